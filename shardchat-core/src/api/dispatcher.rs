/*
    dispatcher.rs - API request dispatcher

    Stateless per request: decode -> validate -> authenticate -> route
    -> encode. Validation order is part of the contract: missing-field
    checks, then type/range checks, then authentication, then business
    rules. Callers rely on receiving the first applicable error, so the
    checks are explicit and sequential.
*/

use crate::api::codes::ApiErrorCode;
use crate::api::wire::{error_reply, ok_reply, Request};
use crate::store::{StoreError, Stores};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Routes decoded requests into the stores and produces reply payloads
pub struct Dispatcher {
    stores: Arc<Stores>,
}

impl Dispatcher {
    pub fn new(stores: Arc<Stores>) -> Self {
        Dispatcher { stores }
    }

    /// Handle one raw request buffer and return the encoded reply.
    /// Never fails: undecodable requests get an error reply.
    pub fn handle_raw(&self, raw: &[u8]) -> String {
        let reply = match Request::decode(raw) {
            Ok(request) => self.call(&request.method, &request.params),
            Err(e) => {
                debug!(error = %e, "undecodable request");
                error_reply(ApiErrorCode::IncorrectValue)
            }
        };
        reply.to_string()
    }

    /// Route one decoded request
    pub fn call(&self, method: &str, params: &Value) -> Value {
        let result = match method {
            "user.create" => self.user_create(params),
            "access_token.change" => self.token_change(params),
            _ => self.authenticated(method, params),
        };
        result.unwrap_or_else(|reply| reply)
    }

    fn user_create(&self, params: &Value) -> Result<Value, Value> {
        let username = require_str(params, "username", ApiErrorCode::NoUsername)?;
        let password = require_str(params, "password", ApiErrorCode::NoUserPassword)?;

        // records are space-separated lines; names and passwords with
        // whitespace (or nothing at all) cannot be persisted
        if !well_formed(username) || !well_formed(password) {
            return Err(error_reply(ApiErrorCode::IncorrectValue));
        }

        if self.stores.identity.contains_username(username).map_err(|e| self.fail(e))? {
            return Err(error_reply(ApiErrorCode::UserAlreadyExists));
        }

        let user_id = self
            .stores
            .accounts
            .create_user(username, password)
            .map_err(|e| self.fail(e))?;
        self.stores
            .membership
            .ensure_record(user_id)
            .map_err(|e| self.fail(e))?;
        let token = self
            .stores
            .tokens
            .issue_or_rotate(user_id)
            .map_err(|e| self.fail(e))?;

        Ok(json!({ "new_token": token }))
    }

    fn token_change(&self, params: &Value) -> Result<Value, Value> {
        let username = require_str(params, "username", ApiErrorCode::NoUserId)?;
        let password = require_str(params, "password", ApiErrorCode::NoUserPassword)?;

        let user_id = match self.stores.identity.lookup_by_username(username) {
            Ok(user_id) => user_id,
            Err(StoreError::UnknownUsername(_)) => {
                return Err(error_reply(ApiErrorCode::UserValidationFailure))
            }
            Err(e) => return Err(self.fail(e)),
        };
        let valid = self
            .stores
            .accounts
            .validate_password(user_id, password)
            .map_err(|e| self.fail(e))?;
        if !valid {
            return Err(error_reply(ApiErrorCode::UserValidationFailure));
        }

        let token = self
            .stores
            .tokens
            .issue_or_rotate(user_id)
            .map_err(|e| self.fail(e))?;
        Ok(json!({ "new_token": token }))
    }

    /// Token gate plus routing for every other method
    fn authenticated(&self, method: &str, params: &Value) -> Result<Value, Value> {
        let token = require_str(params, "access_token", ApiErrorCode::NoAccessToken)?;
        if token.len() != self.stores.tokens.token_len() {
            return Err(error_reply(ApiErrorCode::IncorrectValue));
        }
        let sender = match self.stores.tokens.resolve(token) {
            Ok(sender) => sender,
            Err(StoreError::UnknownToken) => {
                return Err(error_reply(ApiErrorCode::TokenValidationFailure))
            }
            Err(e) => return Err(self.fail(e)),
        };

        match method {
            "user.getmyinfo" => self.my_info(sender),
            "chat.create" => self.chat_create(sender, params),
            "chat.get" => self.chat_get(sender, params),
            "chat.set.property" => self.chat_set_property(sender, params),
            "chat.addmember" => self.chat_add_member(sender, params),
            "chat.kickmember" => self.chat_kick_member(sender, params),
            "chat.sendmessage" => self.chat_send_message(sender, params),
            "chat.getlastmessages" => self.chat_last_messages(sender, params),
            _ => Err(error_reply(ApiErrorCode::UnknownError)),
        }
    }

    fn my_info(&self, sender: u64) -> Result<Value, Value> {
        let username = self
            .stores
            .accounts
            .username_of(sender)
            .map_err(|e| self.fail(e))?;
        let chat_ids = self
            .stores
            .membership
            .chats_of(sender)
            .map_err(|e| self.fail(e))?;

        let mut chat_membership = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            let name = self
                .stores
                .chats
                .name_of(chat_id)
                .map_err(|e| self.fail(e))?;
            chat_membership.push(json!({ "id": chat_id, "name": name }));
        }

        Ok(json!({
            "username": username,
            "chat_membership": chat_membership,
        }))
    }

    fn chat_create(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let is_visible = require_bool(params, "is_visible", ApiErrorCode::NoChatVisibility)?;
        let name = require_str(params, "name", ApiErrorCode::NoChatName)?;

        let members = match params.get("members") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => {
                let mut members = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry.as_str() {
                        Some(username) => members.push(username.to_string()),
                        None => return Err(error_reply(ApiErrorCode::IncorrectValue)),
                    }
                }
                members
            }
            Some(_) => return Err(error_reply(ApiErrorCode::IncorrectValue)),
        };

        let chat_id = self
            .stores
            .chats
            .create_chat(name, &members, sender, is_visible)
            .map_err(|e| self.fail(e))?;
        Ok(json!({ "chat_id": chat_id }))
    }

    fn chat_get(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let info = self
            .stores
            .chats
            .get_info(chat_id, sender)
            .map_err(|e| self.fail(e))?;
        serde_json::to_value(info).map_err(|e| {
            error!(error = %e, "failed to encode chat info");
            error_reply(ApiErrorCode::UnknownError)
        })
    }

    fn chat_set_property(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let property = require_str(params, "property", ApiErrorCode::NoChatProperty)?;
        let value = match params.get("value") {
            None | Some(Value::Null) => {
                return Err(error_reply(ApiErrorCode::NoChatPropertyValue))
            }
            Some(value) => value,
        };

        self.stores
            .chats
            .set_property(chat_id, sender, property, value)
            .map_err(|e| self.fail(e))?;
        Ok(ok_reply())
    }

    fn chat_add_member(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let target = require_u64(params, "user_id", ApiErrorCode::NoUserId)?;

        let username = self
            .stores
            .accounts
            .username_of(target)
            .map_err(|e| self.fail(e))?;
        self.stores
            .chats
            .add_member(chat_id, sender, target)
            .map_err(|e| self.fail(e))?;
        self.stores
            .chats
            .append_message(chat_id, sender, &format!("{} was invited in chat", username), true)
            .map_err(|e| self.fail(e))?;
        Ok(ok_reply())
    }

    fn chat_kick_member(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let target = require_u64(params, "user_id", ApiErrorCode::NoUserId)?;

        let username = self
            .stores
            .accounts
            .username_of(target)
            .map_err(|e| self.fail(e))?;
        self.stores
            .chats
            .kick_member(chat_id, sender, target)
            .map_err(|e| self.fail(e))?;
        self.stores
            .chats
            .append_message(chat_id, sender, &format!("{} was kicked from chat", username), true)
            .map_err(|e| self.fail(e))?;
        Ok(ok_reply())
    }

    fn chat_send_message(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let text = require_str(params, "text", ApiErrorCode::NoMessageText)?;

        self.stores
            .chats
            .append_message(chat_id, sender, text, false)
            .map_err(|e| self.fail(e))?;
        Ok(ok_reply())
    }

    fn chat_last_messages(&self, sender: u64, params: &Value) -> Result<Value, Value> {
        let chat_id = require_u64(params, "chat_id", ApiErrorCode::NoChatId)?;
        let count = require_i64(params, "num", ApiErrorCode::NoLastMessagesNum)?;

        let messages = self
            .stores
            .chats
            .newest_messages(chat_id, sender, count)
            .map_err(|e| self.fail(e))?;
        Ok(json!({
            "chat_id": chat_id,
            "newest_messages": messages,
        }))
    }

    /// Map a store failure to its API code. Infrastructure failures
    /// are logged server-side and surfaced as UnknownError.
    fn fail(&self, err: StoreError) -> Value {
        let code = match &err {
            StoreError::UnknownUsername(_) | StoreError::UnknownUser(_) => {
                ApiErrorCode::UserDoesNotExist
            }
            StoreError::UsernameTaken(_) => ApiErrorCode::UserAlreadyExists,
            StoreError::UnknownToken => ApiErrorCode::TokenValidationFailure,
            StoreError::UnknownChat(_) => ApiErrorCode::ChatDoesNotExist,
            StoreError::ChatNotVisible(_, _) => ApiErrorCode::ChatIsNotVisible,
            StoreError::NotAdmin(_, _) => ApiErrorCode::UserNotAdmin,
            StoreError::NotMember(_, _) => ApiErrorCode::UserNotInChat,
            StoreError::AlreadyMember(_, _) => ApiErrorCode::UserAlreadyInChat,
            StoreError::ForbiddenProperty(_) => ApiErrorCode::IncorrectValue,
            StoreError::Io(_) | StoreError::Corrupt { .. } | StoreError::Lock(_) => {
                error!(error = %err, "storage failure");
                ApiErrorCode::UnknownError
            }
        };
        error_reply(code)
    }
}

/// A present-and-string field, or the first applicable error:
/// `missing` when absent or null, IncorrectValue on a wrong type
fn require_str<'a>(
    params: &'a Value,
    key: &str,
    missing: ApiErrorCode,
) -> Result<&'a str, Value> {
    match params.get(key) {
        None | Some(Value::Null) => Err(error_reply(missing)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(error_reply(ApiErrorCode::IncorrectValue)),
    }
}

fn require_u64(params: &Value, key: &str, missing: ApiErrorCode) -> Result<u64, Value> {
    match params.get(key) {
        None | Some(Value::Null) => Err(error_reply(missing)),
        // negative and fractional ids fail as_u64
        Some(value) => value
            .as_u64()
            .ok_or_else(|| error_reply(ApiErrorCode::IncorrectValue)),
    }
}

fn require_i64(params: &Value, key: &str, missing: ApiErrorCode) -> Result<i64, Value> {
    match params.get(key) {
        None | Some(Value::Null) => Err(error_reply(missing)),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| error_reply(ApiErrorCode::IncorrectValue)),
    }
}

fn require_bool(params: &Value, key: &str, missing: ApiErrorCode) -> Result<bool, Value> {
    match params.get(key) {
        None | Some(Value::Null) => Err(error_reply(missing)),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| error_reply(ApiErrorCode::IncorrectValue)),
    }
}

fn well_formed(field: &str) -> bool {
    !field.is_empty() && !field.contains(char::is_whitespace)
}
