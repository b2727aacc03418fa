/*
    chats.rs - Chat store

    One directory per chat: `info.json` carries name, members, admin,
    visibility and the message counter; `N.json` files hold fixed-size
    blocks of messages ({"messages": [...]}). The message counter is
    also the next message id, so message N lives in shard
    N / block_size at offset N % block_size.

    The counter rewrite and the block append are two separate writes,
    in that order; a crash between them reserves an id without its
    message. Preserved from the original layout. Per-chat locks close
    the concurrent case: two appends cannot take the same id.
*/

use crate::store::blockfile;
use crate::store::errors::{handle_poison, StoreError, StoreResult};
use crate::store::identity::IdentityIndex;
use crate::store::membership::MembershipStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const INFO_FILE: &str = "info.json";

/// Persisted chat metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatInfo {
    pub name: String,
    pub members: Vec<u64>,
    pub admin: u64,
    pub is_visible: bool,
    pub total_messages: u64,
}

impl ChatInfo {
    pub fn is_member(&self, user_id: u64) -> bool {
        self.members.contains(&user_id)
    }
}

/// A single chat message. System messages carry `type: "system"` and
/// no sender id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<u64>,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MessageBlock {
    messages: Vec<Message>,
}

pub struct ChatStore {
    root: PathBuf,
    block_size: u64,
    identity: Arc<IdentityIndex>,
    membership: Arc<MembershipStore>,
    /// Serializes chat id allocation
    create_lock: Mutex<()>,
    /// Per-chat locks serializing info rewrites and message appends.
    /// One entry per chat ever touched in this process, never evicted;
    /// growth is bounded by the number of chats on disk.
    chat_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl ChatStore {
    pub fn open(
        root: &Path,
        block_size: u64,
        identity: Arc<IdentityIndex>,
        membership: Arc<MembershipStore>,
    ) -> StoreResult<Self> {
        std::fs::create_dir_all(root)?;
        Ok(ChatStore {
            root: root.to_path_buf(),
            block_size,
            identity,
            membership,
            create_lock: Mutex::new(()),
            chat_locks: Mutex::new(HashMap::new()),
        })
    }

    fn chat_dir(&self, chat_id: u64) -> PathBuf {
        self.root.join(chat_id.to_string())
    }

    fn info_path(&self, chat_id: u64) -> PathBuf {
        self.chat_dir(chat_id).join(INFO_FILE)
    }

    fn block_path(&self, chat_id: u64, shard: u64) -> PathBuf {
        self.chat_dir(chat_id).join(format!("{}.json", shard))
    }

    fn chat_lock(&self, chat_id: u64) -> StoreResult<Arc<Mutex<()>>> {
        let mut locks = self.chat_locks.lock().map_err(handle_poison)?;
        Ok(locks.entry(chat_id).or_default().clone())
    }

    fn read_info(&self, chat_id: u64) -> StoreResult<ChatInfo> {
        let path = self.info_path(chat_id);
        if !path.exists() {
            return Err(StoreError::UnknownChat(chat_id));
        }
        blockfile::read_json(&path)
    }

    fn write_info(&self, chat_id: u64, info: &ChatInfo) -> StoreResult<()> {
        blockfile::write_json(&self.info_path(chat_id), info)
    }

    /// Create a chat and fan its membership out to the per-user index.
    ///
    /// Member usernames are resolved up front; any unknown name fails
    /// the whole call before anything is written. The admin is always
    /// a member. The info write and the membership fan-out are not
    /// atomic with each other (documented gap).
    pub fn create_chat(
        &self,
        name: &str,
        member_usernames: &[String],
        admin_id: u64,
        is_visible: bool,
    ) -> StoreResult<u64> {
        let mut members = vec![admin_id];
        for username in member_usernames {
            let user_id = self.identity.lookup_by_username(username)?;
            if !members.contains(&user_id) {
                members.push(user_id);
            }
        }

        let chat_id = {
            let _guard = self.create_lock.lock().map_err(handle_poison)?;
            let chat_id = blockfile::read_counter(&self.root)?;
            std::fs::create_dir_all(self.chat_dir(chat_id))?;
            self.write_info(
                chat_id,
                &ChatInfo {
                    name: name.to_string(),
                    members: members.clone(),
                    admin: admin_id,
                    is_visible,
                    total_messages: 0,
                },
            )?;
            blockfile::write_counter(&self.root, chat_id + 1)?;
            chat_id
        };

        for member in &members {
            self.membership.add(*member, chat_id)?;
        }
        Ok(chat_id)
    }

    /// Chat info, gated by visibility: hidden chats are only readable
    /// by their members.
    pub fn get_info(&self, chat_id: u64, requester: u64) -> StoreResult<ChatInfo> {
        let info = self.read_info(chat_id)?;
        if !info.is_visible && !info.is_member(requester) {
            return Err(StoreError::ChatNotVisible(chat_id, requester));
        }
        Ok(info)
    }

    /// Current chat name, ungated; used for the membership list join
    pub fn name_of(&self, chat_id: u64) -> StoreResult<String> {
        Ok(self.read_info(chat_id)?.name)
    }

    /// Set a scalar chat property. `admin`, `members` and
    /// `total_messages` have dedicated operations and are rejected, as
    /// is any unknown key; only the admin may change the rest.
    pub fn set_property(
        &self,
        chat_id: u64,
        requester: u64,
        property: &str,
        value: &Value,
    ) -> StoreResult<()> {
        let _guard = self.chat_lock(chat_id)?;
        let _guard = _guard.lock().map_err(handle_poison)?;

        let mut info = self.read_info(chat_id)?;

        // property validation comes before the admin check; callers
        // depend on the first applicable error
        let parsed = match property {
            "name" => value
                .as_str()
                .map(|name| PropertyUpdate::Name(name.to_string())),
            "is_visible" => parse_flag(value).map(PropertyUpdate::Visible),
            _ => return Err(StoreError::ForbiddenProperty(property.to_string())),
        }
        .ok_or_else(|| StoreError::ForbiddenProperty(property.to_string()))?;

        if info.admin != requester {
            return Err(StoreError::NotAdmin(chat_id, requester));
        }

        match parsed {
            PropertyUpdate::Name(name) => info.name = name,
            PropertyUpdate::Visible(flag) => info.is_visible = flag,
        }
        self.write_info(chat_id, &info)
    }

    /// Any member may invite; duplicate invites are rejected
    pub fn add_member(&self, chat_id: u64, requester: u64, target: u64) -> StoreResult<()> {
        let _guard = self.chat_lock(chat_id)?;
        let _guard = _guard.lock().map_err(handle_poison)?;

        let mut info = self.read_info(chat_id)?;
        if !info.is_member(requester) {
            return Err(StoreError::NotMember(chat_id, requester));
        }
        if info.is_member(target) {
            return Err(StoreError::AlreadyMember(chat_id, target));
        }

        info.members.push(target);
        self.write_info(chat_id, &info)?;
        self.membership.add(target, chat_id)
    }

    /// Only the admin may kick
    pub fn kick_member(&self, chat_id: u64, requester: u64, target: u64) -> StoreResult<()> {
        let _guard = self.chat_lock(chat_id)?;
        let _guard = _guard.lock().map_err(handle_poison)?;

        let mut info = self.read_info(chat_id)?;
        if info.admin != requester {
            return Err(StoreError::NotAdmin(chat_id, requester));
        }
        if !info.is_member(target) {
            return Err(StoreError::NotMember(chat_id, target));
        }

        info.members.retain(|id| *id != target);
        self.write_info(chat_id, &info)?;
        self.membership.remove(target, chat_id)
    }

    /// Append a message; its id is the chat's current message counter.
    ///
    /// System messages bypass the membership gate and carry no sender.
    pub fn append_message(
        &self,
        chat_id: u64,
        sender: u64,
        text: &str,
        is_system: bool,
    ) -> StoreResult<u64> {
        let _guard = self.chat_lock(chat_id)?;
        let _guard = _guard.lock().map_err(handle_poison)?;

        let mut info = self.read_info(chat_id)?;
        if !is_system && !info.is_member(sender) {
            return Err(StoreError::NotMember(chat_id, sender));
        }

        let message_id = info.total_messages;

        // counter first, block second; preserved write order
        info.total_messages = message_id + 1;
        self.write_info(chat_id, &info)?;

        let path = self.block_path(chat_id, blockfile::shard_index(message_id, self.block_size));
        let mut block = if path.exists() {
            blockfile::read_json::<MessageBlock>(&path)?
        } else {
            MessageBlock::default()
        };
        block.messages.push(Message {
            id: message_id,
            kind: is_system.then(|| "system".to_string()),
            text: text.to_string(),
            sender_id: (!is_system).then_some(sender),
            date: timestamp(),
        });
        blockfile::write_json(&path, &block)?;

        Ok(message_id)
    }

    /// The newest `count` messages in ascending id order. Walks shards
    /// from the last one backwards; returns fewer if the chat is short.
    pub fn newest_messages(
        &self,
        chat_id: u64,
        requester: u64,
        count: i64,
    ) -> StoreResult<Vec<Message>> {
        let info = self.read_info(chat_id)?;
        if !info.is_member(requester) {
            return Err(StoreError::NotMember(chat_id, requester));
        }
        if count <= 0 || info.total_messages == 0 {
            return Ok(Vec::new());
        }

        let mut remaining = count as u64;
        let mut newest_first = Vec::new();
        let last_shard = blockfile::shard_index(info.total_messages - 1, self.block_size);
        for shard in (0..=last_shard).rev() {
            if remaining == 0 {
                break;
            }
            let path = self.block_path(chat_id, shard);
            if !path.exists() {
                continue;
            }
            let block = blockfile::read_json::<MessageBlock>(&path)?;
            for message in block.messages.into_iter().rev() {
                if remaining == 0 {
                    break;
                }
                newest_first.push(message);
                remaining -= 1;
            }
        }

        newest_first.reverse();
        Ok(newest_first)
    }

    /// Point lookup by message id; None when the id was never written
    /// (or lost to the counter/append gap)
    pub fn message_by_id(
        &self,
        chat_id: u64,
        requester: u64,
        message_id: u64,
    ) -> StoreResult<Option<Message>> {
        let info = self.read_info(chat_id)?;
        if !info.is_member(requester) {
            return Err(StoreError::NotMember(chat_id, requester));
        }
        if message_id >= info.total_messages {
            return Ok(None);
        }

        let path = self.block_path(chat_id, blockfile::shard_index(message_id, self.block_size));
        if !path.exists() {
            return Ok(None);
        }
        let block = blockfile::read_json::<MessageBlock>(&path)?;
        Ok(block
            .messages
            .into_iter()
            .find(|message| message.id == message_id))
    }

    /// Message counter, gated by membership
    pub fn total_messages(&self, chat_id: u64, requester: u64) -> StoreResult<u64> {
        let info = self.read_info(chat_id)?;
        if !info.is_member(requester) {
            return Err(StoreError::NotMember(chat_id, requester));
        }
        Ok(info.total_messages)
    }
}

enum PropertyUpdate {
    Name(String),
    Visible(bool),
}

fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%d.%m.%Y %H:%M:%S").to_string()
}
