/*
    codes.rs - API error taxonomy

    Numeric codes are part of the wire contract and never reordered;
    new codes are appended. Every reply that is not a success payload
    is {"error_code": N, "error_desc": "..."} (code 0 doubles as the
    empty success reply).
*/

/// Error codes reported to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ApiErrorCode {
    NoError = 0,
    NoAccessToken = 1,
    NoChatId = 2,
    NoQuerySenderId = 3,
    IncorrectValue = 4,
    TokenValidationFailure = 5,
    NoUserId = 6,
    NoUserPassword = 7,
    UserValidationFailure = 8,
    ChatDoesNotExist = 9,
    ChatIsNotVisible = 10,
    UserNotAdmin = 11,
    UnknownError = 12,
    NoUsername = 13,
    UserAlreadyExists = 14,
    UserDoesNotExist = 15,
    UserNotInChat = 16,
    UserAlreadyInChat = 17,
    NoChatProperty = 18,
    NoChatPropertyValue = 19,
    NoMessageText = 20,
    NoLastMessagesNum = 21,
    NoChatVisibility = 22,
    NoChatName = 23,
    NoChatMembers = 24,
}

impl ApiErrorCode {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    pub fn description(&self) -> &'static str {
        match self {
            ApiErrorCode::NoError => "",
            ApiErrorCode::NoAccessToken => "No access token provided to API",
            ApiErrorCode::NoChatId => "Query parameter not found: chat_id",
            ApiErrorCode::NoQuerySenderId => {
                "Unknown query sender id, unable to validate access token"
            }
            ApiErrorCode::IncorrectValue => {
                "Some of the fields of query contain prohibited values"
            }
            ApiErrorCode::TokenValidationFailure => {
                "Incorrect token sent, please check it's correctness"
            }
            ApiErrorCode::NoUserId => "No user ID",
            ApiErrorCode::NoUserPassword => "No password",
            ApiErrorCode::UserValidationFailure => "Incorrect login or password",
            ApiErrorCode::ChatDoesNotExist => {
                "Chat with this id doesnt exist, check the correctness of query parameters"
            }
            ApiErrorCode::ChatIsNotVisible => {
                "Chat is not public, you need to be it's member to get info about it"
            }
            ApiErrorCode::UserNotAdmin => {
                "You need to be admin of the chat to have access to this operations"
            }
            ApiErrorCode::UnknownError => "Unknown error",
            ApiErrorCode::NoUsername => "No username",
            ApiErrorCode::UserAlreadyExists => "User already exists",
            ApiErrorCode::UserDoesNotExist => {
                "User with this id doesn't exist, check the correctness of query parameters"
            }
            ApiErrorCode::UserNotInChat => "User with this id is not a member of this chat",
            ApiErrorCode::UserAlreadyInChat => "User with this id is already in chat",
            ApiErrorCode::NoChatProperty => "No chat property",
            ApiErrorCode::NoChatPropertyValue => "No new value of a property",
            ApiErrorCode::NoMessageText => "No message text",
            ApiErrorCode::NoLastMessagesNum => "No number of last messages",
            ApiErrorCode::NoChatVisibility => "No chat visibility",
            ApiErrorCode::NoChatName => "No chat name",
            ApiErrorCode::NoChatMembers => "No chat members",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ApiErrorCode::NoError.code(), 0);
        assert_eq!(ApiErrorCode::TokenValidationFailure.code(), 5);
        assert_eq!(ApiErrorCode::UnknownError.code(), 12);
        assert_eq!(ApiErrorCode::NoChatMembers.code(), 24);
    }

    #[test]
    fn test_no_error_has_empty_description() {
        assert_eq!(ApiErrorCode::NoError.description(), "");
        assert!(!ApiErrorCode::UnknownError.description().is_empty());
    }
}
