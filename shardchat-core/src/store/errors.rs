/*
    errors.rs - Error types for the storage engine

    Distinguishes business outcomes (unknown user, not a member, ...)
    from infrastructure failures (I/O, corrupt shards, poisoned locks).
    The dispatcher maps the former to precise API codes and the latter
    to UnknownError.
*/

use thiserror::Error;

/// Errors produced by the sharded stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Username is not registered
    #[error("Unknown username: {0}")]
    UnknownUsername(String),

    /// User id has no persisted record
    #[error("Unknown user id: {0}")]
    UnknownUser(u64),

    /// Username already has an account
    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    /// Access token does not resolve to any user
    #[error("Unknown access token")]
    UnknownToken,

    /// Chat directory does not exist
    #[error("Unknown chat id: {0}")]
    UnknownChat(u64),

    /// Chat is hidden and the requester is not a member
    #[error("Chat {0} is not visible to user {1}")]
    ChatNotVisible(u64, u64),

    /// Operation requires chat admin rights
    #[error("User {1} is not the admin of chat {0}")]
    NotAdmin(u64, u64),

    /// Operation requires chat membership
    #[error("User {1} is not a member of chat {0}")]
    NotMember(u64, u64),

    /// Target user is already a chat member
    #[error("User {1} is already a member of chat {0}")]
    AlreadyMember(u64, u64),

    /// Property is unknown or cannot be set directly
    #[error("Chat property cannot be set: {0}")]
    ForbiddenProperty(String),

    /// Storage I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shard contents could not be decoded
    #[error("Corrupt shard {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// A thread panicked while holding a store lock
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Helper to convert poison errors into StoreError
pub(crate) fn handle_poison<T>(_err: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock("a thread panicked while holding the lock".to_string())
}
