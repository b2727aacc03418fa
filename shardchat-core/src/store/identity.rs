/*
    identity.rs - In-memory identity index

    O(1) lookup of user id from username or access token without file
    I/O. Rebuilt once at startup by scanning the account and token
    shards; every persisted mutation updates it afterwards
    (write-then-index ordering, so unpersisted state is never
    advertised).
*/

use crate::store::blockfile;
use crate::store::errors::{handle_poison, StoreError, StoreResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::warn;

/// username -> user id and access token -> user id maps
#[derive(Debug, Default)]
pub struct IdentityIndex {
    usernames: RwLock<HashMap<String, u64>>,
    tokens: RwLock<HashMap<String, u64>>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate both maps from the persisted shards.
    ///
    /// Unreadable or malformed shards are logged and skipped; the
    /// service continues with whatever entries were loaded. This is a
    /// known consistency risk, accepted at startup.
    pub fn rebuild(&self, accounts_dir: &Path, tokens_dir: &Path) -> StoreResult<()> {
        let mut usernames = self.usernames.write().map_err(handle_poison)?;
        let mut tokens = self.tokens.write().map_err(handle_poison)?;
        usernames.clear();
        tokens.clear();

        for index in 0..blockfile::shard_count(accounts_dir) {
            let path = blockfile::shard_path(accounts_dir, index);
            let lines = match blockfile::read_lines(&path) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(shard = %path.display(), error = %e, "skipping unreadable account shard");
                    continue;
                }
            };
            for line in lines {
                let mut fields = line.split(' ');
                match (fields.next(), fields.next()) {
                    (Some(id), Some(name)) => {
                        if let Ok(id) = id.parse::<u64>() {
                            usernames.insert(name.to_string(), id);
                        } else {
                            warn!(shard = %path.display(), "malformed account record");
                        }
                    }
                    _ => warn!(shard = %path.display(), "malformed account record"),
                }
            }
        }

        for index in 0..blockfile::shard_count(tokens_dir) {
            let path = blockfile::shard_path(tokens_dir, index);
            let lines = match blockfile::read_lines(&path) {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(shard = %path.display(), error = %e, "skipping unreadable token shard");
                    continue;
                }
            };
            for line in lines {
                let mut fields = line.split(' ');
                match (fields.next(), fields.next()) {
                    (Some(id), Some(token)) => {
                        if let Ok(id) = id.parse::<u64>() {
                            tokens.insert(token.to_string(), id);
                        } else {
                            warn!(shard = %path.display(), "malformed token record");
                        }
                    }
                    _ => warn!(shard = %path.display(), "malformed token record"),
                }
            }
        }

        Ok(())
    }

    pub fn lookup_by_username(&self, name: &str) -> StoreResult<u64> {
        self.usernames
            .read()
            .map_err(handle_poison)?
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::UnknownUsername(name.to_string()))
    }

    pub fn lookup_by_token(&self, token: &str) -> StoreResult<u64> {
        self.tokens
            .read()
            .map_err(handle_poison)?
            .get(token)
            .copied()
            .ok_or(StoreError::UnknownToken)
    }

    pub fn contains_username(&self, name: &str) -> StoreResult<bool> {
        Ok(self.usernames.read().map_err(handle_poison)?.contains_key(name))
    }

    /// Register a freshly persisted account
    pub fn register_user(&self, name: &str, user_id: u64) -> StoreResult<()> {
        self.usernames
            .write()
            .map_err(handle_poison)?
            .insert(name.to_string(), user_id);
        Ok(())
    }

    /// Swap a user's token mapping after the shard rewrite succeeded
    pub fn rotate_token(&self, old: Option<&str>, new: &str, user_id: u64) -> StoreResult<()> {
        let mut tokens = self.tokens.write().map_err(handle_poison)?;
        if let Some(old) = old {
            tokens.remove(old);
        }
        tokens.insert(new.to_string(), user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lookup_absent_fails() {
        let index = IdentityIndex::new();
        assert!(matches!(
            index.lookup_by_username("nobody"),
            Err(StoreError::UnknownUsername(_))
        ));
        assert!(matches!(
            index.lookup_by_token("ttt"),
            Err(StoreError::UnknownToken)
        ));
    }

    #[test]
    fn test_register_and_lookup() {
        let index = IdentityIndex::new();
        index.register_user("alice", 3).unwrap();
        assert_eq!(index.lookup_by_username("alice").unwrap(), 3);
        assert!(index.contains_username("alice").unwrap());
    }

    #[test]
    fn test_rotate_token_drops_old_mapping() {
        let index = IdentityIndex::new();
        index.rotate_token(None, "first", 1).unwrap();
        assert_eq!(index.lookup_by_token("first").unwrap(), 1);

        index.rotate_token(Some("first"), "second", 1).unwrap();
        assert!(index.lookup_by_token("first").is_err());
        assert_eq!(index.lookup_by_token("second").unwrap(), 1);
    }

    #[test]
    fn test_rebuild_from_shards() {
        let accounts = tempdir().unwrap();
        let tokens = tempdir().unwrap();

        blockfile::append_line(&blockfile::shard_path(accounts.path(), 0), "0 alice pw1").unwrap();
        blockfile::append_line(&blockfile::shard_path(accounts.path(), 0), "1 bob pw2").unwrap();
        blockfile::append_line(&blockfile::shard_path(tokens.path(), 0), "1 tok-bob").unwrap();

        let index = IdentityIndex::new();
        index.rebuild(accounts.path(), tokens.path()).unwrap();

        assert_eq!(index.lookup_by_username("alice").unwrap(), 0);
        assert_eq!(index.lookup_by_username("bob").unwrap(), 1);
        assert_eq!(index.lookup_by_token("tok-bob").unwrap(), 1);
    }

    #[test]
    fn test_rebuild_skips_malformed_records() {
        let accounts = tempdir().unwrap();
        let tokens = tempdir().unwrap();

        blockfile::append_line(&blockfile::shard_path(accounts.path(), 0), "garbage").unwrap();
        blockfile::append_line(&blockfile::shard_path(accounts.path(), 0), "2 carol pw").unwrap();

        let index = IdentityIndex::new();
        index.rebuild(accounts.path(), tokens.path()).unwrap();

        assert_eq!(index.lookup_by_username("carol").unwrap(), 2);
        assert!(index.lookup_by_username("garbage").is_err());
    }
}
