/*
    accounts.rs - Account store

    Persists `"id username password"` records, one per line, sharded by
    id / block_size. User ids are dense: the next id comes from the
    collection's persisted counter, consumed under the store lock.

    Passwords are stored and compared in plaintext. This reproduces the
    original system and is a documented security gap, not a feature.
*/

use crate::store::blockfile;
use crate::store::errors::{handle_poison, StoreError, StoreResult};
use crate::store::identity::IdentityIndex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AccountStore {
    dir: PathBuf,
    block_size: u64,
    identity: Arc<IdentityIndex>,
    /// Serializes id allocation and shard writes
    lock: Mutex<()>,
}

impl AccountStore {
    pub fn open(dir: &Path, block_size: u64, identity: Arc<IdentityIndex>) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(AccountStore {
            dir: dir.to_path_buf(),
            block_size,
            identity,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an account and return its dense user id.
    ///
    /// The record is persisted before the identity index learns the
    /// name, so a lookup never sees unpersisted state.
    pub fn create_user(&self, username: &str, password: &str) -> StoreResult<u64> {
        let _guard = self.lock.lock().map_err(handle_poison)?;

        if self.identity.contains_username(username)? {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }

        let user_id = blockfile::read_counter(&self.dir)?;
        let shard = blockfile::shard_path(&self.dir, blockfile::shard_index(user_id, self.block_size));
        blockfile::append_line(&shard, &format!("{} {} {}", user_id, username, password))?;
        blockfile::write_counter(&self.dir, user_id + 1)?;

        self.identity.register_user(username, user_id)?;
        Ok(user_id)
    }

    /// Verbatim password comparison against the persisted record
    pub fn validate_password(&self, user_id: u64, password: &str) -> StoreResult<bool> {
        let shard = blockfile::shard_path(&self.dir, blockfile::shard_index(user_id, self.block_size));
        if !shard.exists() {
            return Ok(false);
        }
        for line in blockfile::read_lines(&shard)? {
            if let Some((id, _, stored)) = split_record(&line) {
                if id == user_id {
                    return Ok(stored == password);
                }
            }
        }
        Ok(false)
    }

    pub fn username_of(&self, user_id: u64) -> StoreResult<String> {
        let shard = blockfile::shard_path(&self.dir, blockfile::shard_index(user_id, self.block_size));
        if !shard.exists() {
            return Err(StoreError::UnknownUser(user_id));
        }
        for line in blockfile::read_lines(&shard)? {
            if let Some((id, name, _)) = split_record(&line) {
                if id == user_id {
                    return Ok(name.to_string());
                }
            }
        }
        Err(StoreError::UnknownUser(user_id))
    }
}

/// Split `"id username password"`; None on malformed lines
fn split_record(line: &str) -> Option<(u64, &str, &str)> {
    let mut fields = line.splitn(3, ' ');
    let id = fields.next()?.parse().ok()?;
    let name = fields.next()?;
    let password = fields.next()?;
    Some((id, name, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path, block_size: u64) -> AccountStore {
        AccountStore::open(dir, block_size, Arc::new(IdentityIndex::new())).unwrap()
    }

    #[test]
    fn test_ids_are_dense() {
        let dir = tempdir().unwrap();
        let accounts = store(dir.path(), 200);

        assert_eq!(accounts.create_user("alice", "pw1").unwrap(), 0);
        assert_eq!(accounts.create_user("bob", "pw2").unwrap(), 1);
        assert_eq!(accounts.create_user("carol", "pw3").unwrap(), 2);
    }

    #[test]
    fn test_new_shard_started_at_capacity() {
        let dir = tempdir().unwrap();
        let accounts = store(dir.path(), 2);

        for i in 0..5 {
            accounts.create_user(&format!("user{}", i), "pw").unwrap();
        }

        // ids 0-1 in shard 0, 2-3 in shard 1, 4 in shard 2
        assert_eq!(blockfile::shard_count(dir.path()), 3);
        assert_eq!(accounts.username_of(4).unwrap(), "user4");
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let dir = tempdir().unwrap();
        let accounts = store(dir.path(), 200);

        accounts.create_user("alice", "pw1").unwrap();
        assert!(matches!(
            accounts.create_user("alice", "pw2"),
            Err(StoreError::UsernameTaken(_))
        ));
    }

    #[test]
    fn test_validate_password() {
        let dir = tempdir().unwrap();
        let accounts = store(dir.path(), 200);

        let id = accounts.create_user("alice", "secret").unwrap();
        assert!(accounts.validate_password(id, "secret").unwrap());
        assert!(!accounts.validate_password(id, "wrong").unwrap());
        assert!(!accounts.validate_password(999, "secret").unwrap());
    }

    #[test]
    fn test_username_of_unknown_user() {
        let dir = tempdir().unwrap();
        let accounts = store(dir.path(), 200);

        assert!(matches!(
            accounts.username_of(0),
            Err(StoreError::UnknownUser(0))
        ));
    }
}
