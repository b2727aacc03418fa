/*
    membership.rs - Per-user chat membership index

    Mirrors chat membership from the user's side so "my chats" queries
    need not scan every chat directory. JSON shards of the form
    {"membership": [{"id": N, "chats": [...]}, ...]}, sharded by
    user_id / block_size. A user's record is created together with the
    account and rewritten on every add/remove.
*/

use crate::store::blockfile;
use crate::store::errors::{handle_poison, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MembershipRecord {
    id: u64,
    chats: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MembershipBlock {
    membership: Vec<MembershipRecord>,
}

pub struct MembershipStore {
    dir: PathBuf,
    block_size: u64,
    /// Serializes shard rewrites
    lock: Mutex<()>,
}

impl MembershipStore {
    pub fn open(dir: &Path, block_size: u64) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(MembershipStore {
            dir: dir.to_path_buf(),
            block_size,
            lock: Mutex::new(()),
        })
    }

    fn shard_for(&self, user_id: u64) -> PathBuf {
        blockfile::shard_path(&self.dir, blockfile::shard_index(user_id, self.block_size))
    }

    fn read_block(&self, path: &Path) -> StoreResult<MembershipBlock> {
        if path.exists() {
            blockfile::read_json(path)
        } else {
            Ok(MembershipBlock::default())
        }
    }

    /// Create the user's empty membership record.
    ///
    /// A record lives at offset user_id % block_size in its shard.
    /// Account creation and the membership write are separate critical
    /// sections, so records may arrive out of id order; any missing
    /// earlier records in the shard are back-filled empty and completed
    /// when their own creation lands here. Idempotent.
    pub fn ensure_record(&self, user_id: u64) -> StoreResult<()> {
        let _guard = self.lock.lock().map_err(handle_poison)?;

        let path = self.shard_for(user_id);
        let mut block = self.read_block(&path)?;
        let offset = blockfile::shard_offset(user_id, self.block_size);
        if offset < block.membership.len() {
            return Ok(());
        }

        let base = blockfile::shard_index(user_id, self.block_size) * self.block_size;
        while block.membership.len() <= offset {
            block.membership.push(MembershipRecord {
                id: base + block.membership.len() as u64,
                chats: Vec::new(),
            });
        }
        blockfile::write_json(&path, &block)
    }

    pub fn add(&self, user_id: u64, chat_id: u64) -> StoreResult<()> {
        let _guard = self.lock.lock().map_err(handle_poison)?;

        let path = self.shard_for(user_id);
        let mut block = self.read_block(&path)?;
        let offset = blockfile::shard_offset(user_id, self.block_size);
        let record = block
            .membership
            .get_mut(offset)
            .ok_or(StoreError::UnknownUser(user_id))?;

        if record.chats.contains(&chat_id) {
            return Err(StoreError::AlreadyMember(chat_id, user_id));
        }
        record.chats.push(chat_id);
        blockfile::write_json(&path, &block)
    }

    pub fn remove(&self, user_id: u64, chat_id: u64) -> StoreResult<()> {
        let _guard = self.lock.lock().map_err(handle_poison)?;

        let path = self.shard_for(user_id);
        let mut block = self.read_block(&path)?;
        let offset = blockfile::shard_offset(user_id, self.block_size);
        let record = block
            .membership
            .get_mut(offset)
            .ok_or(StoreError::UnknownUser(user_id))?;

        let before = record.chats.len();
        record.chats.retain(|id| *id != chat_id);
        if record.chats.len() == before {
            return Err(StoreError::NotMember(chat_id, user_id));
        }
        blockfile::write_json(&path, &block)
    }

    /// Chat ids the user belongs to, in join order
    pub fn chats_of(&self, user_id: u64) -> StoreResult<Vec<u64>> {
        let path = self.shard_for(user_id);
        let block = self.read_block(&path)?;
        let offset = blockfile::shard_offset(user_id, self.block_size);
        block
            .membership
            .get(offset)
            .map(|record| record.chats.clone())
            .ok_or(StoreError::UnknownUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_add_and_list() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        store.ensure_record(0).unwrap();
        store.add(0, 10).unwrap();
        store.add(0, 11).unwrap();

        assert_eq!(store.chats_of(0).unwrap(), vec![10, 11]);
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        store.ensure_record(0).unwrap();
        store.add(0, 10).unwrap();
        assert!(matches!(
            store.add(0, 10),
            Err(StoreError::AlreadyMember(10, 0))
        ));
        assert_eq!(store.chats_of(0).unwrap(), vec![10]);
    }

    #[test]
    fn test_remove_absent_rejected() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        store.ensure_record(0).unwrap();
        assert!(matches!(
            store.remove(0, 10),
            Err(StoreError::NotMember(10, 0))
        ));
    }

    #[test]
    fn test_records_span_shards() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 2).unwrap();

        for user in 0..5 {
            store.ensure_record(user).unwrap();
        }
        store.add(4, 1).unwrap();

        assert_eq!(store.chats_of(4).unwrap(), vec![1]);
        assert_eq!(store.chats_of(3).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_ensure_record_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        store.ensure_record(0).unwrap();
        store.add(0, 7).unwrap();
        store.ensure_record(0).unwrap();

        assert_eq!(store.chats_of(0).unwrap(), vec![7]);
    }

    #[test]
    fn test_out_of_order_creation_backfills_shard() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        // user 2's record lands before 0 and 1 exist
        store.ensure_record(2).unwrap();
        store.ensure_record(0).unwrap();

        store.add(0, 5).unwrap();
        store.add(2, 7).unwrap();
        assert_eq!(store.chats_of(0).unwrap(), vec![5]);
        assert_eq!(store.chats_of(1).unwrap(), Vec::<u64>::new());
        assert_eq!(store.chats_of(2).unwrap(), vec![7]);
    }

    #[test]
    fn test_unknown_user() {
        let dir = tempdir().unwrap();
        let store = MembershipStore::open(dir.path(), 200).unwrap();

        assert!(matches!(
            store.chats_of(3),
            Err(StoreError::UnknownUser(3))
        ));
    }
}
