/*
    tokens.rs - Access token store

    Persists `"user_id token"` records sharded by user_id / block_size.
    At most one live token per user: rotation rewrites the user's line
    in place and drops the old mapping from the identity index.

    Tokens are drawn uniformly per character from a fixed alphabet via
    `rand`; they are session handles, not cryptographic material. This
    reproduces the original system and is a documented gap.
*/

use crate::store::blockfile;
use crate::store::errors::{handle_poison, StoreResult};
use crate::store::identity::IdentityIndex;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const TOKEN_ALPHABET: &[u8] =
    b"QWERTYUIOPASDFGHJKLZXCVBNMqwertyuiopasdfghjklzxcvbnm.-0123456789_=/|";

pub struct TokenStore {
    dir: PathBuf,
    block_size: u64,
    token_len: usize,
    identity: Arc<IdentityIndex>,
    /// Serializes shard rewrites
    lock: Mutex<()>,
}

impl TokenStore {
    pub fn open(
        dir: &Path,
        block_size: u64,
        token_len: usize,
        identity: Arc<IdentityIndex>,
    ) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(TokenStore {
            dir: dir.to_path_buf(),
            block_size,
            token_len,
            identity,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn token_len(&self) -> usize {
        self.token_len
    }

    /// Issue a fresh token for the user, invalidating any previous one
    pub fn issue_or_rotate(&self, user_id: u64) -> StoreResult<String> {
        let _guard = self.lock.lock().map_err(handle_poison)?;

        let token = self.generate_token();
        let shard = blockfile::shard_path(&self.dir, blockfile::shard_index(user_id, self.block_size));

        let mut old_token = None;
        let mut lines = if shard.exists() {
            blockfile::read_lines(&shard)?
        } else {
            Vec::new()
        };

        let mut rewritten = false;
        for line in lines.iter_mut() {
            let mut fields = line.split(' ');
            if let (Some(id), Some(existing)) = (fields.next(), fields.next()) {
                if id.parse::<u64>() == Ok(user_id) {
                    old_token = Some(existing.to_string());
                    *line = format!("{} {}", user_id, token);
                    rewritten = true;
                    break;
                }
            }
        }
        if !rewritten {
            lines.push(format!("{} {}", user_id, token));
        }
        blockfile::write_lines(&shard, &lines)?;

        self.identity
            .rotate_token(old_token.as_deref(), &token, user_id)?;
        Ok(token)
    }

    /// Identity-index lookup; the single authorization gate
    pub fn resolve(&self, token: &str) -> StoreResult<u64> {
        self.identity.lookup_by_token(token)
    }

    fn generate_token(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.token_len)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::errors::StoreError;
    use tempfile::tempdir;

    fn store(dir: &Path) -> TokenStore {
        TokenStore::open(dir, 200, 100, Arc::new(IdentityIndex::new())).unwrap()
    }

    #[test]
    fn test_issue_then_resolve_round_trip() {
        let dir = tempdir().unwrap();
        let tokens = store(dir.path());

        let token = tokens.issue_or_rotate(5).unwrap();
        assert_eq!(token.len(), 100);
        assert_eq!(tokens.resolve(&token).unwrap(), 5);
    }

    #[test]
    fn test_rotation_invalidates_previous_token() {
        let dir = tempdir().unwrap();
        let tokens = store(dir.path());

        let first = tokens.issue_or_rotate(1).unwrap();
        let second = tokens.issue_or_rotate(1).unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            tokens.resolve(&first),
            Err(StoreError::UnknownToken)
        ));
        assert_eq!(tokens.resolve(&second).unwrap(), 1);
    }

    #[test]
    fn test_rotation_rewrites_line_in_place() {
        let dir = tempdir().unwrap();
        let tokens = store(dir.path());

        tokens.issue_or_rotate(0).unwrap();
        tokens.issue_or_rotate(1).unwrap();
        let rotated = tokens.issue_or_rotate(0).unwrap();

        let shard = blockfile::shard_path(dir.path(), 0);
        let lines = blockfile::read_lines(&shard).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("0 {}", rotated));
    }

    #[test]
    fn test_survives_rebuild() {
        let dir = tempdir().unwrap();
        let identity = Arc::new(IdentityIndex::new());
        let tokens =
            TokenStore::open(dir.path(), 200, 100, identity.clone()).unwrap();

        let token = tokens.issue_or_rotate(9).unwrap();

        // fresh index, as after a restart
        let reloaded = Arc::new(IdentityIndex::new());
        reloaded
            .rebuild(tempdir().unwrap().path(), dir.path())
            .unwrap();
        assert_eq!(reloaded.lookup_by_token(&token).unwrap(), 9);
    }
}
