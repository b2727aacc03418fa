/*
    mod.rs - Storage engine

    Block-sharded flat-file persistence for accounts, access tokens,
    chats and per-user chat membership, plus the in-memory identity
    index that fronts the account and token shards.

    On-disk layout under the data dir:

        dbase/userlogindata/<N>        account shards (text)
        dbase/access_tokens/<N>        token shards (text)
        dbase/userchatmembership/<N>   membership shards (JSON)
        chats/<chat_id>/info.json      chat metadata
        chats/<chat_id>/<N>.json       message blocks

    Each sharded collection additionally keeps a persisted `next_id`
    counter for dense id allocation.
*/

pub mod accounts;
pub mod blockfile;
pub mod chats;
pub mod errors;
pub mod identity;
pub mod membership;
pub mod tokens;

pub use accounts::AccountStore;
pub use chats::{ChatInfo, ChatStore, Message};
pub use errors::{StoreError, StoreResult};
pub use identity::IdentityIndex;
pub use membership::MembershipStore;
pub use tokens::TokenStore;

use crate::config::StoreConfig;
use std::sync::Arc;
use tracing::info;

/// Process-scoped storage state: all stores plus the identity index,
/// constructed once at startup and shared behind `Arc`.
pub struct Stores {
    pub identity: Arc<IdentityIndex>,
    pub accounts: AccountStore,
    pub tokens: TokenStore,
    pub membership: Arc<MembershipStore>,
    pub chats: ChatStore,
}

impl Stores {
    /// Open every collection under the configured data dir and rebuild
    /// the identity index from the persisted shards.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let dbase = config.data_dir.join("dbase");
        let identity = Arc::new(IdentityIndex::new());

        let accounts = AccountStore::open(
            &dbase.join("userlogindata"),
            config.block_size,
            identity.clone(),
        )?;
        let tokens = TokenStore::open(
            &dbase.join("access_tokens"),
            config.block_size,
            config.token_len,
            identity.clone(),
        )?;
        let membership = Arc::new(MembershipStore::open(
            &dbase.join("userchatmembership"),
            config.block_size,
        )?);
        let chats = ChatStore::open(
            &config.data_dir.join("chats"),
            config.block_size,
            identity.clone(),
            membership.clone(),
        )?;

        identity.rebuild(accounts.dir(), tokens.dir())?;
        info!(data_dir = %config.data_dir.display(), "storage opened, identity index rebuilt");

        Ok(Stores {
            identity,
            accounts,
            tokens,
            membership,
            chats,
        })
    }
}
