//! Persisted account and prefix collections.
//!
//! Both collections are read and written whole, keyed by a fixed version
//! tag; bumping the tag orphans (rather than corrupts) caches written by
//! an incompatible build.

use std::sync::Arc;

use tracing::debug;

use crate::account::types::{Account, UserPrefix};
use crate::error::StorageError;
use crate::storage::Storage;

pub const ACCOUNTS_CACHE_KEY: &str = "accounts_cache_v3";
pub const USER_PREFIX_CACHE_KEY: &str = "user_prefixes_v1";

pub struct AccountCache {
    storage: Arc<Storage>,
}

impl AccountCache {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn read_accounts(&self) -> Result<Vec<Account>, StorageError> {
        Ok(self.storage.get(ACCOUNTS_CACHE_KEY)?.unwrap_or_default())
    }

    pub fn write_accounts(&self, accounts: &[Account]) -> Result<(), StorageError> {
        debug!("persisting {} accounts", accounts.len());
        self.storage.put(ACCOUNTS_CACHE_KEY, &accounts.to_vec())
    }

    pub fn read_prefixes(&self) -> Result<Vec<UserPrefix>, StorageError> {
        Ok(self.storage.get(USER_PREFIX_CACHE_KEY)?.unwrap_or_default())
    }

    pub fn write_prefixes(&self, prefixes: &[UserPrefix]) -> Result<(), StorageError> {
        self.storage.put(USER_PREFIX_CACHE_KEY, &prefixes.to_vec())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(ACCOUNTS_CACHE_KEY)?;
        self.storage.remove(USER_PREFIX_CACHE_KEY)
    }
}
