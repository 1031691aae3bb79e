//! One-time startup sweep that moves extractable legacy keys into the
//! current store.
//!
//! Deliberately non-transactional across accounts: a partially migrated
//! set with the completion marker unset is an accepted, re-enterable
//! state. The marker is written only after a sweep finishes without an
//! unhandled failure, so an interrupted sweep retries on the next launch.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::account::cache::AccountCache;
use crate::crypto::SignatureAlgorithm;
use crate::error::KeyError;
use crate::keystore::compat::{current_key_id, legacy_alias};
use crate::keystore::current::{CurrentKeyStore, StoredKey};
use crate::keystore::legacy::{EntryKind, LegacyKeyStore};
use crate::keystore::normalize_private_scalar;
use crate::storage::Storage;

pub const MIGRATION_MARKER_KEY: &str = "keystore_migration_completed";

pub struct MigrationCoordinator {
    storage: Arc<Storage>,
    current: Arc<CurrentKeyStore>,
    legacy: Arc<dyn LegacyKeyStore>,
    cache: Arc<AccountCache>,
}

impl MigrationCoordinator {
    pub fn new(
        storage: Arc<Storage>,
        current: Arc<CurrentKeyStore>,
        legacy: Arc<dyn LegacyKeyStore>,
        cache: Arc<AccountCache>,
    ) -> Self {
        Self {
            storage,
            current,
            legacy,
            cache,
        }
    }

    /// Run the sweep unless the completion marker is already set.
    pub fn run_once(&self) {
        if self.status() {
            debug!("key migration already completed, skipping");
            return;
        }

        let accounts = match self.cache.read_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                // Without the account list nothing can be swept; leave the
                // marker unset so the next launch retries.
                warn!("could not read account cache for migration: {e}");
                return;
            }
        };
        info!("checking {} cached accounts for key migration", accounts.len());

        let mut eligible = 0usize;
        let mut migrated = 0usize;

        for account in &accounts {
            let Some(prefix) = account
                .prefix
                .as_deref()
                .filter(|p| !p.trim().is_empty())
            else {
                continue;
            };
            eligible += 1;

            let key_id = current_key_id(prefix);
            if self.current.get(&key_id, prefix).is_ok() {
                debug!("prefix '{prefix}' already has a key in the current store, skipping");
                continue;
            }

            match self.migrate_prefix(prefix, &key_id) {
                Ok(()) => {
                    info!("migrated legacy key for prefix '{prefix}'");
                    migrated += 1;
                }
                Err(KeyError::KeyNotFound(alias)) => {
                    debug!("no legacy key '{alias}' for prefix '{prefix}' (may be a new account)");
                }
                Err(KeyError::NonExportable(alias)) => {
                    info!("legacy key '{alias}' is hardware-bound; left in place");
                }
                Err(e @ KeyError::InvalidKeySize { .. }) => {
                    error!("cannot migrate prefix '{prefix}': {e}; account may need manual recovery");
                }
                Err(e) => {
                    error!("migration failed for prefix '{prefix}': {e}");
                }
            }
        }

        if migrated > 0 || eligible == 0 {
            match self.storage.put(MIGRATION_MARKER_KEY, &true) {
                Ok(()) => info!("key migration completed ({migrated} keys moved)"),
                Err(e) => warn!("failed to persist migration marker: {e}"),
            }
        } else {
            debug!("no keys migrated this launch; marker left unset");
        }
    }

    fn migrate_prefix(&self, prefix: &str, key_id: &str) -> Result<(), KeyError> {
        let alias = legacy_alias(prefix);
        if !self.legacy.contains(&alias) {
            return Err(KeyError::KeyNotFound(alias));
        }
        match self.legacy.entry_kind(&alias) {
            Some(EntryKind::EcPrivateKey) => {}
            kind => {
                return Err(KeyError::UnsupportedKeyType {
                    alias,
                    kind: kind.map(|k| k.to_string()).unwrap_or_else(|| "none".into()),
                })
            }
        }

        let raw = self.legacy.export_key(&alias)?;
        let scalar = normalize_private_scalar(&raw)?;
        let key = StoredKey::import_raw(&scalar)?;
        key.store(&self.current, key_id, prefix)
            .map_err(|e| KeyError::MigrationStorage(key_id.to_string(), e.to_string()))?;

        // Verify by re-reading the stored key and deriving a public key
        // from it; a key that cannot produce one was not actually saved.
        let stored = self
            .current
            .get(key_id, prefix)
            .map_err(|e| KeyError::MigrationStorage(key_id.to_string(), e.to_string()))?;
        stored
            .public_key(SignatureAlgorithm::EcdsaP256)
            .map_err(|_| KeyError::MigrationVerification(key_id.to_string()))?;
        Ok(())
    }

    /// Whether the completion marker is set.
    pub fn status(&self) -> bool {
        self.storage
            .get::<bool>(MIGRATION_MARKER_KEY)
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    /// Clear the completion marker so the next `run_once` sweeps again.
    pub fn reset(&self) {
        if let Err(e) = self.storage.remove(MIGRATION_MARKER_KEY) {
            debug!("error resetting migration marker: {e}");
        }
    }
}
