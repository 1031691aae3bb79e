//! Backward compatibility between the two key-storage generations.
//!
//! Old scheme: `user_keystore_{prefix}` aliases in the hardware store.
//! New scheme: `prefix_key_{prefix}` records in the current store.
//!
//! Resolution checks the current scheme first; this order is load-bearing,
//! it is what keeps an already-migrated key from being re-imported on
//! every lookup.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::crypto::{HashAlgorithm, SignatureAlgorithm};
use crate::error::KeyError;
use crate::keystore::current::{CurrentKeyStore, StoredKey};
use crate::keystore::legacy::{EntryKind, LegacyKeyStore};
use crate::keystore::normalize_private_scalar;
use crate::signer::RawKeySigner;

pub const CURRENT_KEY_PREFIX: &str = "prefix_key_";
pub const LEGACY_ALIAS_PREFIX: &str = "user_keystore_";

pub fn current_key_id(prefix: &str) -> String {
    format!("{CURRENT_KEY_PREFIX}{prefix}")
}

pub fn legacy_alias(prefix: &str) -> String {
    format!("{LEGACY_ALIAS_PREFIX}{prefix}")
}

pub struct KeyCompatibilityResolver {
    current: Arc<CurrentKeyStore>,
    legacy: Arc<dyn LegacyKeyStore>,
}

impl KeyCompatibilityResolver {
    pub fn new(current: Arc<CurrentKeyStore>, legacy: Arc<dyn LegacyKeyStore>) -> Self {
        Self { current, legacy }
    }

    /// Resolve a signer for an account prefix, with legacy fallback.
    ///
    /// Every failure collapses to `None` here; the distinction between
    /// "not found", "hardware-bound" and "store error" survives only in
    /// the logs. Password-prefix accounts sign P-256 with SHA2-256.
    pub fn resolve(&self, prefix: &str, password: &str) -> Option<RawKeySigner> {
        let key_id = current_key_id(prefix);
        match self.current.get(&key_id, password) {
            Ok(key) => {
                debug!("resolved key from current store: {key_id}");
                return Some(prefix_signer(key));
            }
            Err(e) => debug!("key not in current store ({key_id}): {e}"),
        }

        match self.import_from_legacy(prefix, password) {
            Ok(key) => {
                info!("resolved key from legacy store for prefix '{prefix}' and imported it");
                Some(prefix_signer(key))
            }
            Err(KeyError::KeyNotFound(alias)) => {
                debug!("no legacy entry '{alias}' for prefix '{prefix}'");
                None
            }
            Err(KeyError::NonExportable(alias)) => {
                // Usable in place via a HardwareSigner, but never silently
                // migrated.
                info!("legacy key '{alias}' is hardware-bound; not migrating");
                None
            }
            Err(e) => {
                warn!("legacy lookup failed for prefix '{prefix}': {e}");
                None
            }
        }
    }

    /// Extract from the legacy store, normalize, and import into the
    /// current scheme under the current-scheme id.
    fn import_from_legacy(&self, prefix: &str, password: &str) -> Result<StoredKey, KeyError> {
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
        key.store(&self.current, &current_key_id(prefix), password)?;
        Ok(key)
    }

    /// Whether a key exists for the prefix in either storage generation.
    pub fn has_key(&self, prefix: &str, password: &str) -> bool {
        if self.current.get(&current_key_id(prefix), password).is_ok() {
            return true;
        }
        self.legacy.contains(&legacy_alias(prefix))
    }

    /// Human-readable report of what each store holds for a prefix.
    pub fn diagnose(&self, prefix: &str, password: &str) -> String {
        let mut report = String::new();
        let key_id = current_key_id(prefix);
        let _ = writeln!(report, "=== key storage diagnostic for prefix: {prefix} ===");
        match self.current.get(&key_id, password) {
            Ok(key) => {
                let public = key
                    .public_key(SignatureAlgorithm::EcdsaP256)
                    .map(|p| hex::encode(&p[1..17]))
                    .unwrap_or_else(|_| "unavailable".into());
                let _ = writeln!(report, "current store ({key_id}): found (public key: {public}...)");
            }
            Err(e) => {
                let _ = writeln!(report, "current store ({key_id}): not found ({e})");
            }
        }
        let alias = legacy_alias(prefix);
        match self.legacy.entry_kind(&alias) {
            Some(kind) => {
                let _ = writeln!(report, "legacy store ({alias}): found ({kind})");
            }
            None => {
                let _ = writeln!(report, "legacy store ({alias}): not found");
            }
        }
        report
    }
}

fn prefix_signer(key: StoredKey) -> RawKeySigner {
    RawKeySigner::new(key, SignatureAlgorithm::EcdsaP256)
        .with_hash_algorithm(HashAlgorithm::Sha2_256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::legacy::SoftwareLegacyStore;
    use crate::signer::KeySigner;
    use crate::storage::Storage;

    const TEST_SCALAR: [u8; 32] = [0x47u8; 32];

    struct Fixture {
        resolver: KeyCompatibilityResolver,
        current: Arc<CurrentKeyStore>,
        legacy: Arc<SoftwareLegacyStore>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(Storage::temporary().unwrap());
        let current = Arc::new(CurrentKeyStore::new(storage.clone()));
        let legacy = Arc::new(SoftwareLegacyStore::new(storage));
        let resolver = KeyCompatibilityResolver::new(
            current.clone(),
            legacy.clone() as Arc<dyn LegacyKeyStore>,
        );
        Fixture {
            resolver,
            current,
            legacy,
        }
    }

    #[test]
    fn test_current_store_wins() {
        let f = fixture();
        StoredKey::import_raw(&TEST_SCALAR)
            .unwrap()
            .store(&f.current, &current_key_id("p1"), "p1")
            .unwrap();

        let signer = f.resolver.resolve("p1", "p1").unwrap();
        assert_eq!(
            signer.signature_algorithm(),
            SignatureAlgorithm::EcdsaP256
        );
        assert_eq!(signer.hash_algorithm(), HashAlgorithm::Sha2_256);
    }

    #[test]
    fn test_legacy_key_imported_exactly_once() {
        let f = fixture();
        f.legacy
            .put_extractable(
                &legacy_alias("p2"),
                &TEST_SCALAR,
                SignatureAlgorithm::EcdsaP256,
            )
            .unwrap();

        assert!(!f.current.contains(&current_key_id("p2")));
        let first = f.resolver.resolve("p2", "p2").unwrap();
        assert!(f.current.contains(&current_key_id("p2")));

        // Remove the legacy entry; resolution must now come from the
        // current store alone, proving no re-import happens.
        f.legacy.remove(&legacy_alias("p2")).unwrap();
        let second = f.resolver.resolve("p2", "p2").unwrap();
        assert_eq!(
            first.public_key_hex().unwrap(),
            second.public_key_hex().unwrap()
        );
    }

    #[test]
    fn test_legacy_sign_byte_key_is_normalized() {
        let f = fixture();
        let mut with_sign_byte = vec![0u8];
        with_sign_byte.extend_from_slice(&TEST_SCALAR);
        f.legacy
            .put_extractable(
                &legacy_alias("p3"),
                &with_sign_byte,
                SignatureAlgorithm::EcdsaP256,
            )
            .unwrap();

        let signer = f.resolver.resolve("p3", "p3").unwrap();
        let expected = crate::crypto::public_key_uncompressed(
            SignatureAlgorithm::EcdsaP256,
            &TEST_SCALAR,
        )
        .unwrap();
        assert_eq!(
            signer.public_key_hex().unwrap(),
            hex::encode(&expected[1..])
        );
    }

    #[test]
    fn test_hardware_bound_key_is_not_migrated() {
        let f = fixture();
        f.legacy
            .put_hardware_bound(
                &legacy_alias("p4"),
                &TEST_SCALAR,
                SignatureAlgorithm::EcdsaP256,
            )
            .unwrap();

        assert!(f.resolver.resolve("p4", "p4").is_none());
        assert!(!f.current.contains(&current_key_id("p4")));
        // Still discoverable for in-place hardware signing.
        assert!(f.resolver.has_key("p4", "p4"));
    }

    #[test]
    fn test_unknown_prefix_is_none() {
        let f = fixture();
        assert!(f.resolver.resolve("ghost", "ghost").is_none());
        assert!(!f.resolver.has_key("ghost", "ghost"));
    }

    #[test]
    fn test_certificate_entry_is_none() {
        let f = fixture();
        f.legacy.put_certificate(&legacy_alias("p5")).unwrap();
        assert!(f.resolver.resolve("p5", "p5").is_none());
    }
}
