//! Legacy hardware key store: alias-addressed, enumerable, entries either
//! software-extractable or hardware-bound.
//!
//! Whether an entry can be extracted is deliberately not part of its
//! advertised kind; the stores being modelled expose no reliable flag, so
//! extractability is discovered only by attempting the extraction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{self, SignatureAlgorithm};
use crate::error::KeyError;
use crate::keystore::normalize_private_scalar;
use crate::storage::Storage;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    EcPrivateKey,
    Certificate,
    Symmetric,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::EcPrivateKey => write!(f, "EcPrivateKey"),
            EntryKind::Certificate => write!(f, "Certificate"),
            EntryKind::Symmetric => write!(f, "Symmetric"),
        }
    }
}

pub trait LegacyKeyStore: Send + Sync {
    fn aliases(&self) -> Vec<String>;

    fn contains(&self, alias: &str) -> bool;

    fn entry_kind(&self, alias: &str) -> Option<EntryKind>;

    /// Raw private scalar bytes, as stored (possibly carrying an ASN.1
    /// sign byte, possibly short). Hardware-bound entries refuse with
    /// [`KeyError::NonExportable`].
    fn export_key(&self, alias: &str) -> Result<Vec<u8>, KeyError>;

    /// Affine X and Y of the entry's public point.
    fn public_point(&self, alias: &str) -> Result<(Vec<u8>, Vec<u8>), KeyError>;

    /// Sign a digest without the key leaving the store. Output is
    /// DER-encoded, as platform signers produce it.
    fn sign_digest(&self, alias: &str, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError>;
}

const LEGACY_RECORD_PREFIX: &str = "legacy:";

#[derive(Serialize, Deserialize)]
struct LegacyRecord {
    kind: EntryKind,
    algorithm: SignatureAlgorithm,
    exportable: bool,
    // Private material held behind the store boundary; never returned for
    // non-exportable entries.
    scalar: Vec<u8>,
}

/// Store implementation over the embedded database. Hardware-bound entries
/// keep their scalar behind the store boundary: signing and public-point
/// queries work, export does not.
pub struct SoftwareLegacyStore {
    storage: Arc<Storage>,
}

impl SoftwareLegacyStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn record_key(alias: &str) -> String {
        format!("{LEGACY_RECORD_PREFIX}{alias}")
    }

    fn record(&self, alias: &str) -> Result<LegacyRecord, KeyError> {
        self.storage
            .get(&Self::record_key(alias))
            .map_err(|e| KeyError::HardwareAccess {
                alias: alias.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| KeyError::KeyNotFound(alias.to_string()))
    }

    fn put_record(&self, alias: &str, record: &LegacyRecord) -> Result<(), KeyError> {
        self.storage
            .put(&Self::record_key(alias), record)
            .map_err(|e| KeyError::HardwareAccess {
                alias: alias.to_string(),
                reason: e.to_string(),
            })
    }

    /// Seed a software-extractable entry. `scalar` is stored verbatim, so
    /// tests can exercise the 33-byte sign-byte and short-key shapes.
    pub fn put_extractable(
        &self,
        alias: &str,
        scalar: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> Result<(), KeyError> {
        self.put_record(
            alias,
            &LegacyRecord {
                kind: EntryKind::EcPrivateKey,
                algorithm,
                exportable: true,
                scalar: scalar.to_vec(),
            },
        )
    }

    /// Seed a hardware-bound entry: usable in place, never exportable.
    pub fn put_hardware_bound(
        &self,
        alias: &str,
        scalar: &[u8; 32],
        algorithm: SignatureAlgorithm,
    ) -> Result<(), KeyError> {
        self.put_record(
            alias,
            &LegacyRecord {
                kind: EntryKind::EcPrivateKey,
                algorithm,
                exportable: false,
                scalar: scalar.to_vec(),
            },
        )
    }

    /// Seed a non-key entry (trust certificate and the like).
    pub fn put_certificate(&self, alias: &str) -> Result<(), KeyError> {
        self.put_record(
            alias,
            &LegacyRecord {
                kind: EntryKind::Certificate,
                algorithm: SignatureAlgorithm::EcdsaP256,
                exportable: false,
                scalar: Vec::new(),
            },
        )
    }

    pub fn remove(&self, alias: &str) -> Result<(), KeyError> {
        self.storage
            .remove(&Self::record_key(alias))
            .map_err(|e| KeyError::HardwareAccess {
                alias: alias.to_string(),
                reason: e.to_string(),
            })
    }

    fn scalar32(&self, alias: &str, record: &LegacyRecord) -> Result<[u8; 32], KeyError> {
        if record.kind != EntryKind::EcPrivateKey {
            return Err(KeyError::UnsupportedKeyType {
                alias: alias.to_string(),
                kind: record.kind.to_string(),
            });
        }
        normalize_private_scalar(&record.scalar)
    }
}

impl LegacyKeyStore for SoftwareLegacyStore {
    fn aliases(&self) -> Vec<String> {
        self.storage
            .keys_with_prefix(LEGACY_RECORD_PREFIX)
            .into_iter()
            .map(|k| k[LEGACY_RECORD_PREFIX.len()..].to_string())
            .collect()
    }

    fn contains(&self, alias: &str) -> bool {
        self.storage
            .contains(&Self::record_key(alias))
            .unwrap_or(false)
    }

    fn entry_kind(&self, alias: &str) -> Option<EntryKind> {
        self.record(alias).ok().map(|r| r.kind)
    }

    fn export_key(&self, alias: &str) -> Result<Vec<u8>, KeyError> {
        let record = self.record(alias)?;
        if record.kind != EntryKind::EcPrivateKey {
            return Err(KeyError::UnsupportedKeyType {
                alias: alias.to_string(),
                kind: record.kind.to_string(),
            });
        }
        if !record.exportable {
            return Err(KeyError::NonExportable(alias.to_string()));
        }
        Ok(record.scalar)
    }

    fn public_point(&self, alias: &str) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
        let record = self.record(alias)?;
        let scalar = self.scalar32(alias, &record)?;
        let point = crypto::public_key_uncompressed(record.algorithm, &scalar)?;
        Ok((point[1..33].to_vec(), point[33..65].to_vec()))
    }

    fn sign_digest(&self, alias: &str, digest: &[u8; 32]) -> Result<Vec<u8>, KeyError> {
        let record = self.record(alias)?;
        let scalar = self.scalar32(alias, &record)?;
        crypto::sign_prehash_der(record.algorithm, &scalar, digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SoftwareLegacyStore {
        SoftwareLegacyStore::new(Arc::new(Storage::temporary().unwrap()))
    }

    #[test]
    fn test_extractable_entry_exports() {
        let s = store();
        s.put_extractable("user_keystore_a", &[0x31; 32], SignatureAlgorithm::EcdsaP256)
            .unwrap();
        assert_eq!(s.export_key("user_keystore_a").unwrap(), vec![0x31; 32]);
    }

    #[test]
    fn test_hardware_bound_entry_refuses_export_but_signs() {
        let s = store();
        s.put_hardware_bound("user_keystore_hw", &[0x32; 32], SignatureAlgorithm::EcdsaP256)
            .unwrap();

        assert!(matches!(
            s.export_key("user_keystore_hw"),
            Err(KeyError::NonExportable(_))
        ));

        let digest = [0x01u8; 32];
        let der = s.sign_digest("user_keystore_hw", &digest).unwrap();
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn test_non_key_entry_is_unsupported() {
        let s = store();
        s.put_certificate("user_keystore_cert").unwrap();
        assert!(matches!(
            s.export_key("user_keystore_cert"),
            Err(KeyError::UnsupportedKeyType { .. })
        ));
    }

    #[test]
    fn test_missing_alias_distinct_from_non_exportable() {
        let s = store();
        assert!(matches!(
            s.export_key("user_keystore_none"),
            Err(KeyError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_alias_enumeration() {
        let s = store();
        s.put_extractable("user_keystore_a", &[0x31; 32], SignatureAlgorithm::EcdsaP256)
            .unwrap();
        s.put_certificate("user_keystore_b").unwrap();

        let mut aliases = s.aliases();
        aliases.sort();
        assert_eq!(aliases, vec!["user_keystore_a", "user_keystore_b"]);
    }
}
