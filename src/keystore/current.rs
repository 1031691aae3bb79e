//! Current key-store scheme: key-id addressed, password scoped.
//!
//! Each record holds an Argon2id hash of the password (so a wrong password
//! is distinguishable from a corrupt record) and the 32-byte scalar sealed
//! with AES-256-GCM under a PBKDF2-derived key.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{self, SignatureAlgorithm};
use crate::error::KeyError;
use crate::storage::Storage;

const KEY_RECORD_PREFIX: &str = "key:";
const PBKDF2_ROUNDS: u32 = 100_000;

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    password_hash: String,
    salt: Vec<u8>,
    // nonce || ciphertext
    blob: Vec<u8>,
}

pub struct CurrentKeyStore {
    storage: Arc<Storage>,
}

impl CurrentKeyStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn record_key(key_id: &str) -> String {
        format!("{KEY_RECORD_PREFIX}{key_id}")
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.storage
            .contains(&Self::record_key(key_id))
            .unwrap_or(false)
    }

    /// Password-scoped lookup. A present record with the wrong password is
    /// reported as `WrongPassword`, not `KeyNotFound`.
    pub fn get(&self, key_id: &str, password: &str) -> Result<StoredKey, KeyError> {
        let record: KeyRecord = self
            .storage
            .get(&Self::record_key(key_id))?
            .ok_or_else(|| KeyError::KeyNotFound(key_id.to_string()))?;

        if !verify_password(password, &record.password_hash) {
            return Err(KeyError::WrongPassword(key_id.to_string()));
        }

        let plaintext = decrypt(&record.blob, password, &record.salt)
            .ok_or_else(|| KeyError::WrongPassword(key_id.to_string()))?;
        StoredKey::import_raw(&plaintext)
    }

    pub(crate) fn put(
        &self,
        key_id: &str,
        password: &str,
        scalar: &[u8; 32],
    ) -> Result<(), KeyError> {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);

        let password_hash = hash_password(password)?;
        let blob = encrypt(scalar, password, &salt)?;

        let record = KeyRecord {
            password_hash,
            salt: salt.to_vec(),
            blob,
        };
        self.storage.put(&Self::record_key(key_id), &record)?;
        debug!("stored key under id '{key_id}'");
        Ok(())
    }
}

/// A private scalar held in memory, zeroed on drop. The only way key
/// material enters or leaves the current store.
pub struct StoredKey {
    scalar: Zeroizing<[u8; 32]>,
}

impl StoredKey {
    /// Fresh random key, valid on both supported curves.
    pub fn create() -> Self {
        loop {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            if k256::ecdsa::SigningKey::from_slice(&bytes).is_ok()
                && p256::ecdsa::SigningKey::from_slice(&bytes).is_ok()
            {
                return Self {
                    scalar: Zeroizing::new(bytes),
                };
            }
        }
    }

    /// Import a raw scalar. Exactly 32 bytes; anything else is a size
    /// error, never silently reshaped.
    pub fn import_raw(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidKeySize {
                actual: bytes.len(),
                expected: 32,
            });
        }
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(bytes);
        Ok(Self {
            scalar: Zeroizing::new(scalar),
        })
    }

    /// Persist under the given id, sealed with the password.
    pub fn store(
        &self,
        store: &CurrentKeyStore,
        key_id: &str,
        password: &str,
    ) -> Result<(), KeyError> {
        store.put(key_id, password, &self.scalar)
    }

    /// Uncompressed SEC1 public point for this key on the given curve.
    pub fn public_key(&self, algorithm: SignatureAlgorithm) -> Result<Vec<u8>, KeyError> {
        crypto::public_key_uncompressed(algorithm, &self.scalar)
    }

    pub(crate) fn secret_bytes(&self) -> &[u8; 32] {
        &self.scalar
    }
}

fn hash_password(password: &str) -> Result<String, KeyError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| KeyError::StoreFailure(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn derive_encryption_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

fn encrypt(data: &[u8], password: &str, salt: &[u8]) -> Result<Vec<u8>, KeyError> {
    let key = derive_encryption_key(password, salt);
    let cipher = Aes256Gcm::new(&key.into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| KeyError::StoreFailure(format!("encryption error: {e:?}")))?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

fn decrypt(blob: &[u8], password: &str, salt: &[u8]) -> Option<Vec<u8>> {
    if blob.len() < 12 {
        return None;
    }
    let key = derive_encryption_key(password, salt);
    let cipher = Aes256Gcm::new(&key.into());
    let nonce = Nonce::from_slice(&blob[..12]);
    cipher.decrypt(nonce, &blob[12..]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> CurrentKeyStore {
        CurrentKeyStore::new(Arc::new(Storage::temporary().unwrap()))
    }

    #[test]
    fn test_store_and_get_roundtrip() {
        let store = test_store();
        let key = StoredKey::create();
        key.store(&store, "prefix_key_abc", "abc").unwrap();

        let loaded = store.get("prefix_key_abc", "abc").unwrap();
        assert_eq!(loaded.secret_bytes(), key.secret_bytes());
    }

    #[test]
    fn test_wrong_password_is_distinguished_from_missing() {
        let store = test_store();
        StoredKey::create()
            .store(&store, "prefix_key_abc", "abc")
            .unwrap();

        assert!(matches!(
            store.get("prefix_key_abc", "nope"),
            Err(KeyError::WrongPassword(_))
        ));
        assert!(matches!(
            store.get("prefix_key_other", "abc"),
            Err(KeyError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_import_raw_requires_exactly_32_bytes() {
        assert!(StoredKey::import_raw(&[0x01; 32]).is_ok());
        assert!(matches!(
            StoredKey::import_raw(&[0x01; 31]),
            Err(KeyError::InvalidKeySize { actual: 31, .. })
        ));
        assert!(matches!(
            StoredKey::import_raw(&[0x01; 33]),
            Err(KeyError::InvalidKeySize { actual: 33, .. })
        ));
    }

    #[test]
    fn test_created_key_works_on_both_curves() {
        let key = StoredKey::create();
        assert_eq!(
            key.public_key(SignatureAlgorithm::EcdsaP256).unwrap().len(),
            65
        );
        assert_eq!(
            key.public_key(SignatureAlgorithm::EcdsaSecp256k1)
                .unwrap()
                .len(),
            65
        );
    }
}
