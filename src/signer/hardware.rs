//! Signer over a hardware-bound legacy store entry.
//!
//! The private key never leaves the store: signing is delegated to the
//! platform signer (which returns DER output) and the public key is
//! reassembled from the stored affine coordinates.

use std::sync::Arc;

use crate::crypto::{HashAlgorithm, SignatureAlgorithm};
use crate::encoding::{der_to_raw, normalize_scalar, SCALAR_SIZE};
use crate::error::KeyError;
use crate::keystore::legacy::LegacyKeyStore;
use crate::signer::{format_public_key, KeySigner};

pub struct HardwareSigner {
    store: Arc<dyn LegacyKeyStore>,
    alias: String,
    algorithm: SignatureAlgorithm,
    hash_override: Option<HashAlgorithm>,
}

impl std::fmt::Debug for HardwareSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSigner")
            .field("alias", &self.alias)
            .field("algorithm", &self.algorithm)
            .field("hash_override", &self.hash_override)
            .finish_non_exhaustive()
    }
}

impl HardwareSigner {
    /// Legacy hardware entries default to P-256.
    pub fn new(store: Arc<dyn LegacyKeyStore>, alias: &str) -> Result<Self, KeyError> {
        Self::with_algorithms(store, alias, SignatureAlgorithm::EcdsaP256, None)
    }

    pub fn with_algorithms(
        store: Arc<dyn LegacyKeyStore>,
        alias: &str,
        algorithm: SignatureAlgorithm,
        hash_override: Option<HashAlgorithm>,
    ) -> Result<Self, KeyError> {
        if !store.contains(alias) {
            return Err(KeyError::KeyNotFound(alias.to_string()));
        }
        Ok(Self {
            store,
            alias: alias.to_string(),
            algorithm,
            hash_override,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl KeySigner for HardwareSigner {
    fn public_key_hex(&self) -> Result<String, KeyError> {
        let (x, y) = self.store.public_point(&self.alias)?;
        let mut point = Vec::with_capacity(1 + 2 * SCALAR_SIZE);
        point.push(0x04);
        point.extend_from_slice(&normalize_scalar(&x, SCALAR_SIZE));
        point.extend_from_slice(&normalize_scalar(&y, SCALAR_SIZE));
        Ok(format_public_key(&point))
    }

    fn sign(&self, message: &[u8]) -> Result<String, KeyError> {
        let digest = self.hash_algorithm().digest(message);
        let der = self.store.sign_digest(&self.alias, &digest)?;
        Ok(hex::encode(der_to_raw(&der)))
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_override
            .unwrap_or_else(|| self.algorithm.default_hash())
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn is_exportable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::keystore::legacy::SoftwareLegacyStore;
    use crate::storage::Storage;

    const TEST_SCALAR: [u8; 32] = [0x29u8; 32];

    fn store_with_key(alias: &str) -> Arc<SoftwareLegacyStore> {
        let storage = Arc::new(Storage::temporary().unwrap());
        let store = SoftwareLegacyStore::new(storage);
        store
            .put_hardware_bound(alias, &TEST_SCALAR, SignatureAlgorithm::EcdsaP256)
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_unknown_alias_is_not_found() {
        let store = store_with_key("user_keystore_a");
        let err = HardwareSigner::new(store, "user_keystore_missing").unwrap_err();
        assert!(matches!(err, KeyError::KeyNotFound(_)));
    }

    #[test]
    fn test_public_key_matches_direct_derivation() {
        let store = store_with_key("user_keystore_a");
        let signer = HardwareSigner::new(store, "user_keystore_a").unwrap();

        let expected = crypto::public_key_uncompressed(
            SignatureAlgorithm::EcdsaP256,
            &TEST_SCALAR,
        )
        .unwrap();
        assert_eq!(signer.public_key_hex().unwrap(), hex::encode(&expected[1..]));
    }

    #[test]
    fn test_der_output_converted_to_raw_and_verifies() {
        let store = store_with_key("user_keystore_a");
        let signer = HardwareSigner::new(store, "user_keystore_a").unwrap();

        let message = b"login challenge";
        let raw = hex::decode(signer.sign(message).unwrap()).unwrap();
        assert_eq!(raw.len(), 64);

        let digest = signer.hash_algorithm().digest(message);
        let point =
            crypto::public_key_uncompressed(SignatureAlgorithm::EcdsaP256, &TEST_SCALAR).unwrap();
        assert!(crypto::verify_prehash_raw(
            SignatureAlgorithm::EcdsaP256,
            &point,
            &digest,
            &raw
        ));
    }

    #[test]
    fn test_hardware_signer_is_not_exportable() {
        let store = store_with_key("user_keystore_a");
        let signer = HardwareSigner::new(store, "user_keystore_a").unwrap();
        assert!(!signer.is_exportable());
    }
}
