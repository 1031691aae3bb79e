//! Signer over a raw private scalar held in the current key store.

use crate::crypto::{self, HashAlgorithm, SignatureAlgorithm};
use crate::encoding::strip_recovery_id;
use crate::error::KeyError;
use crate::keystore::current::StoredKey;
use crate::signer::{format_public_key, KeySigner};

pub struct RawKeySigner {
    key: StoredKey,
    algorithm: SignatureAlgorithm,
    hash: HashAlgorithm,
}

impl RawKeySigner {
    pub fn new(key: StoredKey, algorithm: SignatureAlgorithm) -> Self {
        Self {
            key,
            algorithm,
            hash: algorithm.default_hash(),
        }
    }

    /// Override the default curve/hash pairing, e.g. P-256 with SHA2-256
    /// for password-prefix accounts.
    pub fn with_hash_algorithm(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    pub fn into_key(self) -> StoredKey {
        self.key
    }
}

impl KeySigner for RawKeySigner {
    fn public_key_hex(&self) -> Result<String, KeyError> {
        let point = self.key.public_key(self.algorithm)?;
        Ok(format_public_key(&point))
    }

    fn sign(&self, message: &[u8]) -> Result<String, KeyError> {
        let digest = self.hash.digest(message);
        // secp256k1 output carries a trailing recovery byte; always strip.
        let signature = crypto::sign_prehash_raw(self.algorithm, self.key.secret_bytes(), &digest)?;
        Ok(hex::encode(strip_recovery_id(&signature)))
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn is_exportable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCALAR: [u8; 32] = [0x17u8; 32];

    fn signer(algorithm: SignatureAlgorithm) -> RawKeySigner {
        let key = StoredKey::import_raw(&TEST_SCALAR).unwrap();
        RawKeySigner::new(key, algorithm)
    }

    #[test]
    fn test_public_key_has_no_point_prefix() {
        for algo in [
            SignatureAlgorithm::EcdsaP256,
            SignatureAlgorithm::EcdsaSecp256k1,
        ] {
            let pk = signer(algo).public_key_hex().unwrap();
            assert_eq!(pk.len(), 128, "{algo}");
        }
    }

    #[test]
    fn test_signature_is_64_bytes_hex() {
        for algo in [
            SignatureAlgorithm::EcdsaP256,
            SignatureAlgorithm::EcdsaSecp256k1,
        ] {
            let sig = signer(algo).sign(b"message").unwrap();
            assert_eq!(sig.len(), 128, "{algo}");
        }
    }

    // End-to-end: the raw signature re-encodes to DER and verifies against
    // the signer's own public key, for both curve parameterizations.
    #[test]
    fn test_sign_then_der_verify_p256() {
        let s = signer(SignatureAlgorithm::EcdsaP256);
        let message = b"challenge token";
        let raw = hex::decode(s.sign(message).unwrap()).unwrap();
        let digest = s.hash_algorithm().digest(message);

        let sig = p256::ecdsa::Signature::from_slice(&raw).unwrap();
        let der = sig.to_der();
        let recovered = p256::ecdsa::Signature::from_der(der.as_bytes()).unwrap();

        let point = hex::decode(format!("04{}", s.public_key_hex().unwrap())).unwrap();
        let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point).unwrap();
        use p256::ecdsa::signature::hazmat::PrehashVerifier;
        assert!(vk.verify_prehash(&digest, &recovered).is_ok());
    }

    #[test]
    fn test_sign_then_der_verify_secp256k1() {
        let s = signer(SignatureAlgorithm::EcdsaSecp256k1);
        let message = b"challenge token";
        let raw = hex::decode(s.sign(message).unwrap()).unwrap();
        let digest = s.hash_algorithm().digest(message);

        let sig = k256::ecdsa::Signature::from_slice(&raw).unwrap();
        let der = sig.to_der();
        let recovered = k256::ecdsa::Signature::from_der(der.as_bytes()).unwrap();

        let point = hex::decode(format!("04{}", s.public_key_hex().unwrap())).unwrap();
        let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(&point).unwrap();
        use k256::ecdsa::signature::hazmat::PrehashVerifier;
        assert!(vk.verify_prehash(&digest, &recovered).is_ok());
    }

    #[test]
    fn test_domain_tag_changes_signature() {
        use crate::crypto::DomainTag;
        let s = signer(SignatureAlgorithm::EcdsaP256);
        let user = s.sign_with_tag(b"payload", DomainTag::User).unwrap();
        let tx = s.sign_with_tag(b"payload", DomainTag::Transaction).unwrap();
        let untagged = s.sign(b"payload").unwrap();
        assert_ne!(user, tx);
        assert_ne!(user, untagged);
    }

    #[test]
    fn test_default_hash_follows_curve_rule() {
        assert_eq!(
            signer(SignatureAlgorithm::EcdsaP256).hash_algorithm(),
            HashAlgorithm::Sha3_256
        );
        assert_eq!(
            signer(SignatureAlgorithm::EcdsaSecp256k1).hash_algorithm(),
            HashAlgorithm::Sha2_256
        );
    }
}
