//! Curve and digest primitives shared by every signer variant.
//!
//! The two supported parameterizations are ECDSA over P-256 and over
//! secp256k1, each paired with a default hash by a fixed rule that the
//! remote verifier depends on: secp256k1 → SHA2-256, P-256 → SHA3-256.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::KeyError;

/// Key weight reported to the remote protocol; this implementation always
/// signs with a single full-weight key.
pub const FULL_KEY_WEIGHT: u32 = 1000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    EcdsaP256,
    EcdsaSecp256k1,
}

impl SignatureAlgorithm {
    /// Index used on the wire by the remote login protocol.
    pub fn wire_index(&self) -> u32 {
        match self {
            SignatureAlgorithm::EcdsaP256 => 1,
            SignatureAlgorithm::EcdsaSecp256k1 => 2,
        }
    }

    /// Default hash pairing. Reproduced exactly: it determines wire
    /// compatibility with the remote verifier.
    pub fn default_hash(&self) -> HashAlgorithm {
        match self {
            SignatureAlgorithm::EcdsaSecp256k1 => HashAlgorithm::Sha2_256,
            SignatureAlgorithm::EcdsaP256 => HashAlgorithm::Sha3_256,
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureAlgorithm::EcdsaP256 => write!(f, "ECDSA_P256"),
            SignatureAlgorithm::EcdsaSecp256k1 => write!(f, "ECDSA_secp256k1"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha2_256,
    Sha3_256,
}

impl HashAlgorithm {
    pub fn wire_index(&self) -> u32 {
        match self {
            HashAlgorithm::Sha2_256 => 1,
            HashAlgorithm::Sha3_256 => 3,
        }
    }

    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha2_256 => {
                let mut hasher = Sha256::new();
                hasher.update(data);
                hasher.finalize().into()
            }
            HashAlgorithm::Sha3_256 => {
                let mut hasher = Sha3_256::new();
                hasher.update(data);
                hasher.finalize().into()
            }
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha2_256 => write!(f, "SHA2_256"),
            HashAlgorithm::Sha3_256 => write!(f, "SHA3_256"),
        }
    }
}

/// Domain-separation tag mixed in front of a message before hashing, so a
/// signature produced for login can never be replayed as a transaction
/// authorization. Tags are ASCII, right-padded with zeros to 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainTag {
    User,
    Transaction,
}

impl DomainTag {
    pub fn bytes(&self) -> [u8; 32] {
        match self {
            DomainTag::User => padded_tag("KEYHOLD-V0.0-user"),
            DomainTag::Transaction => padded_tag("KEYHOLD-V0.0-transaction"),
        }
    }
}

fn padded_tag(tag: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..tag.len()].copy_from_slice(tag.as_bytes());
    out
}

/// Uncompressed SEC1 public point (65 bytes, leading 0x04) for a 32-byte
/// private scalar on the given curve.
pub fn public_key_uncompressed(
    algorithm: SignatureAlgorithm,
    scalar: &[u8; 32],
) -> Result<Vec<u8>, KeyError> {
    match algorithm {
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let sk = k256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            Ok(sk.verifying_key().to_encoded_point(false).as_bytes().to_vec())
        }
        SignatureAlgorithm::EcdsaP256 => {
            let sk = p256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            Ok(sk.verifying_key().to_encoded_point(false).as_bytes().to_vec())
        }
    }
}

/// ECDSA over a precomputed 32-byte digest.
///
/// secp256k1 output is 65 bytes (r || s plus a trailing recovery id the
/// caller is expected to strip); P-256 output is the bare 64-byte r || s.
pub fn sign_prehash_raw(
    algorithm: SignatureAlgorithm,
    scalar: &[u8; 32],
    digest: &[u8; 32],
) -> Result<Vec<u8>, KeyError> {
    match algorithm {
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let sk = k256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            let (sig, recovery_id) = sk
                .sign_prehash_recoverable(digest)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            let mut out = sig.to_bytes().to_vec();
            out.push(recovery_id.to_byte());
            Ok(out)
        }
        SignatureAlgorithm::EcdsaP256 => {
            let sk = p256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            let sig: p256::ecdsa::Signature = sk
                .sign_prehash(digest)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            Ok(sig.to_bytes().to_vec())
        }
    }
}

/// DER-encoded ECDSA over a precomputed digest, as a hardware-backed
/// platform signer would return it.
pub fn sign_prehash_der(
    algorithm: SignatureAlgorithm,
    scalar: &[u8; 32],
    digest: &[u8; 32],
) -> Result<Vec<u8>, KeyError> {
    match algorithm {
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let sk = k256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            let sig: k256::ecdsa::Signature = sk
                .sign_prehash(digest)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            Ok(sig.to_der().as_bytes().to_vec())
        }
        SignatureAlgorithm::EcdsaP256 => {
            let sk = p256::ecdsa::SigningKey::from_slice(scalar)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            let sig: p256::ecdsa::Signature = sk
                .sign_prehash(digest)
                .map_err(|e| KeyError::SigningFailed(e.to_string()))?;
            Ok(sig.to_der().as_bytes().to_vec())
        }
    }
}

/// Verify a 64-byte r || s signature over a precomputed digest against an
/// uncompressed SEC1 public point. Used by tests and the post-migration
/// verification path.
pub fn verify_prehash_raw(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    digest: &[u8; 32],
    signature: &[u8],
) -> bool {
    if signature.len() != 64 {
        return false;
    }
    match algorithm {
        SignatureAlgorithm::EcdsaSecp256k1 => {
            let Ok(vk) = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
                return false;
            };
            let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            vk.verify_prehash(digest, &sig).is_ok()
        }
        SignatureAlgorithm::EcdsaP256 => {
            let Ok(vk) = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
                return false;
            };
            let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            vk.verify_prehash(digest, &sig).is_ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCALAR: [u8; 32] = [0x42u8; 32];

    #[test]
    fn test_default_hash_rule() {
        assert_eq!(
            SignatureAlgorithm::EcdsaSecp256k1.default_hash(),
            HashAlgorithm::Sha2_256
        );
        assert_eq!(
            SignatureAlgorithm::EcdsaP256.default_hash(),
            HashAlgorithm::Sha3_256
        );
    }

    #[test]
    fn test_wire_indices() {
        assert_eq!(SignatureAlgorithm::EcdsaP256.wire_index(), 1);
        assert_eq!(SignatureAlgorithm::EcdsaSecp256k1.wire_index(), 2);
        assert_eq!(HashAlgorithm::Sha2_256.wire_index(), 1);
        assert_eq!(HashAlgorithm::Sha3_256.wire_index(), 3);
    }

    #[test]
    fn test_domain_tags_distinct_and_padded() {
        let user = DomainTag::User.bytes();
        let tx = DomainTag::Transaction.bytes();
        assert_ne!(user, tx);
        assert_eq!(user.len(), 32);
        assert!(user.starts_with(b"KEYHOLD-V0.0-user"));
    }

    #[test]
    fn test_public_key_is_uncompressed_point() {
        for algo in [
            SignatureAlgorithm::EcdsaP256,
            SignatureAlgorithm::EcdsaSecp256k1,
        ] {
            let pk = public_key_uncompressed(algo, &TEST_SCALAR).unwrap();
            assert_eq!(pk.len(), 65);
            assert_eq!(pk[0], 0x04);
        }
    }

    #[test]
    fn test_sign_verify_roundtrip_both_curves() {
        let digest = HashAlgorithm::Sha2_256.digest(b"challenge");
        for algo in [
            SignatureAlgorithm::EcdsaP256,
            SignatureAlgorithm::EcdsaSecp256k1,
        ] {
            let pk = public_key_uncompressed(algo, &TEST_SCALAR).unwrap();
            let sig = sign_prehash_raw(algo, &TEST_SCALAR, &digest).unwrap();
            let raw = crate::encoding::strip_recovery_id(&sig);
            assert!(verify_prehash_raw(algo, &pk, &digest, &raw), "{algo}");
        }
    }

    #[test]
    fn test_secp256k1_carries_recovery_byte() {
        let digest = HashAlgorithm::Sha2_256.digest(b"msg");
        let sig = sign_prehash_raw(SignatureAlgorithm::EcdsaSecp256k1, &TEST_SCALAR, &digest)
            .unwrap();
        assert_eq!(sig.len(), 65);

        let sig = sign_prehash_raw(SignatureAlgorithm::EcdsaP256, &TEST_SCALAR, &digest).unwrap();
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_der_output_converts_to_same_raw() {
        let digest = HashAlgorithm::Sha3_256.digest(b"payload");
        let der =
            sign_prehash_der(SignatureAlgorithm::EcdsaP256, &TEST_SCALAR, &digest).unwrap();
        let raw = crate::encoding::try_der_to_raw(&der).unwrap();
        let pk = public_key_uncompressed(SignatureAlgorithm::EcdsaP256, &TEST_SCALAR).unwrap();
        assert!(verify_prehash_raw(
            SignatureAlgorithm::EcdsaP256,
            &pk,
            &digest,
            &raw
        ));
    }
}
