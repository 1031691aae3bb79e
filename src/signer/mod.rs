//! Signing backends.
//!
//! Every variant satisfies the same [`KeySigner`] contract so the switch
//! protocol and the transaction layer never care where the private
//! material actually lives: a password-scoped store entry, a hardware
//! store that will never hand the bytes out, or a scalar derived on the
//! fly from a seed phrase.

pub mod derived;
pub mod hardware;
pub mod raw;

pub use derived::SeedSigner;
pub use hardware::HardwareSigner;
pub use raw::RawKeySigner;

use crate::crypto::{DomainTag, HashAlgorithm, SignatureAlgorithm, FULL_KEY_WEIGHT};
use crate::error::KeyError;

pub trait KeySigner: Send + Sync {
    /// Hex-encoded public key without the uncompressed-point prefix byte.
    fn public_key_hex(&self) -> Result<String, KeyError>;

    /// Sign a message, returning the 64-byte r || s signature hex-encoded.
    fn sign(&self, message: &[u8]) -> Result<String, KeyError>;

    /// Sign with a domain-separation tag prepended to the message before
    /// hashing.
    fn sign_with_tag(&self, message: &[u8], tag: DomainTag) -> Result<String, KeyError> {
        let mut tagged = tag.bytes().to_vec();
        tagged.extend_from_slice(message);
        self.sign(&tagged)
    }

    fn hash_algorithm(&self) -> HashAlgorithm;

    fn signature_algorithm(&self) -> SignatureAlgorithm;

    /// Weight this key contributes towards the remote signing threshold.
    fn key_weight(&self) -> u32 {
        FULL_KEY_WEIGHT
    }

    /// Whether the private material can leave this signer. Statically
    /// false for hardware-bound keys, so callers can branch without
    /// attempting an extraction that is known to fail.
    fn is_exportable(&self) -> bool;
}

/// Hex-encode an uncompressed SEC1 point, stripping the standard `04`
/// prefix byte. Callers expect the bare 64-byte-equivalent hex string.
pub(crate) fn format_public_key(uncompressed: &[u8]) -> String {
    let bytes = match uncompressed.first() {
        Some(&0x04) => &uncompressed[1..],
        _ => uncompressed,
    };
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_public_key_strips_prefix() {
        let mut point = vec![0x04u8];
        point.extend_from_slice(&[0xaa; 64]);
        let formatted = format_public_key(&point);
        assert_eq!(formatted.len(), 128);
        assert!(!formatted.starts_with("04"));
    }

    #[test]
    fn test_format_public_key_leaves_bare_point() {
        let bare = vec![0xbb; 64];
        assert_eq!(format_public_key(&bare), hex::encode(&bare));
    }
}
