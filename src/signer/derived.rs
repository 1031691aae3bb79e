//! Signer over a scalar derived deterministically from a seed phrase.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use tiny_hderive::bip32::ExtendedPrivKey;
use zeroize::Zeroizing;

use crate::crypto::{self, HashAlgorithm, SignatureAlgorithm};
use crate::encoding::strip_recovery_id;
use crate::error::KeyError;
use crate::signer::{format_public_key, KeySigner};

/// Derivation path used for every seed-phrase account.
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/539'/0'/0/0";

pub struct SeedSigner {
    scalar: Zeroizing<[u8; 32]>,
    derivation_path: String,
}

impl SeedSigner {
    pub fn new(phrase: &str) -> Result<Self, KeyError> {
        Self::with_path(phrase, DEFAULT_DERIVATION_PATH)
    }

    pub fn with_path(phrase: &str, path: &str) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| KeyError::InvalidSeedPhrase(e.to_string()))?;
        let seed = mnemonic.to_seed("");
        let ext_key = ExtendedPrivKey::derive(&seed, path)
            .map_err(|_| KeyError::DerivationFailed(path.to_string()))?;
        Ok(Self {
            scalar: Zeroizing::new(ext_key.secret()),
            derivation_path: path.to_string(),
        })
    }

    /// Fresh 12-word seed phrase.
    pub fn generate_phrase() -> String {
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);
        Mnemonic::from_entropy(&entropy)
            .expect("16 bytes of entropy is a valid mnemonic")
            .to_string()
    }

    pub fn derivation_path(&self) -> &str {
        &self.derivation_path
    }
}

impl KeySigner for SeedSigner {
    fn public_key_hex(&self) -> Result<String, KeyError> {
        let point =
            crypto::public_key_uncompressed(SignatureAlgorithm::EcdsaSecp256k1, &self.scalar)?;
        Ok(format_public_key(&point))
    }

    fn sign(&self, message: &[u8]) -> Result<String, KeyError> {
        // Hash here rather than delegating; the recoverable signing
        // primitive appends a parity byte that the verifier never sees.
        let digest = HashAlgorithm::Sha2_256.digest(message);
        let signature =
            crypto::sign_prehash_raw(SignatureAlgorithm::EcdsaSecp256k1, &self.scalar, &digest)?;
        Ok(hex::encode(strip_recovery_id(&signature)))
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha2_256
    }

    fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaSecp256k1
    }

    fn is_exportable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PHRASE: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    #[test]
    fn test_rejects_invalid_phrase() {
        assert!(matches!(
            SeedSigner::new("not a valid mnemonic at all"),
            Err(KeyError::InvalidSeedPhrase(_))
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = SeedSigner::new(TEST_PHRASE).unwrap();
        let b = SeedSigner::new(TEST_PHRASE).unwrap();
        assert_eq!(a.public_key_hex().unwrap(), b.public_key_hex().unwrap());
    }

    #[test]
    fn test_different_paths_give_different_keys() {
        let a = SeedSigner::new(TEST_PHRASE).unwrap();
        let b = SeedSigner::with_path(TEST_PHRASE, "m/44'/539'/0'/0/1").unwrap();
        assert_ne!(a.public_key_hex().unwrap(), b.public_key_hex().unwrap());
    }

    #[test]
    fn test_signature_verifies_and_is_64_bytes() {
        let signer = SeedSigner::new(TEST_PHRASE).unwrap();
        let message = b"resume challenge";
        let raw = hex::decode(signer.sign(message).unwrap()).unwrap();
        assert_eq!(raw.len(), 64);

        let digest = HashAlgorithm::Sha2_256.digest(message);
        let point = hex::decode(format!("04{}", signer.public_key_hex().unwrap())).unwrap();
        assert!(crypto::verify_prehash_raw(
            SignatureAlgorithm::EcdsaSecp256k1,
            &point,
            &digest,
            &raw
        ));
    }

    #[test]
    fn test_generated_phrase_is_twelve_words() {
        let phrase = SeedSigner::generate_phrase();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(SeedSigner::new(&phrase).is_ok());
    }
}
