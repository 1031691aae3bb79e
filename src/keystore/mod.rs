//! Key storage: the current password-scoped scheme, the legacy
//! hardware-alias scheme, and the compatibility/migration layer that
//! bridges the two.

pub mod compat;
pub mod current;
pub mod legacy;
pub mod migration;

pub use compat::KeyCompatibilityResolver;
pub use current::{CurrentKeyStore, StoredKey};
pub use legacy::{EntryKind, LegacyKeyStore, SoftwareLegacyStore};
pub use migration::MigrationCoordinator;

use crate::encoding::normalize_scalar;
use crate::error::KeyError;

/// Normalize extracted private-key bytes to a 32-byte scalar.
///
/// Platform stores hand back the scalar in whatever width their ASN.1
/// integer happened to use: a leading zero sign byte, or fewer than 32
/// significant bytes. Anything that still exceeds 32 bytes after stripping
/// leading zeros is corrupt and must not be truncated into a different key.
pub(crate) fn normalize_private_scalar(bytes: &[u8]) -> Result<[u8; 32], KeyError> {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first_nonzero..];
    if significant.len() > 32 {
        return Err(KeyError::InvalidKeySize {
            actual: bytes.len(),
            expected: 32,
        });
    }
    let normalized = normalize_scalar(significant, 32);
    let mut out = [0u8; 32];
    out.copy_from_slice(&normalized);
    Ok(out)
}
