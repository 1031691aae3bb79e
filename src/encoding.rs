//! Byte-level signature encoding conversions.
//!
//! The platform signers used by the hardware key store produce ASN.1/DER
//! signatures; the remote verifier expects a fixed-width 64-byte r || s
//! encoding. Everything in here is a pure function over byte slices.

use tracing::warn;

use crate::error::CodecError;

/// Width of one ECDSA scalar (r or s) on both supported curves.
pub const SCALAR_SIZE: usize = 32;

/// Normalize a big-endian scalar to exactly `target` bytes.
///
/// Equal length passes through unchanged. Longer inputs have their leading
/// zero bytes stripped, then are left-padded (or truncated from the left if
/// still too long). Shorter inputs are left-padded with zeros. Defined for
/// any input length, and idempotent.
pub fn normalize_scalar(bytes: &[u8], target: usize) -> Vec<u8> {
    if bytes.len() == target {
        return bytes.to_vec();
    }
    if bytes.len() > target {
        let first_nonzero = bytes.iter().position(|&b| b != 0);
        let significant = match first_nonzero {
            Some(i) => &bytes[i..],
            None => return vec![0u8; target],
        };
        if significant.len() <= target {
            let mut out = vec![0u8; target - significant.len()];
            out.extend_from_slice(significant);
            out
        } else {
            significant[significant.len() - target..].to_vec()
        }
    } else {
        let mut out = vec![0u8; target - bytes.len()];
        out.extend_from_slice(bytes);
        out
    }
}

/// Strict DER → raw conversion.
///
/// Parses `SEQUENCE { INTEGER r, INTEGER s }` (short- and long-form
/// sequence lengths) and returns the 64-byte zero-padded concatenation of
/// r and s.
pub fn try_der_to_raw(der: &[u8]) -> Result<[u8; 64], CodecError> {
    let mut offset = 0usize;

    if der.first() != Some(&0x30) {
        return Err(CodecError::MalformedDer("missing sequence tag"));
    }
    offset += 1;

    let length_byte = *der
        .get(offset)
        .ok_or(CodecError::MalformedDer("truncated sequence length"))?;
    if length_byte & 0x80 == 0 {
        offset += 1;
    } else {
        let length_bytes = (length_byte & 0x7f) as usize;
        offset += 1 + length_bytes;
    }

    let (r, next) = read_der_integer(der, offset)?;
    let (s, _) = read_der_integer(der, next)?;

    let mut out = [0u8; 64];
    out[..SCALAR_SIZE].copy_from_slice(&normalize_scalar(r, SCALAR_SIZE));
    out[SCALAR_SIZE..].copy_from_slice(&normalize_scalar(s, SCALAR_SIZE));
    Ok(out)
}

fn read_der_integer(der: &[u8], offset: usize) -> Result<(&[u8], usize), CodecError> {
    if der.get(offset) != Some(&0x02) {
        return Err(CodecError::MalformedDer("missing integer tag"));
    }
    let len = *der
        .get(offset + 1)
        .ok_or(CodecError::MalformedDer("truncated integer length"))? as usize;
    let start = offset + 2;
    let end = start + len;
    if end > der.len() {
        return Err(CodecError::MalformedDer("truncated integer body"));
    }
    Ok((&der[start..end], end))
}

/// Best-effort DER → raw conversion used on the signing path.
///
/// Inputs already in fixed-width form pass through: a 64-byte signature is
/// returned as-is and a 65-byte one has its trailing recovery byte dropped.
/// When DER parsing fails the input is returned unchanged. The fallback is
/// an explicit escape hatch so signing stays best-effort; callers that need
/// the loud failure use [`try_der_to_raw`].
pub fn der_to_raw(signature: &[u8]) -> Vec<u8> {
    if signature.len() == 64 {
        return signature.to_vec();
    }
    if signature.len() == 65 {
        return signature[..64].to_vec();
    }
    match try_der_to_raw(signature) {
        Ok(raw) => raw.to_vec(),
        Err(e) => {
            warn!("DER signature conversion failed ({e}), passing bytes through unchanged");
            signature.to_vec()
        }
    }
}

/// Drop the trailing recovery id from a 65-byte signature; any other
/// length is returned unchanged. The remote verifier expects exactly
/// 64 bytes.
pub fn strip_recovery_id(signature: &[u8]) -> Vec<u8> {
    if signature.len() == 65 {
        signature[..64].to_vec()
    } else {
        signature.to_vec()
    }
}
