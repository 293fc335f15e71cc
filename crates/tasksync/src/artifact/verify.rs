//! Checksum and signature checks on raw artifact bytes.

use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Check `bytes` against an expected SHA-256 (hex, any case).
///
/// # Errors
///
/// Returns `Error::ChecksumMismatch` when the digests differ.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// HMAC-SHA256 of `bytes` under `key`, as lowercase hex.
///
/// # Errors
///
/// Returns `Error::Config` if the key is rejected.
pub fn sign(bytes: &[u8], key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Config(format!("invalid signing key: {e}")))?;
    mac.update(bytes);
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}

/// Check an HMAC-SHA256 signature (hex) over `bytes`.
///
/// The comparison runs in constant time.
///
/// # Errors
///
/// Returns `Error::SignatureMismatch` if the signature is not valid hex or
/// does not verify.
pub fn verify_signature(bytes: &[u8], signature: &str, key: &[u8]) -> Result<()> {
    let tag = decode_hex(signature.trim()).ok_or(Error::SignatureMismatch)?;
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| Error::SignatureMismatch)?;
    mac.update(bytes);
    mac.verify_slice(&tag).map_err(|_| Error::SignatureMismatch)
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_checksum_is_case_insensitive() {
        let upper = sha256_hex(b"payload").to_uppercase();
        assert!(verify_checksum(b"payload", &upper).is_ok());
    }

    #[test]
    fn test_checksum_mismatch_reports_both_values() {
        match verify_checksum(b"payload", "00").unwrap_err() {
            Error::ChecksumMismatch { expected, actual } => {
                assert_eq!(expected, "00");
                assert_eq!(actual, sha256_hex(b"payload"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let key = b"secret";
        let signature = sign(b"payload", key).unwrap();
        assert!(verify_signature(b"payload", &signature, key).is_ok());
        assert!(verify_signature(b"payload!", &signature, key).is_err());
        assert!(verify_signature(b"payload", &signature, b"other").is_err());
    }

    #[test]
    fn test_malformed_signature_is_mismatch() {
        assert!(matches!(
            verify_signature(b"payload", "zz", b"k"),
            Err(Error::SignatureMismatch)
        ));
        assert!(matches!(
            verify_signature(b"payload", "abc", b"k"),
            Err(Error::SignatureMismatch)
        ));
    }

    #[test]
    fn test_rfc4231_case_two() {
        assert_eq!(
            sign(b"what do ya want for nothing?", b"Jefe").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
