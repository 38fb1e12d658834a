//! HMAC-SHA256 signatures over raw payload bytes.
//!
//! Signatures travel as lowercase hex. Verification decodes the supplied
//! value and compares digests with `subtle`, so the running time does not
//! depend on the position of the first differing byte.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

type HmacSha256 = Hmac<Sha256>;

/// Compute the raw HMAC-SHA256 digest of `payload`.
pub fn hmac_sha256(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Generate a hex-encoded HMAC-SHA256 signature.
pub fn generate_signature(secret: &str, payload: &[u8]) -> Result<String, anyhow::Error> {
    Ok(hex::encode(hmac_sha256(secret.as_bytes(), payload)?))
}

/// Constant-time digest comparison.
///
/// Length is not secret (every valid digest is 32 bytes), so a length
/// mismatch short-circuits.
pub fn digests_match(expected: &[u8], supplied: &[u8]) -> Choice {
    if expected.len() != supplied.len() {
        return Choice::from(0);
    }
    expected.ct_eq(supplied)
}

/// Verify a hex-encoded HMAC-SHA256 signature over `payload`.
///
/// Any decoding problem is a rejection, never an error.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(supplied) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(expected) = hmac_sha256(secret.as_bytes(), payload) else {
        return false;
    };

    digests_match(&expected, &supplied).into()
}
