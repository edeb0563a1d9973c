use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded HMAC-SHA256 of a request or response body.
pub const HASH_HEADER: &str = "HashSHA256";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("invalid signing key: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
    #[error("signature is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("signature mismatch")]
    Mismatch,
}

/// Returns the lowercase hex HMAC-SHA256 of `body` under `key`.
///
/// # Examples
///
/// ```
/// use tally_common::sign::{sign, verify};
///
/// let sig = sign(b"secret", b"payload").unwrap();
/// assert_eq!(sig.len(), 64);
/// assert!(verify(b"secret", b"payload", &sig).is_ok());
/// ```
pub fn sign(key: &[u8], body: &[u8]) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature against `body` in constant time.
pub fn verify(key: &[u8], body: &[u8], signature: &str) -> Result<(), SignError> {
    let expected = hex::decode(signature.trim())?;
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignError::Mismatch)
}
