use crate::error::{PaymentError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over `message` with `key`.
pub fn sign(key: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex-encoded HMAC-SHA256 signature.
pub fn verify(key: &str, message: &[u8], signature_hex: &str) -> Result<()> {
    let expected = hex::decode(signature_hex)
        .map_err(|_| PaymentError::AuthenticationFailed("malformed signature hex".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::AuthenticationFailed("signature mismatch".to_string()))
}
