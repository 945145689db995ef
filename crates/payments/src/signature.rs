//! Webhook signature: `hex(HMAC-SHA256(secret, raw_body))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs a raw webhook body.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, &'static str> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex signature over the raw body in constant time.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> Result<(), &'static str> {
    let expected = hex::decode(signature.trim()).map_err(|_| "invalid signature encoding")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| "webhook signature mismatch")
}
