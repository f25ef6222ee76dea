use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Checks an `X-Line-Signature` header against the raw request body.
///
/// LINE signs the body with HMAC-SHA256 keyed by the channel secret and sends
/// the digest base64-encoded.
pub fn verify_signature(body: &[u8], signature: &str, channel_secret: &str) -> bool {
    sign(body, channel_secret).is_some_and(|expected| {
        constant_time_eq(expected.as_bytes(), signature.trim().as_bytes())
    })
}

/// Computes the signature LINE would send for `body`.
pub fn sign(body: &[u8], channel_secret: &str) -> Option<String> {
    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => {
            warn!(event_name = "ingress.line.hmac_init_failed", "failed to create HMAC");
            return None;
        }
    };
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
