//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix GitHub puts in front of the hex digest.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Verifies a GitHub webhook signature using constant-time comparison.
///
/// GitHub sends `X-Hub-Signature-256: sha256=<hex>`, the lowercase hex
/// HMAC-SHA256 of the raw body keyed with the shared secret. Returns `false`
/// when the secret or header is missing, the prefix is wrong, the digest is
/// not 64 lowercase hex digits, or the digest does not match.
pub fn verify(secret: Option<&str>, body: &[u8], signature_header: Option<&str>) -> bool {
    let (Some(secret), Some(header)) = (secret, signature_header) else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }

    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let lowercase_hex = hex_sig.len() == DIGEST_HEX_LEN
        && hex_sig.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !lowercase_hex {
        return false;
    }

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(body);
    // verify_slice compares in constant time.
    mac.verify_slice(&expected).is_ok()
}

/// Computes the header value GitHub would send for `body` under `secret`.
#[cfg(any(test, feature = "test-support"))]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}
