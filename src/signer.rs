//! AWS3-HTTPS request signing.
//!
//! The service authenticates a request by an HMAC-SHA1 of the `Date`
//! header value under the account's secret key, base64-encoded and placed
//! in the `X-Amzn-Authorization` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

/// HMAC block size for SHA-1.
const BLOCK_SIZE: usize = 64;

/// Computes the base64-encoded HMAC-SHA1 of `data` under `key`.
#[must_use]
pub fn sign(data: &[u8], key: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key).expect("HMAC-SHA1 accepts keys of any length");
    mac.update(data);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Manual RFC 2104 construction of the same signature.
///
/// Kept as a compatibility fallback for environments without a keyed-hash
/// primitive, and as a cross-check for [`sign`]: the two produce identical
/// output for every `(data, key)` pair. Keys longer than the 64-byte block
/// are first reduced with SHA-1, per RFC 2104.
#[must_use]
pub fn sign_rfc2104(data: &[u8], key: &[u8]) -> String {
    let mut padded = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        padded[..20].copy_from_slice(&Sha1::digest(key));
    } else {
        padded[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha1::new();
    inner.update(padded.map(|b| b ^ 0x36));
    inner.update(data);
    let inner = inner.finalize();

    let mut outer = Sha1::new();
    outer.update(padded.map(|b| b ^ 0x5c));
    outer.update(inner);

    STANDARD.encode(outer.finalize())
}
