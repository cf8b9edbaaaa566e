//! Deterministic cache key derivation
//!
//! A cache key is either supplied explicitly by the caller or derived from
//! the literal query text: a 64-bit xxh3 digest, rendered in base 36 and
//! prefixed with the configured namespace. Identical query text always maps
//! to the same key; collision resistance is explicitly not a goal.

use xxhash_rust::xxh3::xxh3_64;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Compute the fingerprint of a query's literal text.
///
/// The digest is non-cryptographic: distinct queries collide with
/// probability ~2^-64, which is accepted.
pub fn fingerprint(query: &str) -> String {
    to_base36(xxh3_64(query.as_bytes()))
}

/// Derive the full cache key for a query under a namespace prefix.
pub fn derive_key(prefix: &str, query: &str) -> String {
    format!("{}{}", prefix, fingerprint(query))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }

    // u64::MAX in base 36 is 13 digits
    let mut buf = [0u8; 13];
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = BASE36_DIGITS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&buf[i..]).into_owned()
}
