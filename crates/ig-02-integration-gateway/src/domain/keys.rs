//! API key material: generation, hashing and verification.
//!
//! Key format: `<prefix>_<64 lowercase hex chars>`. The first
//! [`LOOKUP_LEN`] secret characters are stored in clear for lookup; the
//! whole key is stored only as a SHA-256 digest.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes per key
pub const SECRET_BYTES: usize = 32;

/// Secret characters stored in clear for lookup
pub const LOOKUP_LEN: usize = 8;

/// Generated key material
pub struct KeyMaterial {
    pub plaintext: String,
    pub lookup: String,
    pub hash: String,
}

/// Generate a new key under `prefix`
pub fn generate_key(prefix: &str) -> KeyMaterial {
    let mut secret = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);

    let secret_hex = hex::encode(secret);
    let plaintext = format!("{}_{}", prefix, secret_hex);

    KeyMaterial {
        lookup: secret_hex[..LOOKUP_LEN].to_string(),
        hash: hash_key(&plaintext),
        plaintext,
    }
}

/// Lookup segment of a presented key, or None if it is not shaped like one
/// of ours.
pub fn lookup_segment<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let secret = raw.strip_prefix(prefix)?.strip_prefix('_')?;

    if secret.len() != SECRET_BYTES * 2
        || !secret
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }

    Some(&secret[..LOOKUP_LEN])
}

/// SHA-256 of the full key, hex encoded
pub fn hash_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Constant-time string comparison to prevent timing attacks
///
/// SECURITY: This function takes the same amount of time regardless of how
/// many characters match, preventing timing side-channel attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    // Pad both to the longer length; different pad bytes force a mismatch
    // when lengths differ.
    let max_len = std::cmp::max(a.len(), b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}

/// Whether `raw` hashes to `stored_hash`
pub fn verify_key(raw: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_key(raw), stored_hash)
}
