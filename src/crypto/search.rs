//! # Searchable Hashes
//!
//! Salted, iterated one-way hashes for values that must support equality
//! search without ever being stored in cleartext. Wire format:
//!
//! ```text
//! hash_<saltHex>_<digestHex>
//! ```
//!
//! Only exact-match lookup works — range queries are impossible by
//! construction. Input is case-normalized (trimmed, lowercased) so lookups
//! are insensitive to how the value was typed.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// PBKDF2 iteration count for searchable hashes. Lower than the key
/// derivation count: these are computed on every equality lookup.
const HASH_ITERATIONS: u32 = 10_000;

/// Hash a value for searchable storage.
///
/// A fresh random salt is drawn per call, so two hashes of the same value
/// differ; equality is tested with [`verify_searchable_hash`].
pub fn generate_searchable_hash(plaintext: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let digest = compute_digest(plaintext, &salt);
    format!("hash_{}_{}", hex::encode(salt), hex::encode(digest))
}

/// Verify a value against a stored searchable hash.
///
/// Recomputes the digest with the embedded salt and compares in constant
/// time. Malformed stored hashes verify as `false`, never panic.
pub fn verify_searchable_hash(plaintext: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('_').collect();
    if parts.len() != 3 || parts[0] != "hash" {
        return false;
    }
    let Ok(salt) = hex::decode(parts[1]) else {
        return false;
    };
    let Ok(expected) = hex::decode(parts[2]) else {
        return false;
    };
    if salt.len() != SALT_LEN || expected.len() != DIGEST_LEN {
        return false;
    }

    let digest = compute_digest(plaintext, &salt);
    digest.ct_eq(expected.as_slice()).into()
}

fn compute_digest(plaintext: &str, salt: &[u8]) -> [u8; DIGEST_LEN] {
    let normalized = plaintext.trim().to_lowercase();
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(normalized.as_bytes(), salt, HASH_ITERATIONS, &mut digest);
    digest
}
