//! # Backup Codes
//!
//! Single-use fallback credentials issued alongside TOTP setup. Plaintext
//! codes are shown to the user exactly once; only one-way hashes are
//! stored, and a consumed hash is removed from the stored set.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a fresh set of backup codes (`xxxx-xxxx`, lowercase hex)
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    use rand::Rng;
    let mut rng = rand::thread_rng();

    (0..count)
        .map(|_| {
            let code: [u8; 4] = rng.gen();
            format!("{:02x}{:02x}-{:02x}{:02x}", code[0], code[1], code[2], code[3])
        })
        .collect()
}

/// Hash a backup code for storage
pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(code).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a submitted code against one stored hash in constant time
pub fn verify_backup_code(code: &str, stored_hash: &str) -> bool {
    let computed = hash_backup_code(code);
    computed.len() == stored_hash.len()
        && bool::from(computed.as_bytes().ct_eq(stored_hash.as_bytes()))
}

/// Whether a submitted token is shaped like a backup code
pub fn looks_like_backup_code(token: &str) -> bool {
    let normalized = normalize(token);
    normalized.len() == 8 && normalized.chars().all(|c| c.is_ascii_hexdigit())
}

/// Dashes and case are presentation only
fn normalize(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_backup_codes() {
        let codes = generate_backup_codes(8);
        assert_eq!(codes.len(), 8);

        for code in &codes {
            // Format: xxxx-xxxx
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
        }

        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_hash_and_verify() {
        let code = "a1b2-c3d4";
        let hash = hash_backup_code(code);

        assert!(verify_backup_code(code, &hash));
        assert!(verify_backup_code("A1B2-C3D4", &hash)); // case-insensitive
        assert!(verify_backup_code("a1b2c3d4", &hash)); // dashes optional
        assert!(!verify_backup_code("ffff-ffff", &hash));
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let code = "a1b2-c3d4";
        let hash = hash_backup_code(code);
        assert_ne!(hash, code);
        assert_eq!(hash.len(), 64); // SHA-256 hex
    }

    #[test]
    fn test_looks_like_backup_code() {
        assert!(looks_like_backup_code("a1b2-c3d4"));
        assert!(looks_like_backup_code("A1B2C3D4"));
        assert!(!looks_like_backup_code("123456")); // TOTP shape
        assert!(!looks_like_backup_code("xyzw-qrst")); // not hex
        assert!(!looks_like_backup_code(""));
    }
}
