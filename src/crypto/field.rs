//! # Field Encryption
//!
//! Authenticated symmetric encryption of individual string fields using
//! AES-256-GCM, with a self-describing wire format:
//!
//! ```text
//! enc_v1_<ivHex>_<authTagHex>_<cipherHex>
//! ```
//!
//! The format is versioned; decryption dispatches on the version tag so a
//! future `enc_v2_` can coexist with stored `v1` values. Parsing is
//! centralized in [`EncryptedField::parse`] — call sites never inspect the
//! string themselves.
//!
//! The key is derived from the master passphrase with PBKDF2-HMAC-SHA256
//! and a fixed application salt, so the same passphrase always yields the
//! same key. Changing the passphrase is a key-rotation event: existing
//! ciphertexts become undecryptable unless re-encrypted under the new key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use pbkdf2::pbkdf2_hmac;
use serde_json::Value;
use sha2::Sha256;

use crate::errors::{SecurityError, SecurityResult};

/// Wire format version emitted by [`FieldEncryption::encrypt_field`]
const WIRE_VERSION: &str = "v1";

/// Prefix shared by every encrypted-field version
const WIRE_PREFIX: &str = "enc_v";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// PBKDF2 iteration count for key derivation
const KDF_ITERATIONS: u32 = 100_000;

/// Fixed application-level salt. Deterministic on purpose: decryption needs
/// the same key for the same passphrase across restarts.
const KDF_SALT: &[u8] = b"hirelight-field-encryption";

// ==================
// Wire Format
// ==================

/// A parsed encrypted-field wire value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Format version tag (`v1`)
    pub version: String,
    /// Per-value random IV
    pub iv: Vec<u8>,
    /// GCM authentication tag
    pub tag: Vec<u8>,
    /// Ciphertext (may be empty for an empty plaintext)
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Parse a wire string into its segments.
    ///
    /// Returns `None` for anything that is not a well-formed encrypted
    /// field — this is the single "is this value encrypted" check in the
    /// codebase.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<&str> = value.split('_').collect();
        if parts.len() != 5 || parts[0] != "enc" {
            return None;
        }
        let version = parts[1];
        if version.len() < 2 || !version.starts_with('v') {
            return None;
        }
        let iv = hex::decode(parts[2]).ok()?;
        let tag = hex::decode(parts[3]).ok()?;
        let ciphertext = hex::decode(parts[4]).ok()?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return None;
        }
        Some(Self {
            version: version.to_string(),
            iv,
            tag,
            ciphertext,
        })
    }

    /// Serialize back to the wire string
    pub fn to_wire(&self) -> String {
        format!(
            "enc_{}_{}_{}_{}",
            self.version,
            hex::encode(&self.iv),
            hex::encode(&self.tag),
            hex::encode(&self.ciphertext)
        )
    }

    /// Whether a stored value is already in encrypted wire form
    pub fn is_encrypted(value: &str) -> bool {
        Self::parse(value).is_some()
    }
}

// ==================
// Sensitive Schemas
// ==================

/// Statically declared set of sensitive fields for one record type.
///
/// Field sensitivity is declared here, per record type, rather than
/// inferred from field names at runtime. Adding a sensitive field to a
/// record means adding it to the schema declaration.
#[derive(Debug, Clone, Copy)]
pub struct SensitiveSchema {
    /// Record type this schema describes
    pub record_type: &'static str,
    /// Field names whose string values are encrypted at rest
    pub fields: &'static [&'static str],
}

/// Job-seeker profile PII
pub const CANDIDATE_PROFILE: SensitiveSchema = SensitiveSchema {
    record_type: "candidate_profile",
    fields: &[
        "ssn",
        "bank_account",
        "salary_expectation",
        "phone",
        "date_of_birth",
        "home_address",
    ],
};

/// Company billing PII
pub const COMPANY_BILLING: SensitiveSchema = SensitiveSchema {
    record_type: "company_billing",
    fields: &["tax_id", "bank_account", "billing_phone"],
};

// ==================
// Health Check
// ==================

/// Key status reported by [`FieldEncryption::health_check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Ready,
    Failed,
}

/// Result of an encryption health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionHealth {
    pub can_encrypt: bool,
    pub can_decrypt: bool,
    pub key_status: KeyStatus,
}

// ==================
// Field Encryption Service
// ==================

/// Field encryption service owning the derived key.
///
/// Constructed once per process from [`SecurityCoreConfig`]'s master
/// passphrase and injected into the services that persist PII.
///
/// [`SecurityCoreConfig`]: crate::config::SecurityCoreConfig
pub struct FieldEncryption {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of debug output
        f.debug_struct("FieldEncryption").finish_non_exhaustive()
    }
}

impl FieldEncryption {
    /// Derive the key and build the cipher. Fails fast on an empty
    /// passphrase.
    pub fn new(passphrase: &str) -> SecurityResult<Self> {
        if passphrase.trim().is_empty() {
            return Err(SecurityError::validation(
                "encryption passphrase must not be empty",
            ));
        }
        let key = derive_key(passphrase);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| SecurityError::Internal("cipher construction failed".to_string()))?;
        Ok(Self { cipher })
    }

    /// Encrypt a single field value.
    ///
    /// Already-encrypted input is returned unchanged (guard against double
    /// encryption). A fresh random IV is drawn per call, so encrypting the
    /// same plaintext twice yields two different wire strings.
    pub fn encrypt_field(&self, plaintext: &str) -> SecurityResult<String> {
        if EncryptedField::is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SecurityError::Internal("field encryption failed".to_string()))?;

        // aes-gcm appends the tag; the wire format carries it separately
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedField {
            version: WIRE_VERSION.to_string(),
            iv: nonce.to_vec(),
            tag,
            ciphertext: sealed,
        }
        .to_wire())
    }

    /// Decrypt a single field value.
    ///
    /// Input that does not carry the wire prefix is returned unchanged.
    /// Input that carries the prefix but fails to parse, names an unknown
    /// version, or fails tag verification is a [`SecurityError::Decryption`]
    /// — tampered ciphertext fails closed, never decodes to garbage.
    pub fn decrypt_field(&self, value: &str) -> SecurityResult<String> {
        if !value.starts_with(WIRE_PREFIX) {
            return Ok(value.to_string());
        }

        let field = EncryptedField::parse(value).ok_or_else(|| {
            SecurityError::Decryption("malformed encrypted field".to_string())
        })?;

        match field.version.as_str() {
            WIRE_VERSION => self.decrypt_v1(&field),
            other => Err(SecurityError::Decryption(format!(
                "unsupported wire format version: {}",
                other
            ))),
        }
    }

    fn decrypt_v1(&self, field: &EncryptedField) -> SecurityResult<String> {
        let mut sealed = field.ciphertext.clone();
        sealed.extend_from_slice(&field.tag);

        let nonce = Nonce::from_slice(&field.iv);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| SecurityError::Decryption("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| SecurityError::Decryption("decrypted payload is not UTF-8".to_string()))
    }

    /// Encrypt the declared sensitive fields of a record in place.
    ///
    /// Only fields named by the schema are touched; non-string values pass
    /// through unchanged.
    pub fn encrypt_record(
        &self,
        record: &mut serde_json::Map<String, Value>,
        schema: &SensitiveSchema,
    ) -> SecurityResult<()> {
        for field in schema.fields {
            if let Some(Value::String(s)) = record.get_mut(*field) {
                *s = self.encrypt_field(s)?;
            }
        }
        Ok(())
    }

    /// Decrypt the declared sensitive fields of a record in place.
    pub fn decrypt_record(
        &self,
        record: &mut serde_json::Map<String, Value>,
        schema: &SensitiveSchema,
    ) -> SecurityResult<()> {
        for field in schema.fields {
            if let Some(Value::String(s)) = record.get_mut(*field) {
                *s = self.decrypt_field(s)?;
            }
        }
        Ok(())
    }

    /// Round-trip a probe value and report key health.
    pub fn health_check(&self) -> EncryptionHealth {
        const PROBE: &str = "hirelight-encryption-probe";

        let encrypted = self.encrypt_field(PROBE);
        let can_encrypt = encrypted.is_ok();

        let can_decrypt = match encrypted {
            Ok(wire) => matches!(self.decrypt_field(&wire), Ok(ref p) if p == PROBE),
            Err(_) => false,
        };

        EncryptionHealth {
            can_encrypt,
            can_decrypt,
            key_status: if can_encrypt && can_decrypt {
                KeyStatus::Ready
            } else {
                KeyStatus::Failed
            },
        }
    }
}

/// Derive the AES-256 key from a passphrase.
///
/// Deterministic: the same passphrase always yields the same key.
fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    key
}

// ==================
// Tests
// ==================
