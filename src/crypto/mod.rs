//! # Crypto Primitives
//!
//! Field-level authenticated encryption and searchable hashing for
//! sensitive PII. Everything that touches key material lives here.

pub mod field;
pub mod search;

pub use field::{
    EncryptedField, EncryptionHealth, FieldEncryption, KeyStatus, SensitiveSchema,
    CANDIDATE_PROFILE, COMPANY_BILLING,
};
pub use search::{generate_searchable_hash, verify_searchable_hash};
