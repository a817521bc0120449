//! # Multi-Factor Authentication
//!
//! TOTP secrets, single-use backup codes, and the per-user lifecycle state
//! machine that ties them together.

pub mod backup;
pub mod service;
pub mod totp;

pub use backup::{generate_backup_codes, hash_backup_code, verify_backup_code};
pub use service::{
    InMemoryMfaSettingsRepository, MfaEnrollment, MfaService, MfaSettings,
    MfaSettingsRepository, MfaState, MfaStatus, MfaVerification,
};
pub use totp::{TotpAlgorithm, TotpConfig};
