//! # Security Core Errors
//!
//! Unified error taxonomy for the authentication security core.
//!
//! Operational errors (wrong-state operations, malformed input) are kept
//! distinct from security failures (verification, lockout, tampered
//! ciphertext) so callers can tell a logic mistake apart from an attack.

use thiserror::Error;

/// Result type for security core operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Security core errors
#[derive(Debug, Clone, Error)]
pub enum SecurityError {
    /// Malformed input: bad token format, empty passphrase, unknown session
    #[error("Validation error: {0}")]
    Validation(String),

    /// A presented credential did not verify
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Failure threshold exceeded; the factor is locked
    #[error("Account locked: {0}")]
    Lockout(String),

    /// Ciphertext failed authentication or the wire format is malformed.
    /// Always propagated; the ciphertext is never returned as plaintext.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// MFA operation attempted before setup completed
    #[error("MFA is not configured for this account")]
    NotConfigured,

    /// Setup attempted when MFA is already enabled
    #[error("MFA is already enabled for this account")]
    AlreadyConfigured,

    /// Persistence layer failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SecurityError {
    /// Get error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::Validation(_) => "VALIDATION_ERROR",
            SecurityError::Authentication(_) => "AUTHENTICATION_ERROR",
            SecurityError::Lockout(_) => "LOCKOUT_ERROR",
            SecurityError::Decryption(_) => "DECRYPTION_ERROR",
            SecurityError::NotConfigured => "MFA_NOT_CONFIGURED",
            SecurityError::AlreadyConfigured => "MFA_ALREADY_CONFIGURED",
            SecurityError::Store(_) => "STORE_ERROR",
            SecurityError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors that indicate a possible attack rather than a
    /// caller-side logic mistake.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            SecurityError::Authentication(_)
                | SecurityError::Lockout(_)
                | SecurityError::Decryption(_)
        )
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
