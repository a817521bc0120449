//! # hirelight-auth
//!
//! Authentication security core for the Hirelight job platform: MFA
//! secret/token lifecycle, session risk scoring, field-level encryption of
//! sensitive PII, and the append-only security event log.
//!
//! The surrounding web application (routing, CRUD services, billing, the
//! relational store itself) consumes this crate; services here are
//! explicitly constructed with their repositories, key material, and event
//! sink injected, so tests run against in-memory stores with isolated
//! keys.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod mfa;
pub mod session;

pub use config::{MfaPolicy, RiskPolicy, SecurityCoreConfig, MASTER_KEY_ENV};
pub use crypto::{EncryptedField, EncryptionHealth, FieldEncryption, KeyStatus, SensitiveSchema};
pub use errors::{SecurityError, SecurityResult};
pub use events::{
    EventSeverity, SecurityEvent, SecurityEventLog, SecurityEventRepository, SecurityEventType,
};
pub use mfa::{
    MfaEnrollment, MfaService, MfaSettings, MfaState, MfaStatus, MfaVerification, TotpConfig,
};
pub use session::{
    EnhancedSession, GeoLocation, LocationResolver, RequestContext, SecurityFlags,
    SessionAnalytics, SessionService, SessionValidation,
};
