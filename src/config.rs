//! # Security Core Configuration
//!
//! All policy thresholds live here, not in code. Defaults are explicit and
//! documented; the master key is validated at construction so a
//! misconfigured deployment fails at startup, not on the first login.

use serde::{Deserialize, Serialize};

use crate::errors::{SecurityError, SecurityResult};

/// Environment variable supplying the master passphrase for field
/// encryption key derivation.
pub const MASTER_KEY_ENV: &str = "HIRELIGHT_MASTER_KEY";

/// Top-level configuration for the security core.
///
/// The master passphrase is key material: changing it is a key-rotation
/// event that invalidates existing ciphertexts unless they are explicitly
/// re-encrypted.
#[derive(Debug, Clone)]
pub struct SecurityCoreConfig {
    /// Passphrase the field-encryption key is derived from
    pub master_passphrase: String,
    /// MFA lifecycle policy
    pub mfa: MfaPolicy,
    /// Session risk policy
    pub risk: RiskPolicy,
}

impl SecurityCoreConfig {
    /// Build a configuration with an explicit passphrase.
    ///
    /// Fails fast on an empty or whitespace-only passphrase.
    pub fn new(master_passphrase: impl Into<String>) -> SecurityResult<Self> {
        let master_passphrase = master_passphrase.into();
        if master_passphrase.trim().is_empty() {
            return Err(SecurityError::validation(
                "master passphrase must not be empty",
            ));
        }
        Ok(Self {
            master_passphrase,
            mfa: MfaPolicy::default(),
            risk: RiskPolicy::default(),
        })
    }

    /// Build a configuration from the environment.
    ///
    /// Fails fast if `HIRELIGHT_MASTER_KEY` is absent or blank.
    pub fn from_env() -> SecurityResult<Self> {
        let passphrase = std::env::var(MASTER_KEY_ENV).map_err(|_| {
            SecurityError::validation(format!("{} is not set", MASTER_KEY_ENV))
        })?;
        Self::new(passphrase)
    }
}

/// MFA lifecycle policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaPolicy {
    /// Failed live verifications before the factor locks.
    /// Setup-phase failures are never counted toward lockout.
    pub max_failed_attempts: u32,

    /// Backup codes issued per (re)generation event
    pub backup_code_count: usize,
}

impl Default for MfaPolicy {
    /// Defaults: lock after 5 failures, 8 backup codes per set.
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            backup_code_count: 8,
        }
    }
}

/// Session risk policy.
///
/// Every threshold the risk engine consults is a field here. None of these
/// are hard-coded at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Maximum concurrent active sessions per user. Creating one more
    /// evicts the least-recently-active session first.
    pub max_concurrent_sessions: usize,

    /// Session lifetime in hours
    pub session_ttl_hours: i64,

    /// Risk score (0-100) at which re-authentication is required
    pub reauth_threshold: u8,

    /// Upper bound on the location lookup; past this the signal degrades
    /// to "unknown location" rather than stalling validation
    pub location_timeout_ms: u64,

    /// Minimum recorded sessions before the unusual-hours signal uses the
    /// user's own history instead of the quiet-window fallback
    pub min_history_samples: usize,

    /// Fallback quiet window (UTC hours, start inclusive, end exclusive)
    /// used while history is thin
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,

    /// Circular hour distance counted as "near" a historical session hour
    pub unusual_hour_window: u32,

    /// Below this fraction of history samples near the current hour, the
    /// hour is unusual
    pub unusual_hour_min_fraction: f64,

    /// Window and count for the security-event burst signal feeding the
    /// suspicious-activity flag
    pub event_burst_window_minutes: i64,
    pub event_burst_threshold: usize,

    /// Risk score weights, one per flag. The score is the clamped sum of
    /// the weights of raised flags, so it is monotonic in the flags.
    pub weight_device_change: u8,
    pub weight_location_change: u8,
    pub weight_unusual_hours: u8,
    pub weight_concurrent_sessions: u8,
    pub weight_suspicious_activity: u8,
}

impl Default for RiskPolicy {
    /// Defaults: 5 concurrent sessions, 24h lifetime, reauth at score 50,
    /// 500ms location budget, quiet window 01:00-05:00 UTC, ±2h unusual-hour
    /// window at a 10% floor over at least 5 history samples, burst at 10
    /// events in 10 minutes.
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 5,
            session_ttl_hours: 24,
            reauth_threshold: 50,
            location_timeout_ms: 500,
            min_history_samples: 5,
            quiet_hours_start: 1,
            quiet_hours_end: 5,
            unusual_hour_window: 2,
            unusual_hour_min_fraction: 0.1,
            event_burst_window_minutes: 10,
            event_burst_threshold: 10,
            weight_device_change: 35,
            weight_location_change: 25,
            weight_unusual_hours: 15,
            weight_concurrent_sessions: 10,
            weight_suspicious_activity: 15,
        }
    }
}
