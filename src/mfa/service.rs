//! # MFA Service
//!
//! Per-user MFA lifecycle: `NotSetUp → PendingVerification → Enabled →
//! (Disabled | Locked)`. Every mutation is gated on a verified factor
//! (verify-then-mutate), so neither disabling MFA nor burning backup codes
//! is possible without proving possession of a valid one.
//!
//! Setup-phase failures never count toward lockout — until a factor is
//! proven there is no live factor to brute-force. Live failures lock the
//! factor after `MfaPolicy::max_failed_attempts`; the lockout check runs
//! before the token is even evaluated (closed fail).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::config::MfaPolicy;
use crate::crypto::FieldEncryption;
use crate::errors::{SecurityError, SecurityResult};
use crate::events::{SecurityEvent, SecurityEventLog, SecurityEventType};
use crate::mfa::backup;
use crate::mfa::totp::{self, TotpConfig};

// ==================
// MFA Settings
// ==================

/// Per-user MFA settings record.
///
/// The secret is stored in encrypted wire form, never plaintext; backup
/// codes are stored as one-way hashes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaSettings {
    pub user_id: Uuid,
    /// TOTP secret, always `enc_v1_...` wire form at rest
    pub secret: String,
    /// Remaining (unconsumed) backup-code hashes
    pub backup_codes: Vec<String>,
    pub enabled: bool,
    pub failed_attempts: u32,
    /// Time step of the last successful TOTP verification; a code matching
    /// the same step again is a replay and does not verify
    pub last_used_step: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// MFA lifecycle state, derived from the stored record.
///
/// `Disabled` has no record of its own: disabling deletes the settings, so
/// a disabled account reads back as `NotSetUp` and may set up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaState {
    NotSetUp,
    PendingVerification,
    Enabled,
    Locked,
}

impl MfaSettings {
    pub fn state(&self, policy: &MfaPolicy) -> MfaState {
        if !self.enabled {
            MfaState::PendingVerification
        } else if self.failed_attempts >= policy.max_failed_attempts {
            MfaState::Locked
        } else {
            MfaState::Enabled
        }
    }
}

// ==================
// Repository
// ==================

/// Repository for MFA settings
pub trait MfaSettingsRepository: Send + Sync {
    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Option<MfaSettings>>;

    /// Insert or replace the record for a user
    fn upsert(&self, settings: MfaSettings) -> SecurityResult<()>;

    /// Update an existing record; errors if absent
    fn update(&self, settings: MfaSettings) -> SecurityResult<()>;

    fn delete(&self, user_id: Uuid) -> SecurityResult<()>;
}

/// In-memory MFA settings repository for testing
pub struct InMemoryMfaSettingsRepository {
    records: RwLock<HashMap<Uuid, MfaSettings>>,
}

impl InMemoryMfaSettingsRepository {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMfaSettingsRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MfaSettingsRepository for InMemoryMfaSettingsRepository {
    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Option<MfaSettings>> {
        let records = self
            .records
            .read()
            .map_err(|_| SecurityError::store("mfa store poisoned"))?;
        Ok(records.get(&user_id).cloned())
    }

    fn upsert(&self, settings: MfaSettings) -> SecurityResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SecurityError::store("mfa store poisoned"))?;
        records.insert(settings.user_id, settings);
        Ok(())
    }

    fn update(&self, settings: MfaSettings) -> SecurityResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SecurityError::store("mfa store poisoned"))?;
        match records.get_mut(&settings.user_id) {
            Some(existing) => {
                *existing = settings;
                Ok(())
            }
            None => Err(SecurityError::store("mfa settings not found for update")),
        }
    }

    fn delete(&self, user_id: Uuid) -> SecurityResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| SecurityError::store("mfa store poisoned"))?;
        records.remove(&user_id);
        Ok(())
    }
}

// ==================
// Operation Results
// ==================

/// Returned by [`MfaService::enable_mfa`] exactly once; the plaintexts are
/// never retrievable again.
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    /// Base32 shared secret for manual entry
    pub secret: String,
    /// otpauth:// URI the setup QR code renders
    pub otpauth_uri: String,
    /// Plaintext backup codes, shown once
    pub backup_codes: Vec<String>,
}

/// Outcome of a live verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfaVerification {
    pub valid: bool,
    /// True when a backup code (not TOTP) was the means of success —
    /// callers use this to prompt "you have N codes left"
    pub used_backup_code: bool,
    pub attempts_remaining: u32,
    pub backup_codes_remaining: usize,
}

/// Read-only status projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaStatus {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
    pub last_used: Option<DateTime<Utc>>,
    pub can_setup: bool,
}

// ==================
// MFA Service
// ==================

/// MFA secret/token service
pub struct MfaService<R: MfaSettingsRepository> {
    totp: TotpConfig,
    policy: MfaPolicy,
    repo: Arc<R>,
    encryption: Arc<FieldEncryption>,
    events: Arc<SecurityEventLog>,
}

impl<R: MfaSettingsRepository> MfaService<R> {
    pub fn new(
        totp: TotpConfig,
        policy: MfaPolicy,
        repo: Arc<R>,
        encryption: Arc<FieldEncryption>,
        events: Arc<SecurityEventLog>,
    ) -> Self {
        Self {
            totp,
            policy,
            repo,
            encryption,
            events,
        }
    }

    /// Begin MFA setup for a user.
    ///
    /// Generates a secret, provisioning URI, and a fresh set of backup
    /// codes; persists the secret encrypted and the codes as hashes, with
    /// the factor not yet enabled. Re-running setup while still pending
    /// replaces the unproven factor; setup on an enabled account fails with
    /// [`SecurityError::AlreadyConfigured`].
    pub fn enable_mfa(&self, user_id: Uuid, account_label: &str) -> SecurityResult<MfaEnrollment> {
        if let Some(existing) = self.repo.find_by_user_id(user_id)? {
            if existing.enabled {
                return Err(SecurityError::AlreadyConfigured);
            }
        }

        let secret = totp::generate_secret();
        let otpauth_uri = totp::provisioning_uri(&secret, account_label, &self.totp);
        let backup_codes = backup::generate_backup_codes(self.policy.backup_code_count);

        let settings = MfaSettings {
            user_id,
            secret: self.encryption.encrypt_field(&secret)?,
            backup_codes: backup_codes.iter().map(|c| backup::hash_backup_code(c)).collect(),
            enabled: false,
            failed_attempts: 0,
            last_used_step: None,
            created_at: Utc::now(),
            last_used: None,
        };
        self.repo.upsert(settings)?;

        self.events
            .record(SecurityEvent::new(user_id, SecurityEventType::MfaSetupInitiated));
        debug!(%user_id, "mfa setup initiated");

        Ok(MfaEnrollment {
            secret,
            otpauth_uri,
            backup_codes,
        })
    }

    /// Complete setup by proving the authenticator works.
    ///
    /// Valid only while pending. Setup failures increment the counter for
    /// bookkeeping but never lock the factor.
    pub fn verify_and_enable_mfa(&self, user_id: Uuid, token: &str) -> SecurityResult<bool> {
        let mut settings = self
            .repo
            .find_by_user_id(user_id)?
            .ok_or(SecurityError::NotConfigured)?;
        if settings.enabled {
            return Err(SecurityError::AlreadyConfigured);
        }
        self.require_totp_shape(token)?;

        let secret = self.encryption.decrypt_field(&settings.secret)?;
        match totp::matching_step(&secret, token, totp::unix_now()?, &self.totp)? {
            Some(step) => {
                settings.enabled = true;
                settings.failed_attempts = 0;
                settings.last_used = Some(Utc::now());
                settings.last_used_step = Some(step);
                self.repo.update(settings)?;
                self.events
                    .record(SecurityEvent::new(user_id, SecurityEventType::MfaEnabled));
                debug!(%user_id, "mfa enabled");
                Ok(true)
            }
            None => {
                settings.failed_attempts += 1;
                self.repo.update(settings)?;
                Ok(false)
            }
        }
    }

    /// Verify a live token (TOTP or backup code).
    ///
    /// The lockout check runs first and fails closed: at or past the
    /// threshold the token is not evaluated at all. A failed attempt never
    /// reveals which path was tried — only "invalid" plus the remaining
    /// attempt count.
    pub fn verify_mfa_token(&self, user_id: Uuid, token: &str) -> SecurityResult<MfaVerification> {
        let mut settings = self
            .repo
            .find_by_user_id(user_id)?
            .ok_or(SecurityError::NotConfigured)?;
        if !settings.enabled {
            return Err(SecurityError::NotConfigured);
        }

        let max = self.policy.max_failed_attempts;
        if settings.failed_attempts >= max {
            self.events.record(
                SecurityEvent::new(user_id, SecurityEventType::MfaLocked)
                    .with_details(json!({ "failed_attempts": settings.failed_attempts })),
            );
            return Ok(MfaVerification {
                valid: false,
                used_backup_code: false,
                attempts_remaining: 0,
                backup_codes_remaining: settings.backup_codes.len(),
            });
        }

        let is_totp = self.has_totp_shape(token);
        let is_backup = backup::looks_like_backup_code(token);
        if !is_totp && !is_backup {
            return Err(SecurityError::validation(
                "token is neither a TOTP code nor a backup code",
            ));
        }

        if is_totp {
            let secret = self.encryption.decrypt_field(&settings.secret)?;
            if let Some(step) = totp::matching_step(&secret, token, totp::unix_now()?, &self.totp)? {
                // A code matching the step of the previous success is a
                // replay and falls through to the failure path
                if settings.last_used_step != Some(step) {
                    settings.failed_attempts = 0;
                    settings.last_used = Some(Utc::now());
                    settings.last_used_step = Some(step);
                    let backup_codes_remaining = settings.backup_codes.len();
                    self.repo.update(settings)?;
                    self.events
                        .record(SecurityEvent::new(user_id, SecurityEventType::MfaVerified));
                    return Ok(MfaVerification {
                        valid: true,
                        used_backup_code: false,
                        attempts_remaining: max,
                        backup_codes_remaining,
                    });
                }
            }
        }

        if is_backup {
            if let Some(pos) = settings
                .backup_codes
                .iter()
                .position(|hash| backup::verify_backup_code(token, hash))
            {
                // Single use: the hash is removed before success is reported
                settings.backup_codes.remove(pos);
                settings.failed_attempts = 0;
                settings.last_used = Some(Utc::now());
                let backup_codes_remaining = settings.backup_codes.len();
                self.repo.update(settings)?;
                self.events.record(
                    SecurityEvent::new(user_id, SecurityEventType::BackupCodeUsed)
                        .with_details(json!({ "backup_codes_remaining": backup_codes_remaining })),
                );
                return Ok(MfaVerification {
                    valid: true,
                    used_backup_code: true,
                    attempts_remaining: max,
                    backup_codes_remaining,
                });
            }
        }

        settings.failed_attempts += 1;
        let attempts_remaining = max.saturating_sub(settings.failed_attempts);
        let backup_codes_remaining = settings.backup_codes.len();
        self.repo.update(settings)?;
        self.events.record(
            SecurityEvent::new(user_id, SecurityEventType::MfaFailed)
                .with_details(json!({ "attempts_remaining": attempts_remaining })),
        );

        Ok(MfaVerification {
            valid: false,
            used_backup_code: false,
            attempts_remaining,
            backup_codes_remaining,
        })
    }

    /// Disable MFA. Requires a currently-valid token; clears the secret and
    /// backup codes entirely.
    pub fn disable_mfa(&self, user_id: Uuid, current_token: &str) -> SecurityResult<()> {
        self.require_valid_token(user_id, current_token)?;

        self.repo.delete(user_id)?;
        self.events
            .record(SecurityEvent::new(user_id, SecurityEventType::MfaDisabled));
        debug!(%user_id, "mfa disabled");
        Ok(())
    }

    /// Replace the entire backup-code set. Requires a currently-valid
    /// token; returns the fresh plaintexts exactly once.
    pub fn regenerate_backup_codes(
        &self,
        user_id: Uuid,
        current_token: &str,
    ) -> SecurityResult<Vec<String>> {
        self.require_valid_token(user_id, current_token)?;

        // Reload: verification may have consumed the presented backup code
        let mut settings = self
            .repo
            .find_by_user_id(user_id)?
            .ok_or(SecurityError::NotConfigured)?;

        let codes = backup::generate_backup_codes(self.policy.backup_code_count);
        settings.backup_codes = codes.iter().map(|c| backup::hash_backup_code(c)).collect();
        self.repo.update(settings)?;

        self.events.record(
            SecurityEvent::new(user_id, SecurityEventType::BackupCodesRegenerated)
                .with_details(json!({ "count": codes.len() })),
        );
        Ok(codes)
    }

    /// Read-only status projection for the account settings page
    pub fn mfa_status(&self, user_id: Uuid) -> SecurityResult<MfaStatus> {
        Ok(match self.repo.find_by_user_id(user_id)? {
            Some(settings) => MfaStatus {
                enabled: settings.enabled,
                backup_codes_remaining: settings.backup_codes.len(),
                last_used: settings.last_used,
                can_setup: !settings.enabled,
            },
            None => MfaStatus {
                enabled: false,
                backup_codes_remaining: 0,
                last_used: None,
                can_setup: true,
            },
        })
    }

    fn has_totp_shape(&self, token: &str) -> bool {
        token.len() == self.totp.digits as usize && token.chars().all(|c| c.is_ascii_digit())
    }

    fn require_totp_shape(&self, token: &str) -> SecurityResult<()> {
        if self.has_totp_shape(token) {
            Ok(())
        } else {
            Err(SecurityError::validation("token is not a TOTP code"))
        }
    }

    /// Verify-then-mutate gate shared by disable and regeneration
    fn require_valid_token(&self, user_id: Uuid, token: &str) -> SecurityResult<()> {
        let outcome = self.verify_mfa_token(user_id, token)?;
        if outcome.valid {
            Ok(())
        } else if outcome.attempts_remaining == 0 {
            Err(SecurityError::Lockout(
                "too many failed MFA attempts".to_string(),
            ))
        } else {
            Err(SecurityError::Authentication(
                "MFA token did not verify".to_string(),
            ))
        }
    }
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemorySecurityEventRepository, SecurityEventRepository};

    struct Harness {
        service: MfaService<InMemoryMfaSettingsRepository>,
        events: Arc<InMemorySecurityEventRepository>,
        user: Uuid,
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryMfaSettingsRepository::new());
        let encryption = Arc::new(FieldEncryption::new("test-master-passphrase").unwrap());
        let event_repo = Arc::new(InMemorySecurityEventRepository::new());
        let events = Arc::new(SecurityEventLog::new(event_repo.clone()));
        Harness {
            service: MfaService::new(
                TotpConfig::default(),
                MfaPolicy::default(),
                repo,
                encryption,
                events,
            ),
            events: event_repo,
            user: Uuid::new_v4(),
        }
    }

    fn current_code(secret: &str) -> String {
        totp::generate_totp(secret, totp::unix_now().unwrap(), &TotpConfig::default()).unwrap()
    }

    /// A 6-digit code guaranteed not to verify in the current window
    fn wrong_code(secret: &str) -> String {
        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();
        let current = now / config.period;
        let window: Vec<String> = (current - config.skew..=current + config.skew)
            .map(|s| totp::generate_totp(secret, s * config.period, &config).unwrap())
            .collect();
        (0..1_000_000)
            .map(|n| format!("{:06}", n))
            .find(|c| !window.contains(c))
            .unwrap()
    }

    fn enrolled(h: &Harness) -> MfaEnrollment {
        let enrollment = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        assert!(h
            .service
            .verify_and_enable_mfa(h.user, &current_code(&enrollment.secret))
            .unwrap());
        enrollment
    }

    #[test]
    fn test_enrollment_returns_plaintext_once() {
        let h = harness();
        let enrollment = h.service.enable_mfa(h.user, "dana@example.com").unwrap();

        assert_eq!(enrollment.backup_codes.len(), 8);
        assert!(enrollment.otpauth_uri.starts_with("otpauth://totp/"));

        // At rest: secret encrypted, codes hashed
        let stored = h.service.repo.find_by_user_id(h.user).unwrap().unwrap();
        assert!(!stored.enabled);
        assert_ne!(stored.secret, enrollment.secret);
        assert!(stored.secret.starts_with("enc_v1_"));
        for (code, hash) in enrollment.backup_codes.iter().zip(&stored.backup_codes) {
            assert_ne!(code, hash);
        }
    }

    #[test]
    fn test_setup_already_enabled_fails() {
        let h = harness();
        enrolled(&h);
        let result = h.service.enable_mfa(h.user, "dana@example.com");
        assert!(matches!(result, Err(SecurityError::AlreadyConfigured)));
    }

    #[test]
    fn test_pending_setup_can_restart() {
        let h = harness();
        let first = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        let second = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        assert_ne!(first.secret, second.secret);

        // Only the replacement factor verifies
        assert!(!h
            .service
            .verify_and_enable_mfa(h.user, &wrong_code(&second.secret))
            .unwrap());
        assert!(h
            .service
            .verify_and_enable_mfa(h.user, &current_code(&second.secret))
            .unwrap());
    }

    #[test]
    fn test_verify_before_setup_is_not_configured() {
        let h = harness();
        let result = h.service.verify_mfa_token(h.user, "123456");
        assert!(matches!(result, Err(SecurityError::NotConfigured)));
    }

    #[test]
    fn test_totp_verification_and_replay_rejection() {
        let h = harness();
        // Enabling consumes the current step; a later step's code is used
        // for the live verification (still inside the ±2 window)
        let enrollment = enrolled(&h);
        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();

        let next_code =
            totp::generate_totp(&enrollment.secret, now + config.period, &config).unwrap();
        let outcome = h.service.verify_mfa_token(h.user, &next_code).unwrap();
        assert!(outcome.valid);
        assert!(!outcome.used_backup_code);

        // Same code, same step: replay is rejected
        let replay = h.service.verify_mfa_token(h.user, &next_code).unwrap();
        assert!(!replay.valid);
        assert_eq!(replay.attempts_remaining, 4);
    }

    #[test]
    fn test_backup_code_single_use() {
        let h = harness();
        let enrollment = enrolled(&h);

        let code = &enrollment.backup_codes[0];
        let outcome = h.service.verify_mfa_token(h.user, code).unwrap();
        assert!(outcome.valid);
        assert!(outcome.used_backup_code);
        assert_eq!(outcome.backup_codes_remaining, 7);

        let status = h.service.mfa_status(h.user).unwrap();
        assert_eq!(status.backup_codes_remaining, 7);

        // Consumed codes are gone
        let replay = h.service.verify_mfa_token(h.user, code).unwrap();
        assert!(!replay.valid);
    }

    #[test]
    fn test_malformed_token_is_validation_error() {
        let h = harness();
        enrolled(&h);
        let result = h.service.verify_mfa_token(h.user, "not-a-token!");
        assert!(matches!(result, Err(SecurityError::Validation(_))));
    }

    #[test]
    fn test_lockout_after_five_failures() {
        let h = harness();
        let enrollment = enrolled(&h);
        let bad = wrong_code(&enrollment.secret);

        for expected_remaining in (0..5).rev() {
            let outcome = h.service.verify_mfa_token(h.user, &bad).unwrap();
            assert!(!outcome.valid);
            assert_eq!(outcome.attempts_remaining, expected_remaining);
        }

        // Sixth attempt: even a correct code is rejected, closed fail
        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();
        let good = totp::generate_totp(&enrollment.secret, now + config.period, &config).unwrap();
        let outcome = h.service.verify_mfa_token(h.user, &good).unwrap();
        assert!(!outcome.valid);
        assert_eq!(outcome.attempts_remaining, 0);

        // The lockout is on the audit trail
        let events = h.events.find_by_user_id(h.user).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == SecurityEventType::MfaLocked));
    }

    #[test]
    fn test_setup_failures_do_not_lock() {
        let h = harness();
        let enrollment = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        let bad = wrong_code(&enrollment.secret);

        for _ in 0..7 {
            assert!(!h.service.verify_and_enable_mfa(h.user, &bad).unwrap());
        }

        // Still pending, still enableable
        assert!(h
            .service
            .verify_and_enable_mfa(h.user, &current_code(&enrollment.secret))
            .unwrap());
    }

    #[test]
    fn test_disable_requires_valid_token_and_resets() {
        let h = harness();
        let enrollment = enrolled(&h);
        let bad = wrong_code(&enrollment.secret);

        // Two failures, then a wrong-token disable is rejected
        h.service.verify_mfa_token(h.user, &bad).unwrap();
        h.service.verify_mfa_token(h.user, &bad).unwrap();
        let denied = h.service.disable_mfa(h.user, &bad);
        assert!(matches!(denied, Err(SecurityError::Authentication(_))));

        // Valid token disables; account returns to NotSetUp
        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();
        let good = totp::generate_totp(&enrollment.secret, now + config.period, &config).unwrap();
        h.service.disable_mfa(h.user, &good).unwrap();

        let status = h.service.mfa_status(h.user).unwrap();
        assert!(!status.enabled);
        assert!(status.can_setup);
        assert_eq!(status.backup_codes_remaining, 0);

        // Re-enrolling starts with a clean failure counter
        let again = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        assert!(h
            .service
            .verify_and_enable_mfa(h.user, &current_code(&again.secret))
            .unwrap());
        let stored = h.service.repo.find_by_user_id(h.user).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
    }

    #[test]
    fn test_locked_factor_cannot_be_disabled() {
        let h = harness();
        let enrollment = enrolled(&h);
        let bad = wrong_code(&enrollment.secret);

        for _ in 0..5 {
            h.service.verify_mfa_token(h.user, &bad).unwrap();
        }

        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();
        let good = totp::generate_totp(&enrollment.secret, now + config.period, &config).unwrap();
        let result = h.service.disable_mfa(h.user, &good);
        assert!(matches!(result, Err(SecurityError::Lockout(_))));
    }

    #[test]
    fn test_regenerate_backup_codes_replaces_set() {
        let h = harness();
        let enrollment = enrolled(&h);

        let config = TotpConfig::default();
        let now = totp::unix_now().unwrap();
        let good = totp::generate_totp(&enrollment.secret, now + config.period, &config).unwrap();
        let fresh = h.service.regenerate_backup_codes(h.user, &good).unwrap();
        assert_eq!(fresh.len(), 8);

        // Old codes are dead
        let old = &enrollment.backup_codes[0];
        assert!(!h.service.verify_mfa_token(h.user, old).unwrap().valid);
        // New codes work
        let outcome = h.service.verify_mfa_token(h.user, &fresh[0]).unwrap();
        assert!(outcome.valid);
        assert!(outcome.used_backup_code);
    }

    #[test]
    fn test_status_before_setup() {
        let h = harness();
        let status = h.service.mfa_status(h.user).unwrap();
        assert!(!status.enabled);
        assert!(status.can_setup);
        assert_eq!(status.backup_codes_remaining, 0);
        assert!(status.last_used.is_none());
    }

    #[test]
    fn test_state_projection() {
        let h = harness();
        let policy = MfaPolicy::default();

        let enrollment = h.service.enable_mfa(h.user, "dana@example.com").unwrap();
        let stored = h.service.repo.find_by_user_id(h.user).unwrap().unwrap();
        assert_eq!(stored.state(&policy), MfaState::PendingVerification);

        assert!(h
            .service
            .verify_and_enable_mfa(h.user, &current_code(&enrollment.secret))
            .unwrap());
        let stored = h.service.repo.find_by_user_id(h.user).unwrap().unwrap();
        assert_eq!(stored.state(&policy), MfaState::Enabled);

        let bad = wrong_code(&enrollment.secret);
        for _ in 0..5 {
            h.service.verify_mfa_token(h.user, &bad).unwrap();
        }
        let stored = h.service.repo.find_by_user_id(h.user).unwrap().unwrap();
        assert_eq!(stored.state(&policy), MfaState::Locked);
    }
}
