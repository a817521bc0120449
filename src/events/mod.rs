//! # Security Event Log
//!
//! Append-only record of MFA and session events, consumed by the external
//! dashboard and alerting layer. Events are never mutated or deleted by
//! this core. Recording failures are logged and swallowed — the audit
//! trail must never block an authentication flow.

use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{SecurityError, SecurityResult};

// ==================
// Event Types
// ==================

/// Security event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    MfaSetupInitiated,
    MfaEnabled,
    MfaVerified,
    MfaFailed,
    MfaLocked,
    MfaDisabled,
    BackupCodeUsed,
    BackupCodesRegenerated,
    SessionCreated,
    SessionInvalidated,
    SessionExpired,
    ReauthRequired,
    SuspiciousActivity,
}

impl SecurityEventType {
    /// String representation used in storage and dashboards
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::MfaSetupInitiated => "mfa_setup_initiated",
            SecurityEventType::MfaEnabled => "mfa_enabled",
            SecurityEventType::MfaVerified => "mfa_verified",
            SecurityEventType::MfaFailed => "mfa_failed",
            SecurityEventType::MfaLocked => "mfa_locked",
            SecurityEventType::MfaDisabled => "mfa_disabled",
            SecurityEventType::BackupCodeUsed => "backup_code_used",
            SecurityEventType::BackupCodesRegenerated => "backup_codes_regenerated",
            SecurityEventType::SessionCreated => "session_created",
            SecurityEventType::SessionInvalidated => "session_invalidated",
            SecurityEventType::SessionExpired => "session_expired",
            SecurityEventType::ReauthRequired => "reauth_required",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
        }
    }

    /// Severity used by the alerting layer
    pub fn severity(&self) -> EventSeverity {
        match self {
            SecurityEventType::MfaLocked | SecurityEventType::SuspiciousActivity => {
                EventSeverity::Critical
            }
            SecurityEventType::MfaFailed | SecurityEventType::ReauthRequired => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

// ==================
// Security Event
// ==================

/// One security event. Append-only: no update path exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: SecurityEventType,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(user_id: Uuid, event_type: SecurityEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_type,
            ip_address: None,
            user_agent: None,
            details: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Attach request context
    pub fn with_context(mut self, ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address);
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Attach structured details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

// ==================
// Repository
// ==================

/// Repository for security events. Append and read only.
pub trait SecurityEventRepository: Send + Sync {
    /// Append one event
    fn append(&self, event: SecurityEvent) -> SecurityResult<()>;

    /// All events for a user, oldest first
    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Vec<SecurityEvent>>;

    /// Count of a user's events at or after `since`
    fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> SecurityResult<usize>;
}

/// In-memory event repository for testing
pub struct InMemorySecurityEventRepository {
    events: RwLock<Vec<SecurityEvent>>,
}

impl InMemorySecurityEventRepository {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemorySecurityEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityEventRepository for InMemorySecurityEventRepository {
    fn append(&self, event: SecurityEvent) -> SecurityResult<()> {
        let mut events = self
            .events
            .write()
            .map_err(|_| SecurityError::store("event store poisoned"))?;
        events.push(event);
        Ok(())
    }

    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Vec<SecurityEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| SecurityError::store("event store poisoned"))?;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> SecurityResult<usize> {
        let events = self
            .events
            .read()
            .map_err(|_| SecurityError::store("event store poisoned"))?;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id && e.timestamp >= since)
            .count())
    }
}

// ==================
// Event Log
// ==================

/// Recording front-end over the event repository.
///
/// `record` never propagates store failures: a broken audit sink must not
/// take logins down with it. Failures are surfaced via `tracing` instead.
pub struct SecurityEventLog {
    repo: Arc<dyn SecurityEventRepository>,
}

impl SecurityEventLog {
    pub fn new(repo: Arc<dyn SecurityEventRepository>) -> Self {
        Self { repo }
    }

    /// Append an event, best-effort
    pub fn record(&self, event: SecurityEvent) {
        let event_type = event.event_type;
        if let Err(err) = self.repo.append(event) {
            warn!(
                event_type = event_type.as_str(),
                error = %err,
                "failed to record security event"
            );
        }
    }

    /// All events for a user
    pub fn events_for_user(&self, user_id: Uuid) -> SecurityResult<Vec<SecurityEvent>> {
        self.repo.find_by_user_id(user_id)
    }

    /// Events for a user inside a trailing window. Degrades to 0 on store
    /// failure — a missing signal, not a blocked login.
    pub fn recent_count(&self, user_id: Uuid, window: Duration) -> usize {
        let since = Utc::now() - window;
        self.repo.count_since(user_id, since).unwrap_or(0)
    }
}

// ==================
// Tests
// ==================
