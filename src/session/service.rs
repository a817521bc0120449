//! # Session Risk Engine
//!
//! Creates and validates enhanced sessions: device fingerprinting, coarse
//! location, anomaly flags, and the risk score that drives the
//! reauthentication decision. Signal lookups degrade to neutral values on
//! failure — login availability is prioritized over signal completeness.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::config::RiskPolicy;
use crate::errors::{SecurityError, SecurityResult};
use crate::events::{SecurityEvent, SecurityEventLog, SecurityEventType};
use crate::session::fingerprint::{device_fingerprint, RequestContext};
use crate::session::location::{GeoLocation, LocationResolver};
use crate::session::risk::{is_unusual_hour, risk_score, SecurityFlags};

// ==================
// Enhanced Session
// ==================

/// A tracked session with its security posture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_fingerprint: String,
    pub ip_address: std::net::IpAddr,
    /// Coarse location; `None` when the lookup failed or timed out
    pub location: Option<GeoLocation>,
    pub is_active: bool,
    pub flags: SecurityFlags,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EnhancedSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Active and not yet expired
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

// ==================
// Repository
// ==================

/// Repository for enhanced sessions
pub trait SessionRepository: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> SecurityResult<Option<EnhancedSession>>;

    /// All sessions for a user, any state
    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Vec<EnhancedSession>>;

    /// Active sessions whose `expires_at` has passed
    fn find_expired(&self, now: DateTime<Utc>) -> SecurityResult<Vec<EnhancedSession>>;

    fn create(&self, session: EnhancedSession) -> SecurityResult<()>;

    fn update(&self, session: EnhancedSession) -> SecurityResult<()>;
}

/// In-memory session repository for testing
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, EnhancedSession>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn find_by_id(&self, id: Uuid) -> SecurityResult<Option<EnhancedSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SecurityError::store("session store poisoned"))?;
        Ok(sessions.get(&id).cloned())
    }

    fn find_by_user_id(&self, user_id: Uuid) -> SecurityResult<Vec<EnhancedSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SecurityError::store("session store poisoned"))?;
        let mut result: Vec<EnhancedSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|s| s.created_at);
        Ok(result)
    }

    fn find_expired(&self, now: DateTime<Utc>) -> SecurityResult<Vec<EnhancedSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| SecurityError::store("session store poisoned"))?;
        Ok(sessions
            .values()
            .filter(|s| s.is_active && s.is_expired(now))
            .cloned()
            .collect())
    }

    fn create(&self, session: EnhancedSession) -> SecurityResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SecurityError::store("session store poisoned"))?;
        sessions.insert(session.id, session);
        Ok(())
    }

    fn update(&self, session: EnhancedSession) -> SecurityResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| SecurityError::store("session store poisoned"))?;
        match sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session;
                Ok(())
            }
            None => Err(SecurityError::store("session not found for update")),
        }
    }
}

// ==================
// Operation Results
// ==================

/// Outcome of a validation pass. Computed without writes; callers persist
/// via [`SessionService::update_session_activity`] on each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionValidation {
    pub valid: bool,
    /// Integration point with the MFA service: when set, the caller must
    /// demand a fresh factor before continuing
    pub requires_reauth: bool,
    pub risk_score: u8,
    pub flags: SecurityFlags,
}

impl SessionValidation {
    /// Absent, expired, or revoked session
    fn invalid() -> Self {
        Self {
            valid: false,
            requires_reauth: true,
            risk_score: 0,
            flags: SecurityFlags::default(),
        }
    }
}

/// Per-flag totals across a user's sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCounts {
    pub suspicious_activity: usize,
    pub location_change: usize,
    pub device_change: usize,
    pub concurrent_sessions: usize,
    pub unusual_hours: usize,
}

/// Aggregate view for the external dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub distinct_devices: usize,
    pub distinct_locations: usize,
    pub flag_counts: FlagCounts,
}

// ==================
// Session Service
// ==================

/// Session risk engine
pub struct SessionService<R: SessionRepository, L: LocationResolver> {
    policy: RiskPolicy,
    repo: Arc<R>,
    resolver: L,
    events: Arc<SecurityEventLog>,
}

impl<R: SessionRepository, L: LocationResolver> SessionService<R, L> {
    pub fn new(
        policy: RiskPolicy,
        repo: Arc<R>,
        resolver: L,
        events: Arc<SecurityEventLog>,
    ) -> Self {
        Self {
            policy,
            repo,
            resolver,
            events,
        }
    }

    /// Create a session at login.
    ///
    /// Evicts least-recently-active sessions when the user is at the
    /// concurrency cap (over-eviction is acceptable; exceeding the cap is
    /// not). Initial flags are computed against the user's session
    /// history, so a brand-new device raises `device_change` at creation.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> SecurityResult<EnhancedSession> {
        let now = Utc::now();
        let fingerprint = device_fingerprint(ctx);
        let location = self.resolve_location(ctx.ip_address).await;

        let history = self.repo.find_by_user_id(user_id)?;
        let mut live: Vec<&EnhancedSession> =
            history.iter().filter(|s| s.is_live(now)).collect();

        let cap = self.policy.max_concurrent_sessions;
        if live.len() >= cap {
            live.sort_by_key(|s| s.last_activity);
            let excess = live.len() + 1 - cap;
            for stale in live.iter().take(excess) {
                let mut evicted = (*stale).clone();
                evicted.is_active = false;
                self.repo.update(evicted)?;
                self.events.record(
                    SecurityEvent::new(user_id, SecurityEventType::SessionInvalidated)
                        .with_context(ctx.ip_address, ctx.user_agent.clone())
                        .with_details(
                            json!({ "session_id": stale.id, "reason": "concurrency_cap" }),
                        ),
                );
                debug!(%user_id, session_id = %stale.id, "evicted least-recently-active session");
            }
        }
        let live_after = if live.len() >= cap { cap } else { live.len() + 1 };

        let mut flags = SecurityFlags {
            concurrent_sessions: live_after >= cap,
            ..Default::default()
        };
        if !history.is_empty()
            && !history.iter().any(|s| s.device_fingerprint == fingerprint)
        {
            flags.device_change = true;
        }
        if let Some(current) = &location {
            if self.location_changed(&history, current) {
                flags.location_change = true;
            }
        }
        let hours: Vec<u32> = history.iter().map(|s| s.created_at.hour()).collect();
        flags.unusual_hours = is_unusual_hour(now.hour(), &hours, &self.policy);
        flags.suspicious_activity = self.is_suspicious(&flags, user_id);

        let session = EnhancedSession {
            id: Uuid::new_v4(),
            user_id,
            device_fingerprint: fingerprint.clone(),
            ip_address: ctx.ip_address,
            location,
            is_active: true,
            flags,
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::hours(self.policy.session_ttl_hours),
        };
        self.repo.create(session.clone())?;

        self.events.record(
            SecurityEvent::new(user_id, SecurityEventType::SessionCreated)
                .with_context(ctx.ip_address, ctx.user_agent.clone())
                .with_details(json!({ "session_id": session.id, "fingerprint": fingerprint })),
        );
        debug!(%user_id, session_id = %session.id, "session created");

        Ok(session)
    }

    /// Validate a session against the current request.
    ///
    /// Absent, expired, or revoked sessions are invalid and require
    /// reauthentication. Live sessions get their flags recomputed; the
    /// risk score is a monotonic combination of the raised flags.
    pub async fn validate_session(
        &self,
        session_id: Uuid,
        ctx: &RequestContext,
    ) -> SecurityResult<SessionValidation> {
        let now = Utc::now();
        let Some(session) = self.repo.find_by_id(session_id)? else {
            return Ok(SessionValidation::invalid());
        };
        if !session.is_live(now) {
            return Ok(SessionValidation::invalid());
        }

        let fingerprint = device_fingerprint(ctx);
        let location = self.resolve_location(ctx.ip_address).await;
        let history = self.repo.find_by_user_id(session.user_id)?;

        // Stored flags are the sticky base; this pass can only add
        let mut flags = session.flags;
        if fingerprint != session.device_fingerprint {
            flags.device_change = true;
        }
        if let Some(current) = &location {
            if self.location_changed(&history, current) {
                flags.location_change = true;
            }
        }
        let hours: Vec<u32> = history.iter().map(|s| s.created_at.hour()).collect();
        if is_unusual_hour(now.hour(), &hours, &self.policy) {
            flags.unusual_hours = true;
        }
        if self.is_suspicious(&flags, session.user_id) {
            flags.suspicious_activity = true;
        }

        let score = risk_score(&flags, &self.policy);
        let requires_reauth = score >= self.policy.reauth_threshold;

        if flags.suspicious_activity && !session.flags.suspicious_activity {
            self.events.record(
                SecurityEvent::new(session.user_id, SecurityEventType::SuspiciousActivity)
                    .with_context(ctx.ip_address, ctx.user_agent.clone())
                    .with_details(json!({ "session_id": session.id, "risk_score": score })),
            );
        }
        if requires_reauth {
            self.events.record(
                SecurityEvent::new(session.user_id, SecurityEventType::ReauthRequired)
                    .with_context(ctx.ip_address, ctx.user_agent.clone())
                    .with_details(json!({ "session_id": session.id, "risk_score": score })),
            );
        }

        Ok(SessionValidation {
            valid: true,
            requires_reauth,
            risk_score: score,
            flags,
        })
    }

    /// Refresh `last_activity` and persist newly-raised flags. Flags merge
    /// monotonically: a calmer request never clears an earlier anomaly.
    pub fn update_session_activity(
        &self,
        session_id: Uuid,
        raised: &SecurityFlags,
    ) -> SecurityResult<()> {
        let mut session = self
            .repo
            .find_by_id(session_id)?
            .ok_or_else(|| SecurityError::validation("unknown session"))?;
        session.last_activity = Utc::now();
        session.flags.merge(raised);
        self.repo.update(session)
    }

    /// Explicit revoke: logout, account disable, password reset
    pub fn invalidate_session(&self, session_id: Uuid) -> SecurityResult<()> {
        let mut session = self
            .repo
            .find_by_id(session_id)?
            .ok_or_else(|| SecurityError::validation("unknown session"))?;
        if session.is_active {
            session.is_active = false;
            let user_id = session.user_id;
            self.repo.update(session)?;
            self.events.record(
                SecurityEvent::new(user_id, SecurityEventType::SessionInvalidated)
                    .with_details(json!({ "session_id": session_id, "reason": "revoked" })),
            );
        }
        Ok(())
    }

    /// Revoke every active session a user has
    pub fn invalidate_all_user_sessions(&self, user_id: Uuid) -> SecurityResult<usize> {
        let now = Utc::now();
        let mut revoked = 0;
        for session in self.repo.find_by_user_id(user_id)? {
            if session.is_live(now) {
                self.invalidate_session(session.id)?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Deactivate sessions past their expiry. Idempotent; safe to run
    /// repeatedly or concurrently.
    pub fn cleanup_expired_sessions(&self) -> SecurityResult<usize> {
        let now = Utc::now();
        let mut swept = 0;
        for session in self.repo.find_expired(now)? {
            let mut expired = session.clone();
            expired.is_active = false;
            self.repo.update(expired)?;
            self.events.record(
                SecurityEvent::new(session.user_id, SecurityEventType::SessionExpired)
                    .with_details(json!({ "session_id": session.id })),
            );
            swept += 1;
        }
        Ok(swept)
    }

    /// Aggregate read feeding the external dashboard
    pub fn session_analytics(&self, user_id: Uuid) -> SecurityResult<SessionAnalytics> {
        let now = Utc::now();
        let sessions = self.repo.find_by_user_id(user_id)?;

        let devices: HashSet<&str> = sessions
            .iter()
            .map(|s| s.device_fingerprint.as_str())
            .collect();
        let locations: HashSet<String> = sessions
            .iter()
            .filter_map(|s| s.location.as_ref())
            .map(|l| format!("{}/{}", l.country, l.region))
            .collect();

        let mut flag_counts = FlagCounts::default();
        for session in &sessions {
            if session.flags.suspicious_activity {
                flag_counts.suspicious_activity += 1;
            }
            if session.flags.location_change {
                flag_counts.location_change += 1;
            }
            if session.flags.device_change {
                flag_counts.device_change += 1;
            }
            if session.flags.concurrent_sessions {
                flag_counts.concurrent_sessions += 1;
            }
            if session.flags.unusual_hours {
                flag_counts.unusual_hours += 1;
            }
        }

        Ok(SessionAnalytics {
            total_sessions: sessions.len(),
            active_sessions: sessions.iter().filter(|s| s.is_live(now)).count(),
            distinct_devices: devices.len(),
            distinct_locations: locations.len(),
            flag_counts,
        })
    }

    /// Location lookup under the policy time budget; anything slow or
    /// failing degrades to unknown
    async fn resolve_location(&self, ip: std::net::IpAddr) -> Option<GeoLocation> {
        let budget = std::time::Duration::from_millis(self.policy.location_timeout_ms);
        match tokio::time::timeout(budget, self.resolver.resolve(ip)).await {
            Ok(location) => location,
            Err(_) => {
                debug!(%ip, "location lookup timed out");
                None
            }
        }
    }

    /// Coarse comparison against every location the user has been seen
    /// from. An unknown current or fully-unknown history never raises the
    /// flag.
    fn location_changed(&self, history: &[EnhancedSession], current: &GeoLocation) -> bool {
        let known: Vec<&GeoLocation> =
            history.iter().filter_map(|s| s.location.as_ref()).collect();
        !known.is_empty() && !known.iter().any(|k| k.same_region(current))
    }

    /// Composite signal: several anomalies at once, or a burst of security
    /// events in the trailing window
    fn is_suspicious(&self, flags: &SecurityFlags, user_id: Uuid) -> bool {
        if flags.anomaly_count() >= 2 {
            return true;
        }
        let window = Duration::minutes(self.policy.event_burst_window_minutes);
        self.events.recent_count(user_id, window) > self.policy.event_burst_threshold
    }
}

// ==================
// Tests
// ==================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InMemorySecurityEventRepository, SecurityEventRepository};
    use crate::session::location::{StaticLocationResolver, UnknownLocationResolver};
    use std::net::IpAddr;

    const IP_CA: &str = "203.0.113.10";
    const IP_NY: &str = "198.51.100.20";
    const IP_DE: &str = "192.0.2.30";

    /// Policy with the unusual-hours signal neutralized so tests are not
    /// sensitive to the wall-clock hour they run at
    fn test_policy() -> RiskPolicy {
        RiskPolicy {
            quiet_hours_start: 0,
            quiet_hours_end: 0,
            min_history_samples: usize::MAX,
            ..RiskPolicy::default()
        }
    }

    fn resolver() -> StaticLocationResolver {
        StaticLocationResolver::new()
            .with_entry(IP_CA.parse().unwrap(), GeoLocation::new("US", "CA"))
            .with_entry(IP_NY.parse().unwrap(), GeoLocation::new("US", "NY"))
            .with_entry(IP_DE.parse().unwrap(), GeoLocation::new("DE", "BE"))
    }

    struct Harness<L: LocationResolver> {
        service: SessionService<InMemorySessionRepository, L>,
        events: Arc<InMemorySecurityEventRepository>,
        user: Uuid,
    }

    fn harness_with<L: LocationResolver>(policy: RiskPolicy, resolver: L) -> Harness<L> {
        let repo = Arc::new(InMemorySessionRepository::new());
        let event_repo = Arc::new(InMemorySecurityEventRepository::new());
        let events = Arc::new(SecurityEventLog::new(event_repo.clone()));
        Harness {
            service: SessionService::new(policy, repo, resolver, events),
            events: event_repo,
            user: Uuid::new_v4(),
        }
    }

    fn harness() -> Harness<StaticLocationResolver> {
        harness_with(test_policy(), resolver())
    }

    fn laptop(ip: &str) -> RequestContext {
        RequestContext::new(ip.parse::<IpAddr>().unwrap(), "Mozilla/5.0 (X11; Linux)")
            .with_header("Accept-Language", "en-US")
    }

    fn phone(ip: &str) -> RequestContext {
        RequestContext::new(ip.parse::<IpAddr>().unwrap(), "Mozilla/5.0 (iPhone)")
            .with_header("Accept-Language", "en-US")
    }

    #[tokio::test]
    async fn test_create_session_basics() {
        let h = harness();
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        assert!(session.is_active);
        assert_eq!(session.location, Some(GeoLocation::new("US", "CA")));
        assert!(!session.flags.any());
        assert_eq!(session.device_fingerprint.len(), 32);
    }

    #[tokio::test]
    async fn test_eviction_at_concurrency_cap() {
        let h = harness();
        let cap = h.service.policy.max_concurrent_sessions;

        let mut ids = Vec::new();
        for _ in 0..cap {
            ids.push(h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap().id);
        }

        // Stamp distinct activity times; ids[1] becomes least recent
        let base = Utc::now();
        for (i, id) in ids.iter().enumerate() {
            let mut s = h.service.repo.find_by_id(*id).unwrap().unwrap();
            s.last_activity = base
                + Duration::minutes(if i == 1 { 1 } else { 10 + i as i64 });
            h.service.repo.update(s).unwrap();
        }

        let newest = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        // Exactly the least-recently-active session was evicted
        let evicted = h.service.repo.find_by_id(ids[1]).unwrap().unwrap();
        assert!(!evicted.is_active);
        for (i, id) in ids.iter().enumerate() {
            if i != 1 {
                assert!(h.service.repo.find_by_id(*id).unwrap().unwrap().is_active);
            }
        }

        // Cap holds: exactly `cap` live sessions
        let now = Utc::now();
        let live = h
            .service
            .repo
            .find_by_user_id(h.user)
            .unwrap()
            .iter()
            .filter(|s| s.is_live(now))
            .count();
        assert_eq!(live, cap);
        assert!(newest.flags.concurrent_sessions);
    }

    #[tokio::test]
    async fn test_new_device_raises_flag_and_score() {
        let h = harness();
        h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let same_device = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        let new_device = h.service.create_session(h.user, &phone(IP_CA)).await.unwrap();

        assert!(!same_device.flags.device_change);
        assert!(new_device.flags.device_change);
        assert!(
            risk_score(&new_device.flags, &h.service.policy)
                > risk_score(&same_device.flags, &h.service.policy)
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_session_is_invalid() {
        let h = harness();
        let validation = h
            .service
            .validate_session(Uuid::new_v4(), &laptop(IP_CA))
            .await
            .unwrap();
        assert!(!validation.valid);
        assert!(validation.requires_reauth);
    }

    #[tokio::test]
    async fn test_validate_expired_session_is_invalid() {
        let h = harness();
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let mut stale = session.clone();
        stale.expires_at = Utc::now() - Duration::minutes(1);
        h.service.repo.update(stale).unwrap();

        let validation = h
            .service
            .validate_session(session.id, &laptop(IP_CA))
            .await
            .unwrap();
        assert!(!validation.valid);
        assert!(validation.requires_reauth);
    }

    #[tokio::test]
    async fn test_validate_quiet_request_carries_no_risk() {
        let h = harness();
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let validation = h
            .service
            .validate_session(session.id, &laptop(IP_CA))
            .await
            .unwrap();
        assert!(validation.valid);
        assert!(!validation.requires_reauth);
        assert_eq!(validation.risk_score, 0);
    }

    #[tokio::test]
    async fn test_hijack_shape_requires_reauth() {
        let h = harness();
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        // Different device from a different country: device_change +
        // location_change (+ composite) crosses the reauth threshold
        let validation = h
            .service
            .validate_session(session.id, &phone(IP_DE))
            .await
            .unwrap();
        assert!(validation.valid);
        assert!(validation.flags.device_change);
        assert!(validation.flags.location_change);
        assert!(validation.flags.suspicious_activity);
        assert!(validation.requires_reauth);

        let events = h.events.find_by_user_id(h.user).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == SecurityEventType::ReauthRequired));
        assert!(events
            .iter()
            .any(|e| e.event_type == SecurityEventType::SuspiciousActivity));
    }

    #[tokio::test]
    async fn test_same_country_region_rotation_is_not_location_change() {
        let h = harness();
        // History spans CA only; an NY login is a change, but another CA
        // address is not, even though the raw IP differs
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let rotated = h
            .service
            .validate_session(session.id, &laptop(IP_CA))
            .await
            .unwrap();
        assert!(!rotated.flags.location_change);

        let moved = h
            .service
            .validate_session(session.id, &laptop(IP_NY))
            .await
            .unwrap();
        assert!(moved.flags.location_change);
    }

    #[tokio::test]
    async fn test_unknown_location_degrades_to_neutral() {
        let h = harness_with(test_policy(), UnknownLocationResolver);
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        assert_eq!(session.location, None);

        let validation = h
            .service
            .validate_session(session.id, &laptop(IP_DE))
            .await
            .unwrap();
        assert!(validation.valid);
        assert!(!validation.flags.location_change);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_location_lookup_times_out() {
        struct SlowResolver;
        impl LocationResolver for SlowResolver {
            fn resolve(
                &self,
                _ip: IpAddr,
            ) -> impl std::future::Future<Output = Option<GeoLocation>> + Send {
                async {
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                    Some(GeoLocation::new("US", "CA"))
                }
            }
        }

        let h = harness_with(test_policy(), SlowResolver);
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        // Session creation was not blocked; the signal degraded instead
        assert!(session.is_active);
        assert_eq!(session.location, None);
    }

    #[tokio::test]
    async fn test_flags_are_sticky_across_requests() {
        let h = harness();
        let session = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let anomalous = h
            .service
            .validate_session(session.id, &phone(IP_CA))
            .await
            .unwrap();
        assert!(anomalous.flags.device_change);
        h.service
            .update_session_activity(session.id, &anomalous.flags)
            .unwrap();

        // Back on the original device: the recorded anomaly persists
        let calm = h
            .service
            .validate_session(session.id, &laptop(IP_CA))
            .await
            .unwrap();
        assert!(calm.flags.device_change);
    }

    #[tokio::test]
    async fn test_invalidate_and_revoke_all() {
        let h = harness();
        let first = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        let second = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        h.service.invalidate_session(first.id).unwrap();
        let validation = h
            .service
            .validate_session(first.id, &laptop(IP_CA))
            .await
            .unwrap();
        assert!(!validation.valid);

        // Revoking twice is a no-op, not an error
        h.service.invalidate_session(first.id).unwrap();

        let revoked = h.service.invalidate_all_user_sessions(h.user).unwrap();
        assert_eq!(revoked, 1);
        assert!(!h
            .service
            .validate_session(second.id, &laptop(IP_CA))
            .await
            .unwrap()
            .valid);
    }

    #[tokio::test]
    async fn test_cleanup_expired_is_idempotent() {
        let h = harness();
        let keep = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        let expire = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();

        let mut stale = expire.clone();
        stale.expires_at = Utc::now() - Duration::minutes(5);
        h.service.repo.update(stale).unwrap();

        assert_eq!(h.service.cleanup_expired_sessions().unwrap(), 1);
        assert_eq!(h.service.cleanup_expired_sessions().unwrap(), 0);

        assert!(h.service.repo.find_by_id(keep.id).unwrap().unwrap().is_active);
        assert!(!h.service.repo.find_by_id(expire.id).unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_session_analytics() {
        let h = harness();
        let s1 = h.service.create_session(h.user, &laptop(IP_CA)).await.unwrap();
        h.service.create_session(h.user, &phone(IP_DE)).await.unwrap();
        h.service.invalidate_session(s1.id).unwrap();

        let analytics = h.service.session_analytics(h.user).unwrap();
        assert_eq!(analytics.total_sessions, 2);
        assert_eq!(analytics.active_sessions, 1);
        assert_eq!(analytics.distinct_devices, 2);
        assert_eq!(analytics.distinct_locations, 2);
        // The second login was a new device in a new region
        assert_eq!(analytics.flag_counts.device_change, 1);
        assert_eq!(analytics.flag_counts.location_change, 1);
    }
}
