//! # Risk Signals
//!
//! Anomaly flags, the unusual-hours model, and the composite risk score.
//! All thresholds come from [`RiskPolicy`]; nothing here is hard-coded.

use serde::{Deserialize, Serialize};

use crate::config::RiskPolicy;

/// Per-session anomaly flags. Sticky: once raised on a session they stay
/// raised for audit purposes until the session is invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityFlags {
    pub suspicious_activity: bool,
    pub location_change: bool,
    pub device_change: bool,
    pub concurrent_sessions: bool,
    pub unusual_hours: bool,
}

impl SecurityFlags {
    /// OR another flag set into this one (sticky merge)
    pub fn merge(&mut self, other: &SecurityFlags) {
        self.suspicious_activity |= other.suspicious_activity;
        self.location_change |= other.location_change;
        self.device_change |= other.device_change;
        self.concurrent_sessions |= other.concurrent_sessions;
        self.unusual_hours |= other.unusual_hours;
    }

    /// Number of raised flags, excluding the composite
    pub fn anomaly_count(&self) -> usize {
        [
            self.location_change,
            self.device_change,
            self.concurrent_sessions,
            self.unusual_hours,
        ]
        .iter()
        .filter(|&&raised| raised)
        .count()
    }

    pub fn any(&self) -> bool {
        self.suspicious_activity || self.anomaly_count() > 0
    }
}

/// Compute the 0-100 risk score for a flag set.
///
/// The score is the clamped sum of the weights of raised flags, so
/// raising any additional flag never lowers it.
pub fn risk_score(flags: &SecurityFlags, policy: &RiskPolicy) -> u8 {
    let mut score: u32 = 0;
    if flags.device_change {
        score += policy.weight_device_change as u32;
    }
    if flags.location_change {
        score += policy.weight_location_change as u32;
    }
    if flags.unusual_hours {
        score += policy.weight_unusual_hours as u32;
    }
    if flags.concurrent_sessions {
        score += policy.weight_concurrent_sessions as u32;
    }
    if flags.suspicious_activity {
        score += policy.weight_suspicious_activity as u32;
    }
    score.min(100) as u8
}

/// Whether an hour-of-day is unusual for a user.
///
/// With enough history, an hour is unusual when fewer than
/// `unusual_hour_min_fraction` of the user's recorded session hours fall
/// within `unusual_hour_window` hours (circularly) of it. With thin
/// history the policy quiet window is the fallback.
pub fn is_unusual_hour(hour: u32, history_hours: &[u32], policy: &RiskPolicy) -> bool {
    if history_hours.len() < policy.min_history_samples {
        return in_quiet_window(hour, policy);
    }

    let near = history_hours
        .iter()
        .filter(|&&h| circular_hour_distance(hour, h) <= policy.unusual_hour_window)
        .count();
    (near as f64) < policy.unusual_hour_min_fraction * history_hours.len() as f64
}

/// Distance between two hours on the 24h clock (23 and 1 are 2 apart)
fn circular_hour_distance(a: u32, b: u32) -> u32 {
    let d = a.abs_diff(b) % 24;
    d.min(24 - d)
}

fn in_quiet_window(hour: u32, policy: &RiskPolicy) -> bool {
    let (start, end) = (policy.quiet_hours_start, policy.quiet_hours_end);
    if start <= end {
        hour >= start && hour < end
    } else {
        // Window wraps midnight
        hour >= start || hour < end
    }
}
