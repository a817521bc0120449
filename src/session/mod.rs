//! # Session Security
//!
//! Device fingerprinting, coarse geolocation, anomaly flags, and the risk
//! engine that decides when a session must re-authenticate.

pub mod fingerprint;
pub mod location;
pub mod risk;
pub mod service;

pub use fingerprint::{device_fingerprint, RequestContext};
pub use location::{GeoLocation, LocationResolver, StaticLocationResolver, UnknownLocationResolver};
pub use risk::{is_unusual_hour, risk_score, SecurityFlags};
pub use service::{
    EnhancedSession, FlagCounts, InMemorySessionRepository, SessionAnalytics,
    SessionRepository, SessionService, SessionValidation,
};
