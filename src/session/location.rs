//! # Coarse IP Geolocation
//!
//! Best-effort location resolution for risk signals. Lookup failure or
//! timeout degrades to "unknown location" — it never blocks a login.
//! Comparison is at country/region granularity, never raw IP equality,
//! so ISP address rotation inside a region does not raise flags.

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Coarse location attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code
    pub country: String,
    /// Subdivision (state/province)
    pub region: String,
    pub city: Option<String>,
}

impl GeoLocation {
    pub fn new(country: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            region: region.into(),
            city: None,
        }
    }

    /// Whether two locations fall in the same coarse region. This is the
    /// comparison the location-change flag uses.
    pub fn same_region(&self, other: &GeoLocation) -> bool {
        self.country == other.country && self.region == other.region
    }
}

/// External location lookup collaborator.
///
/// Implementations are expected to be slow and unreliable; the session
/// engine wraps calls in a timeout and treats `None` as "unknown".
pub trait LocationResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> impl Future<Output = Option<GeoLocation>> + Send;
}

/// Resolver that knows nothing. The degraded default: every session gets
/// an unknown location and location-based flags stay neutral.
#[derive(Debug, Clone, Default)]
pub struct UnknownLocationResolver;

impl LocationResolver for UnknownLocationResolver {
    fn resolve(&self, _ip: IpAddr) -> impl Future<Output = Option<GeoLocation>> + Send {
        std::future::ready(None)
    }
}

/// Table-backed resolver for tests and fixtures
#[derive(Debug, Clone, Default)]
pub struct StaticLocationResolver {
    table: HashMap<IpAddr, GeoLocation>,
}

impl StaticLocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: IpAddr, location: GeoLocation) -> Self {
        self.table.insert(ip, location);
        self
    }
}

impl LocationResolver for StaticLocationResolver {
    fn resolve(&self, ip: IpAddr) -> impl Future<Output = Option<GeoLocation>> + Send {
        std::future::ready(self.table.get(&ip).cloned())
    }
}
