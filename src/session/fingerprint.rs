//! # Device Fingerprinting
//!
//! A stable identifier for "the same device" derived from request
//! metadata, so sessions can be compared without storing raw headers.

use std::collections::BTreeMap;
use std::net::IpAddr;

use sha2::{Digest, Sha256};

/// Headers that feed the fingerprint, in hash order. User-agent is always
/// included; anything not listed here is ignored.
pub const FINGERPRINT_HEADERS: &[&str] = &[
    "accept-language",
    "accept-encoding",
    "sec-ch-ua",
    "sec-ch-ua-platform",
];

/// Hex length of a fingerprint
pub const FINGERPRINT_LEN: usize = 32;

/// Request metadata the session engine sees. The routing layer builds one
/// of these per request; header names are normalized to lowercase.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip_address: IpAddr,
    pub user_agent: String,
    pub headers: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address,
            user_agent: user_agent.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }
}

/// Compute the device fingerprint for a request.
///
/// Stable: the same user-agent and header values always produce the same
/// fingerprint. Absent headers hash as empty, so a missing header is not
/// an error, just a weaker signal.
pub fn device_fingerprint(ctx: &RequestContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ctx.user_agent.as_bytes());
    for name in FINGERPRINT_HEADERS {
        hasher.update(b"\n");
        if let Some(value) = ctx.headers.get(*name) {
            hasher.update(value.as_bytes());
        }
    }
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}
