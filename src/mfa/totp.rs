//! # TOTP (RFC 6238)
//!
//! Time-based one-time passwords over base32 shared secrets. Verification
//! reports the matched time step so the service layer can reject replays
//! of an already-consumed step.

use std::time::{SystemTime, UNIX_EPOCH};

use subtle::ConstantTimeEq;

use crate::errors::{SecurityError, SecurityResult};

// ==================
// TOTP Configuration
// ==================

/// TOTP configuration
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer name (shown in authenticator apps)
    pub issuer: String,
    /// Number of digits (default: 6)
    pub digits: u32,
    /// Time step in seconds (default: 30)
    pub period: u64,
    /// Algorithm (default: SHA1 for authenticator-app compatibility)
    pub algorithm: TotpAlgorithm,
    /// Steps of clock drift tolerated on each side of "now"
    pub skew: u64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Hirelight".to_string(),
            digits: 6,
            period: 30,
            algorithm: TotpAlgorithm::Sha1,
            skew: 2,
        }
    }
}

/// TOTP hash algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl TotpAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            TotpAlgorithm::Sha1 => "SHA1",
            TotpAlgorithm::Sha256 => "SHA256",
            TotpAlgorithm::Sha512 => "SHA512",
        }
    }
}

// ==================
// Secrets
// ==================

/// Generate a random shared secret (20 bytes, base32)
pub fn generate_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 20] = rand::thread_rng().gen();
    base32_encode(&bytes)
}

/// Base32 encoding (RFC 4648, no padding)
fn base32_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = String::new();
    let mut buffer: u64 = 0;
    let mut bits_left = 0;

    for &byte in data {
        buffer = (buffer << 8) | (byte as u64);
        bits_left += 8;

        while bits_left >= 5 {
            bits_left -= 5;
            let index = ((buffer >> bits_left) & 0x1F) as usize;
            result.push(ALPHABET[index] as char);
        }
    }

    if bits_left > 0 {
        let index = ((buffer << (5 - bits_left)) & 0x1F) as usize;
        result.push(ALPHABET[index] as char);
    }

    result
}

/// Base32 decoding
fn base32_decode(encoded: &str) -> Option<Vec<u8>> {
    const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    let mut result = Vec::new();
    let mut buffer: u64 = 0;
    let mut bits_left = 0;

    for c in encoded.chars() {
        let c = c.to_ascii_uppercase();
        if c == '=' {
            continue;
        }
        let value = ALPHABET.find(c)? as u64;
        buffer = (buffer << 5) | value;
        bits_left += 5;

        if bits_left >= 8 {
            bits_left -= 8;
            result.push((buffer >> bits_left) as u8);
        }
    }

    Some(result)
}

// ==================
// Code Generation / Verification
// ==================

/// Current unix time in seconds
pub fn unix_now() -> SecurityResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| SecurityError::Internal("system clock before unix epoch".to_string()))
}

/// Generate the TOTP code for a given timestamp
pub fn generate_totp(secret: &str, timestamp: u64, config: &TotpConfig) -> SecurityResult<String> {
    generate_at_step(secret, timestamp / config.period, config)
}

/// Generate the TOTP code for a specific time step
fn generate_at_step(secret: &str, step: u64, config: &TotpConfig) -> SecurityResult<String> {
    let secret_bytes = base32_decode(secret)
        .ok_or_else(|| SecurityError::validation("secret is not valid base32"))?;

    let counter_bytes = step.to_be_bytes();
    let hash = compute_hmac(&secret_bytes, &counter_bytes, config.algorithm);

    // Dynamic truncation (RFC 4226 §5.3)
    let offset = (hash[hash.len() - 1] & 0x0F) as usize;
    let binary = ((hash[offset] & 0x7F) as u32) << 24
        | (hash[offset + 1] as u32) << 16
        | (hash[offset + 2] as u32) << 8
        | (hash[offset + 3] as u32);

    let otp = binary % 10u32.pow(config.digits);
    Ok(format!("{:0>width$}", otp, width = config.digits as usize))
}

fn compute_hmac(key: &[u8], data: &[u8], algorithm: TotpAlgorithm) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha1::Sha1;
    use sha2::{Sha256, Sha512};

    match algorithm {
        TotpAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).expect("HMAC accepts any key size");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        TotpAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key size");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        TotpAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key size");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Find the time step within the tolerance window whose code matches.
///
/// Checks `skew` steps on each side of the current one. Returns the
/// matched step so callers can track single-use-per-step, or `None` when
/// nothing in the window matches.
pub fn matching_step(
    secret: &str,
    code: &str,
    timestamp: u64,
    config: &TotpConfig,
) -> SecurityResult<Option<u64>> {
    let current = timestamp / config.period;
    let first = current.saturating_sub(config.skew);

    for step in first..=current + config.skew {
        let candidate = generate_at_step(secret, step, config)?;
        if candidate.len() == code.len()
            && bool::from(candidate.as_bytes().ct_eq(code.as_bytes()))
        {
            return Ok(Some(step));
        }
    }

    Ok(None)
}

/// Generate the otpauth:// provisioning URI consumed by authenticator apps.
/// The QR code shown at setup is a rendering of this URI.
pub fn provisioning_uri(secret: &str, account: &str, config: &TotpConfig) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
        urlencoding::encode(&config.issuer),
        urlencoding::encode(account),
        secret,
        urlencoding::encode(&config.issuer),
        config.algorithm.as_str(),
        config.digits,
        config.period
    )
}

// ==================
// Tests
// ==================
