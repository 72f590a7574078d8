//! Rate limiting middleware.
//!
//! PIN-bearing endpoints (register, verify-pin, rotate-pin, sign) are
//! the brute-force surface of this service: a 4-digit PIN survives only
//! as long as guessing is slow. Those endpoints get a strict per-IP
//! limit; everything else shares a general baseline.
//!
//! Uses actix-governor with the built-in PeerIpKeyExtractor.

use actix_governor::{Governor, GovernorConfigBuilder, PeerIpKeyExtractor};

/// Per-IP rate limits, tightest on PIN-bearing endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum PIN attempts per hour per IP (register, verify, rotate).
    pub pin_attempts_per_hour: u32,
    /// Maximum sign operations per hour per IP.
    pub signing_per_hour: u32,
    /// Burst size for PIN endpoints.
    pub pin_burst: u32,
    /// Burst size for sign operations.
    pub signing_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            pin_attempts_per_hour: 30,
            signing_per_hour: 60,
            pin_burst: 5,
            signing_burst: 10,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pin_attempts_per_hour: std::env::var("RATE_LIMIT_PIN_PER_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pin_attempts_per_hour),
            signing_per_hour: std::env::var("RATE_LIMIT_SIGNING_PER_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.signing_per_hour),
            pin_burst: std::env::var("RATE_LIMIT_PIN_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pin_burst),
            signing_burst: std::env::var("RATE_LIMIT_SIGNING_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.signing_burst),
        }
    }
}

/// Type alias for the Governor middleware with default settings.
pub type RateLimiter = Governor<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware>;

fn per_hour_limiter(per_hour: u32, burst: u32, fallback_seconds: u64) -> RateLimiter {
    let seconds_per_request = if per_hour > 0 {
        3600 / u64::from(per_hour)
    } else {
        fallback_seconds
    };

    let governor_config = GovernorConfigBuilder::default()
        .seconds_per_request(seconds_per_request.max(1))
        .burst_size(burst)
        .finish()
        .expect("Failed to build rate limiter");

    Governor::new(&governor_config)
}

/// Rate limiter for PIN-bearing identity endpoints.
pub fn pin_limiter(config: &RateLimitConfig) -> RateLimiter {
    per_hour_limiter(config.pin_attempts_per_hour, config.pin_burst, 3600)
}

/// Rate limiter for sign operations.
pub fn signing_limiter(config: &RateLimitConfig) -> RateLimiter {
    per_hour_limiter(config.signing_per_hour, config.signing_burst, 120)
}

/// General baseline limiter for all endpoints.
///
/// ~1 request per second sustained, with bursts up to 50.
pub fn general_limiter() -> RateLimiter {
    let governor_config = GovernorConfigBuilder::default()
        .seconds_per_request(1)
        .burst_size(50)
        .finish()
        .expect("Failed to build general rate limiter");

    Governor::new(&governor_config)
}
