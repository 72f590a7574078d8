//! Middleware for the e-signature service.
//!
//! Cross-cutting concerns applied across routes: internal service
//! authentication and per-IP rate limiting.

pub mod auth;
pub mod rate_limit;

pub use auth::InternalAuth;
pub use rate_limit::{RateLimitConfig, RateLimiter, general_limiter, pin_limiter, signing_limiter};
