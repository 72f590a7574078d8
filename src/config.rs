//! Service configuration derived from environment variables.
//!
//! Configuration is loaded once at startup and validated before the service starts.
//!
//! ## Environment Variables
//!
//! - `ESIGN_PORT`: HTTP port (default: 5004)
//! - `ESIGN_HOST`: Bind address (default: :: for dual-stack IPv4/IPv6)
//! - `ESIGN_DB_PATH`: Path to ReDB database file
//! - `ESIGN_BLOB_ROOT`: Root directory for document/certificate blobs
//! - `INTERNAL_SERVICE_TOKEN`: Shared secret for main-app/scheduler authentication
//! - `ESIGN_KEY_RETENTION`: "retain" or "purge" - MAC key fate on revocation
//! - `ESIGN_ENFORCE_SIGNING_ORDER`: gate signer N+1 until signer N has signed
//! - `ESIGN_DEFAULT_EXPIRY_DAYS`: request TTL when the creator gives none
//! - `ESIGN_FAST_SIGN_THRESHOLD_SECS`: fraud heuristic for too-fast signing
//! - `RUST_LOG`: Log level filter

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 5004;
const DEFAULT_BODY_LIMIT_MB: usize = 32;
const DEFAULT_EXPIRY_DAYS: i64 = 7;
const DEFAULT_FAST_SIGN_THRESHOLD_SECS: i64 = 10;

/// Helper to get trimmed env var or empty string.
fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Helper to get lowercase env var.
fn env_lower(name: &str) -> String {
    env_trim(name).to_lowercase()
}

/// Check if a string value is truthy.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "yes")
}

/// What happens to a signing key's MAC secret when the key is revoked.
///
/// Historical signatures stay verifiable only under `Retain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyRetention {
    /// Keep revoked MAC keys so historically-signed documents verify.
    #[default]
    Retain,
    /// Zeroize the MAC key at revocation time.
    Purge,
}

impl FromStr for KeyRetention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "purge" => Ok(Self::Purge),
            other => Err(format!(
                "Invalid key retention '{other}'. Must be 'retain' or 'purge'."
            )),
        }
    }
}

impl std::fmt::Display for KeyRetention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retain => write!(f, "retain"),
            Self::Purge => write!(f, "purge"),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    port: u16,
    host: IpAddr,
    db_path: PathBuf,
    blob_root: PathBuf,
    internal_token: Option<String>,
    internal_token_required: bool,
    body_limit_bytes: usize,
    key_retention: KeyRetention,
    enforce_signing_order: bool,
    default_expiry_days: i64,
    fast_sign_threshold_secs: i64,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        let port = env_trim("ESIGN_PORT").parse::<u16>().unwrap_or(DEFAULT_PORT);

        // Default to IPv6 unspecified (::) for dual-stack support.
        // On Linux, this accepts both IPv4 and IPv6 connections.
        let host = env_trim("ESIGN_HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let db_path = env_trim("ESIGN_DB_PATH")
            .parse::<PathBuf>()
            .unwrap_or_else(|_| PathBuf::from("./.data/esign.redb"));

        let blob_root = env_trim("ESIGN_BLOB_ROOT")
            .parse::<PathBuf>()
            .unwrap_or_else(|_| PathBuf::from("./.data/blobs"));

        let internal_token = env_trim("INTERNAL_SERVICE_TOKEN");
        let internal_token = if internal_token.is_empty() {
            None
        } else {
            Some(internal_token)
        };

        // Determine if token is required based on environment
        let app_env = env_lower("APP_ENV");
        let rust_env = env_lower("RUST_ENV");
        let is_production =
            matches!(app_env.as_str(), "production") || matches!(rust_env.as_str(), "production");
        let internal_token_required =
            is_production || is_truthy(&env_lower("INTERNAL_SERVICE_TOKEN_REQUIRED"));

        let body_limit_mb = env_trim("ESIGN_BODY_LIMIT_MB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_MB);
        let body_limit_bytes = body_limit_mb.saturating_mul(1024 * 1024);

        let key_retention = env_trim("ESIGN_KEY_RETENTION")
            .parse::<KeyRetention>()
            .unwrap_or_default();

        let enforce_signing_order = is_truthy(&env_lower("ESIGN_ENFORCE_SIGNING_ORDER"));

        let default_expiry_days = env_trim("ESIGN_DEFAULT_EXPIRY_DAYS")
            .parse::<i64>()
            .unwrap_or(DEFAULT_EXPIRY_DAYS);

        let fast_sign_threshold_secs = env_trim("ESIGN_FAST_SIGN_THRESHOLD_SECS")
            .parse::<i64>()
            .unwrap_or(DEFAULT_FAST_SIGN_THRESHOLD_SECS);

        Self {
            port,
            host,
            db_path,
            blob_root,
            internal_token,
            internal_token_required,
            body_limit_bytes,
            key_retention,
            enforce_signing_order,
            default_expiry_days,
            fast_sign_threshold_secs,
        }
    }

    /// Create settings for tests.
    pub fn for_tests() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            db_path: PathBuf::from("./.data/test-esign.redb"),
            blob_root: PathBuf::from("./.data/test-blobs"),
            internal_token: None,
            internal_token_required: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_MB * 1024 * 1024,
            key_retention: KeyRetention::Retain,
            enforce_signing_order: false,
            default_expiry_days: DEFAULT_EXPIRY_DAYS,
            fast_sign_threshold_secs: DEFAULT_FAST_SIGN_THRESHOLD_SECS,
        }
    }

    /// Validate settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.internal_token_required && self.internal_token.is_none() {
            return Err("INTERNAL_SERVICE_TOKEN is required in production. \
                 Set INTERNAL_SERVICE_TOKEN or INTERNAL_SERVICE_TOKEN_REQUIRED=0."
                .to_string());
        }

        if self.default_expiry_days < 1 {
            return Err("ESIGN_DEFAULT_EXPIRY_DAYS must be at least 1.".to_string());
        }

        if self.fast_sign_threshold_secs < 1 {
            return Err("ESIGN_FAST_SIGN_THRESHOLD_SECS must be at least 1.".to_string());
        }

        Ok(())
    }

    // Getters

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn blob_root(&self) -> &PathBuf {
        &self.blob_root
    }

    pub fn internal_token(&self) -> Option<&str> {
        self.internal_token.as_deref()
    }

    pub fn internal_token_required(&self) -> bool {
        self.internal_token_required
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn key_retention(&self) -> KeyRetention {
        self.key_retention
    }

    pub fn enforce_signing_order(&self) -> bool {
        self.enforce_signing_order
    }

    pub fn default_expiry_days(&self) -> i64 {
        self.default_expiry_days
    }

    pub fn fast_sign_threshold_secs(&self) -> i64 {
        self.fast_sign_threshold_secs
    }
}
