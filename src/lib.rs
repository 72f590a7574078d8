// Crate-level lint configuration
// Allow noisy pedantic/cargo lints that aren't worth fixing individually
#![allow(clippy::multiple_crate_versions)] // Transitive deps, can't easily fix
#![allow(clippy::missing_errors_doc)] // Would require extensive doc changes
#![allow(clippy::missing_panics_doc)] // Would require extensive doc changes
#![allow(clippy::must_use_candidate)] // Too many false positives for internal APIs
#![allow(clippy::module_name_repetitions)] // Acceptable for clarity (e.g., EsignError in error mod)
#![allow(clippy::doc_markdown)] // Too strict about backticks in docs
#![allow(clippy::missing_const_for_fn)] // Often debatable, runtime doesn't benefit

//! E-Signature Service
//!
//! Electronic document signing for the document platform: per-user signing
//! keys gated by a PIN, multi-party signature requests with optional signing
//! order, session-based fraud heuristics, reminder escalation, and completion
//! certificates.
//!
//! ## Architecture
//!
//! A single HTTP service (port 5004) in front of an embedded redb database
//! and a filesystem blob store:
//!
//! - **/signature**: key registration, PIN verification and rotation,
//!   signature verification. PIN endpoints carry a tighter rate limit.
//!
//! - **/esign**: signature request lifecycle (create, read, sign, cancel)
//!   and signing session intake.
//!
//! - **/internal**: document registry, dispatcher and scheduler hooks
//!   (mark-sent, expiry sweep, reminders), fraud reports, certificates.
//!
//! ## Security Model
//!
//! - **PIN-gated keys**: Signing requires the holder's PIN; only a SHA-256
//!   digest of the PIN is ever stored
//! - **Per-key MAC secrets**: Each signature is an HMAC-SHA256 over the
//!   document fingerprint under a key-specific secret
//! - **Internal token**: All routes except health probes require the shared
//!   service token when one is configured
//! - **Hash-chained audit**: Every state change appends to a tamper-evident
//!   audit chain signed with the service identity key

pub mod audit;
pub mod config;
pub mod error;
pub mod esign;
pub mod middleware;
pub mod routes;
pub mod storage;

#[cfg(feature = "otel")]
pub mod telemetry;

#[cfg(not(feature = "otel"))]
pub mod telemetry {
    //! Stub telemetry module when OpenTelemetry is disabled.

    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    /// Initialize tracing with console output only.
    pub fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "esign_service=info,actix_web=info".into());
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    /// No-op shutdown when OpenTelemetry is disabled.
    pub fn shutdown_tracing() {}
}

// Re-export commonly used types
pub use config::{KeyRetention, Settings};
pub use error::{EsignError, EsignResult};
pub use esign::{
    CertificateBuilder, DocumentRegistry, IdentityManager, ReminderTracker, RequestWorkflow,
    SessionMonitor,
};
