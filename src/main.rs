//! E-Signature Service
//!
//! HTTP front end for the document signing subsystem: PIN-gated signing
//! keys, multi-party signature requests, signing session fraud checks,
//! reminder escalation, and completion certificates.
//!
//! ## Security
//!
//! - Authenticates callers via `INTERNAL_SERVICE_TOKEN` (health probes exempt)
//! - Tight per-IP rate limits on PIN-bearing endpoints
//! - Every state change appends to the hash-chained audit log

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use esign_service::{
    audit::{AuditActor, AuditEventType, AuditLogger, AuditOutcome},
    config::Settings,
    esign::{
        CertificateBuilder, DocumentRegistry, IdentityManager, ReminderTracker, RequestWorkflow,
        SessionMonitor,
    },
    middleware::{InternalAuth, RateLimitConfig, general_limiter, pin_limiter, signing_limiter},
    routes,
    storage::{BlobStore, Storage},
    telemetry,
};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing first
    telemetry::init_tracing();

    // Load and validate settings
    let settings = Settings::from_env();

    if let Err(message) = settings.validate() {
        tracing::error!("{message}");
        std::process::exit(1);
    }

    // Initialize storage
    let storage = match Storage::open(settings.db_path()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open storage database");
            std::process::exit(1);
        }
    };

    let blobs = match BlobStore::new(settings.blob_root()) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open blob store");
            std::process::exit(1);
        }
    };

    let audit = match AuditLogger::new(storage.clone()) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize audit log");
            std::process::exit(1);
        }
    };

    // Assemble services around the shared storage handles
    let identity = IdentityManager::new(
        storage.clone(),
        blobs.clone(),
        audit.clone(),
        settings.key_retention(),
    );
    let monitor = SessionMonitor::new(
        storage.clone(),
        audit.clone(),
        settings.fast_sign_threshold_secs(),
    );
    let workflow = RequestWorkflow::new(
        storage.clone(),
        identity.clone(),
        monitor.clone(),
        audit.clone(),
        settings.enforce_signing_order(),
        settings.default_expiry_days(),
    );
    let registry = DocumentRegistry::new(storage.clone(), blobs.clone(), audit.clone());
    let reminders = ReminderTracker::new(storage.clone(), audit.clone());
    let certificates = CertificateBuilder::new(storage, blobs, audit.clone());

    let addr = settings.socket_addr();

    // Load rate limit configuration from environment
    let rate_config = RateLimitConfig::from_env();
    tracing::info!(
        pin_attempts_per_hour = rate_config.pin_attempts_per_hour,
        signing_per_hour = rate_config.signing_per_hour,
        "Rate limiting enabled"
    );

    tracing::info!(
        addr = %addr,
        key_retention = %settings.key_retention(),
        order_enforced = settings.enforce_signing_order(),
        "Starting e-signature service"
    );

    if let Err(e) = audit.append(
        AuditEventType::ServiceStart,
        AuditActor::System,
        None,
        None,
        AuditOutcome::Success,
        None,
    ) {
        tracing::warn!(error = %e, "Failed to record service start in audit log");
    }

    // Clone shared state for app_data
    let identity_data = web::Data::new(identity);
    let workflow_data = web::Data::new(workflow);
    let monitor_data = web::Data::new(monitor);
    let registry_data = web::Data::new(registry);
    let reminders_data = web::Data::new(reminders);
    let certificates_data = web::Data::new(certificates);

    let app_settings = settings.clone();

    HttpServer::new(move || {
        App::new()
            // Internal token check (health endpoints exempt)
            .wrap(InternalAuth::new(&app_settings))
            // Rate limiting baseline
            .wrap(general_limiter())
            // Request tracing
            .wrap(TracingLogger::default())
            // Default headers
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "esign-service"))
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("Cache-Control", "no-store")),
            )
            // JSON body cap
            .app_data(web::JsonConfig::default().limit(app_settings.body_limit_bytes()))
            // Shared state
            .app_data(identity_data.clone())
            .app_data(workflow_data.clone())
            .app_data(monitor_data.clone())
            .app_data(registry_data.clone())
            .app_data(reminders_data.clone())
            .app_data(certificates_data.clone())
            // Routes
            .configure(routes::health::configure)
            .service(
                web::scope("/signature")
                    .wrap(pin_limiter(&rate_config))
                    .configure(routes::keys::configure),
            )
            .service(
                web::scope("/esign")
                    .wrap(signing_limiter(&rate_config))
                    .configure(routes::requests::configure),
            )
            .configure(routes::internal::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    if let Err(e) = audit.append(
        AuditEventType::ServiceStop,
        AuditActor::System,
        None,
        None,
        AuditOutcome::Success,
        None,
    ) {
        tracing::warn!(error = %e, "Failed to record service stop in audit log");
    }

    // Shutdown tracing
    telemetry::shutdown_tracing();

    Ok(())
}
