//! Internal service endpoints.
//!
//! Called by the main app's document flows and by the scheduler, never
//! proxied to end users: document registry, dispatch/expiry hooks,
//! reminder bookkeeping, fraud reporting, and certificates.

use actix_web::{HttpResponse, ResponseError, web};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::esign::fraud::DEFAULT_SUSPICIOUS_LIMIT;
use crate::esign::reminders::DEFAULT_PENDING_DAYS;
use crate::esign::types::{BuildCertificateRequest, RecordReminderRequest, RegisterDocumentRequest};
use crate::esign::{
    CertificateBuilder, DocumentRegistry, ReminderTracker, RequestWorkflow, SessionMonitor,
};

/// Query for the pending-signers listing.
#[derive(Debug, Deserialize)]
pub struct PendingSignersQuery {
    /// Minimum request age in days; defaults to 2.
    #[serde(default)]
    pub days: Option<i64>,
}

/// Query for the suspicious-sessions listing.
#[derive(Debug, Deserialize)]
pub struct SuspiciousSessionsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// POST /internal/documents
///
/// Register a document and store its bytes.
#[tracing::instrument(skip(registry, request), fields(owner_id = %request.owner_id))]
pub async fn register_document(
    registry: web::Data<DocumentRegistry>,
    request: web::Json<RegisterDocumentRequest>,
) -> HttpResponse {
    match registry.register(request.into_inner()) {
        Ok(response) => HttpResponse::Created().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Document registration failed");
            e.error_response()
        }
    }
}

/// GET /internal/documents/{id}
#[tracing::instrument(skip(registry))]
pub async fn get_document(
    registry: web::Data<DocumentRegistry>,
    document_id: web::Path<Uuid>,
) -> HttpResponse {
    match registry.get(&document_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Document lookup failed");
            e.error_response()
        }
    }
}

/// POST /internal/documents/{id}/archive
///
/// Copy the document blob into the year-partitioned archive.
#[tracing::instrument(skip(registry))]
pub async fn archive_document(
    registry: web::Data<DocumentRegistry>,
    document_id: web::Path<Uuid>,
) -> HttpResponse {
    match registry.archive(&document_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Document archival failed");
            e.error_response()
        }
    }
}

/// POST /internal/requests/{id}/sent
///
/// Record that the dispatcher delivered the request to its recipients.
#[tracing::instrument(skip(workflow))]
pub async fn mark_request_sent(
    workflow: web::Data<RequestWorkflow>,
    request_id: web::Path<Uuid>,
) -> HttpResponse {
    match workflow.mark_sent(&request_id) {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => {
            tracing::error!(error = %e, "Mark-sent failed");
            e.error_response()
        }
    }
}

/// POST /internal/expire
///
/// Sweep every live request past its deadline.
#[tracing::instrument(skip(workflow))]
pub async fn expire_requests(workflow: web::Data<RequestWorkflow>) -> HttpResponse {
    match workflow.expire(Utc::now()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Expiry sweep failed");
            e.error_response()
        }
    }
}

/// GET /internal/requests/expiring
///
/// Preview of live requests already past their deadline.
#[tracing::instrument(skip(workflow))]
pub async fn list_expiring(workflow: web::Data<RequestWorkflow>) -> HttpResponse {
    match workflow.list_expiring(Utc::now()) {
        Ok(requests) => HttpResponse::Ok().json(requests),
        Err(e) => {
            tracing::error!(error = %e, "Expiring listing failed");
            e.error_response()
        }
    }
}

/// GET /internal/pending-signers?days=
///
/// Signers the reminder dispatcher should nudge.
#[tracing::instrument(skip(reminders))]
pub async fn pending_signers(
    reminders: web::Data<ReminderTracker>,
    query: web::Query<PendingSignersQuery>,
) -> HttpResponse {
    let days = query.days.unwrap_or(DEFAULT_PENDING_DAYS);
    match reminders.pending_signers(days) {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => {
            tracing::error!(error = %e, "Pending signer listing failed");
            e.error_response()
        }
    }
}

/// GET /internal/reminders/{signer_id}
///
/// Reminder escalation state for one signer.
#[tracing::instrument(skip(reminders))]
pub async fn reminder_status(
    reminders: web::Data<ReminderTracker>,
    signer_id: web::Path<Uuid>,
) -> HttpResponse {
    match reminders.status(&signer_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Reminder status lookup failed");
            e.error_response()
        }
    }
}

/// POST /internal/reminders
///
/// Record a sent reminder level.
#[tracing::instrument(skip(reminders, request), fields(signer_id = %request.signer_id, level = request.level))]
pub async fn record_reminder(
    reminders: web::Data<ReminderTracker>,
    request: web::Json<RecordReminderRequest>,
) -> HttpResponse {
    match reminders.record(request.into_inner()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Reminder recording failed");
            e.error_response()
        }
    }
}

/// GET /internal/sessions/suspicious?limit=
///
/// Sessions flagged by the fraud heuristics, newest first.
#[tracing::instrument(skip(monitor))]
pub async fn suspicious_sessions(
    monitor: web::Data<SessionMonitor>,
    query: web::Query<SuspiciousSessionsQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_SUSPICIOUS_LIMIT);
    match monitor.suspicious_sessions(limit) {
        Ok(sessions) => HttpResponse::Ok().json(sessions),
        Err(e) => {
            tracing::error!(error = %e, "Suspicious session listing failed");
            e.error_response()
        }
    }
}

/// POST /internal/certificates
///
/// Build (or rebuild) the completion certificate for a signed request.
#[tracing::instrument(skip(builder, request), fields(request_id = %request.request_id))]
pub async fn build_certificate(
    builder: web::Data<CertificateBuilder>,
    request: web::Json<BuildCertificateRequest>,
) -> HttpResponse {
    match builder.build(&request.request_id) {
        Ok(certificate) => HttpResponse::Ok().json(certificate),
        Err(e) => {
            tracing::error!(error = %e, "Certificate build failed");
            e.error_response()
        }
    }
}

/// GET /internal/certificates/{request_id}
#[tracing::instrument(skip(builder))]
pub async fn get_certificate(
    builder: web::Data<CertificateBuilder>,
    request_id: web::Path<Uuid>,
) -> HttpResponse {
    match builder.get(&request_id) {
        Ok(certificate) => HttpResponse::Ok().json(certificate),
        Err(e) => {
            tracing::error!(error = %e, "Certificate lookup failed");
            e.error_response()
        }
    }
}

/// Configure internal routes on the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/internal")
            .route("/documents", web::post().to(register_document))
            .route("/documents/{id}", web::get().to(get_document))
            .route("/documents/{id}/archive", web::post().to(archive_document))
            .route("/requests/expiring", web::get().to(list_expiring))
            .route("/requests/{id}/sent", web::post().to(mark_request_sent))
            .route("/expire", web::post().to(expire_requests))
            .route("/pending-signers", web::get().to(pending_signers))
            .route("/reminders", web::post().to(record_reminder))
            .route("/reminders/{signer_id}", web::get().to(reminder_status))
            .route("/sessions/suspicious", web::get().to(suspicious_sessions))
            .route("/certificates", web::post().to(build_certificate))
            .route("/certificates/{request_id}", web::get().to(get_certificate)),
    );
}
