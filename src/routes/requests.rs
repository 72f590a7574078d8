//! Signature request workflow HTTP endpoints.
//!
//! Mounted under `/esign`. These are the endpoints the main app proxies
//! for end users: creating requests, signing, cancelling, and starting
//! signing sessions.

use actix_web::{HttpResponse, ResponseError, web};
use serde::Deserialize;
use uuid::Uuid;

use crate::esign::types::{
    CancelRequestInput, CreateRequestInput, RequestStatus, SignRequestInput, StartSessionRequest,
    UserId,
};
use crate::esign::{RequestWorkflow, SessionMonitor};

/// Query for the creator listing.
#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub creator_id: UserId,
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

/// POST /esign/requests
///
/// Create a signature request with its signer list.
#[tracing::instrument(skip(workflow, request), fields(document_id = %request.document_id, creator_id = %request.creator_id))]
pub async fn create_request(
    workflow: web::Data<RequestWorkflow>,
    request: web::Json<CreateRequestInput>,
) -> HttpResponse {
    match workflow.create_request(request.into_inner()) {
        Ok(detail) => HttpResponse::Created().json(detail),
        Err(e) => {
            tracing::error!(error = %e, "Request creation failed");
            e.error_response()
        }
    }
}

/// GET /esign/requests/{id}
///
/// A request with its signers.
#[tracing::instrument(skip(workflow))]
pub async fn get_request(
    workflow: web::Data<RequestWorkflow>,
    request_id: web::Path<Uuid>,
) -> HttpResponse {
    match workflow.get_detail(&request_id) {
        Ok(detail) => HttpResponse::Ok().json(detail),
        Err(e) => {
            tracing::error!(error = %e, "Request lookup failed");
            e.error_response()
        }
    }
}

/// GET /esign/requests?creator_id=&status=
///
/// Requests created by one user, optionally filtered by status.
#[tracing::instrument(skip(workflow), fields(creator_id = %query.creator_id))]
pub async fn list_requests(
    workflow: web::Data<RequestWorkflow>,
    query: web::Query<ListRequestsQuery>,
) -> HttpResponse {
    match workflow.list_by_creator(&query.creator_id, query.status) {
        Ok(requests) => HttpResponse::Ok().json(requests),
        Err(e) => {
            tracing::error!(error = %e, "Request listing failed");
            e.error_response()
        }
    }
}

/// POST /esign/requests/{id}/sign
///
/// Full signing flow: PIN check, signature production, atomic
/// completion check, advisory session evaluation.
#[tracing::instrument(skip(workflow, request), fields(request_id = %request_id, user_id = %request.user_id))]
pub async fn sign_request(
    workflow: web::Data<RequestWorkflow>,
    request_id: web::Path<Uuid>,
    request: web::Json<SignRequestInput>,
) -> HttpResponse {
    match workflow.sign(&request_id, request.into_inner()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Signing failed");
            e.error_response()
        }
    }
}

/// POST /esign/requests/{id}/cancel
///
/// Cancel a request. Creator only.
#[tracing::instrument(skip(workflow, request), fields(request_id = %request_id, actor_id = %request.actor_id))]
pub async fn cancel_request(
    workflow: web::Data<RequestWorkflow>,
    request_id: web::Path<Uuid>,
    request: web::Json<CancelRequestInput>,
) -> HttpResponse {
    match workflow.cancel(&request_id, request.into_inner()) {
        Ok(request) => HttpResponse::Ok().json(request),
        Err(e) => {
            tracing::error!(error = %e, "Cancellation failed");
            e.error_response()
        }
    }
}

/// POST /esign/sessions
///
/// Start a signing session for fraud evaluation at sign time.
#[tracing::instrument(skip(monitor, request), fields(signer_id = %request.signer_id))]
pub async fn start_session(
    monitor: web::Data<SessionMonitor>,
    request: web::Json<StartSessionRequest>,
) -> HttpResponse {
    match monitor.start_session(request.into_inner()) {
        Ok(response) => HttpResponse::Created().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Session start failed");
            e.error_response()
        }
    }
}

/// Configure workflow routes. Callers mount these under `/esign`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/requests", web::post().to(create_request))
        .route("/requests", web::get().to(list_requests))
        .route("/requests/{id}", web::get().to(get_request))
        .route("/requests/{id}/sign", web::post().to(sign_request))
        .route("/requests/{id}/cancel", web::post().to(cancel_request))
        .route("/sessions", web::post().to(start_session));
}
