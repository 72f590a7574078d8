//! Signing key and PIN HTTP endpoints.
//!
//! Mounted under `/signature`. PINs arrive in request bodies and are
//! never logged; instrumentation records only user and key IDs.

use actix_web::{HttpResponse, ResponseError, web};
use serde::Deserialize;

use crate::esign::IdentityManager;
use crate::esign::types::{
    RegisterKeyRequest, RotatePinRequest, UserId, VerifyPinRequest, VerifyPinResponse,
    VerifySignatureRequest,
};

/// Query for the active-key lookup.
#[derive(Debug, Deserialize)]
pub struct ActiveKeyQuery {
    pub user_id: UserId,
}

/// POST /signature/register
///
/// Register a signing key for a user, revoking any previous one.
#[tracing::instrument(skip(identity, request), fields(user_id = %request.user_id))]
pub async fn register_key(
    identity: web::Data<IdentityManager>,
    request: web::Json<RegisterKeyRequest>,
) -> HttpResponse {
    match identity.register(request.into_inner()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Key registration failed");
            e.error_response()
        }
    }
}

/// POST /signature/verify-pin
///
/// Check a PIN against the user's active key.
#[tracing::instrument(skip(identity, request), fields(user_id = %request.user_id))]
pub async fn verify_pin(
    identity: web::Data<IdentityManager>,
    request: web::Json<VerifyPinRequest>,
) -> HttpResponse {
    match identity.verify_pin(&request.user_id, &request.pin) {
        Ok(valid) => HttpResponse::Ok().json(VerifyPinResponse { valid }),
        Err(e) => {
            tracing::error!(error = %e, "PIN verification failed");
            e.error_response()
        }
    }
}

/// POST /signature/rotate-pin
///
/// Rotate the PIN on the active key. The MAC key is preserved so
/// existing signatures stay verifiable.
#[tracing::instrument(skip(identity, request), fields(user_id = %request.user_id))]
pub async fn rotate_pin(
    identity: web::Data<IdentityManager>,
    request: web::Json<RotatePinRequest>,
) -> HttpResponse {
    match identity.rotate_pin(request.into_inner()) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "PIN rotation failed");
            e.error_response()
        }
    }
}

/// GET /signature/me?user_id=
///
/// The caller's active key summary.
#[tracing::instrument(skip(identity), fields(user_id = %query.user_id))]
pub async fn active_key(
    identity: web::Data<IdentityManager>,
    query: web::Query<ActiveKeyQuery>,
) -> HttpResponse {
    match identity.active_key(&query.user_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Active key lookup failed");
            e.error_response()
        }
    }
}

/// POST /signature/verify
///
/// Verify the most recent signature a user produced over a document
/// against the currently stored bytes.
#[tracing::instrument(skip(identity, request), fields(document_id = %request.document_id, user_id = %request.user_id))]
pub async fn verify_signature(
    identity: web::Data<IdentityManager>,
    request: web::Json<VerifySignatureRequest>,
) -> HttpResponse {
    match identity.verify_signature(&request.document_id, &request.user_id) {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            tracing::error!(error = %e, "Signature verification failed");
            e.error_response()
        }
    }
}

/// Configure signing key routes. Callers mount these under `/signature`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register_key))
        .route("/verify-pin", web::post().to(verify_pin))
        .route("/rotate-pin", web::post().to(rotate_pin))
        .route("/me", web::get().to(active_key))
        .route("/verify", web::post().to(verify_signature));
}
