//! Health and build metadata endpoints, the only unauthenticated routes.

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

/// GET /health body.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// GET /build-info body.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoResponse {
    pub service: String,
    pub version: String,
    pub git_sha: String,
    pub build_time: String,
}

/// GET /health
///
/// Liveness probe for load balancers.
#[tracing::instrument]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /build-info
///
/// Build metadata recorded at compile time, for deployment verification.
#[tracing::instrument]
pub async fn build_info() -> HttpResponse {
    HttpResponse::Ok().json(BuildInfoResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: env!("GIT_SHA").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/build-info", web::get().to(build_info));
}
