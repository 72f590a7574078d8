//! Internal authentication middleware.
//!
//! Every route except health/build-info is reserved for the main app
//! and the scheduler, which authenticate with INTERNAL_SERVICE_TOKEN.
//! Enforcement is mandatory in production and opt-in elsewhere.

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::{Error, ResponseError};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::config::Settings;
use crate::error::EsignError;

/// Middleware enforcing the shared internal service token.
#[derive(Clone)]
pub struct InternalAuth {
    required: bool,
    token: Option<String>,
}

impl InternalAuth {
    /// Build from service settings.
    pub fn new(settings: &Settings) -> Self {
        Self {
            required: settings.internal_token_required(),
            token: settings.internal_token().map(ToString::to_string),
        }
    }

    /// Build directly from config (used for tests).
    pub fn from_config(required: bool, token: Option<String>) -> Self {
        Self { required, token }
    }

    fn is_public_path(path: &str) -> bool {
        matches!(path, "/health" | "/build-info")
    }

    fn extract_token(req: &ServiceRequest) -> Option<String> {
        let headers = req.headers();

        // Prefer Authorization: Bearer <token>
        if let Some(value) = headers.get("authorization")
            && let Ok(value) = value.to_str()
            && let Some(token) = value.strip_prefix("Bearer ")
        {
            return Some(token.trim().to_string());
        }

        // Fallback: X-Internal-Token header
        if let Some(value) = headers.get("x-internal-token")
            && let Ok(value) = value.to_str()
        {
            return Some(value.trim().to_string());
        }

        None
    }

    /// A request is authorized when no token is configured (and not
    /// required), or when the presented token matches the configured one.
    fn authorize(&self, provided: Option<&str>) -> bool {
        match (self.required, self.token.as_deref()) {
            (true, expected) => expected.is_some_and(|expected| provided == Some(expected)),
            (false, Some(expected)) => provided.is_none_or(|provided| provided == expected),
            (false, None) => true,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for InternalAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = InternalAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(InternalAuthMiddleware {
            service,
            auth: self.clone(),
        }))
    }
}

pub struct InternalAuthMiddleware<S> {
    service: S,
    auth: InternalAuth,
}

impl<S, B> Service<ServiceRequest> for InternalAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if !InternalAuth::is_public_path(req.path()) {
            let provided = InternalAuth::extract_token(&req);

            if !self.auth.authorize(provided.as_deref()) {
                // Same envelope the handlers produce for EsignError.
                let (req, _pl) = req.into_parts();
                let response = EsignError::Unauthorized.error_response();
                return Box::pin(async move {
                    Ok(ServiceResponse::new(req, response.map_into_right_body()))
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
