//! Error types for the e-signature service.
//!
//! All errors implement `ResponseError` for Actix-web integration,
//! converting domain errors into appropriate HTTP status codes.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Service error type with structured error responses.
#[derive(Error, Debug)]
pub enum EsignError {
    // Lookup errors
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Signature request not found: {0}")]
    RequestNotFound(String),

    #[error("Signer not found: {0}")]
    SignerNotFound(String),

    #[error("Signature not found: {0}")]
    SignatureNotFound(String),

    #[error("Signing session not found: {0}")]
    SessionNotFound(String),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    // Authentication/authorization errors
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // State machine violations
    #[error("Invalid request state: expected {expected}, got {actual}")]
    InvalidRequestState { expected: String, actual: String },

    #[error("Signing order not reached: {0}")]
    SigningOrderNotReached(String),

    // Input validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Blob store errors
    #[error("Blob store error: {0}")]
    Blob(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl EsignError {
    /// Get the error code for structured error responses.
    fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::DocumentNotFound(_) => Some("DOCUMENT_NOT_FOUND"),
            Self::RequestNotFound(_) => Some("REQUEST_NOT_FOUND"),
            Self::SignerNotFound(_) => Some("SIGNER_NOT_FOUND"),
            Self::SignatureNotFound(_) => Some("SIGNATURE_NOT_FOUND"),
            Self::SessionNotFound(_) => Some("SESSION_NOT_FOUND"),
            Self::CertificateNotFound(_) => Some("CERTIFICATE_NOT_FOUND"),
            Self::Unauthorized => Some("UNAUTHORIZED"),
            Self::Forbidden(_) => Some("FORBIDDEN"),
            Self::InvalidRequestState { .. } => Some("INVALID_REQUEST_STATE"),
            Self::SigningOrderNotReached(_) => Some("SIGNING_ORDER_NOT_REACHED"),
            Self::InvalidInput(_) => Some("INVALID_INPUT"),
            Self::Storage(_) => Some("STORAGE_ERROR"),
            Self::Blob(_) => Some("BLOB_STORE_ERROR"),
            Self::Serialization(_) => Some("SERIALIZATION_ERROR"),
            Self::Deserialization(_) => Some("DESERIALIZATION_ERROR"),
            Self::Internal(_) => None, // Don't expose internal error codes
        }
    }
}

impl ResponseError for EsignError {
    fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request - Client errors
            Self::InvalidInput(_) | Self::Serialization(_) | Self::Deserialization(_) => {
                StatusCode::BAD_REQUEST
            }

            // 401 Unauthorized - PIN/credential failures
            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            // 403 Forbidden - Authorization failures
            Self::Forbidden(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            Self::DocumentNotFound(_)
            | Self::RequestNotFound(_)
            | Self::SignerNotFound(_)
            | Self::SignatureNotFound(_)
            | Self::SessionNotFound(_)
            | Self::CertificateNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict - Illegal state transitions
            Self::InvalidRequestState { .. } | Self::SigningOrderNotReached(_) => {
                StatusCode::CONFLICT
            }

            // 500 Internal Server Error - Everything else
            Self::Storage(_) | Self::Blob(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code().map(String::from),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

// Conversion from common error types

impl From<std::io::Error> for EsignError {
    fn from(err: std::io::Error) -> Self {
        Self::Blob(err.to_string())
    }
}

impl From<serde_json::Error> for EsignError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

impl From<redb::Error> for EsignError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::DatabaseError> for EsignError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TableError> for EsignError {
    fn from(err: redb::TableError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::TransactionError> for EsignError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for EsignError {
    fn from(err: redb::CommitError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<redb::StorageError> for EsignError {
    fn from(err: redb::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<lopdf::Error> for EsignError {
    fn from(err: lopdf::Error) -> Self {
        Self::Internal(format!("Certificate rendering failed: {err}"))
    }
}

/// Result type alias for e-signature operations.
pub type EsignResult<T> = Result<T, EsignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            EsignError::InvalidInput("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EsignError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            EsignError::Forbidden("not the creator".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            EsignError::RequestNotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EsignError::InvalidRequestState {
                expected: "signed".to_string(),
                actual: "sent".to_string(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EsignError::Storage("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EsignError::SignerNotFound("test".to_string()).error_code(),
            Some("SIGNER_NOT_FOUND")
        );
        assert_eq!(
            EsignError::SigningOrderNotReached("signer 2 before signer 1".to_string()).error_code(),
            Some("SIGNING_ORDER_NOT_REACHED")
        );
        assert_eq!(EsignError::Internal("test".to_string()).error_code(), None);
    }
}
