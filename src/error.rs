use crate::models::ApiResponse;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Every way a request can be turned away, from transport checks down to the
/// filesystem call itself.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Forbidden(String),

    #[error("content exceeds maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("unsupported operation")]
    Unsupported,

    /// Carries the OS error text; the only variant whose message is not
    /// composed by this service.
    #[error("{0}")]
    Internal(String),
}

impl GateError {
    pub fn access_denied(path: &str) -> Self {
        GateError::Forbidden(format!("access denied to path: {}", path))
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::Internal(err.to_string())
    }
}

impl ResponseError for GateError {
    fn status_code(&self) -> StatusCode {
        match self {
            GateError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GateError::Forbidden(_) => StatusCode::FORBIDDEN,
            GateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::Unsupported | GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::error(self.to_string()))
    }
}
