// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert coursecast_core errors to HTTP errors
impl From<coursecast_core::Error> for AppError {
    fn from(err: coursecast_core::Error) -> Self {
        use coursecast_core::Error;

        match err {
            Error::Validation(msg) => AppError::bad_request(msg),
            Error::UnknownPath(msg) => AppError::not_found(format!("Unknown path: {msg}")),
            Error::NotFound(msg) => AppError::not_found(msg),
            Error::Authentication(msg) => AppError::unauthorized(msg),
            Error::Authorization(msg) => AppError::forbidden(msg),
            Error::ConnectionLimit(msg) => AppError::too_many_requests(msg),
            Error::Persistence(e) => {
                tracing::error!("Persistence error: {}", e);
                AppError::internal_server_error("Storage error")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                AppError::internal_server_error("Data processing error")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                AppError::internal_server_error("Internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_core::Error;

    #[test]
    fn test_spec_taxonomy_maps_to_statuses() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::UnknownPath("/ws/x".into()), StatusCode::NOT_FOUND),
            (Error::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (Error::Authorization("x".into()), StatusCode::FORBIDDEN),
            (
                Error::ConnectionLimit("x".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                Error::Persistence(sqlx::Error::PoolClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
