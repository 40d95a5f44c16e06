//! Request-level error type and its HTTP mapping.
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("User already exists with this email")]
    DuplicateEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no usable JWT signing secret configured")]
    MisconfiguredSecret,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::DuplicateEmail => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::StoreUnavailable(_) | AppError::MisconfiguredSecret => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client. Server-side detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::StoreUnavailable(_) => "Storage is temporarily unavailable".into(),
            AppError::MisconfiguredSecret => "Login is temporarily unavailable".into(),
            AppError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "request body rejected");
        AppError::InvalidInput("Invalid request body")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        let body = json!({ "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failures_share_status_and_message() {
        let err = AppError::InvalidCredentials;
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), "Invalid email or password");
    }

    #[test]
    fn server_errors_hide_detail() {
        let err = AppError::StoreUnavailable("connection refused at 10.0.0.3".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.public_message().contains("10.0.0.3"));

        let err = AppError::Internal("join error".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
    }
}
