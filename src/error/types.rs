use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::current_request_id;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file data provided")]
    NoData,

    #[error("Unsupported file type: {content_type}. Please provide a supported format.")]
    UnsupportedFormat { content_type: String },

    #[error("{message}")]
    MissingFile { message: String },

    #[error("{message}")]
    ConversionFailure { message: String },

    #[error("File too large: exceeds limit of {limit_mb}MB")]
    FileTooLarge { limit_mb: usize },

    #[error("Rate limit exceeded: maximum concurrent requests reached")]
    RateLimitExceeded,

    #[error("Conversion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NoData => "NO_DATA",
            AppError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            AppError::MissingFile { .. } => "MISSING_FILE",
            AppError::ConversionFailure { .. } => "CONVERSION_FAILURE",
            AppError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::InvalidRequest { .. } => "INVALID_REQUEST",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoData => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            AppError::MissingFile { .. } => StatusCode::BAD_REQUEST,
            AppError::ConversionFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();
        let request_id = current_request_id().unwrap_or_else(|| Uuid::new_v4().to_string());

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = %status,
                request_id = %request_id,
                error_message = %message,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                error_code = error_code,
                status_code = %status,
                request_id = %request_id,
                error_message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error": message,
            "code": error_code,
            "request_id": request_id,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::ConversionFailure {
            message: format!("{:#}", err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl AppError {
    pub fn missing_file(message: impl Into<String>) -> Self {
        AppError::MissingFile {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        AppError::InvalidRequest {
            message: message.into(),
        }
    }
}
