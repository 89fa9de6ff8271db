//! # Error Handling
//!
//! HTTP-facing error type and how it is converted to responses.
//!
//! ## Error Categories:
//! - **BadRequest / ValidationError**: Client sent something unusable (400)
//! - **Transcription**: The provider failed; the message is passed through (500)
//! - **Internal / ConfigError**: Server-side problems (500)
//!
//! ## JSON Response Format:
//! Every error renders the same flat shape clients already parse:
//! ```json
//! { "error": "No audio file provided" }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Internal server errors (staging I/O, worker failures, etc.)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Provider failure, reported verbatim to the client
    Transcription(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Transcription(msg) => write!(f, "Transcription failed: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl AppError {
    /// Message placed in the `error` field of the response body.
    pub fn client_message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::Transcription(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) | AppError::Transcription(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.client_message()
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// A broken multipart stream is the client's fault.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid multipart payload: {}", err))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("Blocking task failed: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
