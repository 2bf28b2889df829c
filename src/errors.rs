use std::error::Error as StdError;
use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::data_models::ErrorResponse;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub const MSG_INVALID_URL: &str =
    "Invalid URL format. Please ensure you entered a valid URL (e.g., https://example.com).";
pub const MSG_UNSUPPORTED_SCHEME: &str = "Only http and https URLs are supported.";
pub const MSG_UNREACHABLE: &str = "The provided URL could not be reached. Check the address.";
pub const MSG_UPSTREAM_STATUS: &str = "The provided URL returned an error status.";
pub const MSG_PARSING_FAILED: &str = "Failed to parse the HTML content.";
pub const MSG_TIMEOUT: &str = "Analysis timed out. The target URL may be slow to respond.";
pub const MSG_UNKNOWN: &str = "An unexpected error occurred.";

/// Categorizes application errors so the HTTP layer can pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unreachable,
    Timeout,
    ParsingFailed,
    Unknown,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unreachable => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ParsingFailed | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ParsingFailed => "parsing failed",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Carries a category, a user facing message and the original cause.
///
/// The message is what the caller sees; the cause is kept for logs only.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    /// Status code returned by the target, when that is what failed.
    pub upstream_status: Option<u16>,
    pub message: String,
    pub cause: Option<BoxError>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            upstream_status: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unreachable(cause: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Unreachable, MSG_UNREACHABLE).with_cause(cause)
    }

    pub fn upstream_status(status: u16) -> Self {
        Self::new(ErrorKind::Unreachable, MSG_UPSTREAM_STATUS).with_upstream_status(status)
    }

    pub fn parsing_failed(cause: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::ParsingFailed, MSG_PARSING_FAILED).with_cause(cause)
    }

    /// Wraps any error as a timeout, keeping the upstream status for diagnostics.
    pub fn timed_out(original: AppError) -> Self {
        let upstream_status = original.upstream_status;
        Self {
            kind: ErrorKind::Timeout,
            upstream_status,
            message: MSG_TIMEOUT.to_string(),
            cause: Some(Box::new(original)),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ErrorResponse::new(self.status_code(), self.message).into_response()
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
