//! Error types and error handling for the application
//!
//! Every failure a handler can produce is an [`AppError`]. Each variant maps to
//! an HTTP status and is rendered as the JSON envelope
//! `{"success": false, "message": ..., "error": ...}`.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// `/upload` received no file in the `file` field
    #[error("No file uploaded")]
    NoFileUploaded,

    /// `/upload-multiple` received no file in the `files` field
    #[error("No files uploaded")]
    NoFilesUploaded,

    /// A file part arrived under a field name the endpoint does not accept
    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    /// More file parts than the endpoint accepts
    #[error("Too many files: at most {0} allowed")]
    TooManyFiles(usize),

    /// The multipart body could not be parsed or exceeded the body limit
    #[error("Invalid multipart request")]
    Multipart(#[from] MultipartError),

    /// Requested download name is not a single path component
    #[error("Invalid filename")]
    InvalidFilename(String),

    /// Requested file does not exist inside the storage root
    #[error("File not found")]
    FileNotFound(String),

    /// Filesystem operation failed
    #[error("{context}")]
    Io {
        /// What the service was doing when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Internal server error (catch-all for panics and unexpected failures)
    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Wrap an I/O error with a description of the failed operation
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Io {
            context: context.into(),
            source,
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoFileUploaded
            | AppError::NoFilesUploaded
            | AppError::UnexpectedField(_)
            | AppError::TooManyFiles(_)
            | AppError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::FileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Io { .. } | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Underlying cause reported in the `error` field, if any
    fn detail(&self) -> Option<String> {
        match self {
            AppError::Multipart(e) => Some(e.body_text()),
            AppError::Io { source, .. } => Some(source.to_string()),
            AppError::Internal(detail) => Some(detail.clone()),
            _ => None,
        }
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Always `false`
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Underlying error text, present for server-side and parse failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, detail = ?detail, "Request rejected");
        }

        let body = Json(ErrorBody {
            success: false,
            message: self.to_string(),
            error: detail,
        });

        (status, body).into_response()
    }
}
