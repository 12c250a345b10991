//! HTTP error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::{MessageBody, ProtocolError};
use thiserror::Error;
use tracing::error;

use crate::files::{BatchError, FileError};

/// Error returned by handlers; always rendered as a `{message}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Authorization failed")]
    Unauthorized,

    #[error("Too many failed attempts. Please try again in {minutes_left} minutes.")]
    Banned { minutes_left: u64 },

    #[error("Too many requests, please try again later.")]
    TooManyRequests,

    /// Details are logged, never sent.
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Banned { .. } => StatusCode::FORBIDDEN,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!(error = %detail, "Request failed");
        }
        let body = MessageBody::new(self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

impl From<FileError> for ApiError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            FileError::Conflict => ApiError::Conflict(err.to_string()),
            FileError::Io { .. } => ApiError::Internal(err.to_string()),
            FileError::NotSafe
            | FileError::NotADirectory
            | FileError::NotAFile
            | FileError::InvalidRequest(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<BatchError> for ApiError {
    /// Any item failure is a bad request, except internal IO failures.
    fn from(err: BatchError) -> Self {
        match err.source {
            FileError::Io { .. } => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        ApiError::BadRequest("Bad Request".to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}
