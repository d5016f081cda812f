//! JSON response envelope
//!
//! Every API response is `{"code": .., "message": .., "data": ..}`. Errors
//! carry `data: null` and usually repeat the HTTP status as `code`. A
//! per-token size breach is the exception: HTTP 400 with `code: 413`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

/// Response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn success(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "Success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Error returned from handlers
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// HTTP status for the wrapped error
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::PayloadTooLarge { .. } | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::Transport(_) | Error::Encode(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// `code` carried in the envelope
    pub fn code(&self) -> u16 {
        match &self.0 {
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
            _ => self.status().as_u16(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }

        let envelope = ApiResponse::<()> {
            code: self.code(),
            message: self.0.to_string(),
            data: None,
        };
        (status, Json(envelope)).into_response()
    }
}
