//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use camera_capture::CameraError;
use detector::DetectError;
use serde_json::json;
use session_lifecycle::SessionError;
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Errors returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Detection unavailable: no model loaded")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ModelUnavailable => ApiError::Unavailable,
            SessionError::SessionNotFound(_) => ApiError::NotFound(err.to_string()),
            SessionError::StreamActive(_) => ApiError::Conflict(err.to_string()),
            SessionError::Source(e) => e.into(),
            SessionError::Detection(_) | SessionError::Worker(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::ModelUnavailable => ApiError::Unavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CameraError> for ApiError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::Open(_) | CameraError::Decode(_) | CameraError::Format(_) => {
                ApiError::BadRequest(err.to_string())
            }
            CameraError::Stream(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ApiError::NotFound("Record not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(SessionError::ModelUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(SessionError::SessionNotFound("camera_a".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::from(StorageError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(CameraError::Decode("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SessionError::StreamActive("camera_a".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
