use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Video error: {0}")]
    VideoError(String),

    /// Camera could not be acquired (permission denied, missing, busy)
    #[error("Camera unavailable [{device}]: {reason}")]
    CameraUnavailable { device: String, reason: String },

    /// Snapshot had zero area (no frame delivered yet)
    #[error("Frame has no pixels yet")]
    EmptyFrame,

    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Recognition request could not be sent or completed
    #[error("Transport error: {0}")]
    Transport(String),
}

impl AppError {
    /// Build a `CameraUnavailable` from an IO error raised while opening a device
    pub fn camera(device: impl Into<String>, err: &std::io::Error) -> Self {
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => format!("permission denied ({})", err),
            std::io::ErrorKind::NotFound => format!("no such device ({})", err),
            _ => err.to_string(),
        };
        AppError::CameraUnavailable {
            device: device.into(),
            reason,
        }
    }
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        // Always return 200 OK - success/failure is indicated by the success field
        StatusCode::OK
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_reason() {
        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let app = AppError::camera("/dev/video0", &err);
        match app {
            AppError::CameraUnavailable { device, reason } => {
                assert_eq!(device, "/dev/video0");
                assert!(reason.starts_with("permission denied"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_body_is_unified() {
        let response = AppError::Transport("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
