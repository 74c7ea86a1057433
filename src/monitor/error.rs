use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// JSON error envelope every monitoring endpoint returns on failure, per
/// `original_source/monitoring/server.py`'s `_send_error`.
pub struct MonitorError {
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
}

impl MonitorError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, error: "Not Found", message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: "Internal Server Error", message: message.into() }
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let error_code = self.error.to_uppercase().replace(' ', "_");
        (
            self.status,
            Json(json!({
                "error": self.error,
                "error_code": error_code,
                "message": self.message,
            })),
        )
            .into_response()
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::internal(format!("failed to read log file: {}", err))
    }
}
