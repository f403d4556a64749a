//! Error conversions - From implementations for common error types
//!
//! Conversion from `serde_json` errors (configuration files) and the
//! HTTP rendering of [`AppError`].

use super::app_error::AppError;
use super::kind::ErrorKind;

// ============================================================================
// serde_json conversions
// ============================================================================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            AppError::config(format!("JSON parse error: {}", err)).with_source(err)
        } else {
            AppError::internal("JSON serialization error").with_source(err)
        }
    }
}

// ============================================================================
// Axum conversions (feature-gated)
// ============================================================================

/// The JSON envelope handlers answer with on failure.
///
/// `logged_in` is the session state the handler had already resolved before
/// the failure, so the client keeps an accurate view of its login.
#[cfg(feature = "axum")]
impl AppError {
    pub fn into_response_for(self, logged_in: bool) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details never leave the process for server-side failures
        let detail = if self.is_server_error() {
            None
        } else {
            Some(self.message())
        };

        let body = serde_json::json!({
            "success": false,
            "error": self.kind().as_str(),
            "loggedIn": logged_in,
            "detail": detail,
            "action": self.action(),
        });

        (status, Json(body)).into_response()
    }
}
