//! Error types for fedsend
//!
//! Every fallible operation in the crate returns `AppError`.
//! The server converts it into an HTTP response via `IntoResponse`;
//! the CLI logs it and exits with a non-zero status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Local identity is not provisioned (404)
    #[error("Resource not found")]
    NotFound,

    /// WebFinger or actor document lookup failed (502)
    #[error("Resolution failure: {0}")]
    Resolution(String),

    /// Key material unreadable or signing failed (500)
    ///
    /// Always indicates misconfiguration; never retried.
    #[error("Signing failure: {0}")]
    Signing(String),

    /// Network error or non-2xx inbox response (502)
    #[error("Delivery failure: {detail}")]
    Delivery {
        status: Option<u16>,
        detail: String,
    },

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request understood but cannot be served in that form (406)
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// Short machine-readable label, used for metrics and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Resolution(_) => "resolution",
            AppError::Signing(_) => "signing",
            AppError::Delivery { .. } => "delivery",
            AppError::Validation(_) => "validation",
            AppError::NotAcceptable(_) => "not_acceptable",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            AppError::Resolution(_) | AppError::Delivery { .. } => StatusCode::BAD_GATEWAY,
            AppError::Signing(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Key and config problems stay in the logs.
        let message = match &self {
            AppError::Signing(_) | AppError::Config(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = AppError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_acceptable_maps_to_406() {
        let response = AppError::NotAcceptable("bad scheme".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn signing_failure_is_a_server_error() {
        let response = AppError::Signing("bad key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn remote_failures_are_bad_gateway() {
        let resolution = AppError::Resolution("no WebFinger record".to_string());
        let delivery = AppError::Delivery {
            status: None,
            detail: "connection refused".to_string(),
        };
        assert_eq!(resolution.into_response().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(delivery.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn delivery_failure_displays_detail() {
        let error = AppError::Delivery {
            status: Some(401),
            detail: "Inbox rejected activity: HTTP 401".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Delivery failure: Inbox rejected activity: HTTP 401"
        );
        assert_eq!(error.kind(), "delivery");
    }
}
