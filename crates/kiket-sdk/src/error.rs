//! SDK error types and their HTTP mapping

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use kiket_auth::AuthError;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by dispatch, registration, configuration and the platform client
#[derive(Debug, Error)]
pub enum SdkError {
    /// The delivery failed authentication
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// No version in the path, `X-Kiket-Event-Version` header or `version` query
    #[error("Event version required")]
    VersionRequired,

    /// Nothing is registered for this event and version
    #[error("No handler registered for event '{event}' version '{version}'")]
    HandlerNotFound {
        /// Event name from the route
        event: String,
        /// Resolved version
        version: String,
    },

    /// The body is not a JSON object
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// A handler was registered with an empty event or version
    #[error("Invalid handler registration: {0}")]
    InvalidRegistration(String),

    /// The handler returned an error or panicked
    #[error("{message}")]
    Handler {
        /// Message exposed to the caller
        message: String,
        /// Error class recorded in telemetry
        kind: String,
    },

    /// A required secret could not be resolved
    #[error("Secret '{0}' is not available")]
    MissingSecret(String),

    /// Outbound platform API call failed
    #[error("Kiket API request failed{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Client {
        /// HTTP status, when the platform answered
        status: Option<u16>,
        /// Failure description
        message: String,
    },

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP server failed to bind or run
    #[error("Server error: {0}")]
    Server(String),
}

impl SdkError {
    /// HTTP status this error is answered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::VersionRequired | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::HandlerNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for SdkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Auth(err) => json!({"error": "Unauthorized", "reason": err.kind(), "message": err.to_string()}),
            Self::VersionRequired => json!({
                "error": "Event version required",
                "message": "Provide the version in the route, the X-Kiket-Event-Version header or the version query parameter"
            }),
            Self::HandlerNotFound { event, version } => json!({
                "error": self.to_string(),
                "event": event,
                "version": version,
            }),
            // Only the message crosses the boundary for internal failures
            _ => json!({"error": self.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;
