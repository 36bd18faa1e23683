//! Telemetry error types

use thiserror::Error;

/// Errors that can occur while setting up observability
///
/// Recording outcomes never fails; these only surface from initialization.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid configuration
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// Tracing subscriber error
    #[error("Tracing subscriber error: {0}")]
    TracingError(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
