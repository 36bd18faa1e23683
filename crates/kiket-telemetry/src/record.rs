//! Dispatch outcome records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::config::TelemetryConfig;

/// Terminal status of a dispatched webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Handler returned a result
    Ok,
    /// Handler (or authentication, when reported) failed
    Error,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Error => "error",
        })
    }
}

/// What the dispatcher knows about one handled request
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Event name
    pub event: String,
    /// Resolved event version
    pub version: String,
    /// Terminal status
    pub status: DispatchStatus,
    /// Wall time spent in the handler, in milliseconds
    pub duration_ms: u64,
    /// Error message, for failures
    pub error_message: Option<String>,
    /// Error class / kind tag, for failures
    pub error_class: Option<String>,
    /// Free-form extra fields
    pub metadata: Map<String, Value>,
}

impl DispatchOutcome {
    /// Successful outcome
    pub fn ok(event: impl Into<String>, version: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            event: event.into(),
            version: version.into(),
            status: DispatchStatus::Ok,
            duration_ms,
            error_message: None,
            error_class: None,
            metadata: Map::new(),
        }
    }

    /// Failed outcome
    pub fn error(
        event: impl Into<String>,
        version: impl Into<String>,
        duration_ms: u64,
        message: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            status: DispatchStatus::Error,
            error_message: Some(message.into()),
            error_class: Some(class.into()),
            ..Self::ok(event, version, duration_ms)
        }
    }

    /// Attach one metadata field
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Wire form of a dispatch outcome
///
/// This is the JSON body POSTed to the remote sink and the value handed to
/// the feedback hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Event name
    pub event: String,
    /// Event version
    pub version: String,
    /// `ok` or `error`
    pub status: DispatchStatus,
    /// Handler duration in milliseconds
    pub duration_ms: u64,
    /// When the record was produced
    pub timestamp: DateTime<Utc>,
    /// Extension identifier
    pub extension_id: Option<String>,
    /// Extension version
    pub extension_version: Option<String>,
    /// Error message, for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Error class, for failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    /// Extra fields
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TelemetryRecord {
    pub(crate) fn from_outcome(outcome: DispatchOutcome, config: &TelemetryConfig) -> Self {
        Self {
            event: outcome.event,
            version: outcome.version,
            status: outcome.status,
            duration_ms: outcome.duration_ms,
            timestamp: Utc::now(),
            extension_id: config.extension_id.clone(),
            extension_version: config.extension_version.clone(),
            error_message: outcome.error_message,
            error_class: outcome.error_class,
            metadata: outcome.metadata,
        }
    }
}
