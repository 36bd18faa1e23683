//! Telemetry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable that disables telemetry when set to a truthy value
pub const OPT_OUT_ENV: &str = "KIKET_SDK_TELEMETRY_OPTOUT";

/// Network timeout for a single remote telemetry POST
pub const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where dispatch outcomes go
///
/// # Example
///
/// ```rust
/// use kiket_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::default()
///     .with_telemetry_url("https://telemetry.example.com")
///     .with_extension("com.example.triage", "1.2.0");
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Master switch; the opt-out environment variable can still disable an enabled reporter
    pub enabled: bool,
    /// Base URL of the remote sink; records are POSTed to `{telemetry_url}/telemetry`
    pub telemetry_url: Option<String>,
    /// Extension identifier stamped on each record
    pub extension_id: Option<String>,
    /// Extension version stamped on each record
    pub extension_version: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            telemetry_url: None,
            extension_id: None,
            extension_version: None,
        }
    }
}

impl TelemetryConfig {
    /// Enable or disable reporting
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the remote sink base URL
    #[must_use]
    pub fn with_telemetry_url(mut self, url: impl Into<String>) -> Self {
        self.telemetry_url = Some(url.into());
        self
    }

    /// Set the extension identity stamped on records
    #[must_use]
    pub fn with_extension(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.extension_id = Some(id.into());
        self.extension_version = Some(version.into());
        self
    }

    /// Full sink endpoint, if a remote sink is configured
    pub fn endpoint(&self) -> Option<String> {
        self.telemetry_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}/telemetry", url.trim_end_matches('/')))
    }
}

/// Whether the opt-out environment variable is currently set
///
/// Read on every call so tests and long-running processes see changes.
pub fn telemetry_opted_out() -> bool {
    std::env::var(OPT_OUT_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
