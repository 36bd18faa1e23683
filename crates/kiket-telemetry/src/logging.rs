//! Structured logging bootstrap
//!
//! Installs a global `tracing` subscriber. Extensions call this once from
//! `main`; libraries should never install a subscriber themselves.

use tracing::info;
use tracing_subscriber::{Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};

/// Logging configuration
///
/// # Example
///
/// ```rust
/// use kiket_telemetry::LoggingConfig;
///
/// let config = LoggingConfig::builder()
///     .service_name("triage-extension")
///     .log_level("info,kiket_sdk=debug")
///     .json_logs(false)
///     .build();
/// assert_eq!(config.service_name, "triage-extension");
/// ```
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name included in the startup line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Fallback filter when `RUST_LOG` is unset (e.g. "info,kiket_sdk=debug")
    pub log_level: String,
    /// JSON output instead of pretty text
    pub json_logs: bool,
    /// Write to stderr instead of stdout
    pub stderr_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "kiket-extension".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info,kiket_sdk=debug,kiket_auth=info".to_string(),
            json_logs: true,
            stderr_output: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> LoggingConfigBuilder {
        LoggingConfigBuilder::default()
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Fails if the filter does not parse or a global subscriber is already set.
    pub fn init(self) -> TelemetryResult<LoggingGuard> {
        LoggingGuard::init(self)
    }
}

/// Builder for [`LoggingConfig`]
#[derive(Debug, Clone, Default)]
pub struct LoggingConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
    stderr_output: Option<bool>,
}

impl LoggingConfigBuilder {
    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the service version
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the fallback log filter
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Enable or disable JSON output
    #[must_use]
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = Some(enabled);
        self
    }

    /// Write to stderr
    #[must_use]
    pub fn stderr_output(mut self, enabled: bool) -> Self {
        self.stderr_output = Some(enabled);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            service_version: self.service_version.unwrap_or(defaults.service_version),
            log_level: self.log_level.unwrap_or(defaults.log_level),
            json_logs: self.json_logs.unwrap_or(defaults.json_logs),
            stderr_output: self.stderr_output.unwrap_or(defaults.stderr_output),
        }
    }
}

/// Keeps the logging configuration alive for the life of the process
///
/// Hold it in `main` until shutdown.
#[derive(Debug)]
pub struct LoggingGuard {
    config: LoggingConfig,
}

impl LoggingGuard {
    /// Install the global subscriber described by `config`
    ///
    /// # Errors
    ///
    /// See [`LoggingConfig::init`].
    pub fn init(config: LoggingConfig) -> TelemetryResult<Self> {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))?;

        init_subscriber(&config, env_filter)?;

        info!(
            service_name = %config.service_name,
            service_version = %config.service_version,
            json_logs = config.json_logs,
            "Kiket logging initialized"
        );

        Ok(Self { config })
    }

    /// The configuration in effect
    #[must_use]
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        info!(service_name = %self.config.service_name, "Shutting down Kiket logging");
    }
}

// Each combination has its own branch because the layer types differ
fn init_subscriber(config: &LoggingConfig, env_filter: EnvFilter) -> TelemetryResult<()> {
    if config.json_logs && config.stderr_output {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .json();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else if config.json_logs {
        let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true).json();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else if config.stderr_output {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true).pretty();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else {
        let fmt_layer = fmt::layer().with_target(true).pretty();
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    }
}
