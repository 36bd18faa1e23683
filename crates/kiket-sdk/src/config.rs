//! SDK configuration
//!
//! Built programmatically with [`SdkConfig::builder`], or loaded with the
//! `config` crate from `KIKET_*` environment variables and optionally a file.
//! Nested keys use `__`, e.g. `KIKET_TELEMETRY__TELEMETRY_URL`.

use kiket_auth::{Authenticator, JwksCache};
use kiket_telemetry::TelemetryConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::settings::Settings;

/// Platform used when no base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://kiket.dev";

/// Environment prefix for [`SdkConfig::from_env`]
pub const ENV_PREFIX: &str = "KIKET";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// Extension configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Shared secret for `X-Kiket-Signature`; selects signature mode when set
    pub webhook_secret: Option<SecretString>,
    /// Token for outbound calls when a delivery carries no runtime token
    pub workspace_token: Option<SecretString>,
    /// Platform API base URL
    pub base_url: String,
    /// Base URL to fetch the JWKS from; selects runtime token mode when no webhook secret is set
    pub jwks_base_url: Option<String>,
    /// Extension identifier
    pub extension_id: Option<String>,
    /// Extension version
    pub extension_version: Option<String>,
    /// Explicit settings (highest priority)
    pub settings: Map<String, Value>,
    /// Manifest setting defaults (lowest priority)
    pub manifest_defaults: Map<String, Value>,
    /// Telemetry sinks
    pub telemetry: TelemetryConfig,
    /// Also record authentication failures as `auth_error` outcomes
    pub telemetry_on_auth_failure: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            workspace_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            jwks_base_url: None,
            extension_id: None,
            extension_version: None,
            settings: Map::new(),
            manifest_defaults: Map::new(),
            telemetry: TelemetryConfig::default(),
            telemetry_on_auth_failure: false,
        }
    }
}

impl SdkConfig {
    /// Create a configuration builder
    ///
    /// # Example
    ///
    /// ```rust
    /// use kiket_sdk::SdkConfig;
    ///
    /// let config = SdkConfig::builder()
    ///     .webhook_secret("whsec_123")
    ///     .extension("com.example.triage", "1.0.0")
    ///     .setting("channel", "#ops")
    ///     .build();
    /// assert_eq!(config.extension_id.as_deref(), Some("com.example.triage"));
    /// ```
    pub fn builder() -> SdkConfigBuilder {
        SdkConfigBuilder::default()
    }

    /// Load from `KIKET_*` environment variables
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseError`] if a variable has the wrong shape.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder().add_source(environment()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from a file (TOML, YAML, or JSON), with `KIKET_*` variables overriding it
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unknown extension, or
    /// contains invalid configuration.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(path.to_str().ok_or(ConfigError::UnsupportedFormat)?, format))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Configured webhook secret, if non-empty
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    /// Pick the authentication strategy
    ///
    /// A webhook secret selects signature verification. Without one, a
    /// configured JWKS base URL selects runtime tokens. With neither, signature
    /// mode is used and every request fails closed with a configuration error.
    pub fn authenticator(&self, jwks: Arc<JwksCache>) -> Authenticator {
        if self.webhook_secret().is_some() {
            return Authenticator::signature(self.webhook_secret.clone());
        }
        match self.jwks_base_url.as_deref().filter(|url| !url.is_empty()) {
            Some(base_url) => Authenticator::runtime_token(jwks, base_url),
            None => Authenticator::signature(None),
        }
    }

    /// Telemetry configuration stamped with the extension identity
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let mut telemetry = self.telemetry.clone();
        if telemetry.extension_id.is_none() {
            telemetry.extension_id.clone_from(&self.extension_id);
        }
        if telemetry.extension_version.is_none() {
            telemetry.extension_version.clone_from(&self.extension_version);
        }
        telemetry
    }

    /// Merge manifest defaults, `KIKET_SETTING_*` overrides and explicit settings
    pub fn merged_settings(&self) -> Settings {
        Settings::merge(&self.manifest_defaults, &self.settings)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Builder for [`SdkConfig`]
#[derive(Debug, Clone, Default)]
pub struct SdkConfigBuilder {
    config: SdkConfig,
}

impl SdkConfigBuilder {
    /// Shared webhook secret
    #[must_use]
    pub fn webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.webhook_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Workspace token for outbound calls
    #[must_use]
    pub fn workspace_token(mut self, token: impl Into<String>) -> Self {
        self.config.workspace_token = Some(SecretString::new(token.into()));
        self
    }

    /// Platform base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Verify runtime tokens against the JWKS at `url`
    #[must_use]
    pub fn jwks_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.jwks_base_url = Some(url.into());
        self
    }

    /// Verify runtime tokens against the JWKS of the configured base URL
    #[must_use]
    pub fn runtime_tokens(mut self) -> Self {
        self.config.jwks_base_url = Some(self.config.base_url.clone());
        self
    }

    /// Extension identity
    #[must_use]
    pub fn extension(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.extension_id = Some(id.into());
        self.config.extension_version = Some(version.into());
        self
    }

    /// One explicit setting
    #[must_use]
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.settings.insert(key.into(), value.into());
        self
    }

    /// One manifest default
    #[must_use]
    pub fn manifest_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.manifest_defaults.insert(key.into(), value.into());
        self
    }

    /// Telemetry sinks
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Record authentication failures as telemetry
    #[must_use]
    pub fn telemetry_on_auth_failure(mut self, enabled: bool) -> Self {
        self.config.telemetry_on_auth_failure = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SdkConfig {
        self.config
    }
}
