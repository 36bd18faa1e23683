//! Per-request handler context

use kiket_auth::AuthContext;
use secrecy::SecretString;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::client::{Endpoints, KiketClient};
use crate::handler::HandlerError;
use crate::secrets::SecretResolver;
use crate::settings::Settings;

/// Everything a handler may use while processing one delivery
///
/// Built fresh by the dispatcher for every request and never shared between
/// requests.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub(crate) event: String,
    pub(crate) event_version: String,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) client: KiketClient,
    pub(crate) endpoints: Endpoints,
    pub(crate) settings: Arc<Settings>,
    pub(crate) extension_id: Option<String>,
    pub(crate) extension_version: Option<String>,
    pub(crate) secrets: SecretResolver,
    pub(crate) auth: Option<AuthContext>,
}

impl HandlerContext {
    /// Event name
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Resolved event version
    pub fn event_version(&self) -> &str {
        &self.event_version
    }

    /// Inbound headers, lowercase names
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// One inbound header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Platform client bound to this delivery's version and token
    pub fn client(&self) -> &KiketClient {
        &self.client
    }

    /// Extension-scoped API helpers
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Merged settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// One setting
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Configured extension id
    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.as_deref()
    }

    /// Configured extension version
    pub fn extension_version(&self) -> Option<&str> {
        self.extension_version.as_deref()
    }

    /// Secret resolver for this delivery
    pub fn secrets(&self) -> &SecretResolver {
        &self.secrets
    }

    /// Resolve a secret (payload first, then environment)
    pub fn secret(&self, key: &str) -> Option<SecretString> {
        self.secrets.get(key)
    }

    /// Runtime token identity, when the delivery carried one
    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    /// Whether the runtime token grants `scope`; always false for signed deliveries
    pub fn has_scope(&self, scope: &str) -> bool {
        self.auth.as_ref().is_some_and(|auth| auth.has_scope(scope))
    }

    /// Fail unless every scope in `scopes` was granted
    ///
    /// # Errors
    ///
    /// A `InsufficientScope` [`HandlerError`] naming the missing scopes.
    pub fn require_scopes(&self, scopes: &[&str]) -> Result<(), HandlerError> {
        let missing: Vec<&str> = scopes.iter().copied().filter(|s| !self.has_scope(s)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::new(
                "InsufficientScope",
                format!("Missing required scopes: {}", missing.join(", ")),
            ))
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(event: &str, version: &str) -> Self {
        let client = KiketClient::new("http://127.0.0.1:9", None).with_event_version(version);
        Self {
            event: event.to_string(),
            event_version: version.to_string(),
            headers: HashMap::new(),
            endpoints: Endpoints::new(client.clone(), None, SecretResolver::default()),
            client,
            settings: Arc::new(Settings::default()),
            extension_id: None,
            extension_version: None,
            secrets: SecretResolver::default(),
            auth: None,
        }
    }
}
