//! Webhook dispatch
//!
//! Each delivery moves through
//! `Received -> Authenticated -> VersionResolved -> HandlerFound -> Invoked`
//! and stops at the first failure:
//!
//! | Step | Failure | Status |
//! |------|---------|--------|
//! | authenticate | any [`kiket_auth::AuthError`] | 401 |
//! | resolve version | no path, header or query version | 400 |
//! | look up handler | nothing registered | 404 |
//! | parse payload | body is not a JSON object | 400 |
//! | invoke | handler error or panic | 500 |
//!
//! Telemetry is recorded only for invoked handlers (and, when enabled, for
//! authentication failures). It never changes the response.

use bytes::Bytes;
use futures::FutureExt;
use http::HeaderMap;
use kiket_auth::{AuthOutcome, Authenticator};
use kiket_telemetry::{DispatchOutcome, TelemetryReporter};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::client::{Endpoints, KiketClient};
use crate::config::SdkConfig;
use crate::context::HandlerContext;
use crate::error::{SdkError, SdkResult};
use crate::handler::Payload;
use crate::registry::HandlerRegistry;
use crate::secrets::SecretResolver;
use crate::settings::Settings;

/// Header carrying the event version
pub const EVENT_VERSION_HEADER: &str = "x-kiket-event-version";

/// Query parameter carrying the event version
pub const VERSION_QUERY_PARAM: &str = "version";

/// Error class recorded for authentication failures
pub const AUTH_ERROR_CLASS: &str = "auth_error";

/// Error class recorded for handler panics
pub const PANIC_ERROR_CLASS: &str = "Panic";

/// One inbound delivery, as extracted from the HTTP request
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    /// Event name from the route
    pub event: String,
    /// Version from the `/v/{version}/...` route, if that route matched
    pub path_version: Option<String>,
    /// Version from the `version` query parameter
    pub query_version: Option<String>,
    /// Inbound headers
    pub headers: HeaderMap,
    /// Raw body, exactly as received
    pub body: Bytes,
}

impl WebhookRequest {
    /// Delivery for `event` with `body`
    pub fn new(event: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            event: event.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Effective version: path, then header, then query; first non-empty wins
    pub fn resolve_version(&self) -> Option<String> {
        let header = self.headers.get(EVENT_VERSION_HEADER).and_then(|v| v.to_str().ok());
        [self.path_version.as_deref(), header, self.query_version.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Authenticates, routes and invokes webhook handlers
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    authenticator: Authenticator,
    reporter: TelemetryReporter,
    settings: Arc<Settings>,
    config: Arc<SdkConfig>,
    http_client: reqwest::Client,
}

impl Dispatcher {
    /// Assemble a dispatcher
    pub fn new(
        registry: Arc<HandlerRegistry>,
        authenticator: Authenticator,
        reporter: TelemetryReporter,
        config: Arc<SdkConfig>,
        http_client: reqwest::Client,
    ) -> Self {
        let settings = Arc::new(config.merged_settings());
        Self {
            registry,
            authenticator,
            reporter,
            settings,
            config,
            http_client,
        }
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The active authentication strategy
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Run one delivery to completion
    ///
    /// `Ok` carries the 200 response body.
    ///
    /// # Errors
    ///
    /// The [`SdkError`] to answer with; see the module docs for the mapping.
    pub async fn dispatch(&self, request: WebhookRequest) -> SdkResult<Value> {
        let span = info_span!("webhook", event = %request.event);
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: WebhookRequest) -> SdkResult<Value> {
        let parsed = parse_body(&request.body);
        let version = request.resolve_version();

        let null = Value::Null;
        let auth_payload = parsed.as_ref().unwrap_or(&null);
        let outcome = match self
            .authenticator
            .authenticate(&request.body, &request.headers, auth_payload)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(mode = self.authenticator.mode(), reason = err.kind(), error = %err, "Webhook authentication failed");
                if self.config.telemetry_on_auth_failure {
                    self.reporter.record(
                        DispatchOutcome::error(
                            &request.event,
                            version.as_deref().unwrap_or("unknown"),
                            0,
                            err.to_string(),
                            AUTH_ERROR_CLASS,
                        )
                        .with_metadata("reason", err.kind()),
                    );
                }
                return Err(err.into());
            }
        };

        let version = version.ok_or(SdkError::VersionRequired)?;

        let record = self
            .registry
            .get(&request.event, &version)
            .ok_or_else(|| SdkError::HandlerNotFound {
                event: request.event.clone(),
                version: version.clone(),
            })?;

        let payload = match parsed {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(SdkError::InvalidPayload(format!(
                    "expected a JSON object, got {}",
                    json_type(&other)
                )));
            }
            Err(e) => return Err(SdkError::InvalidPayload(e)),
        };

        let ctx = self.context(&request, &version, &payload, &outcome);

        debug!(version = %version, "Invoking webhook handler");
        let started = Instant::now();
        let result = AssertUnwindSafe(record.handler.handle(payload, ctx)).catch_unwind().await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(Ok(value)) => {
                self.reporter
                    .record(DispatchOutcome::ok(&request.event, &version, duration_ms));
                debug!(version = %version, duration_ms, "Webhook handled");
                Ok(if value.is_null() { json!({"ok": true}) } else { value })
            }
            Ok(Err(err)) => {
                warn!(version = %version, kind = err.kind(), error = err.message(), duration_ms, "Webhook handler failed");
                self.reporter.record(DispatchOutcome::error(
                    &request.event,
                    &version,
                    duration_ms,
                    err.message(),
                    err.kind(),
                ));
                Err(SdkError::Handler {
                    message: err.message().to_string(),
                    kind: err.kind().to_string(),
                })
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(version = %version, panic = %message, duration_ms, "Webhook handler panicked");
                self.reporter.record(DispatchOutcome::error(
                    &request.event,
                    &version,
                    duration_ms,
                    &message,
                    PANIC_ERROR_CLASS,
                ));
                Err(SdkError::Handler {
                    message,
                    kind: PANIC_ERROR_CLASS.to_string(),
                })
            }
        }
    }

    fn context(&self, request: &WebhookRequest, version: &str, payload: &Payload, outcome: &AuthOutcome) -> HandlerContext {
        let auth = outcome.context().cloned();

        // Prefer the delivery's own runtime token for outbound calls
        let token = auth
            .as_ref()
            .map(|a| a.runtime_token.clone())
            .filter(|t| !t.is_empty())
            .map(SecretString::new)
            .or_else(|| self.config.workspace_token.clone());

        let client = KiketClient::with_http_client(self.http_client.clone(), &self.config.base_url, token)
            .with_event_version(version);
        let secrets = SecretResolver::from_payload(payload);
        let endpoints = Endpoints::new(client.clone(), self.config.extension_id.clone(), secrets.clone());

        HandlerContext {
            event: request.event.clone(),
            event_version: version.to_string(),
            headers: header_map(&request.headers),
            client,
            endpoints,
            settings: Arc::clone(&self.settings),
            extension_id: self.config.extension_id.clone(),
            extension_version: self.config.extension_version.clone(),
            secrets,
            auth,
        }
    }
}

fn parse_body(body: &[u8]) -> Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| format!("body is not valid JSON: {e}"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn request(path: Option<&str>, header: Option<&str>, query: Option<&str>) -> WebhookRequest {
        let mut request = WebhookRequest::new("e", "{}");
        request.path_version = path.map(str::to_string);
        request.query_version = query.map(str::to_string);
        if let Some(header) = header {
            request
                .headers
                .insert(EVENT_VERSION_HEADER, HeaderValue::from_str(header).unwrap());
        }
        request
    }

    #[test]
    fn test_version_priority() {
        assert_eq!(request(Some("v1"), Some("v2"), Some("v3")).resolve_version().as_deref(), Some("v1"));
        assert_eq!(request(None, Some("v2"), Some("v3")).resolve_version().as_deref(), Some("v2"));
        assert_eq!(request(None, None, Some("v3")).resolve_version().as_deref(), Some("v3"));
        assert_eq!(request(None, None, None).resolve_version(), None);
    }

    #[test]
    fn test_blank_version_sources_are_skipped() {
        assert_eq!(request(Some(" "), Some(""), Some(" v3 ")).resolve_version().as_deref(), Some("v3"));
        assert_eq!(request(Some(""), Some("  "), Some("")).resolve_version(), None);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b" \n").unwrap(), json!({}));
        assert_eq!(parse_body(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(parse_body(b"{not json").is_err());
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }
}
