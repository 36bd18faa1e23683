//! Outbound Kiket API client and the endpoints facade
//!
//! Handlers get a client already bound to the platform base URL, the
//! delivery's event version and the best available bearer token (the
//! delivery's runtime token, else the configured workspace token).

use chrono::Utc;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::dispatcher::EVENT_VERSION_HEADER;
use crate::error::{SdkError, SdkResult};
use crate::secrets::SecretResolver;

/// Default timeout for outbound platform calls
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON client for the Kiket platform API
#[derive(Clone)]
pub struct KiketClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    event_version: Option<String>,
}

impl std::fmt::Debug for KiketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiketClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .field("event_version", &self.event_version)
            .finish()
    }
}

impl KiketClient {
    /// Client for `base_url` authenticating with `token`
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, token)
    }

    /// Client sharing an existing connection pool
    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            event_version: None,
        }
    }

    /// Send `X-Kiket-Event-Version` with every request
    #[must_use]
    pub fn with_event_version(mut self, version: impl Into<String>) -> Self {
        self.event_version = Some(version.into());
        self
    }

    /// Platform base URL, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bound event version
    pub fn event_version(&self) -> Option<&str> {
        self.event_version.as_deref()
    }

    /// Whether requests carry a bearer token
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// `GET path`
    ///
    /// # Errors
    ///
    /// [`SdkError::Client`] on transport failure, a non-2xx status, or a
    /// body that does not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> SdkResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    /// `POST path` with a JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SdkResult<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    /// `PUT path` with a JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SdkResult<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    /// `PATCH path` with a JSON body
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SdkResult<T> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    /// `DELETE path`
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> SdkResult<T> {
        self.send(self.request(Method::DELETE, path)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.http.request(method, url).timeout(CLIENT_TIMEOUT);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(version) = &self.event_version {
            builder = builder.header(EVENT_VERSION_HEADER, version);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> SdkResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let body = response.bytes().await?;

        if !status.is_success() {
            debug!(url = %url, status = %status, "Kiket API returned error status");
            return Err(SdkError::Client {
                status: Some(status.as_u16()),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        // 204 and other empty bodies deserialize as JSON null
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        serde_json::from_slice(body).map_err(|e| SdkError::Client {
            status: Some(status.as_u16()),
            message: format!("Invalid response body: {e}"),
        })
    }
}

fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extension-scoped helpers on top of [`KiketClient`]
#[derive(Debug, Clone)]
pub struct Endpoints {
    client: KiketClient,
    extension_id: Option<String>,
    secrets: SecretResolver,
}

impl Endpoints {
    /// Facade over `client` for extension `extension_id`
    pub fn new(client: KiketClient, extension_id: Option<String>, secrets: SecretResolver) -> Self {
        Self {
            client,
            extension_id,
            secrets,
        }
    }

    /// The underlying client
    pub fn client(&self) -> &KiketClient {
        &self.client
    }

    /// Record a custom extension event
    ///
    /// # Errors
    ///
    /// See [`KiketClient::get`].
    pub async fn log_event(&self, event: &str, data: Value) -> SdkResult<Value> {
        let body = json!({
            "extension_id": self.extension_id,
            "event": event,
            "data": data,
            "timestamp": Utc::now(),
        });
        self.client.post("/api/v1/ext/events", &body).await
    }

    /// Send a notification to the workspace
    ///
    /// # Errors
    ///
    /// See [`KiketClient::get`].
    pub async fn notify(&self, title: &str, message: &str, level: &str) -> SdkResult<Value> {
        let body = json!({
            "extension_id": self.extension_id,
            "title": title,
            "message": message,
            "level": level,
        });
        self.client.post("/api/v1/ext/notifications", &body).await
    }

    /// Installation metadata for this extension
    ///
    /// # Errors
    ///
    /// See [`KiketClient::get`].
    pub async fn metadata(&self) -> SdkResult<Value> {
        self.client.get("/api/v1/ext/metadata").await
    }

    /// Resolve a secret for this delivery
    pub fn secret(&self, key: &str) -> Option<SecretString> {
        self.secrets.get(key)
    }
}
