//! SDK entry point

use axum::Router;
use kiket_auth::JwksCache;
use kiket_telemetry::{FeedbackError, TelemetryRecord, TelemetryReporter};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SdkConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{SdkError, SdkResult};
use crate::handler::WebhookHandler;
use crate::registry::HandlerRegistry;
use crate::server;

/// A Kiket extension
///
/// Owns the configuration, handler registry, JWKS cache and telemetry
/// reporter for the life of the process.
///
/// # Example
///
/// ```rust,no_run
/// use kiket_sdk::prelude::*;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> SdkResult<()> {
///     let sdk = KiketSdk::new(SdkConfig::from_env()?);
///
///     sdk.register("issue.created", "v1", |payload: Payload, ctx: HandlerContext| async move {
///         let id = payload.get("issue").and_then(|i| i.get("id")).cloned();
///         ctx.endpoints().log_event("triaged", json!({"issue": id})).await?;
///         Ok::<_, HandlerError>(())
///     })?;
///
///     sdk.serve("0.0.0.0:8080").await
/// }
/// ```
#[derive(Debug)]
pub struct KiketSdk {
    config: Arc<SdkConfig>,
    registry: Arc<HandlerRegistry>,
    jwks: Arc<JwksCache>,
    reporter: TelemetryReporter,
    http_client: reqwest::Client,
}

impl KiketSdk {
    /// Create an extension from `config`
    pub fn new(config: SdkConfig) -> Self {
        let http_client = reqwest::Client::new();
        let reporter = TelemetryReporter::with_client(config.telemetry_config(), http_client.clone());
        Self {
            config: Arc::new(config),
            registry: Arc::new(HandlerRegistry::new()),
            jwks: Arc::new(JwksCache::with_client(http_client.clone())),
            reporter,
            http_client,
        }
    }

    /// Share an existing JWKS cache
    #[must_use]
    pub fn with_jwks_cache(mut self, jwks: Arc<JwksCache>) -> Self {
        self.jwks = jwks;
        self
    }

    /// Receive every telemetry record in-process
    #[must_use]
    pub fn with_feedback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TelemetryRecord) -> Result<(), FeedbackError> + Send + Sync + 'static,
    {
        self.reporter = self.reporter.with_feedback(hook);
        self
    }

    /// Register a handler for `event` at `version`
    ///
    /// # Errors
    ///
    /// [`SdkError::InvalidRegistration`] if `event` or `version` is blank.
    pub fn register<H>(&self, event: &str, version: &str, handler: H) -> SdkResult<()>
    where
        H: WebhookHandler + 'static,
    {
        self.registry.register(event, version, handler)
    }

    /// The configuration
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// The handler registry
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// The JWKS cache
    pub fn jwks_cache(&self) -> &Arc<JwksCache> {
        &self.jwks
    }

    /// Drop every cached key set, forcing a refetch on the next runtime token
    pub fn clear_jwks_cache(&self) {
        self.jwks.clear();
    }

    /// The telemetry reporter
    pub fn reporter(&self) -> &TelemetryReporter {
        &self.reporter
    }

    /// Build a dispatcher over the current registry
    ///
    /// Settings are merged (and `KIKET_SETTING_*` read) here.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.registry),
            self.config.authenticator(Arc::clone(&self.jwks)),
            self.reporter.clone(),
            Arc::clone(&self.config),
            self.http_client.clone(),
        )
    }

    /// The axum router, for mounting into a larger application
    pub fn router(&self) -> Router {
        server::router(
            Arc::new(self.dispatcher()),
            self.config.extension_id.clone(),
            self.config.extension_version.clone(),
        )
    }

    /// Serve on `addr` until Ctrl-C, then flush telemetry
    ///
    /// # Errors
    ///
    /// [`SdkError::Server`] if the address is invalid, cannot be bound, or
    /// the server fails.
    pub async fn serve(&self, addr: &str) -> SdkResult<()> {
        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| SdkError::Server(format!("Invalid address '{addr}': {e}")))?;

        let listener = tokio::net::TcpListener::bind(socket_addr)
            .await
            .map_err(|e| SdkError::Server(format!("Failed to bind to {addr}: {e}")))?;

        info!(
            address = %socket_addr,
            extension_id = ?self.config.extension_id,
            handlers = self.registry.len(),
            "Kiket extension listening (POST /webhooks/{{event}}, /v/{{version}}/webhooks/{{event}}; GET /health)"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| SdkError::Server(format!("Server error: {e}")));

        self.reporter.flush().await;
        info!("Kiket extension stopped");
        result
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
