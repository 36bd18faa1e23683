//! # Kiket SDK
//!
//! Build Kiket extensions in Rust. The SDK receives webhook deliveries from
//! the Kiket platform, authenticates them, routes them by event name and
//! version to your handlers, and gives each handler a context with settings,
//! secrets and a platform API client.
//!
//! ## Request flow
//!
//! 1. the raw body is read in full
//! 2. the delivery is authenticated, by HMAC signature or by ES256 runtime
//!    token depending on [`SdkConfig`] (see [`SdkConfig::authenticator`])
//! 3. the version is resolved from the route, `X-Kiket-Event-Version`, or `?version=`
//! 4. the `(event, version)` handler is looked up in the [`HandlerRegistry`]
//! 5. the handler runs with a fresh [`HandlerContext`]
//! 6. the outcome is recorded by the telemetry reporter
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kiket_sdk::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> SdkResult<()> {
//! let sdk = KiketSdk::new(
//!     SdkConfig::builder()
//!         .webhook_secret("whsec_123")
//!         .extension("com.example.triage", "1.0.0")
//!         .build(),
//! );
//!
//! sdk.register("issue.created", "v1", |payload: Payload, _ctx: HandlerContext| async move {
//!     Ok::<_, HandlerError>(json!({"received": payload.len()}))
//! })?;
//!
//! sdk.serve("0.0.0.0:8080").await
//! # }
//! ```
//!
//! ## Crates
//!
//! - [`kiket_auth`] - signatures, runtime tokens, JWKS cache
//! - [`kiket_telemetry`] - outcome reporting and logging bootstrap

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod registry;
pub mod sdk;
pub mod secrets;
pub mod server;
pub mod settings;

pub use client::{Endpoints, KiketClient};
pub use config::{ConfigError, SdkConfig, SdkConfigBuilder};
pub use context::HandlerContext;
pub use dispatcher::{Dispatcher, EVENT_VERSION_HEADER, WebhookRequest};
pub use error::{SdkError, SdkResult};
pub use handler::{HandlerError, Payload, WebhookHandler};
pub use registry::{HandlerRecord, HandlerRegistry};
pub use sdk::KiketSdk;
pub use secrets::SecretResolver;
pub use settings::Settings;

pub use kiket_auth;
pub use kiket_telemetry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        HandlerContext, HandlerError, KiketSdk, Payload, SdkConfig, SdkError, SdkResult, WebhookHandler,
    };
    pub use kiket_auth::AuthContext;
    pub use kiket_telemetry::{LoggingConfig, TelemetryConfig};
}
