//! Webhook handler trait

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;

use crate::context::HandlerContext;

/// Deserialized webhook body handed to handlers
pub type Payload = Map<String, Value>;

/// Failure returned by a webhook handler
///
/// Any `std::error::Error` converts into it with `?`; the source type's name
/// becomes the error class reported to telemetry. The message is what the
/// platform sees in the 500 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    kind: String,
    message: String,
}

impl HandlerError {
    /// Error with an explicit class
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Error with the generic `HandlerError` class
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("HandlerError", message)
    }

    /// Error class
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Message exposed to the caller
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Strip generic arguments before taking the last path segment
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Handles one event version
///
/// Implemented automatically for async closures and functions of the shape
/// `async fn(Payload, HandlerContext) -> Result<impl Serialize, HandlerError>`.
/// Returning `()` (or anything that serializes to `null`) answers
/// `{"ok": true}`.
///
/// # Example
///
/// ```rust
/// use kiket_sdk::{HandlerContext, HandlerError, Payload};
/// use serde_json::{json, Value};
///
/// async fn on_issue_created(payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError> {
///     let title = payload.get("title").and_then(Value::as_str).unwrap_or_default();
///     Ok(json!({"seen": title, "version": ctx.event_version()}))
/// }
/// ```
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Handle one delivery
    async fn handle(&self, payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut, R> WebhookHandler for F
where
    F: Fn(Payload, HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError> {
        let result = (self)(payload, ctx).await?;
        Ok(serde_json::to_value(result)?)
    }
}
