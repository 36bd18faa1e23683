//! Event/version handler registry
//!
//! Lookups are exact: the dispatcher resolves a version before calling
//! [`HandlerRegistry::get`], and there is no wildcard or fallback version.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{SdkError, SdkResult};
use crate::handler::WebhookHandler;

/// One registered handler
#[derive(Clone)]
pub struct HandlerRecord {
    /// Event name
    pub event: String,
    /// Event version
    pub version: String,
    /// The handler
    pub handler: Arc<dyn WebhookHandler>,
}

impl HandlerRecord {
    /// Composite `event:version` key
    pub fn key(&self) -> String {
        format!("{}:{}", self.event, self.version)
    }
}

impl fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("event", &self.event)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Maps `(event, version)` to handlers
///
/// Read-mostly after startup; registration at runtime is allowed and takes a
/// map-level write lock that is never held across an `.await`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<(String, String), HandlerRecord>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry").field("handlers", &self.len()).finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event` at `version`
    ///
    /// Registering the same pair again replaces the previous handler.
    ///
    /// # Errors
    ///
    /// [`SdkError::InvalidRegistration`] if `event` or `version` is blank.
    pub fn register<H>(&self, event: &str, version: &str, handler: H) -> SdkResult<()>
    where
        H: WebhookHandler + 'static,
    {
        self.register_arc(event, version, Arc::new(handler))
    }

    /// Register an already shared handler
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub fn register_arc(&self, event: &str, version: &str, handler: Arc<dyn WebhookHandler>) -> SdkResult<()> {
        let event = event.trim();
        let version = version.trim();
        if event.is_empty() {
            return Err(SdkError::InvalidRegistration("event name must not be empty".to_string()));
        }
        if version.is_empty() {
            return Err(SdkError::InvalidRegistration(format!(
                "version for event '{event}' must not be empty"
            )));
        }

        let record = HandlerRecord {
            event: event.to_string(),
            version: version.to_string(),
            handler,
        };
        let replaced = self
            .handlers
            .write()
            .insert((record.event.clone(), record.version.clone()), record)
            .is_some();

        debug!(event, version, replaced, "Registered webhook handler");
        Ok(())
    }

    /// Exact lookup
    pub fn get(&self, event: &str, version: &str) -> Option<HandlerRecord> {
        self.handlers
            .read()
            .get(&(event.to_string(), version.to_string()))
            .cloned()
    }

    /// Distinct event names across all versions
    pub fn event_names(&self) -> BTreeSet<String> {
        self.handlers.read().keys().map(|(event, _)| event.clone()).collect()
    }

    /// Every registration, ordered by event then version
    pub fn all(&self) -> Vec<HandlerRecord> {
        let mut records: Vec<_> = self.handlers.read().values().cloned().collect();
        records.sort_by(|a, b| (&a.event, &a.version).cmp(&(&b.event, &b.version)));
        records
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
