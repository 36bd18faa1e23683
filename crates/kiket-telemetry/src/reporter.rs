//! Best-effort dispatch outcome reporter
//!
//! Two independent sinks:
//!
//! 1. an in-process feedback hook, called synchronously
//! 2. a remote HTTP sink, POSTed to in a background task
//!
//! A failure (error or panic) in one never prevents the other, and nothing
//! is ever propagated to the caller.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::{TELEMETRY_TIMEOUT, TelemetryConfig, telemetry_opted_out};
use crate::record::{DispatchOutcome, TelemetryRecord};

/// Error type a feedback hook may return
pub type FeedbackError = Box<dyn std::error::Error + Send + Sync>;

/// In-process callback receiving every record
pub type FeedbackHook = Arc<dyn Fn(&TelemetryRecord) -> Result<(), FeedbackError> + Send + Sync>;

/// Records one outcome per dispatched request
#[derive(Clone)]
pub struct TelemetryReporter {
    config: TelemetryConfig,
    feedback: Option<FeedbackHook>,
    http_client: reqwest::Client,
    timeout: Duration,
    in_flight: TaskTracker,
}

impl std::fmt::Debug for TelemetryReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryReporter")
            .field("config", &self.config)
            .field("feedback", &self.feedback.as_ref().map(|_| "<hook>"))
            .field("timeout", &self.timeout)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl TelemetryReporter {
    /// Create a reporter
    pub fn new(config: TelemetryConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a reporter that posts through `http_client`
    pub fn with_client(config: TelemetryConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            feedback: None,
            http_client,
            timeout: TELEMETRY_TIMEOUT,
            in_flight: TaskTracker::new(),
        }
    }

    /// Register the feedback hook
    #[must_use]
    pub fn with_feedback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TelemetryRecord) -> Result<(), FeedbackError> + Send + Sync + 'static,
    {
        self.feedback = Some(Arc::new(hook));
        self
    }

    /// Override the remote POST timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Whether a call to [`Self::record`] would currently do anything
    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !telemetry_opted_out()
    }

    /// Record one outcome
    ///
    /// Returns immediately after the feedback hook; the remote POST (5 second
    /// timeout unless overridden) runs in the background. Call [`Self::flush`] before shutdown
    /// to wait for it.
    pub fn record(&self, outcome: DispatchOutcome) {
        if !self.is_enabled() {
            return;
        }

        let record = TelemetryRecord::from_outcome(outcome, &self.config);

        if let Some(hook) = &self.feedback {
            match catch_unwind(AssertUnwindSafe(|| hook(&record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = %record.event, error = %e, "Telemetry feedback hook failed"),
                Err(_) => warn!(event = %record.event, "Telemetry feedback hook panicked"),
            }
        }

        if let Some(endpoint) = self.config.endpoint() {
            self.post(endpoint, record);
        }
    }

    /// Wait for every in-flight remote POST to finish
    pub async fn flush(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }

    fn post(&self, endpoint: String, record: TelemetryRecord) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(event = %record.event, "No async runtime, dropping remote telemetry record");
            return;
        };

        let client = self.http_client.clone();
        let timeout = self.timeout;
        self.in_flight.spawn_on(
            async move {
                let result = client
                    .post(&endpoint)
                    .timeout(timeout)
                    .json(&record)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status);

                match result {
                    Ok(_) => debug!(event = %record.event, status = %record.status, "Telemetry record sent"),
                    Err(e) => warn!(endpoint = %endpoint, error = %e, "Failed to send telemetry record"),
                }
            },
            &runtime,
        );
    }
}
