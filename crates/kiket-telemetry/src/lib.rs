//! Outcome reporting and observability for Kiket extensions
//!
//! - **Dispatch telemetry**: one [`TelemetryRecord`] per handled webhook,
//!   delivered to an in-process feedback hook and/or a remote sink
//! - **Structured logging**: [`LoggingConfig`] installs a `tracing` subscriber
//!   with JSON or human-readable output
//!
//! Telemetry is strictly best effort. Recording never returns an error and
//! never panics into the caller; sink failures are logged and dropped.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kiket_telemetry::{DispatchOutcome, TelemetryConfig, TelemetryReporter};
//!
//! # async fn run() {
//! let reporter = TelemetryReporter::new(
//!     TelemetryConfig::default()
//!         .with_telemetry_url("https://telemetry.example.com")
//!         .with_extension("com.example.triage", "1.2.0"),
//! );
//!
//! reporter.record(DispatchOutcome::ok("issue.created", "v1", 12));
//! reporter.flush().await;
//! # }
//! ```
//!
//! # Opting out
//!
//! Setting `KIKET_SDK_TELEMETRY_OPTOUT=1` disables every sink. The variable is
//! read on each call, so it can be toggled at runtime.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod logging;
mod record;
mod reporter;

pub use config::{OPT_OUT_ENV, TELEMETRY_TIMEOUT, TelemetryConfig, telemetry_opted_out};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LoggingConfig, LoggingConfigBuilder, LoggingGuard};
pub use record::{DispatchOutcome, DispatchStatus, TelemetryRecord};
pub use reporter::{FeedbackError, FeedbackHook, TelemetryReporter};

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::{
        DispatchOutcome, DispatchStatus, LoggingConfig, LoggingGuard, TelemetryConfig, TelemetryRecord,
        TelemetryReporter,
    };
    pub use tracing::{Instrument, debug, error, info, instrument, trace, warn};
}
