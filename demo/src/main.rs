//! Issue triage demo extension
//!
//! Configure with environment variables, e.g.
//!
//! ```text
//! KIKET_WEBHOOK_SECRET=whsec_dev KIKET_EXTENSION_ID=dev.triage cargo run -p kiket-demo
//! ```

use kiket_sdk::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Deserialize)]
struct Issue {
    id: i64,
    title: String,
    #[serde(default)]
    labels: Vec<String>,
}

async fn triage(payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError> {
    let issue: Issue = serde_json::from_value(payload.get("issue").cloned().unwrap_or_default())?;

    let priority = if issue.labels.iter().any(|l| l == "outage") || issue.title.to_lowercase().contains("down") {
        "p1"
    } else {
        ctx.settings().get_str("defaultPriority").unwrap_or("p3")
    };

    info!(issue_id = issue.id, priority, "Triaged issue");
    Ok(json!({"issue_id": issue.id, "priority": priority}))
}

// v2 deliveries nest the issue under `data`
async fn triage_v2(mut payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError> {
    if let Some(issue) = payload.remove("data").and_then(|d| d.get("issue").cloned()) {
        payload.insert("issue".to_string(), issue);
    }
    triage(payload, ctx).await
}

async fn closed(_payload: Payload, ctx: HandlerContext) -> Result<(), HandlerError> {
    ctx.endpoints()
        .log_event("issue.closed.seen", json!({"version": ctx.event_version()}))
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logging = LoggingConfig::builder()
        .service_name("kiket-demo")
        .json_logs(false)
        .build()
        .init()?;

    let config = SdkConfig::from_env()?;
    let sdk = KiketSdk::new(config);

    sdk.register("issue.created", "v1", triage)?;
    sdk.register("issue.created", "v2", triage_v2)?;
    sdk.register("issue.closed", "v1", closed)?;

    let addr = std::env::var("KIKET_DEMO_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    sdk.serve(&addr).await?;
    Ok(())
}
