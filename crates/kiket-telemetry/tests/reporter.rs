//! Reporter behaviour against a live (mock) telemetry sink
//!
//! Every test touching `record` is serialized because the opt-out variable
//! is process-global.

use kiket_telemetry::{DispatchOutcome, DispatchStatus, OPT_OUT_ENV, TelemetryConfig, TelemetryRecord, TelemetryReporter};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn capture() -> (Arc<Mutex<Vec<TelemetryRecord>>>, impl Fn(&TelemetryRecord) -> Result<(), kiket_telemetry::FeedbackError>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |record: &TelemetryRecord| {
        sink.lock().unwrap().push(record.clone());
        Ok(())
    })
}

fn clear_opt_out() {
    unsafe { std::env::remove_var(OPT_OUT_ENV) };
}

#[tokio::test]
#[serial]
async fn test_record_posts_to_sink() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .and(body_partial_json(serde_json::json!({
            "event": "issue.created",
            "version": "v1",
            "status": "ok",
            "duration_ms": 12,
            "extension_id": "ext.triage",
            "extension_version": "1.0.0"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = TelemetryReporter::new(
        TelemetryConfig::default()
            .with_telemetry_url(server.uri())
            .with_extension("ext.triage", "1.0.0"),
    );
    reporter.record(DispatchOutcome::ok("issue.created", "v1", 12));
    reporter.flush().await;

    server.verify().await;
}

#[tokio::test]
#[serial]
async fn test_feedback_hook_receives_error_record() {
    clear_opt_out();
    let (seen, hook) = capture();
    let reporter = TelemetryReporter::new(TelemetryConfig::default()).with_feedback(hook);

    reporter.record(
        DispatchOutcome::error("issue.updated", "v2", 7, "db down", "StoreError").with_metadata("retry", true),
    );

    let records = seen.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DispatchStatus::Error);
    assert_eq!(records[0].error_message.as_deref(), Some("db down"));
    assert_eq!(records[0].error_class.as_deref(), Some("StoreError"));
    assert_eq!(records[0].metadata["retry"], serde_json::json!(true));
}

#[tokio::test]
#[serial]
async fn test_failing_hook_does_not_block_sink() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri()))
        .with_feedback(|_| Err("hook exploded".into()));

    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    reporter.flush().await;

    server.verify().await;
}

#[tokio::test]
#[serial]
async fn test_panicking_hook_is_contained() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri()))
        .with_feedback(|_| panic!("hook panicked"));

    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    reporter.flush().await;

    server.verify().await;
}

#[tokio::test]
#[serial]
async fn test_sink_failure_still_calls_hook() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (seen, hook) = capture();
    let reporter =
        TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri())).with_feedback(hook);

    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    reporter.flush().await;

    assert_eq!(seen.lock().unwrap().len(), 1);
    server.verify().await;
}

#[tokio::test]
#[serial]
async fn test_unreachable_sink_is_swallowed() {
    clear_opt_out();
    let (seen, hook) = capture();
    let reporter =
        TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url("http://127.0.0.1:9")).with_feedback(hook);

    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    reporter.flush().await;

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_slow_sink_times_out() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let (seen, hook) = capture();
    let reporter = TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri()))
        .with_timeout(Duration::from_millis(100))
        .with_feedback(hook);

    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    assert_eq!(seen.lock().unwrap().len(), 1);

    tokio::time::timeout(Duration::from_secs(2), reporter.flush())
        .await
        .expect("flush should return once the POST times out");
}

#[tokio::test]
#[serial]
async fn test_opt_out_disables_both_sinks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (seen, hook) = capture();
    let reporter =
        TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri())).with_feedback(hook);

    unsafe { std::env::set_var(OPT_OUT_ENV, "1") };
    assert!(!reporter.is_enabled());
    reporter.record(DispatchOutcome::ok("e", "v1", 1));
    reporter.flush().await;
    clear_opt_out();

    assert!(seen.lock().unwrap().is_empty());
    server.verify().await;
}

#[tokio::test]
#[serial]
async fn test_opt_out_is_read_at_call_time() {
    let (seen, hook) = capture();
    let reporter = TelemetryReporter::new(TelemetryConfig::default()).with_feedback(hook);

    unsafe { std::env::set_var(OPT_OUT_ENV, "true") };
    reporter.record(DispatchOutcome::ok("first", "v1", 1));

    unsafe { std::env::set_var(OPT_OUT_ENV, "0") };
    reporter.record(DispatchOutcome::ok("second", "v1", 1));
    clear_opt_out();

    let records = seen.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, "second");
}

#[tokio::test]
#[serial]
async fn test_flush_can_be_called_repeatedly() {
    clear_opt_out();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let reporter = TelemetryReporter::new(TelemetryConfig::default().with_telemetry_url(server.uri()));
    reporter.record(DispatchOutcome::ok("a", "v1", 1));
    reporter.flush().await;
    reporter.record(DispatchOutcome::ok("b", "v1", 1));
    reporter.flush().await;

    server.verify().await;
}
