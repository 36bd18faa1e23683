//! End-to-end dispatch through the axum router in signature mode

mod common;

use axum::body::Body;
use common::{SECRET, send, signed_post};
use http::{Request, StatusCode};
use kiket_auth::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER, generate_signature};
use kiket_sdk::prelude::*;
use kiket_telemetry::{DispatchStatus, TelemetryRecord};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Records = Arc<Mutex<Vec<TelemetryRecord>>>;

fn sdk_with(config: SdkConfig) -> (KiketSdk, Records) {
    let records: Records = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&records);
    let sdk = KiketSdk::new(config).with_feedback(move |record| {
        sink.lock().unwrap().push(record.clone());
        Ok(())
    });
    (sdk, records)
}

fn sdk() -> (KiketSdk, Records) {
    sdk_with(
        SdkConfig::builder()
            .webhook_secret(SECRET)
            .extension("ext.test", "1.2.3")
            .build(),
    )
}

async fn echo(payload: Payload, ctx: HandlerContext) -> Result<Value, HandlerError> {
    Ok(json!({
        "event": ctx.event(),
        "version": ctx.event_version(),
        "payload": payload,
    }))
}

async fn nothing(_payload: Payload, _ctx: HandlerContext) -> Result<(), HandlerError> {
    Ok(())
}

async fn failing(_payload: Payload, _ctx: HandlerContext) -> Result<Value, HandlerError> {
    Err(HandlerError::new("ValidationError", "title is required"))
}

async fn parse_failure(payload: Payload, _ctx: HandlerContext) -> Result<Value, HandlerError> {
    let raw = payload.get("count").and_then(Value::as_str).unwrap_or_default();
    let count: i64 = raw.parse()?;
    Ok(json!({"count": count}))
}

async fn exploding(_payload: Payload, _ctx: HandlerContext) -> Result<Value, HandlerError> {
    panic!("kaboom")
}

fn counting(
    calls: &Arc<AtomicUsize>,
) -> impl Fn(Payload, HandlerContext) -> std::future::Ready<Result<(), HandlerError>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |_payload: Payload, _ctx: HandlerContext| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_signed_delivery_with_header_version() {
    let (sdk, records) = sdk();
    sdk.register("issue.created", "v1", echo).unwrap();

    let body = r#"{"issue":{"id":42}}"#;
    let request = signed_post("/webhooks/issue.created", body)
        .header("x-kiket-event-version", "v1")
        .body(Body::from(body))
        .unwrap();

    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!({"event": "issue.created", "version": "v1", "payload": {"issue": {"id": 42}}})
    );

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DispatchStatus::Ok);
    assert_eq!(records[0].event, "issue.created");
    assert_eq!(records[0].version, "v1");
    assert_eq!(records[0].extension_id.as_deref(), Some("ext.test"));
    assert_eq!(records[0].extension_version.as_deref(), Some("1.2.3"));
}

#[tokio::test]
async fn test_version_from_path() {
    let (sdk, _) = sdk();
    sdk.register("issue.created", "v2", echo).unwrap();

    let request = signed_post("/v/v2/webhooks/issue.created", "{}")
        .body(Body::from("{}"))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["version"], "v2");
}

#[tokio::test]
async fn test_version_from_query() {
    let (sdk, _) = sdk();
    sdk.register("issue.created", "2024-06", echo).unwrap();

    let request = signed_post("/webhooks/issue.created?version=2024-06", "{}")
        .body(Body::from("{}"))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["version"], "2024-06");
}

#[tokio::test]
async fn test_path_version_beats_header_and_query() {
    let (sdk, _) = sdk();
    sdk.register("e", "v1", echo).unwrap();
    sdk.register("e", "v2", echo).unwrap();
    sdk.register("e", "v3", echo).unwrap();

    let request = signed_post("/v/v1/webhooks/e?version=v3", "{}")
        .header("x-kiket-event-version", "v2")
        .body(Body::from("{}"))
        .unwrap();
    let (_, response) = send(sdk.router(), request).await;
    assert_eq!(response["version"], "v1");

    let request = signed_post("/webhooks/e?version=v3", "{}")
        .header("x-kiket-event-version", "v2")
        .body(Body::from("{}"))
        .unwrap();
    let (_, response) = send(sdk.router(), request).await;
    assert_eq!(response["version"], "v2");
}

#[tokio::test]
async fn test_missing_version_is_rejected_before_invocation() {
    let (sdk, records) = sdk();
    let calls = Arc::new(AtomicUsize::new(0));
    sdk.register("e", "v1", counting(&calls)).unwrap();

    let request = signed_post("/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Event version required");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unregistered_version_is_not_found() {
    let (sdk, records) = sdk();
    sdk.register("issue.closed", "v1", echo).unwrap();

    let request = signed_post("/v/v9/webhooks/issue.closed", "{}")
        .body(Body::from("{}"))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["event"], "issue.closed");
    assert_eq!(response["version"], "v9");
    assert_eq!(
        response["error"],
        "No handler registered for event 'issue.closed' version 'v9'"
    );
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let (sdk, records) = sdk();
    let calls = Arc::new(AtomicUsize::new(0));
    sdk.register("e", "v1", counting(&calls)).unwrap();

    let (_, timestamp) = generate_signature(SECRET, b"{}", None);
    let request = Request::builder()
        .method("POST")
        .uri("/v/v1/webhooks/e")
        .header(SIGNATURE_HEADER, "0".repeat(64))
        .header(TIMESTAMP_HEADER, timestamp)
        .body(Body::from("{}"))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "invalid_signature");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() {
    let (sdk, _) = sdk();
    sdk.register("e", "v1", echo).unwrap();

    let request = signed_post("/v/v1/webhooks/e", r#"{"amount":10}"#)
        .body(Body::from(r#"{"amount":11}"#))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "invalid_signature");
}

#[tokio::test]
async fn test_missing_signature_headers() {
    let (sdk, _) = sdk();
    sdk.register("e", "v1", echo).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/v/v1/webhooks/e")
        .body(Body::from("{}"))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "missing_header");
}

#[tokio::test]
async fn test_no_secret_fails_closed() {
    let (sdk, _) = sdk_with(SdkConfig::default());
    sdk.register("e", "v1", echo).unwrap();

    let request = signed_post("/v/v1/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "config_error");
}

#[tokio::test]
async fn test_auth_failure_telemetry_when_enabled() {
    let (sdk, records) = sdk_with(
        SdkConfig::builder()
            .webhook_secret(SECRET)
            .telemetry_on_auth_failure(true)
            .build(),
    );
    sdk.register("e", "v1", echo).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/v/v1/webhooks/e")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(sdk.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DispatchStatus::Error);
    assert_eq!(records[0].version, "v1");
    assert_eq!(records[0].error_class.as_deref(), Some("auth_error"));
    assert_eq!(records[0].metadata["reason"], "missing_header");
}

#[tokio::test]
async fn test_unit_result_answers_ok_true() {
    let (sdk, _) = sdk();
    sdk.register("e", "v1", nothing).unwrap();

    let request = signed_post("/v/v1/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"ok": true}));
}

#[tokio::test]
async fn test_empty_body_is_an_empty_payload() {
    let (sdk, _) = sdk();
    sdk.register("e", "v1", echo).unwrap();

    let request = signed_post("/v/v1/webhooks/e", "").body(Body::empty()).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["payload"], json!({}));
}

#[tokio::test]
async fn test_handler_error_is_500_with_message() {
    let (sdk, records) = sdk();
    sdk.register("e", "v1", failing).unwrap();

    let request = signed_post("/v/v1/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response, json!({"error": "title is required"}));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DispatchStatus::Error);
    assert_eq!(records[0].error_message.as_deref(), Some("title is required"));
    assert_eq!(records[0].error_class.as_deref(), Some("ValidationError"));
}

#[tokio::test]
async fn test_std_error_class_is_recorded() {
    let (sdk, records) = sdk();
    sdk.register("e", "v1", parse_failure).unwrap();

    let body = r#"{"count":"many"}"#;
    let request = signed_post("/v/v1/webhooks/e", body).body(Body::from(body)).unwrap();
    let (status, _) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(records.lock().unwrap()[0].error_class.as_deref(), Some("ParseIntError"));
}

#[tokio::test]
async fn test_panicking_handler_does_not_take_down_the_router() {
    let (sdk, records) = sdk();
    sdk.register("e", "v1", exploding).unwrap();
    sdk.register("e", "v2", nothing).unwrap();
    let app = sdk.router();

    let request = signed_post("/v/v1/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, response) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response["error"], "kaboom");

    let request = signed_post("/v/v2/webhooks/e", "{}").body(Body::from("{}")).unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].error_class.as_deref(), Some("Panic"));
    assert_eq!(records[1].status, DispatchStatus::Ok);
}

#[tokio::test]
async fn test_non_object_payload_is_bad_request() {
    let (sdk, _) = sdk();
    let calls = Arc::new(AtomicUsize::new(0));
    sdk.register("e", "v1", counting(&calls)).unwrap();

    for body in ["[1,2]", "{broken"] {
        let request = signed_post("/v/v1/webhooks/e", body).body(Body::from(body)).unwrap();
        let (status, _) = send(sdk.router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handler_context_contents() {
    let (sdk, _) = sdk_with(
        SdkConfig::builder()
            .webhook_secret(SECRET)
            .workspace_token("ws-token")
            .extension("ext.test", "1.2.3")
            .manifest_default("channel", "#general")
            .manifest_default("limit", 5)
            .setting("channel", "#ops")
            .build(),
    );
    sdk.register(
        "e",
        "v1",
        |_payload: Payload, ctx: HandlerContext| async move {
            Ok::<_, HandlerError>(json!({
                "channel": ctx.setting("channel"),
                "limit": ctx.setting("limit"),
                "secret": ctx.secret("slackToken").map(|s| s.expose_secret().clone()),
                "request_id": ctx.header("X-Request-Id"),
                "extension_id": ctx.extension_id(),
                "extension_version": ctx.extension_version(),
                "client_version": ctx.client().event_version(),
                "authenticated_client": ctx.client().is_authenticated(),
                "has_auth": ctx.auth().is_some(),
            }))
        },
    )
    .unwrap();

    let body = r#"{"secrets":{"slackToken":"xoxb-1"}}"#;
    let request = signed_post("/v/v1/webhooks/e", body)
        .header("x-request-id", "req-7")
        .body(Body::from(body))
        .unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!({
            "channel": "#ops",
            "limit": 5,
            "secret": "xoxb-1",
            "request_id": "req-7",
            "extension_id": "ext.test",
            "extension_version": "1.2.3",
            "client_version": "v1",
            "authenticated_client": true,
            "has_auth": false,
        })
    );
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let (sdk, _) = sdk();
    sdk.register("issue.created", "v1", nothing).unwrap();
    sdk.register("issue.created", "v2", nothing).unwrap();
    sdk.register("issue.closed", "v1", nothing).unwrap();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, response) = send(sdk.router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["extension_id"], "ext.test");
    assert_eq!(response["extension_version"], "1.2.3");
    assert_eq!(response["auth_mode"], "signature");
    assert_eq!(response["events"], json!(["issue.closed", "issue.created"]));
    assert_eq!(response["handlers"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_runtime_registration_is_visible_to_existing_router() {
    let (sdk, _) = sdk();
    let app = sdk.router();
    sdk.register("late", "v1", nothing).unwrap();

    let request = signed_post("/v/v1/webhooks/late", "{}").body(Body::from("{}")).unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
}
