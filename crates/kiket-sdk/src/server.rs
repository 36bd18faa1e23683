//! HTTP surface
//!
//! - `POST /webhooks/{event}` - version from header or query
//! - `POST /v/{version}/webhooks/{event}` - version from the path
//! - `GET /health` - unauthenticated liveness and registration summary

use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dispatcher::{Dispatcher, WebhookRequest};

/// Maximum webhook body size (10MB)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    extension_id: Option<String>,
    extension_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<String>,
}

/// Build the router serving `dispatcher`
pub fn router(dispatcher: Arc<Dispatcher>, extension_id: Option<String>, extension_version: Option<String>) -> Router {
    let state = AppState {
        dispatcher,
        extension_id,
        extension_version,
    };

    Router::new()
        .route("/webhooks/{event}", post(handle_webhook))
        .route("/v/{version}/webhooks/{event}", post(handle_versioned_webhook))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_webhook(
    State(state): State<AppState>,
    Path(event): Path<String>,
    query: Result<Query<VersionQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest {
        event,
        path_version: None,
        query_version: query_version(query),
        headers,
        body,
    };
    respond(&state, request).await
}

async fn handle_versioned_webhook(
    State(state): State<AppState>,
    Path((version, event)): Path<(String, String)>,
    query: Result<Query<VersionQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest {
        event,
        path_version: Some(version),
        query_version: query_version(query),
        headers,
        body,
    };
    respond(&state, request).await
}

async fn respond(state: &AppState, request: WebhookRequest) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

// A malformed query string is treated as carrying no version
fn query_version(query: Result<Query<VersionQuery>, QueryRejection>) -> Option<String> {
    query.ok().and_then(|Query(q)| q.version)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let registry = state.dispatcher.registry();
    let handlers: Vec<Value> = registry
        .all()
        .iter()
        .map(|record| json!({"event": record.event, "version": record.version}))
        .collect();

    Json(json!({
        "status": "ok",
        "extension_id": state.extension_id,
        "extension_version": state.extension_version,
        "auth_mode": state.dispatcher.authenticator().mode(),
        "events": registry.event_names(),
        "handlers": handlers,
    }))
}
