//! Lifecycle ingest over HTTP.
//!
//! The bridge to the membership platform posts [`LifecycleEvent`]s here;
//! accepted events go onto the router's dispatch channel.
//!
//! - `POST /events` with `Authorization: Bearer <LIFECYCLE_TOKEN>`:
//!   202 when queued, 401 on a bad token (checked before the body is
//!   parsed), 400 or 422 on a malformed event, 503 once shutdown has begun
//! - `GET /healthz`: 200 while running, 503 while draining

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use rolesync_engine::LifecycleEvent;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// Shared ingest state.
#[derive(Clone)]
pub struct IngestState {
    events: mpsc::Sender<LifecycleEvent>,
    token: Arc<str>,
    shutting_down: Arc<AtomicBool>,
}

impl IngestState {
    pub fn new(
        events: mpsc::Sender<LifecycleEvent>,
        token: impl Into<Arc<str>>,
        shutting_down: Arc<AtomicBool>,
    ) -> Self {
        Self {
            events,
            token: token.into(),
            shutting_down,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|presented| constant_time_eq(presented.as_bytes(), self.token.as_bytes()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

pub fn ingest_router(state: IngestState) -> Router {
    Router::new()
        .route("/events", post(post_event))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn post_event(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        warn!("Rejected lifecycle event with invalid token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }

    if state.shutting_down.load(Ordering::Acquire) {
        return unavailable();
    }

    let event: LifecycleEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "Malformed lifecycle event");
            let status = if e.is_data() {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::BAD_REQUEST
            };
            return (status, Json(json!({ "error": e.to_string() })));
        }
    };

    let kind = event.kind();
    match state.events.send(event).await {
        Ok(()) => {
            debug!(kind, "Lifecycle event queued");
            (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
        }
        Err(_) => unavailable(),
    }
}

async fn healthz(State(state): State<IngestState>) -> (StatusCode, Json<Value>) {
    if state.shutting_down.load(Ordering::Acquire) || state.events.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "draining" })),
        );
    }
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

fn unavailable() -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "shutting down" })),
    )
}
