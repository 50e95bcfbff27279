//! HTTP surface: the runner document, the registry API for pane consumers
//! and a WebSocket feed of registry events.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;

use crate::artifact::{Artifact, FenceParser};
use crate::bridge::{BridgeOutcome, Transcript, TransportEvent};
use crate::registry::{self, RegistryEvent, SharedRegistry};
use crate::sandbox::RunnerDocument;
use crate::sandbox::assets;
use crate::sandbox::document::{EmbedDescriptor, RUNNER_CSP, RUNNER_PATH};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Options for [`start_server`].
pub struct ServeOptions {
    pub port: u16,
    pub dev_mode: bool,
}

pub struct AppState {
    pub registry: SharedRegistry,
    pub document: RunnerDocument,
    transcript: Mutex<Transcript>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(registry: SharedRegistry, parser: Arc<FenceParser>) -> Self {
        Self {
            transcript: Mutex::new(Transcript::new(registry.clone(), parser)),
            registry,
            document: RunnerDocument::default(),
        }
    }

    fn transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(RUNNER_PATH, get(runner_document))
        .route(&format!("{}/{{version}}/{{*path}}", RUNNER_PATH), get(runner_asset))
        .route("/api/runner", get(runner_embed))
        .route("/api/artifacts", get(list_artifacts))
        .route("/api/artifacts/current", get(current_artifact))
        .route("/api/artifacts/{id}/open", post(open_artifact))
        .route("/api/pane/close", post(close_pane))
        .route("/api/pane/width", put(set_pane_width))
        .route("/api/events", post(post_event))
        .route("/api/messages/{id}", delete(forget_message))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn runner_document(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let document = &state.document;
    let etag = HeaderValue::from_str(document.etag()).unwrap_or(HeaderValue::from_static("\"\""));

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| document.matches(v));
    if not_modified {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8")),
            (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=600")),
            (header::ETAG, etag),
            (header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(RUNNER_CSP)),
        ],
        document.html().to_string(),
    )
        .into_response()
}

/// Scripts are only served for the document's own version, so they can be
/// cached for good.
async fn runner_asset(
    State(state): State<SharedState>,
    Path((version, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if version != state.document.version() {
        return Err(ApiError::NotFound(format!("Runner version {} not available", version)));
    }
    let asset = assets::lookup(&path)
        .ok_or_else(|| ApiError::NotFound(format!("Runner asset {} not found", path)))?;
    let etag = HeaderValue::from_str(&asset.etag).unwrap_or(HeaderValue::from_static("\"\""));

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').map(str::trim).any(|tag| tag == asset.etag));
    if not_modified {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable")),
            (header::ETAG, etag),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        ],
        asset.body.into_owned(),
    )
        .into_response())
}

async fn runner_embed(State(state): State<SharedState>) -> Json<EmbedDescriptor> {
    Json(state.document.embed())
}

async fn list_artifacts(State(state): State<SharedState>) -> Json<Vec<Artifact>> {
    let artifacts = registry::read(&state.registry)
        .list()
        .iter()
        .map(|a| a.as_ref().clone())
        .collect();
    Json(artifacts)
}

async fn current_artifact(State(state): State<SharedState>) -> impl IntoResponse {
    Json(registry::read(&state.registry).pane_snapshot())
}

async fn open_artifact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut reg = registry::write(&state.registry);
    if !reg.open(&id) {
        return Err(ApiError::NotFound(format!("Artifact {} not found", id)));
    }
    Ok(Json(reg.pane_snapshot()))
}

async fn close_pane(State(state): State<SharedState>) -> impl IntoResponse {
    let mut reg = registry::write(&state.registry);
    reg.close();
    Json(reg.pane_snapshot())
}

#[derive(Debug, Deserialize)]
struct WidthRequest {
    width: u32,
}

async fn set_pane_width(
    State(state): State<SharedState>,
    Json(request): Json<WidthRequest>,
) -> impl IntoResponse {
    let mut reg = registry::write(&state.registry);
    reg.set_pane_width(request.width);
    Json(reg.pane_snapshot())
}

/// Feed one transport event through the stream bridges.
async fn post_event(
    State(state): State<SharedState>,
    body: String,
) -> Result<Json<BridgeOutcome>, ApiError> {
    let event: TransportEvent = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid transport event: {}", e)))?;
    Ok(Json(state.transcript().apply(event)))
}

/// Release a message's bridge once its view is gone.
async fn forget_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.transcript().remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Message {} is not tracked", id)))
    }
}

// ── WebSocket event feed ──────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    let rx = registry::read(&state.registry).subscribe();
    ws.on_upgrade(move |socket| run_socket_loop(socket, rx))
}

/// Forward registry events to the client with ping/pong keepalive.
async fn run_socket_loop(socket: WebSocket, mut rx: broadcast::Receiver<RegistryEvent>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event feed lagged");
                        continue;
                    }
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Startup ───────────────────────────────────────────────────────────

pub async fn start_server(state: SharedState, options: ServeOptions) -> Result<()> {
    let mut app = build_router(state);

    if options.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if options.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, options.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "artifact host listening");
    println!("Artifact host running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
