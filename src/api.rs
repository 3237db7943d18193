//! HTTP and WebSocket surface for the download service (axum).
//!
//! Every JSON endpoint answers with HTTP 200 and a `success` flag; failures
//! carry an `error` message instead of a status code.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Json};
use axum::routing::{MethodRouter, get, post};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::intake::parse_request;
use crate::push::BroadcastChannel;
use crate::service::DownloadService;

pub const DOWNLOAD_ROUTE: &str = "/download";
pub const PROGRESS_ROUTE: &str = "/download-progress/:id";
pub const LIST_ROUTE: &str = "/downloads";
pub const WS_ROUTE: &str = "/ws";

const NOT_FOUND_MESSAGE: &str = "Download not found";

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub service: Arc<DownloadService>,
    pub push: BroadcastChannel,
}

/// Idempotent route registration.
///
/// Remembers every registered path pattern, including ones the host declared
/// itself, and skips duplicates with an `info` log. Patterns are compared by
/// their static prefix, so `/download-progress/:id` and
/// `/download-progress/{download_id}` are the same route.
#[derive(Debug)]
pub struct RouteRegistrar<S = ()> {
    router: Router<S>,
    registered: BTreeSet<String>,
}

impl<S> RouteRegistrar<S>
where
    S: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(router: Router<S>) -> Self {
        Self {
            router,
            registered: BTreeSet::new(),
        }
    }

    /// Marks patterns the host already serves.
    #[must_use]
    pub fn with_existing<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        for pattern in patterns {
            self.registered.insert(route_key(pattern.as_ref()).to_string());
        }
        self
    }

    #[must_use]
    pub fn is_registered(&self, pattern: &str) -> bool {
        self.registered.contains(route_key(pattern))
    }

    /// Adds `pattern` unless an equivalent route is already registered.
    #[must_use]
    pub fn route(mut self, pattern: &str, method_router: MethodRouter<S>) -> Self {
        if self.is_registered(pattern) {
            info!(route = pattern, "route already registered, skipping");
            return self;
        }
        debug!(route = pattern, "registering route");
        self.registered.insert(route_key(pattern).to_string());
        self.router = self.router.route(pattern, method_router);
        self
    }

    #[must_use]
    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

/// Static part of a route pattern, up to the first parameter or wildcard.
fn route_key(pattern: &str) -> &str {
    let end = pattern.find([':', '{', '*']).unwrap_or(pattern.len());
    &pattern[..end]
}

/// Adds the download routes to `registrar`.
#[must_use]
pub fn register_routes(registrar: RouteRegistrar<ApiState>) -> RouteRegistrar<ApiState> {
    registrar
        .route(DOWNLOAD_ROUTE, post(submit_download))
        .route(PROGRESS_ROUTE, get(download_progress))
        .route(LIST_ROUTE, get(list_downloads))
        .route(WS_ROUTE, get(websocket_handler))
}

/// Builds a router serving every download route.
pub fn router(service: Arc<DownloadService>, push: BroadcastChannel) -> Router {
    register_routes(RouteRegistrar::new(Router::new()))
        .into_router()
        .with_state(ApiState { service, push })
}

fn failure(error: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "success": false, "error": error.to_string() }))
}

async fn submit_download(
    State(state): State<ApiState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Json<Value> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let request = match parse_request(content_type, query.as_deref(), &body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "could not decode download request");
            return failure(e);
        }
    };

    match state.service.submit(request) {
        Ok(ticket) => Json(json!({
            "success": true,
            "download_id": ticket.download_id,
            "status": ticket.status,
            "message": ticket.message,
        })),
        Err(e) => {
            warn!(error = %e, "download request rejected");
            failure(e)
        }
    }
}

async fn download_progress(
    State(state): State<ApiState>,
    Path(download_id): Path<String>,
) -> Json<Value> {
    match state.service.progress(&download_id) {
        Some(record) => Json(json!({ "success": true, "download": record })),
        None => failure(NOT_FOUND_MESSAGE),
    }
}

async fn list_downloads(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "success": true, "downloads": state.service.list() }))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_events(socket, state.push))
}

/// Forwards push events to one WebSocket client until either side closes.
async fn forward_events(socket: WebSocket, push: BroadcastChannel) {
    let mut events = push.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!("websocket subscriber connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(message) => {
                    let payload = match serde_json::to_string(&message) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "could not serialize push event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("websocket subscriber disconnected");
}
