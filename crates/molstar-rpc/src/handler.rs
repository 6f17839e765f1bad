//! HTTP request handlers.

use crate::relay::Relay;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use molstar_core::config::{ProtocolConfig, RelayConfig};
use molstar_core::{Envelope, RunResponse};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn bad_request(message: String) -> Response {
    warn!("{}", message);
    (
        StatusCode::BAD_REQUEST,
        Json(RunResponse::failure(message, Vec::new())),
    )
        .into_response()
}

/// Reject requests that announce a protocol version other than ours.
///
/// Requests without the header are accepted.
fn check_protocol_version(headers: &HeaderMap) -> Result<(), Response> {
    let Some(value) = headers.get(ProtocolConfig::VERSION_HEADER) else {
        return Ok(());
    };
    let expected = ProtocolConfig::VERSION.to_string();
    match value.to_str() {
        Ok(version) if version.trim() == expected => Ok(()),
        Ok(version) => Err(bad_request(format!(
            "Unsupported protocol version {} (expected {})",
            version, expected
        ))),
        Err(_) => Err(bad_request("Unreadable protocol version header".to_string())),
    }
}

/// Health check endpoint, also used as the readiness probe.
pub async fn handle_health(State(relay): State<Arc<Relay>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "viewers": relay.viewer_count(),
        "subscribers": relay.subscriber_count(),
    }))
}

/// Root endpoint.
///
/// A WebSocket upgrade here attaches a viewer, the same as on `/ws`. Any
/// other request gets the health report.
pub async fn handle_root(
    State(relay): State<Arc<Relay>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => ws.on_upgrade(move |socket| viewer_session(socket, relay)),
        None => handle_health(State(relay)).await.into_response(),
    }
}

/// Forward a call to every viewer and wait for their replies.
pub async fn handle_run(
    State(relay): State<Arc<Relay>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = check_protocol_version(&headers) {
        return response;
    }
    let name = match Envelope::from_value(&payload) {
        Ok(envelope) => envelope.name(),
        Err(e) => return bad_request(format!("Invalid call envelope: {}", e)),
    };

    debug!("Forwarding {} call", name);
    let response = relay.forward(&payload).await;
    if response.success {
        debug!("{} answered by {} viewers", name, response.responses.len());
    }
    Json(response).into_response()
}

/// Broadcast a payload without waiting for replies.
pub async fn handle_action(
    State(relay): State<Arc<Relay>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    if let Err(response) = check_protocol_version(&headers) {
        return response;
    }
    relay.broadcast(&payload);
    Json(RunResponse::success(Vec::new()).with_message("Request forwarded to all viewers"))
        .into_response()
}

/// Server-sent event stream of forwarded requests.
pub async fn handle_events(
    State(relay): State<Arc<Relay>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = relay.subscribe();
    info!("New event subscriber. Total subscribers: {}", relay.subscriber_count());

    let stream = stream::unfold(events, |mut events| async move {
        loop {
            match events.recv().await {
                Ok(payload) => {
                    return Some((Ok::<_, Infallible>(Event::default().data(payload)), events))
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, skipped {} requests", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(RelayConfig::SSE_KEEP_ALIVE))
}

/// WebSocket endpoint viewers answer requests on.
pub async fn handle_ws(
    State(relay): State<Arc<Relay>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| viewer_session(socket, relay))
}

async fn viewer_session(mut socket: WebSocket, relay: Arc<Relay>) {
    let viewer = relay.attach_viewer();

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(reply) => viewer.reply(reply),
                Err(e) => warn!("Viewer {} sent invalid JSON: {}", viewer.id(), e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Viewer {} socket error: {}", viewer.id(), e);
                break;
            }
        }
    }
}
