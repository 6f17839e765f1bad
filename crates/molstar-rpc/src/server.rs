//! HTTP server implementation using Axum.

use crate::handler::{
    handle_action, handle_events, handle_health, handle_root, handle_run, handle_ws,
};
use crate::relay::Relay;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use molstar_core::config::{ProtocolConfig, RelayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the relay router.
pub fn router(relay: Arc<Relay>) -> Router {
    // Viewer pages are served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route(ProtocolConfig::HEALTH_PATH, get(handle_health))
        .route(ProtocolConfig::EVENTS_PATH, get(handle_events))
        .route(ProtocolConfig::WS_PATH, get(handle_ws))
        .route(ProtocolConfig::RUN_PATH, post(handle_run))
        .route(ProtocolConfig::LEGACY_RUN_PATH, post(handle_run))
        .route(ProtocolConfig::ACTION_PATH, post(handle_action))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(RelayConfig::MAX_BODY_BYTES)),
        )
        .with_state(relay)
}

/// Start the relay HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(relay: Arc<Relay>, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(relay);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use molstar_core::api::{LoadModel, SelectionPoll};
    use molstar_core::{BridgeError, Envelope, ShapeViolation, ViewerClient, ViewerReply};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn start(timeout_ms: u64) -> (SocketAddr, Arc<Relay>) {
        let relay = Arc::new(Relay::new(Duration::from_millis(timeout_ms)));
        let addr = start_server(relay.clone(), "127.0.0.1", 0).await.unwrap();
        (addr, relay)
    }

    /// An in-process viewer that answers each request with the same call.
    fn spawn_viewer(relay: &Arc<Relay>) -> tokio::task::JoinHandle<()> {
        let handle = relay.attach_viewer();
        let mut events = relay.subscribe();
        tokio::spawn(async move {
            while let Ok(text) = events.recv().await {
                let envelope = Envelope::from_json(&text).unwrap();
                let reply = ViewerReply::new(&envelope).unwrap();
                handle.reply(serde_json::to_value(reply).unwrap());
            }
        })
    }

    #[tokio::test]
    async fn test_server_starts() {
        let (addr, _relay) = start(100).await;
        assert!(addr.port() > 0);

        let body: Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["viewers"], json!(0));
    }

    #[tokio::test]
    async fn test_client_round_trip_through_relay() {
        let (addr, relay) = start(2_000).await;
        let viewer = spawn_viewer(&relay);

        let client = ViewerClient::new(format!("http://{}", addr)).unwrap();
        let reply = client.send(LoadModel::new("m1", "END\n")).await.unwrap();
        assert_eq!(reply, LoadModel::new("m1", "END\n"));

        let first = client.send(SelectionPoll::new()).await.unwrap();
        let second = client.send(SelectionPoll::new()).await.unwrap();
        assert_eq!(first, second);

        viewer.abort();
    }

    #[tokio::test]
    async fn test_viewer_socket_on_root_path() {
        let (addr, relay) = start(2_000).await;
        let (mut socket, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();

        let attached = async {
            while relay.viewer_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), attached)
            .await
            .unwrap();

        let mut events = relay.subscribe();
        let client = ViewerClient::new(format!("http://{}", addr)).unwrap();
        let call = tokio::spawn(async move { client.send(LoadModel::new("m3", "END")).await });

        let text = events.recv().await.unwrap();
        let envelope = Envelope::from_json(&text).unwrap();
        let reply = serde_json::to_string(&ViewerReply::new(&envelope).unwrap()).unwrap();
        socket.send(Message::Text(reply)).await.unwrap();

        assert_eq!(call.await.unwrap().unwrap(), LoadModel::new("m3", "END"));

        // Plain requests to the root still get the health report.
        let body: Value = reqwest::get(format!("http://{}/", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["viewers"], json!(1));
    }

    #[tokio::test]
    async fn test_legacy_endpoint() {
        let (addr, relay) = start(2_000).await;
        let viewer = spawn_viewer(&relay);

        let client = ViewerClient::builder(format!("http://{}", addr))
            .endpoint(ProtocolConfig::LEGACY_RUN_PATH)
            .build()
            .unwrap();
        assert!(client.send(LoadModel::new("m2", "END")).await.is_ok());

        viewer.abort();
    }

    #[tokio::test]
    async fn test_no_viewers_is_protocol_error() {
        let (addr, _relay) = start(2_000).await;
        let client = ViewerClient::new(format!("http://{}", addr)).unwrap();

        let err = client.send(LoadModel::new("m1", "END")).await.unwrap_err();
        assert!(err.is_protocol(), "got {:?}", err);
        assert_eq!(err.shape_violation(), Some(ShapeViolation::EmptyResponses));
    }

    #[tokio::test]
    async fn test_silent_viewer_times_out() {
        let (addr, relay) = start(200).await;
        let _silent = relay.attach_viewer();
        let client = ViewerClient::new(format!("http://{}", addr)).unwrap();

        match client.send(LoadModel::new("m1", "END")).await.unwrap_err() {
            BridgeError::ProtocolShape { body, .. } => {
                let body: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(body["success"], json!(false));
                assert!(body["message"].as_str().unwrap().contains("Timeout"));
            }
            other => panic!("Expected ProtocolShape, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_other_protocol_version() {
        let (addr, _relay) = start(100).await;
        let response = reqwest::Client::new()
            .post(format!("http://{}/run", addr))
            .header(ProtocolConfig::VERSION_HEADER, "2")
            .json(&json!({"name": "Focus", "data": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rejects_unknown_variant() {
        let (addr, relay) = start(100).await;
        let mut events = relay.subscribe();
        let response = reqwest::Client::new()
            .post(format!("http://{}/run", addr))
            .json(&json!({"name": "Teleport", "data": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], json!(false));
        // Nothing was forwarded.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_action_is_fire_and_forget() {
        let (addr, relay) = start(100).await;
        let mut events = relay.subscribe();
        let body: Value = reqwest::Client::new()
            .post(format!("http://{}/action", addr))
            .json(&json!({"action": "reset"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(events.recv().await.unwrap(), r#"{"action":"reset"}"#);
    }
}
