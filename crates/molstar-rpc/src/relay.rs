//! Request fan-out and reply collection.
//!
//! Viewer pages subscribe to forwarded requests over SSE and answer over a
//! WebSocket. A forwarded request completes when every viewer connected at
//! the time it was sent has answered once, or when the response timeout
//! elapses.

use molstar_core::config::RelayConfig;
use molstar_core::RunResponse;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A viewer's answer, tagged with the connection it came from.
#[derive(Debug)]
struct Reply {
    viewer_id: u64,
    payload: Value,
}

/// Shared relay state.
#[derive(Debug)]
pub struct Relay {
    events: broadcast::Sender<String>,
    reply_tx: mpsc::UnboundedSender<Reply>,
    /// Held for the whole of a forward, so requests are handled one at a time.
    reply_rx: Mutex<mpsc::UnboundedReceiver<Reply>>,
    viewers: Arc<AtomicUsize>,
    next_viewer_id: AtomicU64,
    response_timeout: Duration,
}

impl Relay {
    pub fn new(response_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(RelayConfig::BROADCAST_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            events,
            reply_tx,
            reply_rx: Mutex::new(reply_rx),
            viewers: Arc::new(AtomicUsize::new(0)),
            next_viewer_id: AtomicU64::new(1),
            response_timeout,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Receive every forwarded payload, as sent to SSE clients.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::SeqCst)
    }

    /// Register a viewer that will answer requests.
    ///
    /// The viewer counts as connected until the handle is dropped.
    pub fn attach_viewer(&self) -> ViewerHandle {
        let id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let total = self.viewers.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Viewer {} connected. Total viewers: {}", id, total);
        ViewerHandle {
            id,
            replies: self.reply_tx.clone(),
            viewers: self.viewers.clone(),
        }
    }

    /// Send `payload` to subscribers without waiting for answers.
    pub fn broadcast(&self, payload: &Value) -> usize {
        let text = payload.to_string();
        // Sending fails only when nobody is subscribed.
        let delivered = self.events.send(text).unwrap_or(0);
        debug!("Broadcast to {} subscribers", delivered);
        delivered
    }

    /// Broadcast `payload` and collect one reply per connected viewer.
    pub async fn forward(&self, payload: &Value) -> RunResponse {
        let mut replies_rx = self.reply_rx.lock().await;

        // Answers that arrived after an earlier request timed out.
        while let Ok(stale) = replies_rx.try_recv() {
            debug!("Dropping late reply from viewer {}", stale.viewer_id);
        }

        let expected = self.viewer_count();
        if expected == 0 {
            warn!("No viewers connected, not forwarding");
            return RunResponse::failure("No viewers connected", Vec::new());
        }

        self.broadcast(payload);

        let deadline = Instant::now() + self.response_timeout;
        let mut answered = HashSet::new();
        let mut responses = Vec::with_capacity(expected);

        while responses.len() < expected {
            match tokio::time::timeout_at(deadline, replies_rx.recv()).await {
                Ok(Some(reply)) => {
                    if answered.insert(reply.viewer_id) {
                        responses.push(reply.payload);
                    } else {
                        debug!("Ignoring second reply from viewer {}", reply.viewer_id);
                    }
                }
                // The relay holds a sender, so the channel never closes.
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Timeout waiting for viewers: {}/{} answered",
                        responses.len(),
                        expected
                    );
                    return RunResponse::failure(
                        "Timeout waiting for viewers to respond",
                        responses,
                    );
                }
            }
        }

        RunResponse::success(responses)
            .with_message("Request forwarded to all viewers and responses received")
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::RESPONSE_TIMEOUT)
    }
}

/// A connected viewer's side of the relay.
#[derive(Debug)]
pub struct ViewerHandle {
    id: u64,
    replies: mpsc::UnboundedSender<Reply>,
    viewers: Arc<AtomicUsize>,
}

impl ViewerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver this viewer's answer to the pending request.
    pub fn reply(&self, payload: Value) {
        let reply = Reply {
            viewer_id: self.id,
            payload,
        };
        if self.replies.send(reply).is_err() {
            warn!("Relay gone, dropping reply from viewer {}", self.id);
        }
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        let remaining = self.viewers.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!("Viewer {} disconnected. Total viewers: {}", self.id, remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay(timeout_ms: u64) -> Arc<Relay> {
        Arc::new(Relay::new(Duration::from_millis(timeout_ms)))
    }

    /// A viewer that answers every request with `{"echo": <request>}`.
    fn spawn_echo_viewer(relay: &Arc<Relay>) -> tokio::task::JoinHandle<()> {
        let handle = relay.attach_viewer();
        let mut events = relay.subscribe();
        tokio::spawn(async move {
            while let Ok(text) = events.recv().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                handle.reply(json!({"echo": request}));
            }
        })
    }

    #[tokio::test]
    async fn test_forward_without_viewers_fails_immediately() {
        let relay = relay(5_000);
        let started = std::time::Instant::now();
        let response = relay.forward(&json!({"name": "Focus", "data": {}})).await;
        assert!(!response.success);
        assert!(response.responses.is_empty());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_forward_collects_one_reply_per_viewer() {
        let relay = relay(2_000);
        let first = spawn_echo_viewer(&relay);
        let second = spawn_echo_viewer(&relay);
        assert_eq!(relay.viewer_count(), 2);

        let request = json!({"name": "Focus", "data": {}});
        let response = relay.forward(&request).await;
        assert!(response.success);
        assert_eq!(response.responses.len(), 2);
        assert!(response.responses.iter().all(|r| r["echo"] == request));

        first.abort();
        second.abort();
    }

    #[tokio::test]
    async fn test_forward_times_out_with_partial_replies() {
        let relay = relay(300);
        let answering = spawn_echo_viewer(&relay);
        let _silent = relay.attach_viewer();

        let response = relay.forward(&json!({"name": "ResetView", "data": {}})).await;
        assert!(!response.success);
        assert_eq!(response.responses.len(), 1);
        assert!(response.message.unwrap().contains("Timeout"));

        answering.abort();
    }

    #[tokio::test]
    async fn test_stale_replies_are_discarded() {
        let relay = relay(300);
        let viewer = relay.attach_viewer();
        viewer.reply(json!(1));

        let response = relay.forward(&json!({})).await;
        assert!(!response.success);
        assert!(response.responses.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_replies_count_once() {
        let relay = relay(300);
        let chatty = relay.attach_viewer();
        let _silent = relay.attach_viewer();
        let mut events = relay.subscribe();
        let task = tokio::spawn(async move {
            while events.recv().await.is_ok() {
                chatty.reply(json!("first"));
                chatty.reply(json!("second"));
            }
        });

        let response = relay.forward(&json!({})).await;
        assert!(!response.success);
        assert_eq!(response.responses, vec![json!("first")]);

        task.abort();
    }

    #[tokio::test]
    async fn test_dropping_handle_disconnects_viewer() {
        let relay = relay(100);
        let handle = relay.attach_viewer();
        assert_eq!(relay.viewer_count(), 1);
        drop(handle);
        assert_eq!(relay.viewer_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let relay = relay(100);
        assert_eq!(relay.broadcast(&json!({"a": 1})), 0);

        let mut events = relay.subscribe();
        assert_eq!(relay.subscriber_count(), 1);
        assert_eq!(relay.broadcast(&json!({"a": 1})), 1);
        assert_eq!(events.recv().await.unwrap(), r#"{"a":1}"#);
    }
}
