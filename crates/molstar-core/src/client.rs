//! HTTP client for the viewer relay.
//!
//! Sends one call per request to the relay's run endpoint and returns the
//! call as populated by the viewer.
//!
//! # Thread Safety
//!
//! The client holds a tokio `Mutex` for the duration of each call, so at most
//! one call is in flight per client even when it is shared between tasks.

use crate::api::{ApiCall, Call, CallRegistry};
use crate::config::{ClientConfig, ProtocolConfig};
use crate::envelope::Envelope;
use crate::error::{BridgeError, Result};
use crate::protocol;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument, Span};
use url::Url;

/// Builder for [`ViewerClient`].
#[derive(Debug, Clone)]
pub struct ViewerClientBuilder {
    base_url: String,
    endpoint: String,
    timeout: Duration,
    connect_timeout: Duration,
    connection_id: Option<String>,
    registry: CallRegistry,
    span: Option<Span>,
}

impl ViewerClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: ProtocolConfig::RUN_PATH.to_string(),
            timeout: ClientConfig::CALL_TIMEOUT,
            connect_timeout: ClientConfig::CONNECT_TIMEOUT,
            connection_id: None,
            registry: CallRegistry::standard(),
            span: None,
        }
    }

    /// Path of the run endpoint, relative to the base URL.
    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.endpoint = path.into();
        self
    }

    /// Upper bound for a whole call round trip.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Identify this client to the viewer. Defaults to a fresh UUID.
    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Registry used to decode viewer replies.
    pub fn registry(mut self, registry: CallRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Parent span for everything the client logs.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<ViewerClient> {
        let base_url = Url::parse(&self.base_url).map_err(|e| BridgeError::Config {
            message: format!("Invalid base URL '{}': {}", self.base_url, e),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BridgeError::Config {
                message: format!("Unsupported URL scheme: {}", base_url.scheme()),
            });
        }
        let run_url = base_url
            .join(&self.endpoint)
            .map_err(|e| BridgeError::Config {
                message: format!("Invalid endpoint '{}': {}", self.endpoint, e),
            })?;

        let http = Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(ClientConfig::USER_AGENT)
            .build()
            .map_err(|e| BridgeError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let connection_id = self
            .connection_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = self.span.unwrap_or_else(|| {
            info_span!(
                "viewer_client",
                base_url = %base_url,
                connection_id = %connection_id
            )
        });

        Ok(ViewerClient {
            http,
            base_url,
            run_url,
            timeout: self.timeout,
            connection_id,
            registry: self.registry,
            span,
            in_flight: Mutex::new(()),
        })
    }
}

/// Client for one viewer relay.
#[derive(Debug)]
pub struct ViewerClient {
    http: Client,
    base_url: Url,
    run_url: Url,
    timeout: Duration,
    connection_id: String,
    registry: CallRegistry,
    span: Span,
    in_flight: Mutex<()>,
}

impl ViewerClient {
    pub fn builder(base_url: impl Into<String>) -> ViewerClientBuilder {
        ViewerClientBuilder::new(base_url)
    }

    /// Client with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn run_url(&self) -> &Url {
        &self.run_url
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one call and return it as populated by the viewer.
    ///
    /// The reply must be the same variant that was sent.
    pub async fn send<T: ApiCall>(&self, call: T) -> Result<T> {
        let reply = self.send_call(call.into_call()).await?;
        let found = reply.name();
        T::from_call(reply).ok_or_else(|| BridgeError::VariantMismatch {
            expected: T::NAME.to_string(),
            found: found.to_string(),
        })
    }

    /// Send a call whose variant is only known at runtime.
    pub async fn send_call(&self, call: Call) -> Result<Call> {
        let name = call.name();
        let span = info_span!(parent: &self.span, "send", call = name);
        async move {
            let _guard = self.in_flight.lock().await;
            let started = Instant::now();
            let envelope = Envelope::new(call);
            let body = self.post(&envelope).await?;

            let output = protocol::unwrap_output(&body).map_err(|e| {
                warn!("Malformed relay response: {}", e);
                e
            })?;
            let reply = decode_reply(&self.registry, &output, name).map_err(|e| {
                warn!("Undecodable viewer reply: {}; raw body: {}", e, body);
                BridgeError::ReplyDecode {
                    body: body.clone(),
                    source: Box::new(e),
                }
            })?;

            debug!("{} answered in {:?}", name, started.elapsed());
            Ok(reply.into_call())
        }
        .instrument(span)
        .await
    }

    async fn post(&self, envelope: &Envelope) -> Result<String> {
        let url = self.run_url.as_str();
        debug!("POST {}", url);

        let response = self
            .http
            .post(self.run_url.clone())
            .timeout(self.timeout)
            .header(
                ProtocolConfig::VERSION_HEADER,
                ProtocolConfig::VERSION.to_string(),
            )
            .json(envelope)
            .send()
            .await
            .map_err(|e| BridgeError::from_reqwest(e, url, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BridgeError::from_reqwest(e, url, self.timeout))?;

        if !status.is_success() {
            return Err(BridgeError::Transport {
                url: url.to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }
        Ok(body)
    }

    /// One readiness check: `GET base_url/` answered with 2xx.
    ///
    /// Returns `Ok(false)` when nothing answers yet.
    pub async fn probe(&self) -> Result<bool> {
        probe_url(&self.http, &self.base_url).await
    }

    /// Poll [`probe`](Self::probe) at a fixed interval until it succeeds.
    pub async fn wait_until_ready(&self, timeout: Duration, interval: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.probe().await? {
                debug!(parent: &self.span, "Relay ready after {:?}", started.elapsed());
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(BridgeError::ReadinessTimeout {
                    url: self.base_url.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Decode the viewer's `output` text into a call of the expected variant.
fn decode_reply(registry: &CallRegistry, output: &str, expected: &str) -> Result<Envelope> {
    let value: serde_json::Value = serde_json::from_str(output)?;
    let reply = Envelope::from_value_with(registry, &value)?;
    if reply.name() != expected {
        return Err(BridgeError::VariantMismatch {
            expected: expected.to_string(),
            found: reply.name().to_string(),
        });
    }
    Ok(reply)
}

/// Readiness probe shared by the client and the supervisor.
pub(crate) async fn probe_url(http: &Client, url: &Url) -> Result<bool> {
    match http
        .get(url.clone())
        .timeout(ClientConfig::PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => Ok(response.status().is_success()),
        Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => Ok(false),
        Err(e) => Err(BridgeError::from_reqwest(
            e,
            url.as_str(),
            ClientConfig::PROBE_TIMEOUT,
        )),
    }
}
