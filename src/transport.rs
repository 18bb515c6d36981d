//! Event delivery.
//!
//! Delivery is best effort. A transport never reports failure back to the
//! sensors: errors are logged at debug level and the event is lost.

use crate::collector::types::{Event, WireEvent};
use crate::transparency::TransparencyLog;
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use url::Url;

/// Path appended to an origin when no endpoint is configured.
pub const DEFAULT_INGEST_PATH: &str = "/api/pp";

/// Transport error types.
#[derive(Debug)]
pub enum TransportError {
    /// No usable endpoint could be derived
    Endpoint(String),
    /// HTTP client could not be built
    Client(String),
    /// Network/HTTP error
    Network(String),
    /// Collector answered with a non-success status
    Server { status: u16 },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Endpoint(msg) => write!(f, "Endpoint error: {msg}"),
            TransportError::Client(msg) => write!(f, "HTTP client error: {msg}"),
            TransportError::Network(msg) => write!(f, "Network error: {msg}"),
            TransportError::Server { status } => write!(f, "Collector returned status {status}"),
            TransportError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Where and as whom events are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub endpoint: String,
    /// Project token stamped on every wire event
    pub token: Option<String>,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
        }
    }

    /// Pick the ingestion endpoint.
    ///
    /// An explicit endpoint wins. Otherwise the origin of the loading
    /// script is used, then the origin of the page itself.
    pub fn resolve(
        explicit: Option<&str>,
        script_src: Option<&str>,
        location: &str,
    ) -> Result<String, TransportError> {
        if let Some(endpoint) = explicit.map(str::trim).filter(|e| !e.is_empty()) {
            return Ok(endpoint.to_string());
        }

        script_src
            .and_then(origin_of)
            .or_else(|| origin_of(location))
            .map(|origin| format!("{origin}{DEFAULT_INGEST_PATH}"))
            .ok_or_else(|| {
                TransportError::Endpoint(format!(
                    "no origin in script source or location {location:?}"
                ))
            })
    }
}

/// Serialized origin of an absolute http(s) URL.
fn origin_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.origin().ascii_serialization())
}

/// Hands events to a collector.
pub trait Transport: Send + Sync {
    /// Deliver one event without blocking the caller.
    fn send(&self, event: &Event);
}

/// Keeps wire events in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    token: Option<String>,
    events: Mutex<Vec<WireEvent>>,
}

impl MemoryTransport {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Copy of everything delivered so far.
    pub fn events(&self) -> Vec<WireEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<WireEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transport for MemoryTransport {
    fn send(&self, event: &Event) {
        let wire = WireEvent::from_event(event, self.token.as_deref());
        if let Ok(mut events) = self.events.lock() {
            events.push(wire);
        }
    }
}

/// POSTs each event as JSON.
///
/// With an ambient tokio runtime the request is spawned onto it. Otherwise
/// it runs on a single-worker runtime created on first use and shared by
/// every clone. Neither path applies a timeout or retries. Requests still
/// in flight when the last clone is dropped are abandoned.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: TransportConfig,
    client: reqwest::Client,
    background: Arc<Background>,
}

/// Delivery runtime for callers outside of tokio.
#[cfg(feature = "http")]
#[derive(Debug, Default)]
struct Background(std::sync::OnceLock<tokio::runtime::Runtime>);

#[cfg(feature = "http")]
impl Drop for Background {
    fn drop(&mut self) {
        // Dropping a runtime from async code panics; this shutdown does not
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            config,
            client,
            background: Arc::new(Background::default()),
        })
    }

    /// Deliver one wire event and wait for the collector's answer.
    pub async fn deliver(&self, event: &WireEvent) -> Result<(), TransportError> {
        post(&self.client, &self.config.endpoint, event).await
    }

    fn background_runtime(&self) -> Result<&tokio::runtime::Runtime, TransportError> {
        if let Some(runtime) = self.background.0.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pixelpulse-delivery")
            .enable_all()
            .build()
            .map_err(|e| TransportError::Client(format!("Failed to create runtime: {e}")))?;
        Ok(self.background.0.get_or_init(|| runtime))
    }
}

#[cfg(feature = "http")]
async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    event: &WireEvent,
) -> Result<(), TransportError> {
    let body =
        serde_json::to_vec(event).map_err(|e| TransportError::Serialization(e.to_string()))?;

    let response = client
        .post(endpoint)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Server {
            status: status.as_u16(),
        });
    }
    Ok(())
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn send(&self, event: &Event) {
        let wire = WireEvent::from_event(event, self.config.token.as_deref());
        let client = self.client.clone();
        let endpoint = self.config.endpoint.clone();
        let request = async move {
            if let Err(e) = post(&client, &endpoint, &wire).await {
                tracing::debug!(error = %e, kind = %wire.t, "event delivery failed");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(request);
            }
            Err(_) => match self.background_runtime() {
                Ok(runtime) => {
                    runtime.spawn(request);
                }
                Err(e) => tracing::debug!(error = %e, "could not start delivery runtime"),
            },
        }
    }
}

/// Drain `receiver` into `transport` on a background thread.
///
/// The thread ends once every sender is dropped and returns the number of
/// events forwarded.
pub fn spawn_forwarder(
    receiver: Receiver<Event>,
    transport: Arc<dyn Transport>,
    log: Arc<TransparencyLog>,
) -> JoinHandle<u64> {
    std::thread::spawn(move || {
        let mut forwarded = 0;
        for event in receiver.iter() {
            log.record_event(event.kind);
            transport.send(&event);
            forwarded += 1;
        }
        forwarded
    })
}
