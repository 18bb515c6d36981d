//! Page identity and the single hand-off point from sensors to delivery.

use crate::collector::types::{Event, EventKind, Props};
use crate::transparency::TransparencyLog;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Capacity of the event channel between sensors and transport.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Identity of one page load.
#[derive(Debug)]
pub struct PageContext {
    session: String,
    page: String,
    token: Option<String>,
    location: RwLock<String>,
}

impl PageContext {
    /// Create a context with fresh session and page identifiers.
    pub fn new(location: impl Into<String>, token: Option<String>) -> Self {
        Self::with_ids(new_session_id(), new_page_id(), token, location)
    }

    /// Create a context with known identifiers.
    pub fn with_ids(
        session: impl Into<String>,
        page: impl Into<String>,
        token: Option<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            session: session.into(),
            page: page.into(),
            token,
            location: RwLock::new(location.into()),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Current page URL.
    pub fn location(&self) -> String {
        self.location
            .read()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    pub fn set_location(&self, url: impl Into<String>) {
        if let Ok(mut location) = self.location.write() {
            *location = url.into();
        }
    }
}

fn new_session_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}{:x}", &Uuid::new_v4().simple().to_string()[..12], millis)
}

fn new_page_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Create the bounded event channel.
pub fn channel(capacity: usize) -> (Sender<Event>, Receiver<Event>) {
    bounded(capacity)
}

/// Stamps detections with page identity and hands them off.
///
/// Emission never blocks: a full or closed channel drops the event.
#[derive(Debug, Clone)]
pub struct Dispatch {
    context: Arc<PageContext>,
    sink: Sender<Event>,
    log: Option<Arc<TransparencyLog>>,
}

impl Dispatch {
    pub fn new(context: Arc<PageContext>, sink: Sender<Event>) -> Self {
        Self {
            context,
            sink,
            log: None,
        }
    }

    /// Count dropped events in `log`.
    pub fn with_log(mut self, log: Arc<TransparencyLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    /// Build an event at `ts` and hand it to the channel.
    pub fn emit(&self, kind: EventKind, props: Props, ts: i64) {
        let event = Event {
            kind,
            props,
            url: self.context.location(),
            session: self.context.session.clone(),
            page: self.context.page.clone(),
            ts,
        };

        let (kind, reason) = match self.sink.try_send(event) {
            Ok(()) => return,
            Err(TrySendError::Full(event)) => (event.kind, "full"),
            Err(TrySendError::Disconnected(event)) => (event.kind, "closed"),
        };
        tracing::debug!(%kind, reason, "event channel unavailable, dropping event");
        if let Some(log) = &self.log {
            log.record_dropped();
        }
    }
}
