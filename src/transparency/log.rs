//! Transparency log.
//!
//! Counts what the sensors produced and what was lost, without keeping any
//! event content.

use crate::collector::types::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Broad grouping of event kinds for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    /// click, rage, depth, page_hide
    Interaction,
    /// drop, form_submit
    Form,
    /// broken_flow, jserr, slow
    Fault,
}

impl EventFamily {
    pub fn of(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Click | EventKind::Rage | EventKind::Depth | EventKind::PageHide => {
                Some(EventFamily::Interaction)
            }
            EventKind::Drop | EventKind::FormSubmit => Some(EventFamily::Form),
            EventKind::BrokenFlow | EventKind::Jserr | EventKind::Slow => Some(EventFamily::Fault),
            EventKind::Unknown => None,
        }
    }
}

/// Collection statistics for the current process.
#[derive(Debug)]
pub struct TransparencyLog {
    interaction_events: AtomicU64,
    form_events: AtomicU64,
    fault_events: AtomicU64,
    /// Events lost to a full or closed channel
    events_dropped: AtomicU64,
    /// Page loads torn down
    page_loads: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            interaction_events: AtomicU64::new(0),
            form_events: AtomicU64::new(0),
            fault_events: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            page_loads: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that resumes from, and saves to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    /// Record one forwarded event.
    pub fn record_event(&self, kind: EventKind) {
        let counter = match EventFamily::of(kind) {
            Some(EventFamily::Interaction) => &self.interaction_events,
            Some(EventFamily::Form) => &self.form_events,
            Some(EventFamily::Fault) => &self.fault_events,
            None => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_load(&self) {
        self.page_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            interaction_events: self.interaction_events.load(Ordering::Relaxed),
            form_events: self.form_events.load(Ordering::Relaxed),
            fault_events: self.fault_events.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            page_loads: self.page_loads.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Collection Statistics:\n\
             - Interaction events: {}\n\
             - Form events: {}\n\
             - Fault events: {}\n\
             - Events dropped: {}\n\
             - Page loads observed: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Password values are always masked\n\
             - Element text is capped at 80 characters\n\
             - No keystrokes or cookies are captured",
            stats.interaction_events,
            stats.form_events,
            stats.fault_events,
            stats.events_dropped,
            stats.page_loads,
            stats.session_duration_secs
        )
    }

    /// Save counters to the persistence path, if any.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                interaction_events: stats.interaction_events,
                form_events: stats.form_events,
                fault_events: stats.fault_events,
                events_dropped: stats.events_dropped,
                page_loads: stats.page_loads,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.interaction_events
                    .store(persisted.interaction_events, Ordering::Relaxed);
                self.form_events
                    .store(persisted.form_events, Ordering::Relaxed);
                self.fault_events
                    .store(persisted.fault_events, Ordering::Relaxed);
                self.events_dropped
                    .store(persisted.events_dropped, Ordering::Relaxed);
                self.page_loads
                    .store(persisted.page_loads, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.interaction_events.store(0, Ordering::Relaxed);
        self.form_events.store(0, Ordering::Relaxed);
        self.fault_events.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.page_loads.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub interaction_events: u64,
    pub form_events: u64,
    pub fault_events: u64,
    pub events_dropped: u64,
    pub page_loads: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    pub fn total_events(&self) -> u64 {
        self.interaction_events + self.form_events + self.fault_events
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    interaction_events: u64,
    #[serde(default)]
    form_events: u64,
    #[serde(default)]
    fault_events: u64,
    #[serde(default)]
    events_dropped: u64,
    #[serde(default)]
    page_loads: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
