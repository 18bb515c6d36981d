//! Drives every sensor of one page load on a single cooperative clock.

use crate::collector::clicks::SemanticClickSensor;
use crate::collector::dispatch::{Dispatch, PageContext};
use crate::collector::faults::ErrorAndPerfSensors;
use crate::collector::flow::BrokenFlowDetector;
use crate::collector::forms::FormDropoffTracker;
use crate::collector::rage::RageClickDetector;
use crate::collector::scroll::ScrollDepthTracker;
use crate::collector::sensor::Sensor;
use crate::collector::types::{Event, PageSignal, TimedSignal};
use crate::config::SensorThresholds;
use crate::transparency::TransparencyLog;
use crossbeam_channel::Sender;
use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Owns the page context and the sensors observing it.
///
/// Timers due at or before a signal's time fire before the signal is routed.
/// A sensor that panics is stopped and logged; the panic never reaches the
/// caller.
pub struct PageRuntime {
    context: Arc<PageContext>,
    dispatch: Dispatch,
    sensors: Vec<Box<dyn Sensor>>,
    now: i64,
    started: bool,
}

impl PageRuntime {
    /// Create a runtime with the standard sensor set.
    pub fn new(
        thresholds: &SensorThresholds,
        location: impl Into<String>,
        token: Option<String>,
        sink: Sender<Event>,
    ) -> Self {
        let context = Arc::new(PageContext::new(location, token));
        let sensors: Vec<Box<dyn Sensor>> = vec![
            Box::new(SemanticClickSensor::new()),
            Box::new(RageClickDetector::new(thresholds)),
            Box::new(ScrollDepthTracker::new(thresholds)),
            Box::new(FormDropoffTracker::new(thresholds)),
            Box::new(BrokenFlowDetector::new(thresholds)),
            Box::new(ErrorAndPerfSensors::new(thresholds)),
        ];
        Self::with_sensors(context, sink, sensors)
    }

    /// Create a runtime over a caller-chosen sensor set.
    pub fn with_sensors(
        context: Arc<PageContext>,
        sink: Sender<Event>,
        sensors: Vec<Box<dyn Sensor>>,
    ) -> Self {
        let dispatch = Dispatch::new(context.clone(), sink);
        Self {
            context,
            dispatch,
            sensors,
            now: 0,
            started: false,
        }
    }

    /// Count events lost on this page in `log`. Call before `start`.
    pub fn with_log(mut self, log: Arc<TransparencyLog>) -> Self {
        self.dispatch = self.dispatch.with_log(log);
        self
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    /// Current virtual time in milliseconds.
    pub fn now(&self) -> i64 {
        self.now
    }

    /// Names of sensors currently running.
    pub fn running_sensors(&self) -> Vec<&'static str> {
        self.sensors
            .iter()
            .filter(|s| s.is_running())
            .map(|s| s.name())
            .collect()
    }

    /// Start every sensor. Calling it again is a no-op.
    pub fn start(&mut self, now: i64) {
        if self.started {
            return;
        }
        self.started = true;
        self.now = self.now.max(now);
        let at = self.now;
        for i in 0..self.sensors.len() {
            let dispatch = self.dispatch.clone();
            self.guarded(i, "start", |s| s.start(dispatch, at));
        }
    }

    /// Fire due timers, then route the signal to every sensor.
    pub fn handle(&mut self, signal: &PageSignal, now: i64) {
        self.advance_to(now);
        let at = self.now;
        for i in 0..self.sensors.len() {
            self.guarded(i, "observe", |s| s.observe(signal, at));
        }
    }

    /// Apply a recorded signal, including any location change it carries.
    pub fn handle_timed(&mut self, timed: &TimedSignal) {
        self.advance_to(timed.at);
        if let Some(location) = &timed.location {
            self.navigate(location.clone());
        }
        self.handle(&timed.signal, timed.at);
    }

    /// Fire every timer due at or before `now`, earliest deadline first.
    ///
    /// The clock never moves backwards.
    pub fn advance_to(&mut self, now: i64) {
        while let Some(deadline) = self.earliest_deadline().filter(|d| *d <= now) {
            self.now = self.now.max(deadline);
            for i in 0..self.sensors.len() {
                let due = self.sensors[i].next_deadline().is_some_and(|d| d <= deadline);
                if due {
                    self.guarded(i, "fire_due", |s| s.fire_due(deadline));
                }
            }
        }
        self.now = self.now.max(now);
    }

    /// Soft navigation: the page URL changes without an unload.
    pub fn navigate(&mut self, url: impl Into<String>) {
        self.context.set_location(url);
    }

    /// Report a failed request at `now` and hand the result back unchanged.
    ///
    /// The failure is routed to the sensors as a `fetch_rejected` signal,
    /// so nothing is reported once the page is torn down.
    pub fn report_fetch<T, E: Display>(
        &mut self,
        url: &str,
        result: Result<T, E>,
        now: i64,
    ) -> Result<T, E> {
        if let Err(e) = &result {
            let signal = PageSignal::FetchRejected {
                url: url.to_string(),
                error: e.to_string(),
            };
            self.handle(&signal, now);
        }
        result
    }

    /// Await a request, reporting a rejection at the current virtual time.
    pub async fn instrument_fetch<F, T, E>(&mut self, url: &str, request: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let result = request.await;
        let now = self.now;
        self.report_fetch(url, result, now)
    }

    /// Unload the page: flush pending state, then stop every sensor.
    pub fn teardown(&mut self, now: i64) {
        if !self.started {
            return;
        }
        self.handle(&PageSignal::BeforeUnload, now);
        for i in 0..self.sensors.len() {
            self.guarded(i, "stop", |s| s.stop());
        }
        self.started = false;
    }

    fn earliest_deadline(&self) -> Option<i64> {
        self.sensors
            .iter()
            .filter(|s| s.is_running())
            .filter_map(|s| s.next_deadline())
            .min()
    }

    fn guarded<F>(&mut self, index: usize, op: &'static str, f: F)
    where
        F: FnOnce(&mut dyn Sensor),
    {
        let sensor = &mut self.sensors[index];
        let name = sensor.name();
        let outcome = catch_unwind(AssertUnwindSafe(|| f(sensor.as_mut())));
        if outcome.is_err() {
            tracing::warn!(sensor = name, op, "sensor panicked, stopping it");
            let _ = catch_unwind(AssertUnwindSafe(|| sensor.stop()));
        }
    }
}

impl std::fmt::Debug for PageRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRuntime")
            .field("context", &self.context)
            .field("sensors", &self.running_sensors())
            .field("now", &self.now)
            .finish()
    }
}
