//! Script errors, slow work and page visibility.
//!
//! These listeners are stateless translations from page notifications to
//! events.

use crate::collector::dispatch::Dispatch;
use crate::collector::sensor::Sensor;
use crate::collector::types::{to_props, truncate_chars, EventKind, PageSignal, PerformanceEntry};
use crate::config::{millis, SensorThresholds};
use serde_json::json;

#[derive(Debug)]
pub struct ErrorAndPerfSensors {
    long_task_ms: f64,
    slow_resource_ms: f64,
    max_stack_chars: usize,
    dispatch: Option<Dispatch>,
}

impl ErrorAndPerfSensors {
    pub fn new(thresholds: &SensorThresholds) -> Self {
        Self {
            long_task_ms: millis(thresholds.long_task_threshold) as f64,
            slow_resource_ms: millis(thresholds.slow_resource_threshold) as f64,
            max_stack_chars: thresholds.max_stack_chars,
            dispatch: None,
        }
    }

    fn stack(&self, stack: &Option<String>) -> Option<String> {
        stack.as_deref().map(|s| truncate_chars(s, self.max_stack_chars))
    }

    fn performance(&self, dispatch: &Dispatch, entry: &PerformanceEntry, now: i64) {
        let dur = entry.duration.round();
        match entry.entry_type.as_str() {
            "longtask" if entry.duration > self.long_task_ms => dispatch.emit(
                EventKind::Slow,
                to_props(json!({
                    "dur": dur as i64,
                    "name": entry.name,
                    "type": entry.entry_type,
                })),
                now,
            ),
            "resource" if entry.duration > self.slow_resource_ms => dispatch.emit(
                EventKind::Slow,
                to_props(json!({
                    "dur": dur as i64,
                    "name": entry.name,
                    "type": "slow_resource",
                    "size": entry.transfer_size,
                })),
                now,
            ),
            _ => {}
        }
    }
}

impl Sensor for ErrorAndPerfSensors {
    fn name(&self) -> &'static str {
        "faults"
    }

    fn start(&mut self, dispatch: Dispatch, _now: i64) {
        if self.dispatch.is_none() {
            self.dispatch = Some(dispatch);
        }
    }

    fn stop(&mut self) {
        self.dispatch = None;
    }

    fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    fn observe(&mut self, signal: &PageSignal, now: i64) {
        let Some(dispatch) = &self.dispatch else {
            return;
        };
        match signal {
            PageSignal::ScriptError {
                message,
                source,
                line,
                column,
                stack,
            } => dispatch.emit(
                EventKind::Jserr,
                to_props(json!({
                    "msg": message,
                    "src": source,
                    "line": line,
                    "col": column,
                    "stack": self.stack(stack),
                })),
                now,
            ),
            PageSignal::UnhandledRejection { reason, stack } => dispatch.emit(
                EventKind::Jserr,
                to_props(json!({
                    "promise": true,
                    "reason": reason,
                    "stack": self.stack(stack),
                })),
                now,
            ),
            PageSignal::PerformanceEntry { entry } => self.performance(dispatch, entry, now),
            PageSignal::VisibilityHidden => {
                dispatch.emit(EventKind::PageHide, to_props(json!({ "duration": now })), now)
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::dispatch::{channel, PageContext};
    use crate::collector::types::Event;
    use crossbeam_channel::Receiver;
    use std::sync::Arc;

    fn started() -> (ErrorAndPerfSensors, Receiver<Event>) {
        let (tx, rx) = channel(64);
        let context = Arc::new(PageContext::with_ids("s", "p", None, "https://a.test/"));
        let mut sensors = ErrorAndPerfSensors::new(&SensorThresholds::default());
        sensors.start(Dispatch::new(context, tx), 0);
        (sensors, rx)
    }

    fn entry(entry_type: &str, duration: f64) -> PageSignal {
        PageSignal::PerformanceEntry {
            entry: PerformanceEntry {
                entry_type: entry_type.to_string(),
                name: "https://cdn.test/app.js".to_string(),
                duration,
                transfer_size: Some(2048),
            },
        }
    }

    #[test]
    fn test_script_error_stack_truncated() {
        let (mut sensors, rx) = started();
        sensors.observe(
            &PageSignal::ScriptError {
                message: "TypeError: x is undefined".to_string(),
                source: Some("app.js".to_string()),
                line: Some(12),
                column: Some(4),
                stack: Some("at f\n".repeat(300)),
            },
            100,
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Jserr);
        assert_eq!(event.prop_str("msg"), Some("TypeError: x is undefined"));
        assert_eq!(event.prop_f64("line"), Some(12.0));
        assert_eq!(event.prop_str("stack").unwrap().chars().count(), 500);
    }

    #[test]
    fn test_unhandled_rejection() {
        let (mut sensors, rx) = started();
        sensors.observe(
            &PageSignal::UnhandledRejection {
                reason: "Error: 401".to_string(),
                stack: None,
            },
            100,
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.props["promise"], true);
        assert_eq!(event.prop_str("reason"), Some("Error: 401"));
        assert!(event.props["stack"].is_null());
    }

    #[test]
    fn test_performance_thresholds() {
        let (mut sensors, rx) = started();
        sensors.observe(&entry("longtask", 200.0), 1);
        sensors.observe(&entry("longtask", 250.4), 2);
        sensors.observe(&entry("resource", 2_999.0), 3);
        sensors.observe(&entry("resource", 3_200.6), 4);
        sensors.observe(&entry("paint", 9_000.0), 5);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].prop_f64("dur"), Some(250.0));
        assert_eq!(events[0].prop_str("type"), Some("longtask"));
        assert_eq!(events[1].prop_f64("dur"), Some(3_201.0));
        assert_eq!(events[1].prop_str("type"), Some("slow_resource"));
        assert_eq!(events[1].prop_f64("size"), Some(2048.0));
    }

    #[test]
    fn test_page_hide() {
        let (mut sensors, rx) = started();
        sensors.observe(&PageSignal::VisibilityHidden, 9_000);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::PageHide);
        assert_eq!(event.prop_f64("duration"), Some(9_000.0));
    }

    #[test]
    fn test_stopped_sensor_is_silent() {
        let (mut sensors, rx) = started();
        sensors.stop();
        sensors.observe(&PageSignal::VisibilityHidden, 1);
        assert!(rx.try_recv().is_err());
    }
}
