//! Broken UI flow detection.
//!
//! A semantic click arms a check. If no navigation was recorded by the time
//! it fires, the click is reported as having produced no response. Rejected
//! network requests arrive as `fetch_rejected` signals and are reported
//! separately.

use crate::collector::dispatch::Dispatch;
use crate::collector::element::classify_click_target;
use crate::collector::sensor::Sensor;
use crate::collector::timers::TimerSet;
use crate::collector::types::{to_props, EventKind, PageSignal};
use crate::config::{millis, SensorThresholds};
use serde_json::json;

/// Identity of one pending click check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickId {
    pub selector: String,
    pub ts: i64,
    /// Disambiguates clicks on one selector within the same millisecond
    pub seq: u64,
}

#[derive(Debug, Clone)]
struct PendingClick {
    id: ClickId,
    text: String,
}

/// Watches clicks for a missing reaction and reports failed requests.
#[derive(Debug)]
pub struct BrokenFlowDetector {
    timeout_ms: i64,
    pending: Vec<PendingClick>,
    checks: TimerSet<ClickId>,
    last_navigation: i64,
    next_seq: u64,
    dispatch: Option<Dispatch>,
}

impl BrokenFlowDetector {
    pub fn new(thresholds: &SensorThresholds) -> Self {
        Self {
            timeout_ms: millis(thresholds.no_response_timeout),
            pending: Vec::new(),
            checks: TimerSet::new(),
            last_navigation: 0,
            next_seq: 0,
            dispatch: None,
        }
    }

    /// Clicks still waiting for their check.
    pub fn pending_checks(&self) -> usize {
        self.checks.len()
    }

    fn arm(&mut self, selector: String, text: String, now: i64) {
        let id = ClickId {
            selector,
            ts: now,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.checks.schedule(id.clone(), now + self.timeout_ms);
        self.pending.push(PendingClick { id, text });
    }

    fn navigated(&mut self, now: i64) {
        self.last_navigation = now;
        self.checks.cancel_all();
        self.pending.clear();
    }

    fn check(&mut self, id: ClickId, now: i64) {
        let Some(i) = self.pending.iter().position(|p| p.id == id) else {
            return;
        };
        let click = self.pending.remove(i);

        if now - self.last_navigation > self.timeout_ms {
            if let Some(dispatch) = &self.dispatch {
                dispatch.emit(
                    EventKind::BrokenFlow,
                    to_props(json!({
                        "type": "no_response",
                        "selector": click.id.selector,
                        "text": click.text,
                        "duration": self.timeout_ms,
                    })),
                    now,
                );
            }
        }
    }
}

impl Sensor for BrokenFlowDetector {
    fn name(&self) -> &'static str {
        "broken_flow"
    }

    fn start(&mut self, dispatch: Dispatch, now: i64) {
        if self.dispatch.is_none() {
            self.last_navigation = now;
            self.dispatch = Some(dispatch);
        }
    }

    fn stop(&mut self) {
        self.checks.cancel_all();
        self.pending.clear();
        self.dispatch = None;
    }

    fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    fn observe(&mut self, signal: &PageSignal, now: i64) {
        let Some(dispatch) = self.dispatch.clone() else {
            return;
        };
        match signal {
            PageSignal::Click { target, .. } => {
                if let Some(info) =
                    classify_click_target(target.as_ref()).filter(|i| i.is_semantic)
                {
                    self.arm(info.selector, info.text, now);
                }
            }
            PageSignal::PopState => self.navigated(now),
            PageSignal::FetchRejected { url, error } => dispatch.emit(
                EventKind::BrokenFlow,
                to_props(json!({
                    "type": "fetch_error",
                    "url": url,
                    "error": error,
                })),
                now,
            ),
            _ => {}
        }
    }

    fn next_deadline(&self) -> Option<i64> {
        self.checks.next_deadline()
    }

    fn fire_due(&mut self, now: i64) {
        while let Some((id, deadline)) = self.checks.pop_due(now) {
            self.check(id, deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::dispatch::{channel, PageContext};
    use crate::collector::types::{Element, Event};
    use crossbeam_channel::Receiver;
    use std::sync::Arc;

    fn started(at: i64) -> (BrokenFlowDetector, Receiver<Event>) {
        let (tx, rx) = channel(64);
        let context = Arc::new(PageContext::with_ids("s", "p", None, "https://a.test/"));
        let mut detector = BrokenFlowDetector::new(&SensorThresholds::default());
        detector.start(Dispatch::new(context, tx), at);
        (detector, rx)
    }

    fn click(el: Element) -> PageSignal {
        PageSignal::Click {
            target: Some(el),
            x: 0.0,
            y: 0.0,
        }
    }

    #[test]
    fn test_unanswered_click_is_reported() {
        let (mut detector, rx) = started(0);
        detector.observe(&click(Element::new("button").with_id("save").with_text("Save")), 5_000);

        detector.fire_due(6_999);
        assert_eq!(rx.try_iter().count(), 0);
        detector.fire_due(7_000);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::BrokenFlow);
        assert_eq!(event.prop_str("type"), Some("no_response"));
        assert_eq!(event.prop_str("selector"), Some("#save"));
        assert_eq!(event.prop_str("text"), Some("Save"));
        assert_eq!(event.prop_f64("duration"), Some(2000.0));
        assert_eq!(detector.pending_checks(), 0);
    }

    #[test]
    fn test_navigation_cancels_pending_checks() {
        let (mut detector, rx) = started(0);
        detector.observe(&click(Element::new("a").with_id("next")), 5_000);
        detector.observe(&click(Element::new("a").with_id("next")), 5_000);
        assert_eq!(detector.pending_checks(), 2);

        detector.observe(&PageSignal::PopState, 5_500);
        assert_eq!(detector.pending_checks(), 0);
        detector.fire_due(10_000);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_navigation_clock_boundary() {
        let (mut detector, rx) = started(1_000);
        detector.observe(&click(Element::new("button").with_id("go")), 1_000);
        detector.observe(&click(Element::new("button").with_id("go")), 1_001);
        detector.fire_due(3_001);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ts, 3_001);
    }

    #[test]
    fn test_fetch_rejection_reported_while_running() {
        let (mut detector, rx) = started(0);
        let rejected = PageSignal::FetchRejected {
            url: "/api/pay".to_string(),
            error: "timeout".to_string(),
        };

        detector.observe(&rejected, 10);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.prop_str("type"), Some("fetch_error"));
        assert_eq!(event.prop_str("url"), Some("/api/pay"));
        assert_eq!(event.prop_str("error"), Some("timeout"));
        assert_eq!(event.ts, 10);

        detector.stop();
        detector.observe(&rejected, 20);
        assert_eq!(rx.try_iter().count(), 0);
    }
}
