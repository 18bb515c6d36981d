//! Rage-click detection.
//!
//! A burst is a run of clicks on the same selector, each within the rage
//! window of the burst's first click and within the pixel radius on both
//! axes. The burst reports once, when it reaches the configured count, and
//! the state is cleared so the same burst cannot report twice.

use crate::collector::dispatch::Dispatch;
use crate::collector::element::{classify_click_target, ElementInfo};
use crate::collector::sensor::Sensor;
use crate::collector::types::{to_props, EventKind, PageSignal};
use crate::config::{millis, SensorThresholds};
use serde_json::json;

/// The click that opened the current burst.
#[derive(Debug, Clone, PartialEq)]
struct ClickRecord {
    ts: i64,
    count: u32,
    x: f64,
    y: f64,
    selector: String,
}

/// Tracks consecutive rapid clicks on one target.
#[derive(Debug)]
pub struct RageClickDetector {
    window_ms: i64,
    radius_px: f64,
    threshold: u32,
    last: Option<ClickRecord>,
    dispatch: Option<Dispatch>,
}

impl RageClickDetector {
    pub fn new(thresholds: &SensorThresholds) -> Self {
        Self {
            window_ms: millis(thresholds.rage_window),
            radius_px: thresholds.rage_radius_px,
            threshold: thresholds.rage_click_count,
            last: None,
            dispatch: None,
        }
    }

    /// Register a semantic click. Returns the burst size when it turns into
    /// a rage click.
    fn register(&mut self, info: &ElementInfo, x: f64, y: f64, now: i64) -> Option<u32> {
        let continues = self.last.as_ref().is_some_and(|last| {
            last.selector == info.selector
                && (x - last.x).abs() < self.radius_px
                && (y - last.y).abs() < self.radius_px
                && now - last.ts < self.window_ms
        });

        match self.last.as_mut() {
            Some(last) if continues => {
                last.count += 1;
                if last.count >= self.threshold {
                    let count = last.count;
                    self.last = None;
                    return Some(count);
                }
                None
            }
            _ => {
                self.last = Some(ClickRecord {
                    ts: now,
                    count: 1,
                    x,
                    y,
                    selector: info.selector.clone(),
                });
                None
            }
        }
    }

    /// Clicks counted in the current burst.
    pub fn current_count(&self) -> u32 {
        self.last.as_ref().map_or(0, |l| l.count)
    }
}

impl Sensor for RageClickDetector {
    fn name(&self) -> &'static str {
        "rage"
    }

    fn start(&mut self, dispatch: Dispatch, _now: i64) {
        if self.dispatch.is_none() {
            self.dispatch = Some(dispatch);
        }
    }

    fn stop(&mut self) {
        self.dispatch = None;
        self.last = None;
    }

    fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    fn observe(&mut self, signal: &PageSignal, now: i64) {
        if self.dispatch.is_none() {
            return;
        }
        let PageSignal::Click { target, x, y } = signal else {
            return;
        };
        let Some(info) = classify_click_target(target.as_ref()).filter(|i| i.is_semantic) else {
            return;
        };

        if let Some(count) = self.register(&info, *x, *y, now) {
            if let Some(dispatch) = &self.dispatch {
                dispatch.emit(
                    EventKind::Rage,
                    to_props(json!({
                        "selector": info.selector,
                        "text": info.text,
                        "count": count,
                        "x": x,
                        "y": y,
                    })),
                    now,
                );
            }
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

    fn started() -> (RageClickDetector, Receiver<Event>) {
        let (tx, rx) = channel(64);
        let context = Arc::new(PageContext::with_ids("s", "p", None, "https://a.test/"));
        let mut detector = RageClickDetector::new(&SensorThresholds::default());
        detector.start(Dispatch::new(context, tx), 0);
        (detector, rx)
    }

    fn click_on(el: &Element, x: f64, y: f64) -> PageSignal {
        PageSignal::Click {
            target: Some(el.clone()),
            x,
            y,
        }
    }

    #[test]
    fn test_four_rapid_clicks_emit_once() {
        let (mut detector, rx) = started();
        let button = Element::new("button").with_id("pay").with_text("Pay now");

        for (i, t) in [0, 100, 200, 300].into_iter().enumerate() {
            detector.observe(&click_on(&button, 50.0 + i as f64, 50.0), t);
        }

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Rage);
        assert_eq!(events[0].prop_str("selector"), Some("#pay"));
        assert_eq!(events[0].prop_f64("count"), Some(4.0));
        assert_eq!(detector.current_count(), 0);
    }

    #[test]
    fn test_long_burst_emits_once_per_four() {
        let (mut detector, rx) = started();
        let button = Element::new("button").with_id("pay");

        for i in 0..7 {
            detector.observe(&click_on(&button, 10.0, 10.0), i * 50);
        }
        assert_eq!(rx.try_iter().count(), 1);
        // Clicks 5..7 started a new burst from 1.
        assert_eq!(detector.current_count(), 3);

        detector.observe(&click_on(&button, 10.0, 10.0), 350);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_different_element_resets() {
        let (mut detector, rx) = started();
        let pay = Element::new("button").with_id("pay");
        let cancel = Element::new("button").with_id("cancel");

        detector.observe(&click_on(&pay, 0.0, 0.0), 0);
        detector.observe(&click_on(&pay, 0.0, 0.0), 50);
        detector.observe(&click_on(&pay, 0.0, 0.0), 100);
        detector.observe(&click_on(&cancel, 0.0, 0.0), 150);
        assert_eq!(detector.current_count(), 1);
        detector.observe(&click_on(&pay, 0.0, 0.0), 200);

        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_slow_or_scattered_clicks_do_not_count() {
        let (mut detector, rx) = started();
        let pay = Element::new("button").with_id("pay");

        for i in 0..6 {
            detector.observe(&click_on(&pay, 0.0, 0.0), i * 700);
        }
        for i in 0..6 {
            detector.observe(&click_on(&pay, (i * 10) as f64, 0.0), 10_000 + i * 10);
        }

        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_non_semantic_targets_ignored() {
        let (mut detector, rx) = started();
        let text = Element::new("p").with_class("copy");

        for i in 0..8 {
            detector.observe(&click_on(&text, 0.0, 0.0), i * 10);
        }

        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(detector.current_count(), 0);
    }
}
