//! Scroll-depth milestones.

use crate::collector::dispatch::Dispatch;
use crate::collector::sensor::Sensor;
use crate::collector::timers::TimerSet;
use crate::collector::types::{to_props, EventKind, PageSignal};
use crate::config::{millis, SensorThresholds};
use serde_json::json;
use std::collections::BTreeSet;

/// Scroll geometry at the last scroll signal.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScrollGeometry {
    scroll_top: f64,
    scroll_height: f64,
    viewport_height: f64,
}

impl ScrollGeometry {
    /// Percentage of scrollable height reached, rounded up.
    fn percent(&self) -> u32 {
        let scrollable = self.scroll_height - self.viewport_height;
        if scrollable <= 0.0 {
            return 0;
        }
        let pct = (self.scroll_top / scrollable * 100.0).ceil();
        if pct.is_finite() && pct > 0.0 {
            pct as u32
        } else {
            0
        }
    }
}

/// Fires each milestone at most once per page load.
#[derive(Debug)]
pub struct ScrollDepthTracker {
    debounce_ms: i64,
    milestones: Vec<u32>,
    fired: BTreeSet<u32>,
    latest: Option<ScrollGeometry>,
    debounce: TimerSet<()>,
    dispatch: Option<Dispatch>,
}

impl ScrollDepthTracker {
    pub fn new(thresholds: &SensorThresholds) -> Self {
        let mut milestones = thresholds.depth_milestones.clone();
        milestones.sort_unstable();
        milestones.dedup();

        Self {
            debounce_ms: millis(thresholds.scroll_debounce),
            milestones,
            fired: BTreeSet::new(),
            latest: None,
            debounce: TimerSet::new(),
            dispatch: None,
        }
    }

    /// Milestones already reported on this page load.
    pub fn fired(&self) -> Vec<u32> {
        self.fired.iter().copied().collect()
    }

    fn measure(&mut self, now: i64) {
        let Some(geometry) = self.latest else {
            return;
        };
        let pct = geometry.percent();

        for &milestone in &self.milestones {
            if pct >= milestone && self.fired.insert(milestone) {
                if let Some(dispatch) = &self.dispatch {
                    dispatch.emit(EventKind::Depth, to_props(json!({ "pct": milestone })), now);
                }
            }
        }
    }
}

impl Sensor for ScrollDepthTracker {
    fn name(&self) -> &'static str {
        "scroll"
    }

    fn start(&mut self, dispatch: Dispatch, _now: i64) {
        if self.dispatch.is_none() {
            self.dispatch = Some(dispatch);
        }
    }

    fn stop(&mut self) {
        self.dispatch = None;
        self.debounce.cancel_all();
    }

    fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    fn observe(&mut self, signal: &PageSignal, now: i64) {
        if self.dispatch.is_none() {
            return;
        }
        if let PageSignal::Scroll {
            scroll_top,
            scroll_height,
            viewport_height,
        } = signal
        {
            self.latest = Some(ScrollGeometry {
                scroll_top: *scroll_top,
                scroll_height: *scroll_height,
                viewport_height: *viewport_height,
            });
            self.debounce.schedule((), now + self.debounce_ms);
        }
    }

    fn next_deadline(&self) -> Option<i64> {
        self.debounce.next_deadline()
    }

    fn fire_due(&mut self, now: i64) {
        while let Some(((), deadline)) = self.debounce.pop_due(now) {
            self.measure(deadline);
        }
    }
}
