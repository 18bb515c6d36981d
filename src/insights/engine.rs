//! Heuristics that turn stored events into ranked insights.
//!
//! Every heuristic runs independently over the same collection. The result
//! is sorted by descending severity; equal severities keep the order the
//! heuristics ran in.

use crate::collector::types::{Event, EventKind};
use crate::config::InsightThresholds;
use crate::insights::types::{Insight, Severity};
use crate::insights::windowing::{
    aged_between, distinct_sessions, first_prop, group_by, of_kind, prop_or_unknown, top_by_count,
    DAY_MS,
};
use serde_json::{json, Map, Value};
use statrs::statistics::Statistics;

/// Compute insights with the default thresholds.
pub fn compute_insights(events: &[Event], now: i64) -> Vec<Insight> {
    InsightEngine::default().compute(events, now)
}

/// Insight engine with configurable thresholds.
#[derive(Debug, Clone, Default)]
pub struct InsightEngine {
    thresholds: InsightThresholds,
}

impl InsightEngine {
    pub fn new(thresholds: InsightThresholds) -> Self {
        Self { thresholds }
    }

    /// Rank insights for an already scoped event collection.
    ///
    /// `now` anchors the drop-off time windows.
    pub fn compute(&self, events: &[Event], now: i64) -> Vec<Insight> {
        if events.is_empty() {
            return Vec::new();
        }

        let mut insights: Vec<Insight> = [
            self.rage(events),
            self.script_errors(events),
            self.dropoff(events, now),
            self.broken_flows(events),
            self.slow_tasks(events),
            self.scroll_completion(events),
        ]
        .into_iter()
        .flatten()
        .collect();

        // sort_by is stable
        insights.sort_by(|a, b| b.severity.cmp(&a.severity));
        insights
    }

    fn rage(&self, events: &[Event]) -> Option<Insight> {
        let t = &self.thresholds;
        let rage = of_kind(events, EventKind::Rage);
        if rage.len() < t.rage_min_events {
            return None;
        }

        let sessions = distinct_sessions(rage.iter().copied());
        let top = top_by_count(rage.iter().copied(), |e| prop_or_unknown(e, "selector"))?;
        let text = top.events[0].prop_str("text").unwrap_or_default().to_string();
        let severity = if rage.len() > t.rage_high_above {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(
            Insight::new(
                "High rage-click activity detected",
                severity,
                format!(
                    "{} rage-click incidents detected across {} sessions. Most common: {}",
                    rage.len(),
                    sessions,
                    top.key
                ),
                "Investigate broken buttons, unresponsive CTAs, or UX dead-ends.",
            )
            .with_metadata(json!({
                "count": rage.len(),
                "sessions": sessions,
                "topElement": {
                    "selector": top.key,
                    "count": top.count(),
                    "text": text,
                },
            })),
        )
    }

    fn script_errors(&self, events: &[Event]) -> Option<Insight> {
        let t = &self.thresholds;
        let errors = of_kind(events, EventKind::Jserr);
        if errors.len() < t.jserr_min_events {
            return None;
        }

        let total_sessions = distinct_sessions(events);
        let error_sessions = distinct_sessions(errors.iter().copied());
        let error_rate = if total_sessions > 0 {
            error_sessions as f64 / total_sessions as f64 * 100.0
        } else {
            0.0
        };

        let top = top_by_count(errors.iter().copied(), |e| first_prop(e, &["msg", "reason"]))?;
        let src = top.events[0].prop_str("src").unwrap_or_default().to_string();
        let severity = if error_rate > t.jserr_critical_rate {
            Severity::Critical
        } else if error_rate > t.jserr_high_rate {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(
            Insight::new(
                format!("JavaScript errors affecting {error_rate:.1}% of sessions"),
                severity,
                format!(
                    "{} JS errors across {} sessions. Most common: {}",
                    errors.len(),
                    error_sessions,
                    top.key
                ),
                "Check browser console and fix broken scripts. Monitor error stack traces.",
            )
            .with_metadata(json!({
                "errorCount": errors.len(),
                "affectedSessions": error_sessions,
                "errorRate": round_to(error_rate, 1),
                "topError": {
                    "msg": top.key,
                    "count": top.count(),
                    "src": src,
                },
            })),
        )
    }

    fn dropoff(&self, events: &[Event], now: i64) -> Option<Insight> {
        let t = &self.thresholds;
        let window_ms = t.dropoff_window_days * DAY_MS;
        let drops = of_kind(events, EventKind::Drop);

        let current = aged_between(&drops, now, None, window_ms);
        let previous = aged_between(&drops, now, Some(window_ms), 2 * window_ms);

        let top = top_by_count(current, |e| prop_or_unknown(e, "field"))?;
        let current_count = top.count();
        let previous_count = previous
            .iter()
            .filter(|e| prop_or_unknown(e, "field") == top.key)
            .count();
        let increase = if previous_count > 0 {
            (current_count as f64 - previous_count as f64) / previous_count as f64 * 100.0
        } else {
            0.0
        };

        if !(increase > t.dropoff_spike_increase || current_count >= t.dropoff_min_count) {
            return None;
        }

        let severity = if increase > t.dropoff_high_increase {
            Severity::High
        } else {
            Severity::Medium
        };
        let mut summary = format!("{current_count} drop-offs on \"{}\" field", top.key);
        if increase > 0.0 {
            summary.push_str(&format!(" (+{increase:.0}% vs last week)"));
        }
        let label = top.events[0].prop_str("label").map(str::to_string);

        Some(
            Insight::new(
                format!("Form drop-off spike on {}", top.key),
                severity,
                summary,
                "Review field validation, UX, or required field indicators.",
            )
            .with_metadata(json!({
                "field": top.key,
                "count": current_count,
                "previousCount": previous_count,
                "increase": increase.round(),
                "label": label,
            })),
        )
    }

    fn broken_flows(&self, events: &[Event]) -> Option<Insight> {
        let t = &self.thresholds;
        let flows = of_kind(events, EventKind::BrokenFlow);
        if flows.len() < t.broken_flow_min_events {
            return None;
        }

        let by_type = group_by(flows.iter().copied(), |e| prop_or_unknown(e, "type"));
        let top = top_by_count(flows.iter().copied(), |e| prop_or_unknown(e, "type"))?;
        let breakdown: Map<String, Value> = by_type
            .iter()
            .map(|g| (g.key.clone(), Value::from(g.count())))
            .collect();
        let severity = if flows.len() > t.broken_flow_high_above {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(
            Insight::new(
                "Broken UI flows detected",
                severity,
                format!(
                    "{} broken flow incidents. Most common: {}",
                    flows.len(),
                    top.key
                ),
                "Check for unresponsive buttons, failed navigation, or network issues.",
            )
            .with_metadata(json!({
                "count": flows.len(),
                "topType": top.key,
                "breakdown": breakdown,
            })),
        )
    }

    fn slow_tasks(&self, events: &[Event]) -> Option<Insight> {
        let t = &self.thresholds;
        let slow = of_kind(events, EventKind::Slow);
        if slow.len() < t.slow_min_events {
            return None;
        }

        let durations: Vec<f64> = slow
            .iter()
            .map(|e| e.prop_f64("dur").filter(|d| d.is_finite()).unwrap_or(0.0))
            .collect();
        let mean = durations.iter().mean();
        let top = top_by_count(slow.iter().copied(), |e| {
            if e.url.is_empty() {
                "unknown".to_string()
            } else {
                e.url.clone()
            }
        })?;
        let severity = if mean > t.slow_high_mean_ms {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(
            Insight::new(
                "Performance degradation detected",
                severity,
                format!(
                    "{} slow tasks detected. Average duration: {}ms. Most affected: {}",
                    slow.len(),
                    mean.round(),
                    top.key
                ),
                "Optimize long tasks, reduce bundle size, or investigate slow network requests.",
            )
            .with_metadata(json!({
                "count": slow.len(),
                "avgDuration": mean.round(),
                "topUrl": top.key,
            })),
        )
    }

    fn scroll_completion(&self, events: &[Event]) -> Option<Insight> {
        let t = &self.thresholds;
        let depth = of_kind(events, EventKind::Depth);
        if depth.len() < t.depth_min_events {
            return None;
        }

        let reached = |pct: f64| depth.iter().filter(|e| e.prop_f64("pct") == Some(pct)).count();
        let total_sessions = distinct_sessions(events);
        let completed = reached(100.0);
        let completion_rate = if total_sessions > 0 {
            completed as f64 / total_sessions as f64 * 100.0
        } else {
            0.0
        };

        if completion_rate >= t.depth_low_completion {
            return None;
        }

        Some(
            Insight::new(
                "Low scroll completion rate",
                Severity::Low,
                format!("Only {completion_rate:.1}% of sessions reach 100% scroll depth."),
                "Consider improving content engagement or reducing page length.",
            )
            .with_metadata(json!({
                "completionRate": round_to(completion_rate, 1),
                "depth50": reached(50.0),
                "depth75": reached(75.0),
                "depth100": completed,
            })),
        )
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::to_props;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000_000;

    fn event(kind: EventKind, props: Value, session: &str) -> Event {
        Event {
            kind,
            props: to_props(props),
            url: "https://shop.test/checkout".to_string(),
            session: session.to_string(),
            page: "p".to_string(),
            ts: NOW - 1_000,
        }
    }

    fn drop_at(field: &str, age_days: i64) -> Event {
        Event {
            ts: NOW - age_days * DAY_MS - 1,
            ..event(EventKind::Drop, json!({ "field": field, "label": "Email" }), "s")
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_insights(&[], NOW).is_empty());
    }

    #[test]
    fn test_rage_threshold() {
        let four: Vec<_> = (0..4)
            .map(|_| event(EventKind::Rage, json!({ "selector": "#pay" }), "s"))
            .collect();
        assert!(compute_insights(&four, NOW).is_empty());

        let many: Vec<_> = (0..21)
            .map(|_| event(EventKind::Rage, json!({ "selector": "#pay" }), "s"))
            .collect();
        let insights = compute_insights(&many, NOW);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].severity, Severity::High);
    }

    #[test]
    fn test_jserr_rate_bands() {
        // 1 of 9 sessions errored: 11.1%
        let mut events: Vec<_> = (0..5)
            .map(|_| event(EventKind::Jserr, json!({ "msg": "boom" }), "bad"))
            .collect();
        for i in 0..8 {
            events.push(event(EventKind::Click, json!({}), &format!("ok{i}")));
        }
        let insights = compute_insights(&events, NOW);
        assert_eq!(insights[0].severity, Severity::High);
        assert_eq!(insights[0].title, "JavaScript errors affecting 11.1% of sessions");

        // 1 of 11 sessions errored: 9.1%
        for i in 8..10 {
            events.push(event(EventKind::Click, json!({}), &format!("ok{i}")));
        }
        let insights = compute_insights(&events, NOW);
        assert_eq!(insights[0].severity, Severity::Medium);
        assert_eq!(insights[0].metadata["errorRate"], json!(9.1));
    }

    #[test]
    fn test_dropoff_spike_against_prior_week() {
        let mut events: Vec<_> = (0..4).map(|_| drop_at("email", 1)).collect();
        events.push(drop_at("email", 8));
        events.push(drop_at("phone", 2));

        let insights = compute_insights(&events, NOW);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Form drop-off spike on email");
        assert_eq!(insights[0].severity, Severity::Medium);
        assert_eq!(insights[0].summary, "4 drop-offs on \"email\" field (+300% vs last week)");
        assert_eq!(insights[0].metadata["label"], "Email");
    }

    #[test]
    fn test_dropoff_high_and_volume_paths() {
        let mut spike: Vec<_> = (0..5).map(|_| drop_at("zip", 0)).collect();
        spike.push(drop_at("zip", 10));
        let insights = compute_insights(&spike, NOW);
        assert_eq!(insights[0].severity, Severity::High);

        let volume: Vec<_> = (0..10).map(|_| drop_at("name", 3)).collect();
        let insights = compute_insights(&volume, NOW);
        assert_eq!(insights[0].severity, Severity::Medium);
        assert_eq!(insights[0].summary, "10 drop-offs on \"name\" field");

        let quiet: Vec<_> = (0..9).map(|_| drop_at("name", 3)).collect();
        assert!(compute_insights(&quiet, NOW).is_empty());

        let stale: Vec<_> = (0..12).map(|_| drop_at("name", 20)).collect();
        assert!(compute_insights(&stale, NOW).is_empty());
    }

    #[test]
    fn test_broken_flow_breakdown() {
        let mut events: Vec<_> = (0..4)
            .map(|_| event(EventKind::BrokenFlow, json!({ "type": "fetch_error" }), "s"))
            .collect();
        events.push(event(EventKind::BrokenFlow, json!({ "type": "no_response" }), "s"));

        let insights = compute_insights(&events, NOW);
        assert_eq!(insights[0].summary, "5 broken flow incidents. Most common: fetch_error");
        assert_eq!(insights[0].metadata["breakdown"]["fetch_error"], 4);
        assert_eq!(insights[0].metadata["breakdown"]["no_response"], 1);
    }

    #[test]
    fn test_slow_mean_duration() {
        let events: Vec<_> = [900.0, 1100.0, 1300.0, 1200.0, 1000.0]
            .into_iter()
            .map(|dur| event(EventKind::Slow, json!({ "dur": dur }), "s"))
            .collect();

        let insights = compute_insights(&events, NOW);
        assert_eq!(insights[0].severity, Severity::High);
        assert_eq!(insights[0].metadata["avgDuration"], json!(1100.0));
        assert!(insights[0].summary.ends_with("Most affected: https://shop.test/checkout"));

        let fast: Vec<_> = (0..5)
            .map(|_| event(EventKind::Slow, json!({ "dur": "n/a" }), "s"))
            .collect();
        assert_eq!(compute_insights(&fast, NOW)[0].severity, Severity::Medium);
    }

    #[test]
    fn test_scroll_completion() {
        let mut events = Vec::new();
        for i in 0..10 {
            let session = format!("s{i}");
            events.push(event(EventKind::Depth, json!({ "pct": 50 }), &session));
            events.push(event(EventKind::Depth, json!({ "pct": 75 }), &session));
        }
        events.push(event(EventKind::Depth, json!({ "pct": 100 }), "s0"));

        let insights = compute_insights(&events, NOW);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].severity, Severity::Low);
        assert_eq!(insights[0].summary, "Only 10.0% of sessions reach 100% scroll depth.");
        assert_eq!(insights[0].metadata["depth75"], 10);
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = InsightEngine::new(InsightThresholds {
            rage_min_events: 2,
            ..InsightThresholds::default()
        });
        let events: Vec<_> = (0..2)
            .map(|_| event(EventKind::Rage, json!({ "selector": ".cta" }), "s"))
            .collect();
        assert_eq!(engine.compute(&events, NOW).len(), 1);
    }

    #[test]
    fn test_unknown_kinds_ignored() {
        let events: Vec<_> = (0..30)
            .map(|_| event(EventKind::Unknown, json!({ "selector": "#x" }), "s"))
            .collect();
        assert!(compute_insights(&events, NOW).is_empty());
    }
}
