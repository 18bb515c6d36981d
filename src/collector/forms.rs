//! Form drop-off tracking.
//!
//! Each touched field moves through `Touched -> PendingTimeout` and is
//! resolved exactly once, either as a `form_submit` or as a `drop`. A
//! resolved field is removed, so it cannot report again until it is focused
//! anew. Only state transitions cancel timers.

use crate::collector::dispatch::Dispatch;
use crate::collector::sensor::Sensor;
use crate::collector::timers::TimerSet;
use crate::collector::types::{to_props, Element, EventKind, FormField, LiveValue, PageSignal};
use crate::config::{millis, SensorThresholds};
use serde_json::json;

/// Replacement for any non-empty password value.
pub const PASSWORD_MASK: &str = "***";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// Focused, or refocused, with no timer running
    Touched,
    /// Blurred; the abandonment timer is running
    PendingTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormTimer {
    Abandon(String),
    LocationPoll,
}

/// Snapshot taken when a field gains focus, plus the live value handle.
#[derive(Debug, Clone)]
struct TrackedField {
    key: String,
    kind: String,
    label: String,
    value: LiveValue,
    state: FieldState,
}

/// Reports fields the user touched but never submitted.
#[derive(Debug)]
pub struct FormDropoffTracker {
    dropoff_ms: i64,
    poll_ms: i64,
    fields: Vec<TrackedField>,
    timers: TimerSet<FormTimer>,
    last_polled_url: String,
    dispatch: Option<Dispatch>,
}

impl FormDropoffTracker {
    pub fn new(thresholds: &SensorThresholds) -> Self {
        Self {
            dropoff_ms: millis(thresholds.dropoff_timeout),
            poll_ms: millis(thresholds.location_poll_interval).max(1),
            fields: Vec::new(),
            timers: TimerSet::new(),
            last_polled_url: String::new(),
            dispatch: None,
        }
    }

    /// State of a touched field, `None` when idle or resolved.
    pub fn field_state(&self, key: &str) -> Option<FieldState> {
        self.position(key).map(|i| self.fields[i].state)
    }

    /// Number of fields touched and not yet resolved.
    pub fn touched_count(&self) -> usize {
        self.fields.len()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.key == key)
    }

    fn focus_in(&mut self, field: &FormField) {
        if !field.is_form_control() {
            return;
        }
        let key = field.identity();
        self.timers.cancel(&FormTimer::Abandon(key.clone()));

        let tracked = TrackedField {
            key: key.clone(),
            kind: field.kind(),
            label: field.label(),
            value: field.value.clone(),
            state: FieldState::Touched,
        };
        match self.position(&key) {
            Some(i) => self.fields[i] = tracked,
            None => self.fields.push(tracked),
        }
    }

    fn focus_out(&mut self, field: &FormField, now: i64) {
        if !field.is_form_control() {
            return;
        }
        let key = field.identity();
        let Some(i) = self.position(&key) else {
            return;
        };

        self.fields[i].value = field.value.clone();
        self.fields[i].state = FieldState::PendingTimeout;
        self.timers
            .schedule(FormTimer::Abandon(key), now + self.dropoff_ms);
    }

    fn input(&mut self, field: &FormField) {
        if let Some(i) = self.position(&field.identity()) {
            self.fields[i].value.set(field.value.get());
        }
    }

    fn submit(&mut self, form: &Element, now: i64) {
        if form.tag_name() != "form" {
            return;
        }
        for field in std::mem::take(&mut self.fields) {
            self.timers.cancel(&FormTimer::Abandon(field.key.clone()));
            if let Some(dispatch) = &self.dispatch {
                dispatch.emit(
                    EventKind::FormSubmit,
                    to_props(json!({ "field": field.key, "success": true })),
                    now,
                );
            }
        }
    }

    fn reset(&mut self, form: &Element, now: i64) {
        if form.tag_name() != "form" {
            return;
        }
        self.flush(now);
    }

    /// Report every remaining field as a drop-off.
    fn flush(&mut self, now: i64) {
        for field in std::mem::take(&mut self.fields) {
            self.report_drop(field, now);
        }
    }

    fn abandon(&mut self, key: &str, now: i64) {
        if let Some(i) = self.position(key) {
            let field = self.fields.remove(i);
            self.report_drop(field, now);
        }
    }

    fn report_drop(&mut self, field: TrackedField, now: i64) {
        self.timers.cancel(&FormTimer::Abandon(field.key.clone()));

        let value = field.value.get();
        let has_value = !value.is_empty();
        let shown = if has_value && field.kind == "password" {
            PASSWORD_MASK.to_string()
        } else {
            value
        };

        if let Some(dispatch) = &self.dispatch {
            dispatch.emit(
                EventKind::Drop,
                to_props(json!({
                    "field": field.key,
                    "type": field.kind,
                    "label": field.label,
                    "value": shown,
                    "hasValue": has_value,
                })),
                now,
            );
        }
    }

    fn poll_location(&mut self, now: i64) {
        let Some(current) = self.dispatch.as_ref().map(|d| d.context().location()) else {
            return;
        };
        if current != self.last_polled_url {
            self.flush(now);
            self.last_polled_url = current;
        }
        self.timers
            .schedule(FormTimer::LocationPoll, now + self.poll_ms);
    }
}

impl Sensor for FormDropoffTracker {
    fn name(&self) -> &'static str {
        "forms"
    }

    fn start(&mut self, dispatch: Dispatch, now: i64) {
        if self.dispatch.is_some() {
            return;
        }
        self.last_polled_url = dispatch.context().location();
        self.dispatch = Some(dispatch);
        self.timers
            .schedule(FormTimer::LocationPoll, now + self.poll_ms);
    }

    fn stop(&mut self) {
        self.timers.cancel_all();
        self.dispatch = None;
    }

    fn is_running(&self) -> bool {
        self.dispatch.is_some()
    }

    fn observe(&mut self, signal: &PageSignal, now: i64) {
        if self.dispatch.is_none() {
            return;
        }
        match signal {
            PageSignal::FocusIn { field } => self.focus_in(field),
            PageSignal::FocusOut { field } => self.focus_out(field, now),
            PageSignal::Input { field } => self.input(field),
            PageSignal::Submit { target } => self.submit(target, now),
            PageSignal::Reset { target } => self.reset(target, now),
            PageSignal::BeforeUnload => self.flush(now),
            _ => {}
        }
    }

    fn next_deadline(&self) -> Option<i64> {
        self.timers.next_deadline()
    }

    fn fire_due(&mut self, now: i64) {
        while let Some((timer, deadline)) = self.timers.pop_due(now) {
            match timer {
                FormTimer::Abandon(key) => self.abandon(&key, deadline),
                FormTimer::LocationPoll => self.poll_location(deadline),
            }
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

    fn started() -> (FormDropoffTracker, Receiver<Event>, Arc<PageContext>) {
        let (tx, rx) = channel(64);
        let context = Arc::new(PageContext::with_ids("s", "p", None, "https://a.test/signup"));
        let mut tracker = FormDropoffTracker::new(&SensorThresholds::default());
        tracker.start(Dispatch::new(context.clone(), tx), 0);
        (tracker, rx, context)
    }

    fn form() -> Element {
        Element::new("FORM")
    }

    #[test]
    fn test_blur_without_submit_drops_once() {
        let (mut tracker, rx, _) = started();
        let value = LiveValue::new("");
        let email = FormField::input("email")
            .with_type("email")
            .with_label("Email address")
            .with_value(value.clone());

        tracker.observe(&PageSignal::FocusIn { field: email.clone() }, 100);
        value.set("ana@example.com");
        tracker.observe(&PageSignal::FocusOut { field: email.clone() }, 500);
        assert_eq!(tracker.field_state("email"), Some(FieldState::PendingTimeout));

        tracker.fire_due(2_400);
        assert_eq!(rx.try_iter().count(), 0);
        tracker.fire_due(2_500);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        let drop = &events[0];
        assert_eq!(drop.kind, EventKind::Drop);
        assert_eq!(drop.ts, 2_500);
        assert_eq!(drop.prop_str("field"), Some("email"));
        assert_eq!(drop.prop_str("type"), Some("email"));
        assert_eq!(drop.prop_str("label"), Some("Email address"));
        assert_eq!(drop.prop_str("value"), Some("ana@example.com"));
        assert_eq!(drop.props["hasValue"], true);
        assert_eq!(tracker.field_state("email"), None);

        tracker.fire_due(10_000);
        tracker.observe(&PageSignal::BeforeUnload, 10_000);
        assert!(rx
            .try_iter()
            .all(|e| e.kind != EventKind::Drop));
    }

    #[test]
    fn test_value_is_read_when_timer_fires() {
        let (mut tracker, rx, _) = started();
        let value = LiveValue::new("a");
        let name = FormField::input("name").with_value(value.clone());

        tracker.observe(&PageSignal::FocusIn { field: name.clone() }, 0);
        tracker.observe(&PageSignal::FocusOut { field: name }, 100);
        value.set("ada lovelace");
        tracker.fire_due(2_100);

        let drop = rx.try_recv().unwrap();
        assert_eq!(drop.prop_str("value"), Some("ada lovelace"));
    }

    #[test]
    fn test_submit_cancels_dropoff() {
        let (mut tracker, rx, _) = started();
        let email = FormField::input("email").with_value(LiveValue::new("x@y.z"));

        tracker.observe(&PageSignal::FocusIn { field: email.clone() }, 0);
        tracker.observe(&PageSignal::FocusOut { field: email }, 100);
        tracker.observe(&PageSignal::Submit { target: form() }, 1_000);
        tracker.fire_due(5_000);
        tracker.observe(&PageSignal::BeforeUnload, 6_000);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FormSubmit);
        assert_eq!(events[0].prop_str("field"), Some("email"));
        assert_eq!(events[0].props["success"], true);
    }

    #[test]
    fn test_refocus_restarts_cycle() {
        let (mut tracker, rx, _) = started();
        let phone = FormField::input("phone");

        tracker.observe(&PageSignal::FocusIn { field: phone.clone() }, 0);
        tracker.observe(&PageSignal::FocusOut { field: phone.clone() }, 100);
        tracker.observe(&PageSignal::FocusIn { field: phone.clone() }, 1_500);
        assert_eq!(tracker.field_state("phone"), Some(FieldState::Touched));
        tracker.fire_due(2_100);
        assert_eq!(rx.try_iter().count(), 0);

        tracker.observe(&PageSignal::FocusOut { field: phone }, 3_000);
        tracker.fire_due(5_000);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_password_is_masked() {
        let (mut tracker, rx, _) = started();
        let password = FormField::input("password")
            .with_type("password")
            .with_value(LiveValue::new("hunter2"));

        tracker.observe(&PageSignal::FocusIn { field: password.clone() }, 0);
        tracker.observe(&PageSignal::FocusOut { field: password }, 10);
        tracker.fire_due(2_010);

        let drop = rx.try_recv().unwrap();
        assert_eq!(drop.prop_str("value"), Some(PASSWORD_MASK));
        assert_eq!(drop.props["hasValue"], true);
        assert!(!drop.props.values().any(|v| v == "hunter2"));
    }

    #[test]
    fn test_reset_flushes_immediately() {
        let (mut tracker, rx, _) = started();
        let first = FormField::input("first");
        let last = FormField::input("last");

        tracker.observe(&PageSignal::FocusIn { field: first.clone() }, 0);
        tracker.observe(&PageSignal::FocusOut { field: first }, 10);
        tracker.observe(&PageSignal::FocusIn { field: last }, 20);
        tracker.observe(&PageSignal::Reset { target: form() }, 30);

        let fields: Vec<_> = rx
            .try_iter()
            .map(|e| (e.kind, e.prop_str("field").map(str::to_string)))
            .collect();
        assert_eq!(
            fields,
            vec![
                (EventKind::Drop, Some("first".to_string())),
                (EventKind::Drop, Some("last".to_string())),
            ]
        );
        assert_eq!(tracker.touched_count(), 0);
        tracker.fire_due(5_000);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_submit_on_non_form_is_ignored() {
        let (mut tracker, rx, _) = started();
        tracker.observe(&PageSignal::FocusIn { field: FormField::input("q") }, 0);
        tracker.observe(&PageSignal::Submit { target: Element::new("div") }, 10);
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(tracker.touched_count(), 1);
    }

    #[test]
    fn test_unload_flushes_touched_fields() {
        let (mut tracker, rx, _) = started();
        tracker.observe(&PageSignal::FocusIn { field: FormField::input("company") }, 0);
        tracker.observe(&PageSignal::BeforeUnload, 50);

        let drop = rx.try_recv().unwrap();
        assert_eq!(drop.kind, EventKind::Drop);
        assert_eq!(drop.props["hasValue"], false);
    }

    #[test]
    fn test_soft_navigation_flushes_on_poll() {
        let (mut tracker, rx, context) = started();
        tracker.observe(&PageSignal::FocusIn { field: FormField::input("coupon") }, 0);

        tracker.fire_due(1_000);
        assert_eq!(rx.try_iter().count(), 0);

        context.set_location("https://a.test/cart");
        tracker.fire_due(1_500);
        assert_eq!(rx.try_iter().count(), 0);
        tracker.fire_due(2_000);

        let drop = rx.try_recv().unwrap();
        assert_eq!(drop.prop_str("field"), Some("coupon"));
        assert_eq!(drop.url, "https://a.test/cart");
    }

    #[test]
    fn test_non_form_controls_ignored() {
        let (mut tracker, _rx, _) = started();
        let mut div = FormField::input("widget");
        div.tag = "div".to_string();
        tracker.observe(&PageSignal::FocusIn { field: div }, 0);
        assert_eq!(tracker.touched_count(), 0);
    }
}
