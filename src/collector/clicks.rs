//! Plain semantic click events.

use crate::collector::dispatch::Dispatch;
use crate::collector::element::classify_click_target;
use crate::collector::sensor::Sensor;
use crate::collector::types::{to_props, EventKind, PageSignal};
use serde_json::json;

/// Emits a `click` event for every click on a semantic element.
#[derive(Debug, Default)]
pub struct SemanticClickSensor {
    dispatch: Option<Dispatch>,
}

impl SemanticClickSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sensor for SemanticClickSensor {
    fn name(&self) -> &'static str {
        "clicks"
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
        let (Some(dispatch), PageSignal::Click { target, x, y }) = (&self.dispatch, signal) else {
            return;
        };
        let Some(info) = classify_click_target(target.as_ref()).filter(|i| i.is_semantic) else {
            return;
        };

        dispatch.emit(
            EventKind::Click,
            to_props(json!({
                "tag": info.tag,
                "text": info.text,
                "id": info.id,
                "cls": info.class_list,
                "selector": info.selector,
                "x": x,
                "y": y,
            })),
            now,
        );
    }
}
