//! Event and page-signal types for the PixelPulse sensors.
//!
//! Events carry only what a detector needs to explain itself: selectors,
//! short text snippets, counts and timings. Field values are read lazily and
//! passwords are always masked.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Type-specific event properties.
pub type Props = serde_json::Map<String, Value>;

/// Convert a `json!` object literal into [`Props`].
///
/// Non-object values produce an empty map.
pub fn to_props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => Props::new(),
    }
}

/// Closed vocabulary of event tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Click on a semantic element
    Click,
    /// Rapid repeated clicks on the same target
    Rage,
    /// Scroll-depth milestone
    Depth,
    /// Form field abandoned without submit
    Drop,
    /// Touched field submitted with its form
    FormSubmit,
    /// Action that produced no observable effect
    BrokenFlow,
    /// Uncaught script error or unhandled rejection
    Jserr,
    /// Long task or slow resource
    Slow,
    /// Page lost visibility
    PageHide,
    /// Any tag outside the vocabulary (stored events only)
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Rage => "rage",
            EventKind::Depth => "depth",
            EventKind::Drop => "drop",
            EventKind::FormSubmit => "form_submit",
            EventKind::BrokenFlow => "broken_flow",
            EventKind::Jserr => "jserr",
            EventKind::Slow => "slow",
            EventKind::PageHide => "page_hide",
            EventKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic unit of telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Which detector produced the event
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Type-specific properties
    #[serde(default)]
    pub props: Props,
    /// Page URL at capture time
    #[serde(default)]
    pub url: String,
    /// Browser-tab session identifier
    #[serde(default)]
    pub session: String,
    /// Script-load identifier
    #[serde(default)]
    pub page: String,
    /// Capture time, milliseconds since epoch
    pub ts: i64,
}

impl Event {
    /// String property, if present and a string.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(Value::as_str)
    }

    /// Numeric property, if present and a number.
    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        self.props.get(key).and_then(Value::as_f64)
    }
}

/// Compact ingestion body, one event per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub t: EventKind,
    #[serde(default)]
    pub p: Props,
    pub ts: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub page: String,
    /// Project token; serialized as `null` when absent
    #[serde(default)]
    pub token: Option<String>,
}

impl WireEvent {
    pub fn from_event(event: &Event, token: Option<&str>) -> Self {
        Self {
            t: event.kind,
            p: event.props.clone(),
            ts: event.ts,
            url: event.url.clone(),
            session: event.session.clone(),
            page: event.page.clone(),
            token: token.map(str::to_string),
        }
    }

    /// Back to the stored shape, discarding the token.
    pub fn into_event(self) -> Event {
        Event {
            kind: self.t,
            props: self.p,
            url: self.url,
            session: self.session,
            page: self.page,
            ts: self.ts,
        }
    }
}

/// Snapshot of a DOM node as seen by the click sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    pub tag: String,
    pub id: String,
    pub class_list: Vec<String>,
    pub inner_text: Option<String>,
    pub text_content: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// A click listener was attached as a property (`el.onclick`)
    pub has_click_handler: bool,
    pub parent: Option<Box<Element>>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class_list.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.inner_text = Some(text.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_click_handler(mut self) -> Self {
        self.has_click_handler = true;
        self
    }

    pub fn with_parent(mut self, parent: Element) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Lowercased tag name.
    pub fn tag_name(&self) -> String {
        self.tag.to_lowercase()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Nearest ancestor-or-self carrying `data-pp`, falling back to self.
    pub fn closest_tracked(&self) -> &Element {
        let mut current = Some(self);
        while let Some(el) = current {
            if el.attributes.contains_key("data-pp") {
                return el;
            }
            current = el.parent.as_deref();
        }
        self
    }
}

/// Shared handle to a form field's current content.
///
/// The page keeps writing to it while the user types; the drop-off tracker
/// reads it only when a field is finally reported. A detached handle models
/// an element removed from the document and reads as empty.
#[derive(Debug, Clone)]
pub struct LiveValue(Arc<RwLock<Option<String>>>);

impl LiveValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(Some(value.into()))))
    }

    pub fn set(&self, value: impl Into<String>) {
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(value.into());
        }
    }

    pub fn get(&self) -> String {
        self.0
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_default()
    }

    pub fn detach(&self) {
        if let Ok(mut slot) = self.0.write() {
            *slot = None;
        }
    }
}

impl Default for LiveValue {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Serialize for LiveValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LiveValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// An input, textarea or select element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormField {
    pub tag: String,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    #[serde(rename = "type")]
    pub input_type: String,
    pub labels: Vec<String>,
    pub value: LiveValue,
}

impl FormField {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            tag: "input".to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_value(mut self, value: LiveValue) -> Self {
        self.value = value;
        self
    }

    /// Whether the tag is one the form tracker watches.
    pub fn is_form_control(&self) -> bool {
        matches!(
            self.tag.to_lowercase().as_str(),
            "input" | "textarea" | "select"
        )
    }

    /// Field identity: name, then id, then placeholder, then `"unknown"`.
    pub fn identity(&self) -> String {
        [&self.name, &self.id, &self.placeholder]
            .into_iter()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Declared input type, defaulting to `text`.
    pub fn kind(&self) -> String {
        if self.input_type.is_empty() {
            "text".to_string()
        } else {
            self.input_type.clone()
        }
    }

    /// First label text, then placeholder, then the field identity.
    pub fn label(&self) -> String {
        self.labels
            .first()
            .filter(|l| !l.is_empty())
            .cloned()
            .or_else(|| Some(self.placeholder.clone()).filter(|p| !p.is_empty()))
            .unwrap_or_else(|| self.identity())
    }
}

/// A performance timeline entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceEntry {
    /// `longtask`, `resource`, ...
    pub entry_type: String,
    pub name: String,
    /// Milliseconds
    pub duration: f64,
    pub transfer_size: Option<u64>,
}

/// Everything the sensors can observe about a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSignal {
    Click {
        #[serde(default)]
        target: Option<Element>,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Scroll {
        scroll_top: f64,
        scroll_height: f64,
        viewport_height: f64,
    },
    FocusIn {
        field: FormField,
    },
    FocusOut {
        field: FormField,
    },
    /// The user edited a field's content
    Input {
        field: FormField,
    },
    Submit {
        target: Element,
    },
    Reset {
        target: Element,
    },
    BeforeUnload,
    /// Browser back/forward navigation
    PopState,
    FetchRejected {
        url: String,
        error: String,
    },
    ScriptError {
        #[serde(default)]
        message: String,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        column: Option<u32>,
        #[serde(default)]
        stack: Option<String>,
    },
    UnhandledRejection {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        stack: Option<String>,
    },
    PerformanceEntry {
        entry: PerformanceEntry,
    },
    VisibilityHidden,
}

/// A page signal stamped with its observation time, one per replay line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedSignal {
    /// Milliseconds since epoch
    pub at: i64,
    /// Location change observed before the signal, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub signal: PageSignal,
}

/// Truncate to at most `max` characters.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
