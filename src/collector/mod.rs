//! Page sensors.
//!
//! Sensors observe an abstract stream of page signals, never the host page
//! directly. Each one turns the signals it cares about into compact events
//! and hands them to a shared [`Dispatch`].

pub mod clicks;
pub mod dispatch;
pub mod element;
pub mod faults;
pub mod flow;
pub mod forms;
pub mod rage;
pub mod runtime;
pub mod scroll;
pub mod sensor;
pub mod timers;
pub mod types;

// Re-export commonly used types
pub use clicks::SemanticClickSensor;
pub use dispatch::{channel, Dispatch, PageContext, DEFAULT_CHANNEL_CAPACITY};
pub use element::{classify, classify_click_target, ElementInfo};
pub use faults::ErrorAndPerfSensors;
pub use flow::{BrokenFlowDetector, ClickId};
pub use forms::{FieldState, FormDropoffTracker, PASSWORD_MASK};
pub use rage::RageClickDetector;
pub use runtime::PageRuntime;
pub use scroll::ScrollDepthTracker;
pub use sensor::Sensor;
pub use timers::TimerSet;
pub use types::{
    Element, Event, EventKind, FormField, LiveValue, PageSignal, PerformanceEntry, Props,
    TimedSignal, WireEvent,
};
