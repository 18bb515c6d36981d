//! PixelPulse - behavioral analytics sensors and an insight engine.
//!
//! The sensors watch a page through an abstract stream of page signals and
//! emit compact events describing friction: rage clicks, abandoned form
//! fields, clicks that do nothing, script errors and slow work. The insight
//! engine turns a stored event collection into ranked, actionable findings.
//!
//! # Privacy Guarantees
//!
//! - **No passwords**: password values are always replaced with a mask
//! - **Bounded text**: element text is capped at 80 characters
//! - **No keystrokes**: only focus, blur and final field values are observed
//! - **Transparency**: every forwarded or dropped event is counted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          PixelPulse                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │ PageSignals │──▶│ PageRuntime │──▶│  Dispatch   │         │
//! │  │             │   │  (sensors)  │   │ (channel)   │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                                             │                │
//! │                                             ▼                │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  Insights   │◀──│ (storage)   │◀──│  Transport  │         │
//! │  │  Engine     │   │             │   │             │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pixelpulse::collector::{channel, Element, PageRuntime, PageSignal};
//! use pixelpulse::config::SensorThresholds;
//!
//! let (tx, rx) = channel(1024);
//! let thresholds = SensorThresholds::default();
//! let mut runtime = PageRuntime::new(&thresholds, "https://shop.test/", None, tx);
//! runtime.start(0);
//!
//! let click = PageSignal::Click {
//!     target: Some(Element::new("button").with_id("pay")),
//!     x: 10.0,
//!     y: 20.0,
//! };
//! runtime.handle(&click, 100);
//! runtime.teardown(5_000);
//!
//! for event in rx.try_iter() {
//!     println!("{} {:?}", event.kind, event.props);
//! }
//! ```

pub mod collector;
pub mod config;
pub mod insights;
pub mod transparency;
pub mod transport;

// Re-export key types at crate root for convenience
pub use collector::{Dispatch, Event, EventKind, PageRuntime, PageSignal, Sensor, WireEvent};
pub use config::{Config, InsightThresholds, SensorThresholds};
pub use insights::{compute_insights, Insight, InsightEngine, Severity};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use transport::{spawn_forwarder, MemoryTransport, Transport, TransportConfig, TransportError};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to site owners.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                PIXELPULSE - PRIVACY DECLARATION                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  The sensors record signs of user friction on your pages.        ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Clicks on buttons, links and other interactive elements     ║
║    • Scroll depth milestones (50%, 75%, 100%)                    ║
║    • Form fields left without submitting, with their value       ║
║    • Script errors, slow tasks and slow resources                ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Password values (always masked)                             ║
║    • Individual keystrokes                                       ║
║    • Cookies, local storage or request bodies                    ║
║    • Element text beyond 80 characters                           ║
║                                                                  ║
║  Delivery is best effort: events may be lost and are never       ║
║  retried.                                                        ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    pixelpulse status                                             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
