//! Server-side insight engine.
//!
//! The engine is a pure computation over an in-memory event collection that
//! the storage layer has already scoped by project and time range. It never
//! performs I/O.

pub mod engine;
pub mod types;
pub mod windowing;

pub use engine::{compute_insights, InsightEngine};
pub use types::{Insight, Severity};
pub use windowing::{top_by_count, Group, DAY_MS};
