//! Transparency reporting.
//!
//! Exposes what the sensors collected and what was lost, so that site
//! owners can audit the telemetry.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log_with_persistence, EventFamily, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
