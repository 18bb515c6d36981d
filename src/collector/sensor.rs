//! The interface every detector implements.

use crate::collector::dispatch::Dispatch;
use crate::collector::types::PageSignal;

/// A detector driven by page signals and its own timers.
///
/// A sensor emits only between `start` and `stop`. Timers are exposed to the
/// runtime through `next_deadline` / `fire_due` so that timer callbacks and
/// signal handlers interleave on one cooperative clock.
pub trait Sensor: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Begin observing. Starting a running sensor is a no-op.
    fn start(&mut self, dispatch: Dispatch, now: i64);

    /// Stop observing and cancel every pending timer.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// React to a page signal.
    fn observe(&mut self, signal: &PageSignal, now: i64);

    /// Earliest pending timer deadline, if any.
    fn next_deadline(&self) -> Option<i64> {
        None
    }

    /// Fire every timer due at `now`.
    fn fire_due(&mut self, _now: i64) {}
}
