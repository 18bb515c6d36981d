//! Cancellable one-shot timers on the page's virtual clock.
//!
//! Every detector schedules through a `TimerSet`. Cancelling removes the
//! handle, so a cancelled timer can never fire afterwards.

/// A pending timer.
#[derive(Debug, Clone)]
struct Timer<K> {
    key: K,
    deadline: i64,
    seq: u64,
}

/// Keyed set of pending timers.
#[derive(Debug, Clone)]
pub struct TimerSet<K> {
    timers: Vec<Timer<K>>,
    next_seq: u64,
}

impl<K: PartialEq> TimerSet<K> {
    pub fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_seq: 0,
        }
    }

    /// Schedule `key` to fire at `deadline`, replacing any pending timer
    /// with the same key.
    pub fn schedule(&mut self, key: K, deadline: i64) {
        self.cancel(&key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer { key, deadline, seq });
    }

    /// Cancel a pending timer. Returns whether one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| &t.key != key);
        before != self.timers.len()
    }

    /// Cancel everything. Returns how many timers were pending.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        self.timers.clear();
        count
    }

    pub fn deadline_of(&self, key: &K) -> Option<i64> {
        self.timers
            .iter()
            .find(|t| &t.key == key)
            .map(|t| t.deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer due at `now`.
    ///
    /// Timers with equal deadlines fire in scheduling order.
    pub fn pop_due(&mut self, now: i64) -> Option<(K, i64)> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(i, _)| i)?;
        let timer = self.timers.remove(index);
        Some((timer.key, timer.deadline))
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl<K: PartialEq> Default for TimerSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
