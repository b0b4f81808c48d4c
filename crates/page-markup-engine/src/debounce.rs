//! Trailing-edge debouncing for the reconciliation loop.

/// A trailing-edge debounce window over a polled millisecond clock.
///
/// Every trigger pushes the deadline `window_ms` past the trigger time, so
/// a burst of triggers fires once, after the burst goes quiet. The engine
/// has no timers of its own; hosts poll with their clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debouncer {
    window_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Debouncer {
            window_ms,
            deadline: None,
        }
    }

    /// Start or restart the window at `now_ms`.
    pub fn trigger(&mut self, now_ms: u64) {
        self.deadline = Some(now_ms + self.window_ms);
    }

    /// A trigger has happened and not yet fired.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.deadline.is_some_and(|deadline| now_ms >= deadline)
    }

    /// Clear and report a due deadline; the firing edge of the window.
    pub fn fire(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.deadline = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
