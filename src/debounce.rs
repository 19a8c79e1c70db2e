// Debounce window resizes: act only once the size has been stable for a
// quiet period.

use std::time::{Duration, Instant};

pub const RESIZE_QUIET_PERIOD: Duration = Duration::from_millis(250);

pub struct ResizeDebouncer {
    quiet: Duration,
    applied: (usize, usize),
    pending: Option<((usize, usize), Instant)>,
}

impl ResizeDebouncer {
    /// `initial` is the size the surface already has.
    pub fn new(initial: (usize, usize), quiet: Duration) -> Self {
        Self { quiet, applied: initial, pending: None }
    }

    /// Report the size observed at `now`. Each change restarts the timer.
    pub fn observe(&mut self, size: (usize, usize), now: Instant) {
        match self.pending {
            Some((pending, _)) if pending == size => {}
            _ if size == self.applied => self.pending = None,
            _ => self.pending = Some((size, now)),
        }
    }

    /// The size to apply, once it has been stable for the quiet period.
    pub fn poll(&mut self, now: Instant) -> Option<(usize, usize)> {
        let (size, since) = self.pending?;
        if now.duration_since(since) < self.quiet {
            return None;
        }
        self.pending = None;
        self.applied = size;
        Some(size)
    }
}
