// Bounded undo/redo history of whole-surface snapshots.

use std::fmt;

use tracing::debug;

pub const DEFAULT_MAX_HISTORY: usize = 50;

/// PNG bytes of the entire surface at one stroke boundary.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

impl Snapshot {
    pub fn new(png: Vec<u8>) -> Self {
        Self(png)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({} bytes)", self.0.len())
    }
}

/// Snapshots plus a cursor at the one currently displayed.
///
/// `step` is `None` only while the history is empty; otherwise it always
/// indexes a valid entry.
#[derive(Debug)]
pub struct History {
    entries: Vec<Snapshot>,
    step: Option<usize>,
    cap: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            step: None,
            cap: cap.max(1),
        }
    }

    /// Append a snapshot after the cursor.
    ///
    /// Returns `false` (and changes nothing) when it is identical to the
    /// displayed snapshot. Anything after the cursor is discarded first, and
    /// the oldest entries fall off once the cap is exceeded.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        if self.current() == Some(&snapshot) {
            return false;
        }

        let next = self.step.map_or(0, |s| s + 1);
        if next < self.entries.len() {
            debug!(dropped = self.entries.len() - next, "truncating redo branch");
            self.entries.truncate(next);
        }
        self.entries.push(snapshot);

        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(..excess);
        }
        self.step = Some(self.entries.len() - 1);
        true
    }

    /// Step back one snapshot and return it.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        match self.step {
            Some(s) if s > 0 => {
                self.step = Some(s - 1);
                self.entries.get(s - 1)
            }
            _ => None,
        }
    }

    /// Step forward one snapshot and return it.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        match self.step {
            Some(s) if s + 1 < self.entries.len() => {
                self.step = Some(s + 1);
                self.entries.get(s + 1)
            }
            _ => None,
        }
    }

    /// The snapshot `undo` would move to, without moving.
    pub fn peek_undo(&self) -> Option<&Snapshot> {
        match self.step {
            Some(s) if s > 0 => self.entries.get(s - 1),
            _ => None,
        }
    }

    pub fn peek_redo(&self) -> Option<&Snapshot> {
        match self.step {
            Some(s) => self.entries.get(s + 1),
            None => None,
        }
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.step.and_then(|s| self.entries.get(s))
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.step, Some(s) if s > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.step, Some(s) if s + 1 < self.entries.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.step = None;
    }

    pub fn step(&self) -> Option<usize> {
        self.step
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, snapshot: &Snapshot) -> bool {
        self.entries.contains(snapshot)
    }
}
