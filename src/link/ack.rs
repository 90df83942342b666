//! Shared latest-ACK slot
//!
//! One slot per link, written by the listener thread and consumed by
//! whoever is blocked in `wait_for_ack`. Overwrites are
//! last-write-wins: the firmware echoes exactly one ACK per command
//! and the link supports one outstanding command, so an unconsumed
//! previous ACK being replaced is a known low-probability race, not a
//! supported flow.

use std::sync::{Arc, Mutex};

/// Mutex-protected latest-ACK line, clonable handle
///
/// The lock is held only for the store/peek/clear of the slot itself,
/// never across I/O or parsing.
#[derive(Clone, Default)]
pub struct AckSlot {
    inner: Arc<Mutex<Option<String>>>,
}

impl AckSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot with a newly received ACK line.
    pub fn store(&self, line: String) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(line);
    }

    /// Copy of the current ACK line, left in place.
    pub fn peek(&self) -> Option<String> {
        let slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slot.clone()
    }

    /// Empty the slot (after a successful match, or on listener start).
    pub fn clear(&self) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}
