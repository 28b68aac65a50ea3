//! Single-slot gate for batch guessing.
//!
//! One guess runs at a time. Later callers are queued, not rejected: they wait
//! on a fair async mutex and proceed in arrival order once the slot frees up.
//! Holding the slot is not the same as guessing: the in-progress flag is only
//! raised by [`GuessPermit::begin`], once the run has passed its preconditions.
//! The permit's `Drop` clears the flag, so an error or a panic inside a guess
//! can never leave the gate stuck.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct GuessGate {
    slot: Mutex<()>,
    busy: AtomicBool,
}

/// Held for the duration of one batch guess.
#[derive(Debug)]
pub struct GuessPermit<'a> {
    _slot: MutexGuard<'a, ()>,
    busy: &'a AtomicBool,
}

impl GuessPermit<'_> {
    /// Mark the guess as actually running.
    pub fn begin(&mut self) {
        self.busy.store(true, Ordering::Release);
    }
}

impl Drop for GuessPermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl GuessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the slot. The flag stays down until [`GuessPermit::begin`].
    pub async fn acquire(&self) -> GuessPermit<'_> {
        let slot = self.slot.lock().await;
        GuessPermit {
            _slot: slot,
            busy: &self.busy,
        }
    }

    pub fn is_guessing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
