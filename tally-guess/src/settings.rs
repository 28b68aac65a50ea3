//! Batch guessing knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for [`crate::BatchGuesser`]. Missing fields fall back to defaults
/// when read from a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuessSettings {
    /// Transactions per `guess` call
    pub batch_size: usize,
    /// Pause between batches, in milliseconds
    pub yield_ms: u64,
    /// Gated guessing needs at least this many distinct confirmed categories
    pub min_confirmed_categories: usize,
}

impl Default for GuessSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            yield_ms: 10,
            min_confirmed_categories: 3,
        }
    }
}

impl GuessSettings {
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_ms)
    }
}

/// Per-call-site behavior.
///
/// The bulk "guess everything" action is gated on category diversity and
/// leaves ignored rows alone; guessing right after an import does neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessOptions {
    pub require_category_diversity: bool,
    pub skip_ignored: bool,
}

impl GuessOptions {
    pub fn bulk() -> Self {
        Self {
            require_category_diversity: true,
            skip_ignored: true,
        }
    }

    pub fn after_import() -> Self {
        Self {
            require_category_diversity: false,
            skip_ignored: false,
        }
    }
}
