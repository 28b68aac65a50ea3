//! tally-guess: batched, gated category guessing on top of tally-core.

pub mod batch;
pub mod gate;
pub mod settings;

pub use batch::{BatchGuessOutcome, BatchGuesser, GuessEvent};
pub use gate::{GuessGate, GuessPermit};
pub use settings::{GuessOptions, GuessSettings};
