//! Error type shared by the classifier and the categorizer state manager.
//!
//! Benign "nothing to do" outcomes are not errors: they come back as `None`
//! from the operations that can produce them. What lands here is a corrupted
//! or unreadable classifier state, or a caller breaking a precondition.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CategorizerError {
    /// The serialized classifier state is not valid JSON for the expected shape.
    #[error("malformed classifier state: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The classifier could not be written out as a state string.
    #[error("failed to serialize classifier state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The state was written by a newer (or unknown) format version.
    #[error("unsupported classifier state version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The state parsed but its counters disagree with each other.
    #[error("corrupt classifier state: {0}")]
    Corrupt(String),

    /// The state was trained with a tokenizer we were not given.
    #[error("classifier state uses tokenizer '{found}', but '{expected}' was supplied")]
    TokenizerMismatch { expected: String, found: String },

    /// `learn` was called without text or without a label.
    #[error("cannot learn from an empty {0}")]
    EmptyTrainingInput(&'static str),
}

pub type Result<T> = std::result::Result<T, CategorizerError>;
