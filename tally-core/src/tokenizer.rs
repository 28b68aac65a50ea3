//! Tokenizers for the classifier.
//!
//! The tokenizer is injected into [`crate::bayes::NaiveBayes`] so it can be
//! swapped or tested without touching the counting logic. Its name is written
//! into the serialized state; loading a state requires a tokenizer of the same
//! name.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub trait Tokenizer: fmt::Debug + Send + Sync {
    /// Stable identifier stored alongside the trained counts.
    fn name(&self) -> &str;

    /// Split text into tokens. Must be pure.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

// Anything that is not a letter (any script), digit, underscore or paren.
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}_()]").expect("token pattern is valid"));

/// Default tokenizer: punctuation becomes whitespace, then split on whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTokenizer;

impl WordTokenizer {
    pub const NAME: &'static str = "word";
}

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        NON_WORD_RE
            .replace_all(text, " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}
