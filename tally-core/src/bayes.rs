//! Multinomial naive-Bayes text classifier over category labels.
//!
//! The classifier is a value: `learn` consumes it and hands back the updated
//! one, and the only persisted form is the string produced by
//! [`NaiveBayes::to_state_string`]. Counters live in ordered maps so the same
//! training sequence always serializes to the same bytes.
//!
//! There is no unlearn. Removing a label's contribution means training a new
//! classifier from scratch (see [`crate::categorizer`]).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{CategorizerError, Result};
use crate::tokenizer::{Tokenizer, WordTokenizer};

/// Current serialized format version.
pub const STATE_VERSION: u32 = 1;

/// Smoothing and tokenizer settings, persisted with the counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesOptions {
    /// Name of the tokenizer the counts were built with
    pub tokenizer: String,
    /// Laplace smoothing constant
    pub alpha: f64,
}

impl Default for BayesOptions {
    fn default() -> Self {
        Self {
            tokenizer: WordTokenizer::NAME.to_string(),
            alpha: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BayesModel {
    version: u32,
    options: BayesOptions,
    /// Labels in the order they were first learned; drives tie-breaking.
    categories: Vec<String>,
    doc_count: BTreeMap<String, u64>,
    total_documents: u64,
    vocabulary: BTreeSet<String>,
    vocabulary_size: u64,
    word_count: BTreeMap<String, u64>,
    word_frequency_count: BTreeMap<String, BTreeMap<String, u64>>,
}

impl BayesModel {
    fn empty(options: BayesOptions) -> Self {
        Self {
            version: STATE_VERSION,
            options,
            categories: Vec::new(),
            doc_count: BTreeMap::new(),
            total_documents: 0,
            vocabulary: BTreeSet::new(),
            vocabulary_size: 0,
            word_count: BTreeMap::new(),
            word_frequency_count: BTreeMap::new(),
        }
    }

    fn check_consistency(&self) -> Result<()> {
        if self.vocabulary_size != self.vocabulary.len() as u64 {
            return Err(CategorizerError::Corrupt(format!(
                "vocabularySize {} but {} vocabulary entries",
                self.vocabulary_size,
                self.vocabulary.len()
            )));
        }
        let docs: u64 = self.doc_count.values().sum();
        if docs != self.total_documents {
            return Err(CategorizerError::Corrupt(format!(
                "totalDocuments {} but docCount sums to {}",
                self.total_documents, docs
            )));
        }
        let labels: BTreeSet<&String> = self.categories.iter().collect();
        if labels.len() != self.categories.len() {
            return Err(CategorizerError::Corrupt("duplicate entries in categories".to_string()));
        }
        // every per-label map must be keyed by exactly the listed categories
        let keyed: [(&str, Vec<&String>); 3] = [
            ("docCount", self.doc_count.keys().collect()),
            ("wordCount", self.word_count.keys().collect()),
            ("wordFrequencyCount", self.word_frequency_count.keys().collect()),
        ];
        for (field, keys) in keyed {
            let keys: BTreeSet<&String> = keys.into_iter().collect();
            if keys != labels {
                return Err(CategorizerError::Corrupt(format!(
                    "{field} labels do not match categories"
                )));
            }
        }
        if !(self.options.alpha > 0.0) {
            return Err(CategorizerError::Corrupt(format!(
                "smoothing alpha must be positive, got {}",
                self.options.alpha
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

#[derive(Debug, Clone)]
pub struct NaiveBayes {
    model: BayesModel,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for NaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for NaiveBayes {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model
    }
}

impl NaiveBayes {
    /// Empty classifier with the default word tokenizer.
    pub fn new() -> Self {
        Self::with_tokenizer(Arc::new(WordTokenizer))
    }

    /// Empty classifier with an injected tokenizer.
    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        let options = BayesOptions {
            tokenizer: tokenizer.name().to_string(),
            ..BayesOptions::default()
        };
        Self {
            model: BayesModel::empty(options),
            tokenizer,
        }
    }

    /// Load a serialized state using the default word tokenizer.
    pub fn from_state_str(state: &str) -> Result<Self> {
        Self::from_state_str_with(state, Arc::new(WordTokenizer))
    }

    /// Load a serialized state with an injected tokenizer.
    ///
    /// Rejects states from a newer format version and states trained with a
    /// differently named tokenizer.
    pub fn from_state_str_with(state: &str, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        let header: VersionHeader = serde_json::from_str(state)?;
        if header.version == 0 || header.version > STATE_VERSION {
            return Err(CategorizerError::UnsupportedVersion {
                found: header.version,
                supported: STATE_VERSION,
            });
        }

        let model: BayesModel = serde_json::from_str(state)?;
        model.check_consistency()?;

        if model.options.tokenizer != tokenizer.name() {
            return Err(CategorizerError::TokenizerMismatch {
                expected: tokenizer.name().to_string(),
                found: model.options.tokenizer,
            });
        }

        Ok(Self { model, tokenizer })
    }

    /// Serialize to the persisted string form.
    pub fn to_state_string(&self) -> Result<String> {
        serde_json::to_string(&self.model).map_err(CategorizerError::Serialize)
    }

    /// Train on one document, returning the updated classifier.
    pub fn learn(mut self, text: &str, label: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(CategorizerError::EmptyTrainingInput("text"));
        }
        if label.is_empty() {
            return Err(CategorizerError::EmptyTrainingInput("label"));
        }

        let model = &mut self.model;
        if !model.doc_count.contains_key(label) {
            model.categories.push(label.to_string());
            model.word_count.insert(label.to_string(), 0);
            model.word_frequency_count.insert(label.to_string(), BTreeMap::new());
        }
        *model.doc_count.entry(label.to_string()).or_insert(0) += 1;
        model.total_documents += 1;

        for token in self.tokenizer.tokenize(text) {
            if !model.vocabulary.contains(&token) {
                model.vocabulary.insert(token.clone());
                model.vocabulary_size += 1;
            }
            *model.word_count.entry(label.to_string()).or_insert(0) += 1;
            *model
                .word_frequency_count
                .entry(label.to_string())
                .or_default()
                .entry(token)
                .or_insert(0) += 1;
        }

        Ok(self)
    }

    /// Log-probability of `text` under every known label, in first-learned order.
    pub fn scores(&self, text: &str) -> Vec<(&str, f64)> {
        let model = &self.model;
        if model.total_documents == 0 {
            return Vec::new();
        }

        let mut frequencies: BTreeMap<String, u64> = BTreeMap::new();
        for token in self.tokenizer.tokenize(text) {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        let alpha = model.options.alpha;
        let vocabulary_size = model.vocabulary.len() as f64;
        let total = model.total_documents as f64;

        model
            .categories
            .iter()
            .map(|label| {
                let docs = model.doc_count.get(label).copied().unwrap_or(0) as f64;
                let mut score = (docs / total).ln();

                let words = model.word_count.get(label).copied().unwrap_or(0) as f64;
                let denominator = words + alpha * vocabulary_size;
                let table = model.word_frequency_count.get(label);
                if denominator > 0.0 {
                    for (token, &n) in &frequencies {
                        let seen = table.and_then(|t| t.get(token)).copied().unwrap_or(0) as f64;
                        score += n as f64 * ((seen + alpha) / denominator).ln();
                    }
                }

                (label.as_str(), score)
            })
            .collect()
    }

    /// Most probable label for `text`, or `None` if nothing has been learned.
    ///
    /// Equal scores go to the label learned first.
    pub fn categorize(&self, text: &str) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for (label, score) in self.scores(text) {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((label, score)),
            }
        }
        best.map(|(label, _)| label.to_string())
    }

    pub fn categories(&self) -> &[String] {
        &self.model.categories
    }

    pub fn is_empty(&self) -> bool {
        self.model.categories.is_empty()
    }

    pub fn doc_count(&self, label: &str) -> u64 {
        self.model.doc_count.get(label).copied().unwrap_or(0)
    }

    pub fn total_documents(&self) -> u64 {
        self.model.total_documents
    }

    pub fn vocabulary_size(&self) -> u64 {
        self.model.vocabulary_size
    }

    pub fn word_count(&self, label: &str) -> u64 {
        self.model.word_count.get(label).copied().unwrap_or(0)
    }

    pub fn word_frequency(&self, label: &str, token: &str) -> u64 {
        self.model
            .word_frequency_count
            .get(label)
            .and_then(|t| t.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn options(&self) -> &BayesOptions {
        &self.model.options
    }
}
