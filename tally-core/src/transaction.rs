//! Transaction records as the host application stores them.
//!
//! The categorizer only reads the description fields and the category pair,
//! and only writes through the helpers at the bottom of this file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::normalize::normalize;

/// Row id -> category id. An empty category id means "clear".
pub type RowCategoryMapping = BTreeMap<String, String>;

/// Row id -> guessed category id.
pub type GuessMapping = BTreeMap<String, String>;

/// An imported bank transaction.
///
/// Fields the categorizer does not use (dates, amounts, accounts...) are kept
/// verbatim in `extra` so a read-modify-write never loses host data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Stable id, unique within the collection
    pub id: String,
    /// Raw free text as imported
    #[serde(default)]
    pub description: String,
    /// Normalized description, recomputed by [`clean_descriptions`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_cleaned: Option<String>,
    #[serde(default)]
    pub category: TransactionCategory,
    /// Ignored rows are left out of bulk guessing
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Confirmed (user-asserted) and guessed (machine-suggested) category ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionCategory {
    #[serde(default)]
    pub confirmed: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guess: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TransactionCategory {
    pub fn is_confirmed(&self) -> bool {
        !self.confirmed.is_empty()
    }
}

impl Transaction {
    /// Build a transaction with its cleaned description already computed.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            id: id.into(),
            description_cleaned: Some(normalize(&description)),
            description,
            ..Self::default()
        }
    }

    pub fn with_confirmed(mut self, category: impl Into<String>) -> Self {
        self.category.confirmed = category.into();
        self
    }

    pub fn with_guess(mut self, category: impl Into<String>) -> Self {
        self.category.guess = category.into();
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Text the classifier sees for this row.
    ///
    /// The cleaned description wins when present (even if it cleaned down to
    /// nothing); the raw description is only a fallback for rows that never
    /// went through the migration. `None` when there is nothing to use.
    pub fn training_text(&self) -> Option<&str> {
        let text = match &self.description_cleaned {
            Some(cleaned) => cleaned.as_str(),
            None => self.description.as_str(),
        };
        (!text.is_empty()).then_some(text)
    }

    pub fn is_confirmed(&self) -> bool {
        self.category.is_confirmed()
    }
}

/// Recompute `description_cleaned` for every row.
pub fn clean_descriptions(transactions: &mut [Transaction]) {
    for txn in transactions.iter_mut() {
        txn.description_cleaned = Some(normalize(&txn.description));
    }
}

/// Write confirmed categories back onto the rows named in `mapping`.
///
/// Returns how many rows were touched; unknown ids are skipped.
pub fn apply_confirmed(transactions: &mut [Transaction], mapping: &RowCategoryMapping) -> usize {
    let mut touched = 0;
    for txn in transactions.iter_mut() {
        if let Some(category) = mapping.get(&txn.id) {
            txn.category.confirmed = category.clone();
            touched += 1;
        }
    }
    touched
}

/// Write guesses back onto the rows named in `guesses`.
pub fn apply_guesses(transactions: &mut [Transaction], guesses: &GuessMapping) -> usize {
    let mut touched = 0;
    for txn in transactions.iter_mut() {
        if let Some(category) = guesses.get(&txn.id) {
            txn.category.guess = category.clone();
            touched += 1;
        }
    }
    touched
}

/// Distinct non-empty confirmed category ids, sorted.
pub fn distinct_confirmed_categories(transactions: &[Transaction]) -> BTreeSet<&str> {
    transactions
        .iter()
        .filter(|t| t.is_confirmed())
        .map(|t| t.category.confirmed.as_str())
        .collect()
}
