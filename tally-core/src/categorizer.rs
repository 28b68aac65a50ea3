//! Categorizer state manager.
//!
//! Owns the decision between a full retrain and an incremental learn, so that
//! after every call the classifier reflects exactly the confirmed
//! `(description, category)` pairs of the transaction collection.
//!
//! Every operation takes the current [`CategorizerConfig`] by reference and
//! returns a new one; nothing here mutates the caller's state. The host
//! helpers at the bottom ([`confirm`], [`bulk_confirm`], [`delete_category`])
//! are the only functions that write to transactions, and they do it through
//! an explicit `&mut`.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::bayes::NaiveBayes;
use crate::error::Result;
use crate::tokenizer::{Tokenizer, WordTokenizer};
use crate::transaction::{GuessMapping, RowCategoryMapping, Transaction, apply_confirmed};

/// Persisted classifier state. An empty `bayes` means "no classifier yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizerConfig {
    #[serde(default)]
    pub bayes: String,
}

impl CategorizerConfig {
    pub fn untrained() -> Self {
        Self::default()
    }

    pub fn has_classifier(&self) -> bool {
        !self.bayes.is_empty()
    }

    fn from_classifier(classifier: &NaiveBayes) -> Result<Self> {
        Ok(Self {
            bayes: classifier.to_state_string()?,
        })
    }
}

/// Retrain/update/guess bound to one tokenizer.
#[derive(Debug, Clone)]
pub struct Categorizer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(Arc::new(WordTokenizer))
    }
}

impl Categorizer {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Deserialize `config`, or `None` when it holds no classifier.
    pub fn load(&self, config: &CategorizerConfig) -> Result<Option<NaiveBayes>> {
        if !config.has_classifier() {
            return Ok(None);
        }
        NaiveBayes::from_state_str_with(&config.bayes, self.tokenizer.clone()).map(Some)
    }

    fn train_on<'a>(&self, transactions: impl IntoIterator<Item = &'a Transaction>) -> Result<NaiveBayes> {
        let mut classifier = NaiveBayes::with_tokenizer(self.tokenizer.clone());
        for txn in transactions {
            if !txn.is_confirmed() {
                continue;
            }
            if let Some(text) = txn.training_text() {
                classifier = classifier.learn(text, &txn.category.confirmed)?;
            }
        }
        Ok(classifier)
    }

    /// Build a fresh classifier from every confirmed transaction.
    ///
    /// With nothing confirmed the result is a valid, empty classifier state.
    pub fn retrain(&self, transactions: &[Transaction]) -> Result<CategorizerConfig> {
        let classifier = self.train_on(transactions)?;
        debug!(
            "retrained classifier: {} documents, {} categories",
            classifier.total_documents(),
            classifier.categories().len()
        );
        CategorizerConfig::from_classifier(&classifier)
    }

    /// Apply a row -> category mapping to the classifier.
    ///
    /// Returns `Ok(None)` when none of the mapped ids exist in `transactions`.
    /// If any mapped row already had a confirmed category, or there is no
    /// classifier yet, the classifier is rebuilt from every other row first so
    /// the old labels of the mapped rows cannot survive. Otherwise the new
    /// labels are learned on top of the existing classifier. Empty category
    /// ids clear a row and teach nothing.
    pub fn update(
        &self,
        transactions: &[Transaction],
        current: &CategorizerConfig,
        mapping: &RowCategoryMapping,
    ) -> Result<Option<CategorizerConfig>> {
        let index: HashMap<&str, usize> = transactions
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.as_str(), i))
            .collect();

        let resolved: Vec<(&Transaction, &str)> = mapping
            .iter()
            .filter_map(|(id, category)| {
                index
                    .get(id.as_str())
                    .map(|&i| (&transactions[i], category.as_str()))
            })
            .collect();

        if resolved.is_empty() {
            return Ok(None);
        }

        let overwrites = resolved.iter().any(|(txn, _)| txn.is_confirmed());
        let existing = if overwrites { None } else { self.load(current)? };

        let mut classifier = match existing {
            Some(classifier) => {
                debug!("incremental learn for {} rows", resolved.len());
                classifier
            }
            None => {
                debug!(
                    "full retrain excluding {} updated rows (overwrite: {})",
                    resolved.len(),
                    overwrites
                );
                let excluded: HashSet<&str> = resolved.iter().map(|(t, _)| t.id.as_str()).collect();
                self.train_on(transactions.iter().filter(|t| !excluded.contains(t.id.as_str())))?
            }
        };

        for (txn, category) in resolved {
            if category.is_empty() {
                continue;
            }
            if let Some(text) = txn.training_text() {
                classifier = classifier.learn(text, category)?;
            }
        }

        CategorizerConfig::from_classifier(&classifier).map(Some)
    }

    /// Guess a category for each transaction with a usable description.
    ///
    /// `Ok(None)` when `config` holds no classifier. Rows without text are
    /// left out of the mapping.
    pub fn guess<'a>(
        &self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
        config: &CategorizerConfig,
    ) -> Result<Option<GuessMapping>> {
        Ok(self
            .load(config)?
            .map(|classifier| guess_with(&classifier, transactions)))
    }
}

/// Guess with an already-loaded classifier.
pub fn guess_with<'a>(
    classifier: &NaiveBayes,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> GuessMapping {
    let mut guesses = GuessMapping::new();
    for txn in transactions {
        let Some(text) = txn.training_text() else { continue };
        if let Some(label) = classifier.categorize(text) {
            guesses.insert(txn.id.clone(), label);
        }
    }
    guesses
}

/// [`Categorizer::retrain`] with the default tokenizer.
pub fn retrain(transactions: &[Transaction]) -> Result<CategorizerConfig> {
    Categorizer::default().retrain(transactions)
}

/// [`Categorizer::update`] with the default tokenizer.
pub fn update(
    transactions: &[Transaction],
    current: &CategorizerConfig,
    mapping: &RowCategoryMapping,
) -> Result<Option<CategorizerConfig>> {
    Categorizer::default().update(transactions, current, mapping)
}

/// [`Categorizer::guess`] with the default tokenizer.
pub fn guess<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    config: &CategorizerConfig,
) -> Result<Option<GuessMapping>> {
    Categorizer::default().guess(transactions, config)
}

/// Result of [`confirm`] / [`bulk_confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub config: CategorizerConfig,
    /// Rows whose confirmed category was written; unknown ids are not counted.
    pub rows: usize,
}

/// Update the classifier and write the confirmed labels onto the rows.
pub fn confirm(
    transactions: &mut [Transaction],
    current: &CategorizerConfig,
    mapping: &RowCategoryMapping,
) -> Result<Option<Confirmation>> {
    let Some(config) = update(transactions, current, mapping)? else {
        return Ok(None);
    };
    let rows = apply_confirmed(transactions, mapping);
    Ok(Some(Confirmation { config, rows }))
}

/// Confirm many rows as the same category (empty category clears them all).
pub fn bulk_confirm<'a>(
    transactions: &mut [Transaction],
    current: &CategorizerConfig,
    ids: impl IntoIterator<Item = &'a str>,
    category: &str,
) -> Result<Option<Confirmation>> {
    let mapping: RowCategoryMapping = ids
        .into_iter()
        .map(|id| (id.to_string(), category.to_string()))
        .collect();
    confirm(transactions, current, &mapping)
}

/// Drop a category: clear it from every row (confirmed and guessed) and
/// retrain on what is left.
pub fn delete_category(transactions: &mut [Transaction], category: &str) -> Result<CategorizerConfig> {
    let mut cleared = 0usize;
    for txn in transactions.iter_mut() {
        if txn.category.confirmed == category {
            txn.category.confirmed.clear();
            cleared += 1;
        }
        if txn.category.guess == category {
            txn.category.guess.clear();
        }
    }
    debug!("deleted category '{category}' from {cleared} rows");
    retrain(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> RowCategoryMapping {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn load(config: &CategorizerConfig) -> NaiveBayes {
        NaiveBayes::from_state_str(&config.bayes).unwrap()
    }

    #[test]
    fn test_retrain_only_uses_confirmed_rows() {
        let txns = vec![
            Transaction::new("1", "Coffee House").with_confirmed("food"),
            Transaction::new("2", "Landlord Rent").with_confirmed("housing"),
            Transaction::new("3", "Coffee House").with_guess("food"),
            Transaction::new("4", "0000000").with_confirmed("misc"),
        ];
        let nb = load(&retrain(&txns).unwrap());
        assert_eq!(nb.total_documents(), 2);
        assert_eq!(nb.categories(), &["food".to_string(), "housing".to_string()]);
    }

    #[test]
    fn test_retrain_empty_is_valid_state() {
        let config = retrain(&[]).unwrap();
        assert!(config.has_classifier());
        assert!(load(&config).is_empty());
    }

    #[test]
    fn test_update_unknown_ids_is_noop() {
        let txns = vec![Transaction::new("1", "coffee")];
        assert_eq!(update(&[], &CategorizerConfig::untrained(), &mapping(&[])).unwrap(), None);
        assert_eq!(
            update(&txns, &CategorizerConfig::untrained(), &mapping(&[("nope", "food")])).unwrap(),
            None
        );
    }

    #[test]
    fn test_update_first_time_learns_incrementally() {
        let txns = vec![
            Transaction::new("1", "coffee").with_confirmed("food"),
            Transaction::new("2", "rent"),
        ];
        let base = retrain(&txns).unwrap();
        let next = update(&txns, &base, &mapping(&[("2", "housing")])).unwrap().unwrap();
        let nb = load(&next);
        assert_eq!(nb.total_documents(), 2);
        assert_eq!(nb.doc_count("housing"), 1);
    }

    #[test]
    fn test_incremental_path_keeps_existing_counts() {
        // The existing state knows something the rows do not: only the
        // incremental path can preserve it.
        let stale = NaiveBayes::new().learn("tram ticket", "transport").unwrap();
        let base = CategorizerConfig { bayes: stale.to_state_string().unwrap() };
        let txns = vec![Transaction::new("1", "coffee")];
        let nb = load(&update(&txns, &base, &mapping(&[("1", "food")])).unwrap().unwrap());
        assert_eq!(nb.doc_count("transport"), 1);
        assert_eq!(nb.doc_count("food"), 1);
    }

    #[test]
    fn test_update_untrained_config_retrains_first() {
        let txns = vec![
            Transaction::new("1", "coffee").with_confirmed("food"),
            Transaction::new("2", "rent"),
        ];
        let nb = load(
            &update(&txns, &CategorizerConfig::untrained(), &mapping(&[("2", "housing")]))
                .unwrap()
                .unwrap(),
        );
        assert_eq!(nb.doc_count("food"), 1);
        assert_eq!(nb.doc_count("housing"), 1);
    }

    #[test]
    fn test_update_overwrite_drops_old_label() {
        let txns = vec![
            Transaction::new("1", "coffee").with_confirmed("food"),
            Transaction::new("2", "coffee beans").with_confirmed("food"),
        ];
        let base = retrain(&txns).unwrap();
        let nb = load(&update(&txns, &base, &mapping(&[("1", "drinks")])).unwrap().unwrap());
        assert_eq!(nb.doc_count("food"), 1);
        assert_eq!(nb.doc_count("drinks"), 1);
        assert_eq!(nb.total_documents(), 2);
    }

    #[test]
    fn test_clear_leaves_no_trace() {
        let mut txns = vec![Transaction::new("1", "origami paper").with_confirmed("hobby")];
        let base = retrain(&txns).unwrap();
        let cleared = confirm(&mut txns, &base, &mapping(&[("1", "")]))
            .unwrap()
            .unwrap()
            .config;
        assert!(load(&cleared).is_empty());
        assert!(txns[0].category.confirmed.is_empty());

        let unseen = vec![Transaction::new("x", "origami paper")];
        assert_eq!(guess(&unseen, &cleared).unwrap(), Some(GuessMapping::new()));
    }

    #[test]
    fn test_confirm_counts_only_matched_rows() {
        let mut txns = vec![
            Transaction::new("1", "coffee"),
            Transaction::new("2", "rent"),
        ];
        let base = CategorizerConfig::untrained();
        let confirmed = confirm(&mut txns, &base, &mapping(&[("1", "food"), ("nope", "food")]))
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.rows, 1);
        assert_eq!(txns[0].category.confirmed, "food");
        assert_eq!(load(&confirmed.config).doc_count("food"), 1);

        assert_eq!(confirm(&mut txns, &confirmed.config, &mapping(&[("nope", "x")])).unwrap(), None);
    }

    #[test]
    fn test_update_skips_rows_without_text() {
        let txns = vec![Transaction::new("1", "")];
        let nb = load(
            &update(&txns, &CategorizerConfig::untrained(), &mapping(&[("1", "food")]))
                .unwrap()
                .unwrap(),
        );
        assert!(nb.is_empty());
    }

    #[test]
    fn test_guess_round_trip_scenario() {
        let training = vec![
            Transaction::new("a", "origami").with_confirmed("hobby"),
            Transaction::new("b", "apple").with_confirmed("food"),
        ];
        let config = retrain(&training).unwrap();
        let unseen = vec![Transaction::new("id", "more origami")];
        let guesses = guess(&unseen, &config).unwrap().unwrap();
        assert_eq!(guesses.len(), 1);
        assert_eq!(guesses["id"], "hobby");
    }

    #[test]
    fn test_guess_preconditions() {
        let unseen = vec![Transaction::new("id", "coffee")];
        assert_eq!(guess(&unseen, &CategorizerConfig::untrained()).unwrap(), None);

        let config = retrain(&[Transaction::new("a", "coffee").with_confirmed("food")]).unwrap();
        assert_eq!(guess(&Vec::new(), &config).unwrap(), Some(GuessMapping::new()));

        let no_text = vec![Transaction::new("blank", "")];
        assert_eq!(guess(&no_text, &config).unwrap(), Some(GuessMapping::new()));
    }

    #[test]
    fn test_guess_propagates_corrupt_state() {
        let config = CategorizerConfig { bayes: "{oops".to_string() };
        assert!(guess(&[Transaction::new("a", "x")], &config).is_err());
    }

    #[test]
    fn test_bulk_confirm_and_delete_category() {
        let mut txns = vec![
            Transaction::new("1", "spotify premium"),
            Transaction::new("2", "netflix"),
            Transaction::new("3", "rewe markt").with_confirmed("food"),
            Transaction::new("4", "spotify family").with_guess("subscriptions"),
        ];
        let base = retrain(&txns).unwrap();
        let confirmed = bulk_confirm(&mut txns, &base, ["1", "2"], "subscriptions")
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.rows, 2);
        let config = confirmed.config;
        assert_eq!(load(&config).doc_count("subscriptions"), 2);
        assert_eq!(txns[1].category.confirmed, "subscriptions");

        let config = delete_category(&mut txns, "subscriptions").unwrap();
        let nb = load(&config);
        assert_eq!(nb.categories(), &["food".to_string()]);
        assert!(txns.iter().all(|t| t.category.confirmed != "subscriptions"));
        assert!(txns[3].category.guess.is_empty());
    }
}
