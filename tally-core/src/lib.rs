//! tally-core: transaction categorization with an incrementally trained
//! naive-Bayes classifier.

pub mod bayes;
pub mod categorizer;
pub mod error;
pub mod normalize;
pub mod tokenizer;
pub mod transaction;

pub use bayes::{BayesOptions, NaiveBayes, STATE_VERSION};
pub use categorizer::{
    Categorizer, CategorizerConfig, Confirmation, bulk_confirm, confirm, delete_category, guess,
    guess_with, retrain, update,
};
pub use error::{CategorizerError, Result};
pub use normalize::normalize;
pub use tokenizer::{Tokenizer, WordTokenizer};
pub use transaction::{
    GuessMapping, RowCategoryMapping, Transaction, TransactionCategory, apply_confirmed,
    apply_guesses, clean_descriptions, distinct_confirmed_categories,
};
