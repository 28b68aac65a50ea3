//! Bulk guessing over every unconfirmed transaction.
//!
//! Rows are guessed in fixed-size batches with a short sleep between batches
//! so the runtime can schedule other work. The whole run holds the
//! [`GuessGate`] slot; there is no cancellation once it starts.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use tally_core::{
    Categorizer, CategorizerConfig, GuessMapping, Result, Transaction,
    distinct_confirmed_categories,
};

use crate::gate::GuessGate;
use crate::settings::{GuessOptions, GuessSettings};

/// Progress notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessEvent {
    /// Diversity gate failed; nothing was guessed
    Skipped { distinct_categories: usize },
    Started,
    BatchProcessed { index: usize, size: usize, guessed: usize },
    Finished { guessed: usize, batches: usize },
}

/// Result of one completed batch guess.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGuessOutcome {
    /// Row id -> guessed category, merged across all batches
    pub guesses: GuessMapping,
    /// Config used for guessing; retrained if the caller had none
    pub config: CategorizerConfig,
    pub batches: usize,
}

#[derive(Debug)]
pub struct BatchGuesser {
    gate: Arc<GuessGate>,
    categorizer: Categorizer,
    settings: GuessSettings,
    events: Option<mpsc::UnboundedSender<GuessEvent>>,
}

impl Default for BatchGuesser {
    fn default() -> Self {
        Self::new(GuessSettings::default())
    }
}

impl BatchGuesser {
    pub fn new(settings: GuessSettings) -> Self {
        Self {
            gate: Arc::new(GuessGate::new()),
            categorizer: Categorizer::default(),
            settings,
            events: None,
        }
    }

    /// Share a gate with other guessers so they queue behind each other.
    pub fn with_gate(mut self, gate: Arc<GuessGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<GuessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gate(&self) -> &Arc<GuessGate> {
        &self.gate
    }

    pub fn settings(&self) -> &GuessSettings {
        &self.settings
    }

    pub fn is_guessing(&self) -> bool {
        self.gate.is_guessing()
    }

    fn emit(&self, event: GuessEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Guess categories for every unconfirmed transaction.
    ///
    /// Waits for any guess already in flight. Returns `Ok(None)` when the
    /// diversity gate (if requested) rejects the run. Errors propagate after
    /// the gate is released.
    pub async fn guess_all(
        &self,
        transactions: &[Transaction],
        config: &CategorizerConfig,
        options: GuessOptions,
    ) -> Result<Option<BatchGuessOutcome>> {
        if self.gate.is_guessing() {
            debug!("batch guess already running, queueing");
        }
        let mut permit = self.gate.acquire().await;

        if options.require_category_diversity {
            let distinct = distinct_confirmed_categories(transactions).len();
            if distinct < self.settings.min_confirmed_categories {
                warn!(
                    "skipping batch guess: {} distinct confirmed categories, need {}",
                    distinct, self.settings.min_confirmed_categories
                );
                self.emit(GuessEvent::Skipped {
                    distinct_categories: distinct,
                });
                return Ok(None);
            }
        }

        permit.begin();
        self.emit(GuessEvent::Started);

        let config = if config.has_classifier() {
            config.clone()
        } else {
            debug!("no classifier yet, retraining before guessing");
            self.categorizer.retrain(transactions)?
        };

        let candidates: Vec<&Transaction> = transactions
            .iter()
            .filter(|t| !t.is_confirmed())
            .filter(|t| !(options.skip_ignored && t.ignore))
            .collect();

        let mut guesses = GuessMapping::new();
        let mut batches = 0;
        for (index, batch) in candidates.chunks(self.settings.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.yield_interval()).await;
            }

            let batch_guesses = self
                .categorizer
                .guess(batch.iter().copied(), &config)?
                .unwrap_or_default();
            debug!(
                "batch {}: {} rows, {} guesses",
                index,
                batch.len(),
                batch_guesses.len()
            );
            self.emit(GuessEvent::BatchProcessed {
                index,
                size: batch.len(),
                guessed: batch_guesses.len(),
            });
            guesses.extend(batch_guesses);
            batches += 1;
        }

        info!(
            "batch guessing finished: {} guesses over {} batches",
            guesses.len(),
            batches
        );
        self.emit(GuessEvent::Finished {
            guessed: guesses.len(),
            batches,
        });

        Ok(Some(BatchGuessOutcome {
            guesses,
            config,
            batches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tally_core::retrain;
    use tokio::time::Instant;

    fn confirmed(n_categories: usize) -> Vec<Transaction> {
        let labels = ["groceries", "housing", "transport", "subscriptions"];
        let texts = ["rewe markt", "landlord rent", "tram ticket", "spotify premium"];
        (0..n_categories)
            .map(|i| Transaction::new(format!("c{i}"), texts[i]).with_confirmed(labels[i]))
            .collect()
    }

    fn unconfirmed(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| Transaction::new(format!("u{i}"), "rewe markt potsdam"))
            .collect()
    }

    fn fast() -> GuessSettings {
        GuessSettings {
            yield_ms: 1,
            ..GuessSettings::default()
        }
    }

    #[tokio::test]
    async fn test_gate_needs_three_categories() {
        let mut txns = confirmed(2);
        txns.extend(unconfirmed(5));
        let config = retrain(&txns).unwrap();
        let guesser = BatchGuesser::new(fast());

        let out = guesser.guess_all(&txns, &config, GuessOptions::bulk()).await.unwrap();
        assert_eq!(out, None);

        let mut txns = confirmed(3);
        txns.extend(unconfirmed(5));
        let out = guesser
            .guess_all(&txns, &config, GuessOptions::bulk())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.guesses.len(), 5);
    }

    #[tokio::test]
    async fn test_after_import_skips_gate_and_keeps_ignored() {
        let mut txns = confirmed(1);
        txns.extend(unconfirmed(3));
        txns[1].ignore = true;
        let guesser = BatchGuesser::new(fast());

        let config = retrain(&txns).unwrap();
        let out = guesser
            .guess_all(&txns, &config, GuessOptions::after_import())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.guesses.len(), 3);

        let mut txns = confirmed(3);
        txns.extend(unconfirmed(3));
        txns[3].ignore = true;
        let out = guesser
            .guess_all(&txns, &config, GuessOptions::bulk())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.guesses.len(), 2);
        assert!(!out.guesses.contains_key("u0"));
    }

    #[tokio::test]
    async fn test_retrains_when_no_classifier() {
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(2));
        let guesser = BatchGuesser::new(fast());

        let out = guesser
            .guess_all(&txns, &CategorizerConfig::untrained(), GuessOptions::bulk())
            .await
            .unwrap()
            .unwrap();
        assert!(out.config.has_classifier());
        assert_eq!(out.config, retrain(&txns).unwrap());
        assert_eq!(out.guesses["u0"], "groceries");
    }

    #[tokio::test]
    async fn test_events_sequence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(3));
        let guesser = BatchGuesser::new(GuessSettings {
            batch_size: 2,
            yield_ms: 1,
            ..GuessSettings::default()
        })
        .with_events(tx);

        let config = retrain(&txns).unwrap();
        guesser.guess_all(&txns, &config, GuessOptions::bulk()).await.unwrap();
        drop(guesser);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(
            events,
            vec![
                GuessEvent::Started,
                GuessEvent::BatchProcessed { index: 0, size: 2, guessed: 2 },
                GuessEvent::BatchProcessed { index: 1, size: 1, guessed: 1 },
                GuessEvent::Finished { guessed: 3, batches: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_gated_skip_never_reports_guessing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut txns = confirmed(2);
        txns.extend(unconfirmed(3));
        let config = retrain(&txns).unwrap();
        let guesser = BatchGuesser::new(fast()).with_events(tx);

        assert_eq!(guesser.guess_all(&txns, &config, GuessOptions::bulk()).await.unwrap(), None);
        assert!(!guesser.is_guessing());
        assert_eq!(
            rx.recv().await,
            Some(GuessEvent::Skipped { distinct_categories: 2 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_yields_between_batches_only() {
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(250));
        let config = retrain(&txns).unwrap();
        let guesser = BatchGuesser::default();
        assert_eq!(guesser.settings().yield_ms, 10);

        let start = Instant::now();
        let out = guesser
            .guess_all(&txns, &config, GuessOptions::bulk())
            .await
            .unwrap()
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(out.batches, 3);
        assert!(elapsed >= Duration::from_millis(20), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(30), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_batch_does_not_sleep() {
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(40));
        let config = retrain(&txns).unwrap();
        let guesser = BatchGuesser::default();

        let start = Instant::now();
        let out = guesser
            .guess_all(&txns, &config, GuessOptions::bulk())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.batches, 1);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_is_up_while_batches_run() {
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(250));
        let config = retrain(&txns).unwrap();
        let guesser = Arc::new(BatchGuesser::default());

        let run = {
            let guesser = guesser.clone();
            tokio::spawn(async move {
                guesser
                    .guess_all(&txns, &config, GuessOptions::bulk())
                    .await
                    .map(|out| out.map(|o| o.batches))
            })
        };

        // the first batch is done and the run is parked in its first yield
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(guesser.is_guessing());

        assert_eq!(run.await.unwrap().unwrap(), Some(3));
        assert!(!guesser.is_guessing());
    }

    #[tokio::test]
    async fn test_error_releases_gate() {
        let mut txns = confirmed(3);
        txns.extend(unconfirmed(2));
        let guesser = BatchGuesser::new(fast());

        let broken = CategorizerConfig {
            bayes: "{not a classifier".to_string(),
        };
        assert!(guesser.guess_all(&txns, &broken, GuessOptions::bulk()).await.is_err());
        assert!(!guesser.is_guessing());

        let config = retrain(&txns).unwrap();
        let out = guesser.guess_all(&txns, &config, GuessOptions::bulk()).await.unwrap();
        assert!(out.is_some());
    }
}
