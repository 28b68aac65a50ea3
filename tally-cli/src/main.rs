use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::path::PathBuf;

use tally_core::{
    RowCategoryMapping, apply_guesses, clean_descriptions, confirm, delete_category,
    distinct_confirmed_categories, normalize, retrain,
};
use tally_guess::{BatchGuesser, GuessOptions};

mod config;
mod state;

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Learn transaction categories from your own confirmations")]
struct Cli {
    /// More output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalized form of a description
    Normalize { text: String },

    /// Recompute cleaned descriptions for every transaction
    Clean {
        #[arg(long)]
        transactions: PathBuf,
    },

    /// Retrain the classifier from all confirmed transactions
    Train {
        #[arg(long)]
        transactions: PathBuf,
        #[arg(long = "state")]
        state_file: PathBuf,
    },

    /// Confirm (or clear, with an empty category) categories for rows
    Confirm {
        #[arg(long)]
        transactions: PathBuf,
        #[arg(long = "state")]
        state_file: PathBuf,
        /// ID=CATEGORY pairs; `ID=` clears the row
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },

    /// Guess categories for all unconfirmed transactions
    Guess {
        #[arg(long)]
        transactions: PathBuf,
        #[arg(long = "state")]
        state_file: PathBuf,
        /// Guess right after an import: no category-diversity gate, ignored rows included
        #[arg(long)]
        import: bool,
    },

    /// Remove a category from every transaction and retrain
    DeleteCategory {
        #[arg(long)]
        transactions: PathBuf,
        #[arg(long = "state")]
        state_file: PathBuf,
        category: String,
    },

    /// List distinct confirmed categories
    Categories {
        #[arg(long)]
        transactions: PathBuf,
    },

    /// Manage ~/.tally/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config file if none exists
    Init,
    /// Print the effective config
    Show,
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (id, category) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=CATEGORY, got '{s}'"))?;
    if id.trim().is_empty() {
        return Err(format!("missing row id in '{s}'"));
    }
    Ok((id.trim().to_string(), category.trim().to_string()))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Normalize { text } => {
            println!("{}", normalize(&text));
        }

        Command::Clean { transactions } => {
            let mut txns = state::read_transactions(&transactions)?;
            clean_descriptions(&mut txns);
            state::write_transactions(&transactions, &txns)?;
            println!("Cleaned {} descriptions in {}", txns.len(), transactions.display());
        }

        Command::Train {
            transactions,
            state_file,
        } => {
            let txns = state::read_transactions(&transactions)?;
            let categorizer = retrain(&txns).context("retraining classifier")?;
            state::write_categorizer(&state_file, &categorizer)?;
            let confirmed = txns.iter().filter(|t| t.is_confirmed()).count();
            println!(
                "Trained on {} confirmed of {} transactions -> {}",
                confirmed,
                txns.len(),
                state_file.display()
            );
        }

        Command::Confirm {
            transactions,
            state_file,
            assignments,
        } => {
            let mut txns = state::read_transactions(&transactions)?;
            let current = state::read_categorizer(&state_file)?;
            let mapping: RowCategoryMapping = assignments.into_iter().collect();

            match confirm(&mut txns, &current, &mapping).context("updating classifier")? {
                Some(confirmation) => {
                    state::write_categorizer(&state_file, &confirmation.config)?;
                    state::write_transactions(&transactions, &txns)?;
                    println!("Updated {} rows", confirmation.rows);
                }
                None => println!("Nothing to do: none of the ids match a transaction"),
            }
        }

        Command::Guess {
            transactions,
            state_file,
            import,
        } => {
            let cfg = config::load_config()?;
            let mut txns = state::read_transactions(&transactions)?;
            let current = state::read_categorizer(&state_file)?;

            let options = if import {
                GuessOptions::after_import()
            } else {
                GuessOptions::bulk()
            };
            let min = cfg.guessing.min_confirmed_categories;
            let guesser = BatchGuesser::new(cfg.guessing);

            match guesser
                .guess_all(&txns, &current, options)
                .await
                .context("could not guess categories")?
            {
                Some(outcome) => {
                    let touched = apply_guesses(&mut txns, &outcome.guesses);
                    state::write_transactions(&transactions, &txns)?;
                    state::write_categorizer(&state_file, &outcome.config)?;
                    println!("Guessed {} transactions in {} batches", touched, outcome.batches);
                }
                None => {
                    let found = distinct_confirmed_categories(&txns).len();
                    println!(
                        "Confirm at least {min} different categories before guessing (found {found})"
                    );
                }
            }
        }

        Command::DeleteCategory {
            transactions,
            state_file,
            category,
        } => {
            let mut txns = state::read_transactions(&transactions)?;
            if !txns.iter().any(|t| t.category.confirmed == category || t.category.guess == category) {
                bail!("no transaction uses category '{category}'");
            }
            let next = delete_category(&mut txns, &category).context("retraining classifier")?;
            state::write_transactions(&transactions, &txns)?;
            state::write_categorizer(&state_file, &next)?;
            println!("Deleted category '{category}'");
        }

        Command::Categories { transactions } => {
            let txns = state::read_transactions(&transactions)?;
            for category in distinct_confirmed_categories(&txns) {
                let count = txns.iter().filter(|t| t.category.confirmed == category).count();
                println!("{category}\t{count}");
            }
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },
    }

    Ok(())
}
