use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use tally_core::{CategorizerConfig, Transaction};

/// `$TALLY_HOME`, or `~/.tally`.
pub fn tally_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tally"))
}

pub fn ensure_tally_home() -> Result<PathBuf> {
    let dir = tally_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse transactions in {}", path.display()))
}

pub fn write_transactions(path: &Path, transactions: &[Transaction]) -> Result<()> {
    let json = serde_json::to_string_pretty(transactions)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// A missing state file means no classifier has been trained yet.
pub fn read_categorizer(path: &Path) -> Result<CategorizerConfig> {
    if !path.exists() {
        return Ok(CategorizerConfig::untrained());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse classifier state in {}", path.display()))
}

pub fn write_categorizer(path: &Path, config: &CategorizerConfig) -> Result<()> {
    let json = serde_json::to_string(config)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
