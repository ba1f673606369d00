//! Journal commands - history and verification

use colored::*;
use serde_json::json;

use arbitra_ledger::{replay, verify_chain};

use super::{open_journal, print_json};
use crate::config::CliConfig;

pub async fn history(config: &CliConfig) -> anyhow::Result<()> {
    let journal = open_journal(config)?;
    let records = journal.load().await?;
    print_json(&records)
}

/// Check every link of the hash chain and that the events replay cleanly
pub async fn verify(config: &CliConfig) -> anyhow::Result<()> {
    let journal = open_journal(config)?;
    let records = journal.load().await?;

    let head = verify_chain(&records)?;
    let agreements = replay(&records)?;

    eprintln!(
        "{} {}",
        "✓".bright_green(),
        format!("{} records verified", records.len()).bright_green()
    );
    print_json(&json!({
        "intact": true,
        "backend": journal.backend(),
        "records": records.len(),
        "agreements": agreements.len(),
        "head_sequence": head.sequence,
        "head_hash": head.hash,
    }))
}
