//! Command implementations

pub mod agreement;
pub mod demo;
pub mod journal;

use std::sync::Arc;

use colored::*;
use serde::Serialize;

use arbitra_escrow::EscrowService;
use arbitra_ledger::{Journal, MemoryJournal, SledJournal};
use arbitra_types::EscrowError;

use crate::config::{CliConfig, StorageBackend};

/// Open the journal selected by the storage configuration
pub fn open_journal(config: &CliConfig) -> anyhow::Result<Arc<dyn Journal>> {
    let journal: Arc<dyn Journal> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryJournal::new()),
        StorageBackend::Sled => Arc::new(SledJournal::open(&config.storage.data_dir)?),
    };
    Ok(journal)
}

/// Replay the configured journal into a ready service
pub async fn open_service(config: &CliConfig) -> anyhow::Result<EscrowService> {
    let journal = open_journal(config)?;
    let service = EscrowService::open(journal, config.escrow.clone()).await?;
    Ok(service)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report a failed request: JSON on stdout, a short line on stderr
pub fn print_error(error: &EscrowError) {
    let body = serde_json::json!({
        "error": error.error_code(),
        "message": error.to_string(),
        "retriable": error.is_retriable(),
    });
    println!("{body:#}");
    eprintln!("{} {}", "✗".bright_red(), error.to_string().bright_red());
}
