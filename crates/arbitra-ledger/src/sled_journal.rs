//! Embedded sled backend for the journal
//!
//! Records live in a dedicated tree keyed by the big-endian sequence, so
//! iteration order is commit order. Appends are flushed before they are
//! acknowledged; a record whose flush fails is withdrawn again.

use std::path::Path;

use async_trait::async_trait;
use tracing::error;

use arbitra_types::{EscrowError, Result};

use crate::journal::{Journal, JournalRecord};

const JOURNAL_TREE: &str = "arbitra_journal";

fn unavailable(e: sled::Error) -> EscrowError {
    EscrowError::unavailable("sled journal", e.to_string())
}

/// Durable journal stored in an embedded sled database
pub struct SledJournal {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledJournal {
    /// Open (or create) the journal under `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(unavailable)?;
        Self::from_db(db)
    }

    /// Journal in a throwaway database, removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(unavailable)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(JOURNAL_TREE).map_err(unavailable)?;
        Ok(Self { db, tree })
    }

    /// Bytes used on disk
    pub fn size_on_disk(&self) -> Result<u64> {
        self.db.size_on_disk().map_err(unavailable)
    }

    /// Remove a record that was inserted but never acknowledged
    fn withdraw(&self, key: [u8; 8], value: &[u8], sequence: u64) {
        match self.tree.compare_and_swap(key, Some(value), None::<&[u8]>) {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!(sequence, "Unflushed record changed before withdrawal"),
            Err(e) => error!(sequence, error = %e, "Unflushed record could not be withdrawn"),
        }
    }
}

#[async_trait]
impl Journal for SledJournal {
    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let key = record.sequence.to_be_bytes();
        let value = serde_json::to_vec(record)?;

        self.tree
            .compare_and_swap(key, None::<&[u8]>, Some(value.as_slice()))
            .map_err(unavailable)?
            .map_err(|_| {
                EscrowError::integrity(record.sequence, "sequence already recorded")
            })?;

        if let Err(e) = self.tree.flush_async().await {
            self.withdraw(key, &value, record.sequence);
            return Err(unavailable(e));
        }
        Ok(())
    }

    async fn get(&self, sequence: u64) -> Result<Option<JournalRecord>> {
        let Some(value) = self.tree.get(sequence.to_be_bytes()).map_err(unavailable)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&value).map_err(|e| {
            EscrowError::integrity(sequence, format!("undecodable record: {e}"))
        })?;
        Ok(Some(record))
    }

    async fn load(&self) -> Result<Vec<JournalRecord>> {
        let mut records = Vec::with_capacity(self.tree.len());
        for item in self.tree.iter() {
            let (key, value) = item.map_err(unavailable)?;
            let record: JournalRecord = serde_json::from_slice(&value).map_err(|e| {
                let sequence = <[u8; 8]>::try_from(key.as_ref())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                EscrowError::integrity(sequence, format!("undecodable record: {e}"))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn backend(&self) -> &'static str {
        "sled"
    }
}
