//! Hash-chained journal of committed ledger events
//!
//! The journal is the durable, append-only log behind the ledger. Each record
//! commits to its predecessor:
//!
//! `hash = blake3(prev_hash ‖ sequence_be ‖ serde_json(event) ‖ recorded_at)`
//!
//! Genesis record: `prev_hash = GENESIS_HASH`. Reordering, dropping or editing
//! a record breaks the chain and is caught by [`verify_chain`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use arbitra_types::{EscrowError, LedgerEvent, Notification, Result};

/// `prev_hash` of the first record
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A single sealed journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Global commit sequence, starting at 1
    pub sequence: u64,
    pub event: LedgerEvent,
    pub recorded_at: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl JournalRecord {
    /// Seal `event` as the record following `prev_hash`
    pub fn seal(
        sequence: u64,
        event: LedgerEvent,
        prev_hash: &str,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self> {
        let hash = Self::compute_hash(sequence, &event, prev_hash, &recorded_at)?;
        Ok(Self {
            sequence,
            event,
            recorded_at,
            prev_hash: prev_hash.to_string(),
            hash,
        })
    }

    pub fn compute_hash(
        sequence: u64,
        event: &LedgerEvent,
        prev_hash: &str,
        recorded_at: &DateTime<Utc>,
    ) -> Result<String> {
        let payload = serde_json::to_vec(event)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(&sequence.to_be_bytes());
        hasher.update(&payload);
        hasher.update(
            recorded_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        Ok(hex::encode(hasher.finalize().as_bytes()))
    }

    /// Recompute the hash and compare with the stored one
    pub fn is_intact(&self) -> bool {
        Self::compute_hash(self.sequence, &self.event, &self.prev_hash, &self.recorded_at)
            .map(|hash| hash == self.hash)
            .unwrap_or(false)
    }

    /// The notification observers receive for this record
    pub fn notification(&self) -> Notification {
        Notification {
            sequence: self.sequence,
            event: self.event.clone(),
            committed_at: self.recorded_at,
            record_hash: self.hash.clone(),
        }
    }
}

/// Position of the newest record in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence: u64,
    pub hash: String,
}

impl ChainHead {
    pub fn genesis() -> Self {
        Self {
            sequence: 0,
            hash: GENESIS_HASH.to_string(),
        }
    }

    pub fn advance(&mut self, record: &JournalRecord) {
        self.sequence = record.sequence;
        self.hash = record.hash.clone();
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Check sequence contiguity and every link of the chain
pub fn verify_chain(records: &[JournalRecord]) -> Result<ChainHead> {
    let mut head = ChainHead::genesis();

    for record in records {
        let expected = head.sequence + 1;
        if record.sequence != expected {
            return Err(EscrowError::integrity(
                record.sequence,
                format!("expected sequence {expected}"),
            ));
        }
        if record.prev_hash != head.hash {
            return Err(EscrowError::integrity(
                record.sequence,
                "previous hash does not match the chain",
            ));
        }
        if !record.is_intact() {
            return Err(EscrowError::integrity(
                record.sequence,
                "record hash does not match its contents",
            ));
        }
        head.advance(record);
    }

    Ok(head)
}

/// Durable append-only log the ledger delegates persistence to
///
/// An `append` that returns `Ok` is durable; the journal never reorders records.
/// An `append` that fails may still have stored the record; [`Journal::get`]
/// tells the two cases apart.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Persist the next record
    async fn append(&self, record: &JournalRecord) -> Result<()>;

    /// All records in sequence order
    async fn load(&self) -> Result<Vec<JournalRecord>>;

    /// The record stored under `sequence`, if any
    async fn get(&self, sequence: u64) -> Result<Option<JournalRecord>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|record| record.sequence == sequence))
    }

    /// Short name of the backend, for logs
    fn backend(&self) -> &'static str;
}

/// In-process journal without durability
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<JournalRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the journal with existing records (e.g. an exported history)
    pub fn from_records(records: Vec<JournalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut records = self.records.lock();
        let expected = records.last().map(|r| r.sequence + 1).unwrap_or(1);
        if record.sequence != expected {
            return Err(EscrowError::integrity(
                record.sequence,
                format!("journal expected sequence {expected}"),
            ));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<JournalRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn get(&self, sequence: u64) -> Result<Option<JournalRecord>> {
        let records = self.records.lock();
        Ok(sequence
            .checked_sub(1)
            .and_then(|position| records.get(position as usize))
            .filter(|record| record.sequence == sequence)
            .cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
