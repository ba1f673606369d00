//! Arbitra Ledger - Authoritative store of escrow agreements
//!
//! The ledger is:
//! - Append-only (indices are assigned sequentially and never reused)
//! - Passive (it performs no authorization)
//! - Journal-backed (every mutation is sealed into a hash-chained record
//!   before it becomes visible)
//! - Replayable (state is re-derived from the journal on open)
//!
//! # Invariants
//!
//! 1. At most one in-flight mutation per agreement index
//! 2. Commits are globally ordered; notifications follow commit order
//! 3. Readers only ever observe committed snapshots
//! 4. A failed journal append leaves the ledger untouched

pub mod journal;
pub mod replay;
pub mod sled_journal;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use arbitra_types::{
    Agreement, AgreementIndex, EscrowError, LedgerEvent, NewAgreement, Notification, Operation,
    PartyAddress, Result,
};

pub use journal::{verify_chain, ChainHead, Journal, JournalRecord, MemoryJournal, GENESIS_HASH};
pub use replay::{apply_event, replay};
pub use sled_journal::SledJournal;

/// Exclusive right to mutate one agreement
///
/// Obtained from [`Ledger::lock_index`]; released on drop.
pub struct IndexGuard {
    index: AgreementIndex,
    _guard: OwnedMutexGuard<()>,
}

impl IndexGuard {
    pub fn index(&self) -> AgreementIndex {
        self.index
    }
}

/// Outcome of a committed flag mutation
#[derive(Debug, Clone)]
pub struct Transition {
    pub before: Agreement,
    pub after: Agreement,
    pub notification: Notification,
}

/// The Arbitra Ledger
///
/// Thread-safe; share it behind an `Arc`.
pub struct Ledger {
    /// Committed snapshots in creation order
    agreements: RwLock<Vec<Agreement>>,
    /// Per-index mutation locks
    index_locks: DashMap<AgreementIndex, Arc<Mutex<()>>>,
    /// Global commit sequencer guarding the journal head
    sequencer: Mutex<ChainHead>,
    journal: Arc<dyn Journal>,
}

impl Ledger {
    /// Create an empty ledger backed by an in-memory journal
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MemoryJournal::new()), Vec::new(), ChainHead::genesis())
    }

    /// Open a ledger over `journal`, replaying and verifying its history
    pub async fn open(journal: Arc<dyn Journal>) -> Result<Self> {
        let records = journal.load().await?;
        let head = verify_chain(&records)?;
        let agreements = replay(&records)?;

        info!(
            backend = journal.backend(),
            records = records.len(),
            agreements = agreements.len(),
            "Ledger opened"
        );

        Ok(Self::with_parts(journal, agreements, head))
    }

    fn with_parts(journal: Arc<dyn Journal>, agreements: Vec<Agreement>, head: ChainHead) -> Self {
        Self {
            agreements: RwLock::new(agreements),
            index_locks: DashMap::new(),
            sequencer: Mutex::new(head),
            journal,
        }
    }

    /// Get an agreement by index
    pub fn get(&self, index: AgreementIndex) -> Result<Agreement> {
        self.agreements
            .read()
            .get(index.as_usize())
            .cloned()
            .ok_or(EscrowError::NotFound { index })
    }

    /// All agreements in creation order
    pub fn all(&self) -> Vec<Agreement> {
        self.agreements.read().clone()
    }

    pub fn len(&self) -> usize {
        self.agreements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agreements.read().is_empty()
    }

    /// Sequence and hash of the latest commit
    pub async fn head(&self) -> ChainHead {
        self.sequencer.lock().await.clone()
    }

    /// Journal records in commit order
    pub async fn history(&self) -> Result<Vec<JournalRecord>> {
        self.journal.load().await
    }

    pub fn journal_backend(&self) -> &'static str {
        self.journal.backend()
    }

    /// Wait for exclusive mutation rights on `index`
    pub async fn lock_index(&self, index: AgreementIndex) -> Result<IndexGuard> {
        if index.as_usize() >= self.len() {
            return Err(EscrowError::NotFound { index });
        }
        let lock = self.index_locks.entry(index).or_default().clone();
        let guard = lock.lock_owned().await;
        Ok(IndexGuard {
            index,
            _guard: guard,
        })
    }

    /// Append a new agreement at the next index
    ///
    /// `publish` runs after the record is durable and visible, while the
    /// commit sequencer is still held.
    pub async fn append<F>(&self, request: NewAgreement, publish: F) -> Result<(Agreement, Notification)>
    where
        F: FnOnce(&Notification),
    {
        request.validate()?;

        let mut head = self.sequencer.lock().await;
        let index = AgreementIndex::new(self.len() as u64);
        let now = Utc::now();
        let agreement = Agreement::open(index, request, now);
        let event = LedgerEvent::AgreementCreated {
            agreement: agreement.clone(),
        };

        let record = self.persist(&head, event).await?;
        self.agreements.write().push(agreement.clone());
        head.advance(&record);

        debug!(index = %index, sequence = record.sequence, "Agreement appended");

        let notification = record.notification();
        publish(&notification);
        Ok((agreement, notification))
    }

    /// Flip the flag behind `operation` on the guarded agreement
    ///
    /// The ledger does not authorize; callers must have done so under the
    /// same guard.
    pub async fn commit<F>(
        &self,
        guard: &IndexGuard,
        operation: Operation,
        caller: PartyAddress,
        publish: F,
    ) -> Result<Transition>
    where
        F: FnOnce(&Notification),
    {
        self.commit_with(guard, operation, caller, |_| {}, publish).await
    }

    /// [`Ledger::commit`] with an effect that becomes visible together with
    /// the new snapshot
    ///
    /// `effect` runs only once the record is durable, while the snapshot write
    /// lock is held, so no reader observes the flag without it.
    pub async fn commit_with<E, F>(
        &self,
        guard: &IndexGuard,
        operation: Operation,
        caller: PartyAddress,
        effect: E,
        publish: F,
    ) -> Result<Transition>
    where
        E: FnOnce(&Agreement),
        F: FnOnce(&Notification),
    {
        let index = guard.index();
        let before = self.get(index)?;
        let after = before.with_operation(operation);

        let mut head = self.sequencer.lock().await;
        let event = LedgerEvent::StateChanged {
            index,
            operation,
            caller,
            before: before.clone(),
            after: after.clone(),
        };

        let record = self.persist(&head, event).await?;
        {
            let mut agreements = self.agreements.write();
            agreements[index.as_usize()] = after.clone();
            effect(&after);
        }
        head.advance(&record);

        debug!(
            index = %index,
            operation = %operation,
            sequence = record.sequence,
            "Agreement state committed"
        );

        let notification = record.notification();
        publish(&notification);
        Ok(Transition {
            before,
            after,
            notification,
        })
    }

    async fn persist(&self, head: &ChainHead, event: LedgerEvent) -> Result<JournalRecord> {
        let record = JournalRecord::seal(head.sequence + 1, event, &head.hash, Utc::now())?;
        let Err(e) = self.journal.append(&record).await else {
            return Ok(record);
        };

        // The backend may have kept the record despite the error
        match self.journal.get(record.sequence).await {
            Ok(Some(stored)) if stored.hash == record.hash => {
                warn!(
                    backend = self.journal.backend(),
                    sequence = record.sequence,
                    error = %e,
                    "Journal append reported failure but the record is stored"
                );
                Ok(record)
            }
            _ => {
                error!(
                    backend = self.journal.backend(),
                    sequence = record.sequence,
                    error = %e,
                    "Journal append failed"
                );
                Err(e)
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
