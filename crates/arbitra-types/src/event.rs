//! Ledger events and notifications
//!
//! Every committed mutation produces exactly one event. Replaying the events
//! in commit order re-derives the current ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Agreement, AgreementIndex, Operation, PartyAddress};

/// A committed change to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A new agreement was appended, carrying its full initial fields
    AgreementCreated { agreement: Agreement },

    /// A flag on an existing agreement was flipped
    StateChanged {
        index: AgreementIndex,
        operation: Operation,
        caller: PartyAddress,
        before: Agreement,
        after: Agreement,
    },
}

impl LedgerEvent {
    pub fn index(&self) -> AgreementIndex {
        match self {
            Self::AgreementCreated { agreement } => agreement.index,
            Self::StateChanged { index, .. } => *index,
        }
    }

    /// Agreement snapshot after the event
    pub fn agreement(&self) -> &Agreement {
        match self {
            Self::AgreementCreated { agreement } => agreement,
            Self::StateChanged { after, .. } => after,
        }
    }

    /// Operation behind a state change (`None` for creation)
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::AgreementCreated { .. } => None,
            Self::StateChanged { operation, .. } => Some(*operation),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgreementCreated { .. } => "agreement_created",
            Self::StateChanged { .. } => "state_changed",
        }
    }
}

/// A committed event as delivered to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Global commit sequence, gap-free from 1
    pub sequence: u64,
    pub event: LedgerEvent,
    pub committed_at: DateTime<Utc>,
    /// Hash of the journal record that made this event durable
    pub record_hash: String,
}
