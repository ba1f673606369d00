//! Receipts returned for committed transitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Agreement, AgreementIndex, Amount, Operation, PartyAddress, ReceiptId};

/// Record of funds leaving custody for the beneficiary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disbursement {
    pub reference: ReceiptId,
    pub index: AgreementIndex,
    pub to: PartyAddress,
    pub amount: Amount,
    pub disbursed_at: DateTime<Utc>,
}

/// Proof that a requested transition committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub index: AgreementIndex,
    /// `None` for agreement creation
    pub operation: Option<Operation>,
    pub caller: PartyAddress,
    /// Snapshot before the transition (`None` for creation)
    pub before: Option<Agreement>,
    /// Snapshot after the transition
    pub agreement: Agreement,
    /// Set when the transition released funds
    pub disbursement: Option<Disbursement>,
    /// Global commit sequence of the ledger record
    pub sequence: u64,
    pub record_hash: String,
    pub committed_at: DateTime<Utc>,
}

impl Receipt {
    pub fn is_creation(&self) -> bool {
        self.operation.is_none()
    }
}
