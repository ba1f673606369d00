//! Custody of deposited funds
//!
//! Funds are locked when an agreement is created and released to the
//! beneficiary when the escrow is approved. A release is two-phase: it is
//! reserved before the ledger commit and confirmed inside it, so the payout
//! becomes visible together with the flag. A reservation whose commit fails
//! is rolled back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use arbitra_types::{
    Agreement, AgreementIndex, Amount, Disbursement, EscrowError, PartyAddress, ReceiptId, Result,
};

/// Holder of escrowed funds
#[async_trait]
pub trait Custody: Send + Sync {
    /// Take `amount` from `depositor` into the hold for `index`
    async fn lock(&self, index: AgreementIndex, depositor: PartyAddress, amount: Amount) -> Result<()>;

    /// Undo a `lock` whose agreement never committed
    async fn unlock(&self, index: AgreementIndex) -> Result<()>;

    /// Reserve the hold for `index` for payout to `beneficiary`
    ///
    /// The funds stay held until [`Custody::confirm`].
    async fn release(
        &self,
        index: AgreementIndex,
        beneficiary: PartyAddress,
        amount: Amount,
    ) -> Result<Disbursement>;

    /// Pay out a reserved release
    ///
    /// Called while the ledger installs the matching flag, so it must not block.
    fn confirm(&self, disbursement: &Disbursement);

    /// Cancel a reserved release whose flag flip never committed
    async fn rollback(&self, disbursement: &Disbursement) -> Result<()>;

    /// Amount currently held for `index`, reserved or not
    async fn held(&self, index: AgreementIndex) -> Option<Amount>;
}

#[derive(Debug, Clone)]
struct Hold {
    depositor: PartyAddress,
    amount: Amount,
    reserved: bool,
}

#[derive(Debug, Default)]
struct CustodyState {
    holds: HashMap<AgreementIndex, Hold>,
    paid: HashMap<PartyAddress, Amount>,
    /// Releases awaiting their ledger commit
    pending: HashMap<ReceiptId, Disbursement>,
}

impl CustodyState {
    /// Payout total for `beneficiary` once every pending release confirms
    fn committed_to(&self, beneficiary: &PartyAddress) -> Option<Amount> {
        self.pending
            .values()
            .filter(|d| d.to == *beneficiary)
            .try_fold(self.paid_to(beneficiary), |acc, d| acc.checked_add(d.amount))
    }

    fn paid_to(&self, beneficiary: &PartyAddress) -> Amount {
        self.paid.get(beneficiary).copied().unwrap_or(Amount::ZERO)
    }
}

/// Process-local custody
#[derive(Default)]
pub struct InMemoryCustody {
    state: RwLock<CustodyState>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild holdings from replayed agreements
    ///
    /// Finalized agreements count as paid out; all others still hold their
    /// deposit.
    pub fn from_agreements(agreements: &[Agreement]) -> Result<Self> {
        let mut state = CustodyState::default();

        for agreement in agreements {
            if agreement.escrow_approved {
                let total = state.paid.entry(agreement.beneficiary).or_insert(Amount::ZERO);
                *total = total
                    .checked_add(agreement.amount)
                    .ok_or_else(|| EscrowError::unavailable("custody", "payout total overflow"))?;
            } else {
                state.holds.insert(
                    agreement.index,
                    Hold {
                        depositor: agreement.depositor,
                        amount: agreement.amount,
                        reserved: false,
                    },
                );
            }
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Total received by `beneficiary` across all agreements
    pub async fn paid_to(&self, beneficiary: &PartyAddress) -> Amount {
        self.state.read().paid_to(beneficiary)
    }

    /// Sum of all funds still in custody, `None` if it exceeds `Amount`
    pub async fn total_held(&self) -> Option<Amount> {
        self.state
            .read()
            .holds
            .values()
            .try_fold(Amount::ZERO, |acc, hold| acc.checked_add(hold.amount))
    }

    /// Depositor behind the hold for `index`
    pub async fn depositor_of(&self, index: AgreementIndex) -> Option<PartyAddress> {
        self.state.read().holds.get(&index).map(|h| h.depositor)
    }

    /// Releases reserved but neither confirmed nor rolled back
    pub fn pending_releases(&self) -> usize {
        self.state.read().pending.len()
    }
}

#[async_trait]
impl Custody for InMemoryCustody {
    async fn lock(&self, index: AgreementIndex, depositor: PartyAddress, amount: Amount) -> Result<()> {
        let mut state = self.state.write();
        if state.holds.contains_key(&index) {
            return Err(EscrowError::unavailable(
                "custody",
                format!("funds for {index} are already locked"),
            ));
        }
        state.holds.insert(
            index,
            Hold {
                depositor,
                amount,
                reserved: false,
            },
        );
        drop(state);

        info!(index = %index, depositor = %depositor, amount = %amount, "Funds locked");
        Ok(())
    }

    async fn unlock(&self, index: AgreementIndex) -> Result<()> {
        let mut state = self.state.write();
        let reserved = state.holds.get(&index).map(|hold| hold.reserved);
        match reserved {
            Some(true) => Err(EscrowError::unavailable(
                "custody",
                format!("funds for {index} are reserved for release"),
            )),
            Some(false) => {
                let amount = state.holds.remove(&index).map(|hold| hold.amount);
                drop(state);
                warn!(index = %index, amount = ?amount, "Funds unlocked");
                Ok(())
            }
            None => Err(EscrowError::unavailable(
                "custody",
                format!("no funds locked for {index}"),
            )),
        }
    }

    async fn release(
        &self,
        index: AgreementIndex,
        beneficiary: PartyAddress,
        amount: Amount,
    ) -> Result<Disbursement> {
        let mut state = self.state.write();
        let hold = state.holds.get(&index).ok_or_else(|| {
            EscrowError::unavailable("custody", format!("no funds locked for {index}"))
        })?;
        if hold.reserved {
            return Err(EscrowError::unavailable(
                "custody",
                format!("funds for {index} are already reserved for release"),
            ));
        }
        if hold.amount != amount {
            return Err(EscrowError::unavailable(
                "custody",
                format!("{index} holds {} but {} was requested", hold.amount, amount),
            ));
        }
        state
            .committed_to(&beneficiary)
            .and_then(|total| total.checked_add(amount))
            .ok_or_else(|| EscrowError::unavailable("custody", "payout total overflow"))?;

        let disbursement = Disbursement {
            reference: ReceiptId::new(),
            index,
            to: beneficiary,
            amount,
            disbursed_at: Utc::now(),
        };
        if let Some(hold) = state.holds.get_mut(&index) {
            hold.reserved = true;
        }
        state
            .pending
            .insert(disbursement.reference.clone(), disbursement.clone());
        drop(state);

        info!(index = %index, to = %beneficiary, amount = %amount, "Release reserved");
        Ok(disbursement)
    }

    fn confirm(&self, disbursement: &Disbursement) {
        let mut state = self.state.write();
        if state.pending.remove(&disbursement.reference).is_none() {
            error!(reference = %disbursement.reference, "Confirmed release was never reserved");
            return;
        }
        state.holds.remove(&disbursement.index);
        let total = state.paid.entry(disbursement.to).or_insert(Amount::ZERO);
        // Headroom was checked when the release was reserved
        match total.checked_add(disbursement.amount) {
            Some(sum) => *total = sum,
            None => error!(reference = %disbursement.reference, "Payout total overflow"),
        }
        drop(state);

        info!(
            index = %disbursement.index,
            to = %disbursement.to,
            amount = %disbursement.amount,
            "Funds released"
        );
    }

    async fn rollback(&self, disbursement: &Disbursement) -> Result<()> {
        let mut state = self.state.write();
        let Some(original) = state.pending.remove(&disbursement.reference) else {
            return Err(EscrowError::unavailable(
                "custody",
                format!("unknown disbursement {}", disbursement.reference),
            ));
        };
        if let Some(hold) = state.holds.get_mut(&original.index) {
            hold.reserved = false;
        }
        drop(state);

        warn!(index = %original.index, reference = %original.reference, "Release rolled back");
        Ok(())
    }

    async fn held(&self, index: AgreementIndex) -> Option<Amount> {
        self.state.read().holds.get(&index).map(|h| h.amount)
    }
}
