//! Escrow agreement entity
//!
//! One deposit arrangement among a depositor, an arbiter and a beneficiary.
//! Identity fields and the amount are fixed at creation; only the four
//! lifecycle flags ever change, and only through the transition executor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgreementIndex, Amount, EscrowError, Operation, PartyAddress, Result, Role};

/// Validated request to open a new agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgreement {
    /// Party funding the agreement (the caller of the deposit)
    pub depositor: PartyAddress,
    /// Neutral party who may approve or dismiss
    pub arbiter: PartyAddress,
    /// Intended recipient of the funds
    pub beneficiary: PartyAddress,
    /// Value deposited, in the smallest currency unit
    pub amount: Amount,
}

impl NewAgreement {
    pub fn new(
        depositor: PartyAddress,
        arbiter: PartyAddress,
        beneficiary: PartyAddress,
        amount: Amount,
    ) -> Self {
        Self {
            depositor,
            arbiter,
            beneficiary,
            amount,
        }
    }

    /// Reject requests the ledger must never store
    pub fn validate(&self) -> Result<()> {
        for (field, address) in [
            ("depositor", &self.depositor),
            ("arbiter", &self.arbiter),
            ("beneficiary", &self.beneficiary),
        ] {
            if address.is_zero() {
                return Err(EscrowError::serialization_fault(
                    field,
                    "the zero address cannot be a party",
                ));
            }
        }
        if self.amount.is_zero() {
            return Err(EscrowError::serialization_fault(
                "amount",
                "deposit must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Lifecycle state derived from the agreement flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementState {
    /// Funded, awaiting the arbiter
    Created,
    /// Arbiter consented, awaiting final release
    ArbiterApproved,
    /// Released to the beneficiary
    Finalized,
    /// Rejected by the arbiter
    Dismissed,
    /// Paid out and logically retired
    Retired,
}

impl AgreementState {
    /// No operation mutates a terminal agreement
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dismissed | Self::Retired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ArbiterApproved => "arbiter_approved",
            Self::Finalized => "finalized",
            Self::Dismissed => "dismissed",
            Self::Retired => "retired",
        }
    }
}

impl fmt::Display for AgreementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An escrow agreement as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    /// Stable position in the ledger
    pub index: AgreementIndex,
    pub depositor: PartyAddress,
    pub arbiter: PartyAddress,
    pub beneficiary: PartyAddress,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    /// Arbiter has signaled consent
    pub arbiter_approved: bool,
    /// Release condition satisfied and funds disbursed
    pub escrow_approved: bool,
    /// Arbiter rejected the agreement
    pub dismissed: bool,
    /// Payout complete, slot retired
    pub deleted: bool,
}

impl Agreement {
    /// Open an agreement at `index` with all flags cleared
    pub fn open(index: AgreementIndex, request: NewAgreement, created_at: DateTime<Utc>) -> Self {
        Self {
            index,
            depositor: request.depositor,
            arbiter: request.arbiter,
            beneficiary: request.beneficiary,
            amount: request.amount,
            created_at,
            arbiter_approved: false,
            escrow_approved: false,
            dismissed: false,
            deleted: false,
        }
    }

    pub fn state(&self) -> AgreementState {
        if self.deleted {
            AgreementState::Retired
        } else if self.dismissed {
            AgreementState::Dismissed
        } else if self.escrow_approved {
            AgreementState::Finalized
        } else if self.arbiter_approved {
            AgreementState::ArbiterApproved
        } else {
            AgreementState::Created
        }
    }

    /// Whether `caller` holds `role` in this agreement
    pub fn has_role(&self, caller: &PartyAddress, role: Role) -> bool {
        let holder = match role {
            Role::Depositor => &self.depositor,
            Role::Arbiter => &self.arbiter,
            Role::Beneficiary => &self.beneficiary,
        };
        holder == caller
    }

    /// All roles `caller` holds (one address may hold several)
    pub fn roles_of(&self, caller: &PartyAddress) -> Vec<Role> {
        [Role::Depositor, Role::Arbiter, Role::Beneficiary]
            .into_iter()
            .filter(|role| self.has_role(caller, *role))
            .collect()
    }

    pub fn is_participant(&self, caller: &PartyAddress) -> bool {
        !self.roles_of(caller).is_empty()
    }

    /// Snapshot with the flag flipped by `operation`
    ///
    /// Performs no authorization; callers must have authorized first.
    pub fn with_operation(&self, operation: Operation) -> Self {
        let mut next = self.clone();
        match operation {
            Operation::ApproveAsArbiter => next.arbiter_approved = true,
            Operation::ApproveEscrow => next.escrow_approved = true,
            Operation::Dismiss => next.dismissed = true,
            Operation::Delete => next.deleted = true,
        }
        next
    }

    /// Flag combinations reachable through the state machine
    pub fn flags_consistent(&self) -> bool {
        (!self.escrow_approved || self.arbiter_approved)
            && !(self.escrow_approved && self.dismissed)
            && (!self.deleted || self.escrow_approved)
    }

    /// Identity fields, amount and creation time are unchanged
    pub fn same_terms(&self, other: &Agreement) -> bool {
        self.index == other.index
            && self.depositor == other.depositor
            && self.arbiter == other.arbiter
            && self.beneficiary == other.beneficiary
            && self.amount == other.amount
            && self.created_at == other.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewAgreement {
        NewAgreement::new(
            PartyAddress::repeat_byte(0xd0),
            PartyAddress::repeat_byte(0xa0),
            PartyAddress::repeat_byte(0xb0),
            Amount::from(1000u64),
        )
    }

    #[test]
    fn test_open_agreement_has_clear_flags() {
        let agreement = Agreement::open(AgreementIndex::new(0), request(), Utc::now());
        assert_eq!(agreement.state(), AgreementState::Created);
        assert!(!agreement.arbiter_approved);
        assert!(!agreement.escrow_approved);
        assert!(!agreement.dismissed);
        assert!(!agreement.deleted);
    }

    #[test]
    fn test_state_follows_flags() {
        let agreement = Agreement::open(AgreementIndex::new(0), request(), Utc::now());
        let approved = agreement.with_operation(Operation::ApproveAsArbiter);
        assert_eq!(approved.state(), AgreementState::ArbiterApproved);
        let finalized = approved.with_operation(Operation::ApproveEscrow);
        assert_eq!(finalized.state(), AgreementState::Finalized);
        let retired = finalized.with_operation(Operation::Delete);
        assert_eq!(retired.state(), AgreementState::Retired);
        assert!(retired.state().is_terminal());

        let dismissed = agreement.with_operation(Operation::Dismiss);
        assert_eq!(dismissed.state(), AgreementState::Dismissed);
        assert!(dismissed.same_terms(&agreement));
        assert!(dismissed.flags_consistent());
    }

    #[test]
    fn test_unreachable_flag_combinations() {
        let agreement = Agreement::open(AgreementIndex::new(0), request(), Utc::now());
        assert!(!agreement.with_operation(Operation::ApproveEscrow).flags_consistent());
        assert!(!agreement.with_operation(Operation::Delete).flags_consistent());

        let both = agreement
            .with_operation(Operation::ApproveAsArbiter)
            .with_operation(Operation::ApproveEscrow)
            .with_operation(Operation::Dismiss);
        assert!(!both.flags_consistent());
    }

    #[test]
    fn test_roles() {
        let agreement = Agreement::open(AgreementIndex::new(0), request(), Utc::now());
        assert_eq!(
            agreement.roles_of(&PartyAddress::repeat_byte(0xa0)),
            vec![Role::Arbiter]
        );
        assert!(!agreement.is_participant(&PartyAddress::repeat_byte(0xee)));

        let mut shared = request();
        shared.beneficiary = shared.depositor;
        let agreement = Agreement::open(AgreementIndex::new(1), shared, Utc::now());
        assert_eq!(
            agreement.roles_of(&PartyAddress::repeat_byte(0xd0)),
            vec![Role::Depositor, Role::Beneficiary]
        );
    }

    #[test]
    fn test_validation() {
        assert!(request().validate().is_ok());

        let mut zero_amount = request();
        zero_amount.amount = Amount::ZERO;
        assert_eq!(
            zero_amount.validate().unwrap_err().error_code(),
            "SERIALIZATION_FAULT"
        );

        let mut zero_arbiter = request();
        zero_arbiter.arbiter = PartyAddress::ZERO;
        assert!(zero_arbiter.validate().is_err());
    }
}
