//! Authorization engine
//!
//! Pure decision over an agreement snapshot: no locking, no I/O. The
//! executor calls it while holding the index lock, so the answer stays valid
//! until the commit.
//!
//! Checks run in a fixed order so a request that fails several preconditions
//! always reports the same reason: caller role first, then retirement,
//! dismissal, finalization and finally the operation's own precondition.

use serde::{Deserialize, Serialize};

use arbitra_types::{Agreement, DenialReason, Operation, PartyAddress, Role};

/// Configurable parts of the authorization rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Roles allowed to finalize a release once the arbiter approved
    #[serde(default = "default_escrow_approvers")]
    pub escrow_approvers: Vec<Role>,
    /// When false, only the three parties may retire a finalized agreement
    #[serde(default = "default_delete_open_to_anyone")]
    pub delete_open_to_anyone: bool,
}

fn default_escrow_approvers() -> Vec<Role> {
    vec![Role::Beneficiary, Role::Depositor]
}

fn default_delete_open_to_anyone() -> bool {
    true
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            escrow_approvers: default_escrow_approvers(),
            delete_open_to_anyone: default_delete_open_to_anyone(),
        }
    }
}

impl ApprovalPolicy {
    /// Whether `caller` holds a role that may approve the release
    pub fn may_approve_escrow(&self, agreement: &Agreement, caller: &PartyAddress) -> bool {
        self.escrow_approvers
            .iter()
            .any(|role| agreement.has_role(caller, *role))
    }

    pub fn may_delete(&self, agreement: &Agreement, caller: &PartyAddress) -> bool {
        self.delete_open_to_anyone || agreement.is_participant(caller)
    }
}

/// Decide whether `caller` may apply `operation` to `agreement`
pub fn authorize(
    operation: Operation,
    caller: &PartyAddress,
    agreement: &Agreement,
    policy: &ApprovalPolicy,
) -> Result<(), DenialReason> {
    match operation {
        Operation::ApproveAsArbiter => {
            require(agreement.has_role(caller, Role::Arbiter))?;
            not_closed(agreement)?;
            if agreement.arbiter_approved {
                return Err(DenialReason::AlreadyApproved);
            }
        }
        Operation::ApproveEscrow => {
            require(policy.may_approve_escrow(agreement, caller))?;
            not_closed(agreement)?;
            if !agreement.arbiter_approved {
                return Err(DenialReason::ArbiterNotYetApproved);
            }
        }
        Operation::Dismiss => {
            require(agreement.has_role(caller, Role::Arbiter))?;
            not_closed(agreement)?;
        }
        Operation::Delete => {
            require(policy.may_delete(agreement, caller))?;
            if agreement.deleted {
                return Err(DenialReason::AlreadyDeleted);
            }
            if !agreement.escrow_approved {
                return Err(DenialReason::NotYetApproved);
            }
        }
    }
    Ok(())
}

/// Operations `caller` could successfully request right now
pub fn permitted_operations(
    caller: &PartyAddress,
    agreement: &Agreement,
    policy: &ApprovalPolicy,
) -> Vec<Operation> {
    Operation::ALL
        .into_iter()
        .filter(|op| authorize(*op, caller, agreement, policy).is_ok())
        .collect()
}

fn require(allowed: bool) -> Result<(), DenialReason> {
    if allowed {
        Ok(())
    } else {
        Err(DenialReason::WrongRole)
    }
}

/// Shared guard for approvals and dismissal
fn not_closed(agreement: &Agreement) -> Result<(), DenialReason> {
    if agreement.deleted {
        Err(DenialReason::AlreadyDeleted)
    } else if agreement.dismissed {
        Err(DenialReason::AlreadyDismissed)
    } else if agreement.escrow_approved {
        Err(DenialReason::AlreadyFinalized)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitra_types::{AgreementIndex, Amount, NewAgreement};
    use chrono::Utc;

    const DEPOSITOR: u8 = 0xd0;
    const ARBITER: u8 = 0xa0;
    const BENEFICIARY: u8 = 0xb0;
    const STRANGER: u8 = 0xee;

    fn party(byte: u8) -> PartyAddress {
        PartyAddress::repeat_byte(byte)
    }

    fn agreement() -> Agreement {
        let request = NewAgreement::new(
            party(DEPOSITOR),
            party(ARBITER),
            party(BENEFICIARY),
            Amount::from(1000u64),
        );
        Agreement::open(AgreementIndex::new(0), request, Utc::now())
    }

    fn check(op: Operation, caller: u8, agreement: &Agreement) -> Result<(), DenialReason> {
        authorize(op, &party(caller), agreement, &ApprovalPolicy::default())
    }

    #[test]
    fn test_arbiter_approval() {
        let fresh = agreement();
        assert!(check(Operation::ApproveAsArbiter, ARBITER, &fresh).is_ok());
        assert_eq!(
            check(Operation::ApproveAsArbiter, BENEFICIARY, &fresh),
            Err(DenialReason::WrongRole)
        );

        let approved = fresh.with_operation(Operation::ApproveAsArbiter);
        assert_eq!(
            check(Operation::ApproveAsArbiter, ARBITER, &approved),
            Err(DenialReason::AlreadyApproved)
        );
        // Role is checked before state
        assert_eq!(
            check(Operation::ApproveAsArbiter, BENEFICIARY, &approved),
            Err(DenialReason::WrongRole)
        );
    }

    #[test]
    fn test_escrow_approval_requires_arbiter_first() {
        let fresh = agreement();
        assert_eq!(
            check(Operation::ApproveEscrow, BENEFICIARY, &fresh),
            Err(DenialReason::ArbiterNotYetApproved)
        );

        let approved = fresh.with_operation(Operation::ApproveAsArbiter);
        assert!(check(Operation::ApproveEscrow, BENEFICIARY, &approved).is_ok());
        assert!(check(Operation::ApproveEscrow, DEPOSITOR, &approved).is_ok());
        assert_eq!(
            check(Operation::ApproveEscrow, ARBITER, &approved),
            Err(DenialReason::WrongRole)
        );
        assert_eq!(
            check(Operation::ApproveEscrow, STRANGER, &approved),
            Err(DenialReason::WrongRole)
        );

        let finalized = approved.with_operation(Operation::ApproveEscrow);
        assert_eq!(
            check(Operation::ApproveEscrow, BENEFICIARY, &finalized),
            Err(DenialReason::AlreadyFinalized)
        );
    }

    #[test]
    fn test_escrow_approvers_are_configurable() {
        let approved = agreement().with_operation(Operation::ApproveAsArbiter);
        let policy = ApprovalPolicy {
            escrow_approvers: vec![Role::Arbiter],
            ..Default::default()
        };
        assert!(authorize(Operation::ApproveEscrow, &party(ARBITER), &approved, &policy).is_ok());
        assert_eq!(
            authorize(Operation::ApproveEscrow, &party(BENEFICIARY), &approved, &policy),
            Err(DenialReason::WrongRole)
        );
    }

    #[test]
    fn test_dismissal() {
        let fresh = agreement();
        assert!(check(Operation::Dismiss, ARBITER, &fresh).is_ok());
        assert_eq!(
            check(Operation::Dismiss, DEPOSITOR, &fresh),
            Err(DenialReason::WrongRole)
        );

        let approved = fresh.with_operation(Operation::ApproveAsArbiter);
        assert!(check(Operation::Dismiss, ARBITER, &approved).is_ok());

        let finalized = approved.with_operation(Operation::ApproveEscrow);
        assert_eq!(
            check(Operation::Dismiss, ARBITER, &finalized),
            Err(DenialReason::AlreadyFinalized)
        );

        let dismissed = fresh.with_operation(Operation::Dismiss);
        assert_eq!(
            check(Operation::Dismiss, ARBITER, &dismissed),
            Err(DenialReason::AlreadyDismissed)
        );
        assert_eq!(
            check(Operation::ApproveAsArbiter, ARBITER, &dismissed),
            Err(DenialReason::AlreadyDismissed)
        );
    }

    #[test]
    fn test_delete() {
        let fresh = agreement();
        assert_eq!(
            check(Operation::Delete, STRANGER, &fresh),
            Err(DenialReason::NotYetApproved)
        );
        assert_eq!(
            check(Operation::Delete, ARBITER, &fresh.with_operation(Operation::Dismiss)),
            Err(DenialReason::NotYetApproved)
        );

        let finalized = fresh
            .with_operation(Operation::ApproveAsArbiter)
            .with_operation(Operation::ApproveEscrow);
        assert!(check(Operation::Delete, STRANGER, &finalized).is_ok());

        let retired = finalized.with_operation(Operation::Delete);
        assert_eq!(
            check(Operation::Delete, DEPOSITOR, &retired),
            Err(DenialReason::AlreadyDeleted)
        );
        assert_eq!(
            check(Operation::ApproveEscrow, BENEFICIARY, &retired),
            Err(DenialReason::AlreadyDeleted)
        );
    }

    #[test]
    fn test_restricted_delete() {
        let finalized = agreement()
            .with_operation(Operation::ApproveAsArbiter)
            .with_operation(Operation::ApproveEscrow);
        let policy = ApprovalPolicy {
            delete_open_to_anyone: false,
            ..Default::default()
        };
        assert_eq!(
            authorize(Operation::Delete, &party(STRANGER), &finalized, &policy),
            Err(DenialReason::WrongRole)
        );
        assert!(authorize(Operation::Delete, &party(ARBITER), &finalized, &policy).is_ok());
    }

    #[test]
    fn test_permitted_operations() {
        let fresh = agreement();
        let policy = ApprovalPolicy::default();
        assert_eq!(
            permitted_operations(&party(ARBITER), &fresh, &policy),
            vec![Operation::ApproveAsArbiter, Operation::Dismiss]
        );
        assert!(permitted_operations(&party(STRANGER), &fresh, &policy).is_empty());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: ApprovalPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ApprovalPolicy::default());

        let policy: ApprovalPolicy =
            serde_json::from_str(r#"{"escrow_approvers":["arbiter","beneficiary"]}"#).unwrap();
        assert_eq!(policy.escrow_approvers, vec![Role::Arbiter, Role::Beneficiary]);
        assert!(policy.delete_open_to_anyone);
    }
}
