//! Operations, roles and denial reasons

use std::fmt;

use serde::{Deserialize, Serialize};

/// A state transition requested against an existing agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// The arbiter signals consent
    ApproveAsArbiter,
    /// A consenting party finalizes the release; funds are disbursed
    ApproveEscrow,
    /// The arbiter rejects the agreement
    Dismiss,
    /// Retire a finalized agreement after payout
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::ApproveAsArbiter,
        Operation::ApproveEscrow,
        Operation::Dismiss,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApproveAsArbiter => "approve_as_arbiter",
            Self::ApproveEscrow => "approve_escrow",
            Self::Dismiss => "dismiss",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a party holds in an agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Depositor,
    Arbiter,
    Beneficiary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depositor => "depositor",
            Self::Arbiter => "arbiter",
            Self::Beneficiary => "beneficiary",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the authorization engine rejected a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Caller does not hold a role allowed to perform the operation
    WrongRole,
    /// Escrow already approved; no further approval or dismissal
    AlreadyFinalized,
    /// Agreement was dismissed by the arbiter
    AlreadyDismissed,
    /// Release requested before the arbiter consented
    ArbiterNotYetApproved,
    /// Delete requested before the escrow was approved
    NotYetApproved,
    /// Arbiter approval requested twice
    AlreadyApproved,
    /// Agreement has been retired
    AlreadyDeleted,
}

impl DenialReason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongRole => "WRONG_ROLE",
            Self::AlreadyFinalized => "ALREADY_FINALIZED",
            Self::AlreadyDismissed => "ALREADY_DISMISSED",
            Self::ArbiterNotYetApproved => "ARBITER_NOT_YET_APPROVED",
            Self::NotYetApproved => "NOT_YET_APPROVED",
            Self::AlreadyApproved => "ALREADY_APPROVED",
            Self::AlreadyDeleted => "ALREADY_DELETED",
        }
    }

    /// Message suitable for showing to the caller
    pub fn describe(&self) -> &'static str {
        match self {
            Self::WrongRole => "caller is not allowed to perform this operation",
            Self::AlreadyFinalized => "escrow has already been approved",
            Self::AlreadyDismissed => "escrow has been dismissed by the arbiter",
            Self::ArbiterNotYetApproved => "the arbiter has not approved this escrow yet",
            Self::NotYetApproved => "escrow has not been approved yet",
            Self::AlreadyApproved => "the arbiter has already approved this escrow",
            Self::AlreadyDeleted => "escrow has already been deleted",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip_through_serde() {
        for op in Operation::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[test]
    fn test_denial_codes_are_unique() {
        let reasons = [
            DenialReason::WrongRole,
            DenialReason::AlreadyFinalized,
            DenialReason::AlreadyDismissed,
            DenialReason::ArbiterNotYetApproved,
            DenialReason::NotYetApproved,
            DenialReason::AlreadyApproved,
            DenialReason::AlreadyDeleted,
        ];
        let mut codes: Vec<_> = reasons.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), reasons.len());
    }
}
