//! Error types for Arbitra
//!
//! Authorization denials and unknown indices are typed so callers can render a
//! specific message. Only `ResourceUnavailable` is worth retrying, and the core
//! never retries on its own.

use thiserror::Error;

use crate::{AgreementIndex, DenialReason, Operation};

/// Result type for Arbitra operations
pub type Result<T> = std::result::Result<T, EscrowError>;

/// Arbitra error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// No agreement at this index
    #[error("Agreement {index} not found")]
    NotFound { index: AgreementIndex },

    /// The authorization engine rejected the transition
    #[error("{operation} denied: {reason}")]
    Denied {
        operation: Operation,
        reason: DenialReason,
    },

    /// The journal, custody or another collaborator could not be reached
    #[error("{resource} unavailable: {message}")]
    ResourceUnavailable { resource: String, message: String },

    /// Caller-supplied identity or amount is malformed
    #[error("Malformed {field}: {reason}")]
    SerializationFault { field: String, reason: String },

    /// The journal does not describe a valid history
    #[error("Journal integrity violation at sequence {sequence}: {reason}")]
    IntegrityViolation { sequence: u64, reason: String },
}

impl EscrowError {
    pub fn denied(operation: Operation, reason: DenialReason) -> Self {
        Self::Denied { operation, reason }
    }

    pub fn unavailable(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn serialization_fault(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SerializationFault {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn integrity(sequence: u64, reason: impl Into<String>) -> Self {
        Self::IntegrityViolation {
            sequence,
            reason: reason.into(),
        }
    }

    /// Denial reason, if this is an authorization failure
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Self::Denied { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Denied { reason, .. } => match reason {
                DenialReason::WrongRole => "DENIED_WRONG_ROLE",
                DenialReason::AlreadyFinalized => "DENIED_ALREADY_FINALIZED",
                DenialReason::AlreadyDismissed => "DENIED_ALREADY_DISMISSED",
                DenialReason::ArbiterNotYetApproved => "DENIED_ARBITER_NOT_YET_APPROVED",
                DenialReason::NotYetApproved => "DENIED_NOT_YET_APPROVED",
                DenialReason::AlreadyApproved => "DENIED_ALREADY_APPROVED",
                DenialReason::AlreadyDeleted => "DENIED_ALREADY_DELETED",
            },
            Self::ResourceUnavailable { .. } => "RESOURCE_UNAVAILABLE",
            Self::SerializationFault { .. } => "SERIALIZATION_FAULT",
            Self::IntegrityViolation { .. } => "INTEGRITY_VIOLATION",
        }
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization_fault("payload", e.to_string())
    }
}
