//! Re-derive ledger state from committed events
//!
//! Creation events must arrive with the next index; state changes must start
//! from the current snapshot and flip exactly one flag along the state machine.

use arbitra_types::{Agreement, AgreementIndex, EscrowError, LedgerEvent, Result};

use crate::journal::JournalRecord;

/// Rebuild every agreement from records in commit order
pub fn replay(records: &[JournalRecord]) -> Result<Vec<Agreement>> {
    let mut agreements = Vec::new();
    for record in records {
        apply_event(&mut agreements, record.sequence, &record.event)?;
    }
    Ok(agreements)
}

/// Apply one event on top of `agreements`
pub fn apply_event(
    agreements: &mut Vec<Agreement>,
    sequence: u64,
    event: &LedgerEvent,
) -> Result<()> {
    match event {
        LedgerEvent::AgreementCreated { agreement } => {
            let expected = AgreementIndex::new(agreements.len() as u64);
            if agreement.index != expected {
                return Err(EscrowError::integrity(
                    sequence,
                    format!("created {} but the next index is {}", agreement.index, expected),
                ));
            }
            if agreement.arbiter_approved
                || agreement.escrow_approved
                || agreement.dismissed
                || agreement.deleted
            {
                return Err(EscrowError::integrity(
                    sequence,
                    "agreement created with flags already set",
                ));
            }
            agreements.push(agreement.clone());
        }
        LedgerEvent::StateChanged {
            index,
            operation,
            before,
            after,
            ..
        } => {
            let current = agreements.get_mut(index.as_usize()).ok_or_else(|| {
                EscrowError::integrity(sequence, format!("state change for unknown {index}"))
            })?;
            if *before != *current {
                return Err(EscrowError::integrity(
                    sequence,
                    format!("snapshot of {index} does not match the replayed state"),
                ));
            }
            let expected = current.with_operation(*operation);
            if expected == *current || *after != expected || !after.flags_consistent() {
                return Err(EscrowError::integrity(
                    sequence,
                    format!("{operation} on {index} is not a valid transition"),
                ));
            }
            *current = expected;
        }
    }
    Ok(())
}
