//! Demo command - both agreement lifecycles against a throwaway ledger

use std::sync::Arc;

use colored::*;
use serde::Serialize;

use arbitra_escrow::{EscrowService, HandlerError, InMemoryCustody};
use arbitra_ledger::Ledger;
use arbitra_types::{AgreementIndex, Amount, Operation, PartyAddress, Receipt, Result};

use super::print_json;
use crate::config::CliConfig;

/// Outcome of one scripted request
#[derive(Debug, Clone, Serialize)]
pub struct DemoStep {
    pub actor: &'static str,
    pub operation: Option<Operation>,
    pub index: Option<AgreementIndex>,
    pub committed: bool,
    /// Error code when the request was refused
    pub code: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    steps: Vec<DemoStep>,
    notifications: u64,
    agreements: Vec<arbitra_types::Agreement>,
}

pub async fn run(config: &CliConfig) -> anyhow::Result<()> {
    print_banner();

    let service = EscrowService::new(
        Arc::new(Ledger::new()),
        Arc::new(InMemoryCustody::new()),
        config.escrow.clone(),
    );
    service.notifications().subscribe_fn(|n| {
        eprintln!(
            "  {} #{} {}",
            "event".bright_blue(),
            n.sequence,
            n.event.kind().bright_blue()
        );
        Ok::<(), HandlerError>(())
    });

    let steps = scripted(&service).await;

    let report = DemoReport {
        steps,
        notifications: service.notifications().stats().published,
        agreements: service.list_agreements(),
    };
    print_json(&report)
}

/// Drive the approval path on agreement 0 and the dismissal path on agreement 1
pub async fn scripted(service: &EscrowService) -> Vec<DemoStep> {
    let depositor = PartyAddress::repeat_byte(0xd0);
    let arbiter = PartyAddress::repeat_byte(0xa0);
    let beneficiary = PartyAddress::repeat_byte(0xb0);
    let anyone = PartyAddress::repeat_byte(0x99);
    let amount = Amount::from(1000u64);

    let mut steps = Vec::new();

    let first = service
        .create_agreement(depositor, arbiter, beneficiary, amount)
        .await;
    let first_index = first.as_ref().map(|r| r.index).unwrap_or_default();
    record(&mut steps, "depositor", None, None, first);

    for (actor, who, op) in [
        ("arbiter", arbiter, Operation::ApproveAsArbiter),
        ("beneficiary", beneficiary, Operation::ApproveAsArbiter),
        ("beneficiary", beneficiary, Operation::ApproveEscrow),
        ("arbiter", arbiter, Operation::Dismiss),
        ("anyone", anyone, Operation::Delete),
    ] {
        let outcome = service.execute(op, who, first_index).await;
        record(&mut steps, actor, Some(op), Some(first_index), outcome);
    }

    let second = service
        .create_agreement(depositor, arbiter, beneficiary, amount)
        .await;
    let second_index = second.as_ref().map(|r| r.index).unwrap_or_default();
    record(&mut steps, "depositor", None, None, second);

    for (actor, who, op) in [
        ("arbiter", arbiter, Operation::Dismiss),
        ("arbiter", arbiter, Operation::ApproveAsArbiter),
        ("anyone", anyone, Operation::Delete),
    ] {
        let outcome = service.execute(op, who, second_index).await;
        record(&mut steps, actor, Some(op), Some(second_index), outcome);
    }

    steps
}

fn record(
    steps: &mut Vec<DemoStep>,
    actor: &'static str,
    operation: Option<Operation>,
    index: Option<AgreementIndex>,
    outcome: Result<Receipt>,
) {
    let label = operation.map(|op| op.as_str()).unwrap_or("create");
    let step = match outcome {
        Ok(receipt) => {
            eprintln!(
                "{} {:<11} {:<18} {} -> {}",
                "✓".bright_green(),
                actor,
                label,
                receipt.index,
                receipt.agreement.state().to_string().bright_green()
            );
            DemoStep {
                actor,
                operation,
                index: Some(receipt.index),
                committed: true,
                code: None,
            }
        }
        Err(e) => {
            eprintln!(
                "{} {:<11} {:<18} {}",
                "✗".bright_red(),
                actor,
                label,
                e.error_code().bright_red()
            );
            DemoStep {
                actor,
                operation,
                index,
                committed: false,
                code: Some(e.error_code()),
            }
        }
    };
    steps.push(step);
}

fn print_banner() {
    eprintln!("{}", "Arbitra escrow demo".bright_white().bold());
    eprintln!();
}
