//! Agreement commands - create, transition and list

use serde_json::json;

use arbitra_escrow::permitted_operations;
use arbitra_types::{AgreementIndex, Amount, Operation, PartyAddress};

use super::{open_service, print_json};
use crate::config::CliConfig;

pub async fn create(
    config: &CliConfig,
    from: &str,
    arbiter: &str,
    beneficiary: &str,
    amount: &str,
    decimals: u8,
) -> anyhow::Result<()> {
    let depositor = PartyAddress::parse(from)?;
    let arbiter = PartyAddress::parse(arbiter)?;
    let beneficiary = PartyAddress::parse(beneficiary)?;
    let amount = Amount::parse_units(amount, decimals)?;

    let service = open_service(config).await?;
    let receipt = service
        .create_agreement(depositor, arbiter, beneficiary, amount)
        .await?;
    print_json(&receipt)
}

pub async fn transition(
    config: &CliConfig,
    operation: Operation,
    from: &str,
    index: u64,
) -> anyhow::Result<()> {
    let caller = PartyAddress::parse(from)?;

    let service = open_service(config).await?;
    let receipt = service
        .execute(operation, caller, AgreementIndex::new(index))
        .await?;
    print_json(&receipt)
}

/// Print every agreement with its derived state
///
/// With `caller`, also lists the operations that address may request.
pub async fn list(config: &CliConfig, caller: Option<&str>) -> anyhow::Result<()> {
    let caller = caller.map(PartyAddress::parse).transpose()?;

    let service = open_service(config).await?;
    let rows: Vec<serde_json::Value> = service
        .list_agreements()
        .into_iter()
        .map(|agreement| {
            let permitted: Option<Vec<Operation>> = caller
                .as_ref()
                .map(|caller| permitted_operations(caller, &agreement, service.policy()));
            let mut row = json!({
                "index": agreement.index,
                "state": agreement.state(),
                "amount_ether": agreement.amount.format_ether(),
                "agreement": agreement,
            });
            if let Some(permitted) = permitted {
                row["permitted"] = json!(permitted);
            }
            row
        })
        .collect();

    print_json(&rows)
}
