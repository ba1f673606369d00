//! Ledger behaviour over the durable sled journal

use std::sync::Arc;

use arbitra_ledger::{verify_chain, Journal, Ledger, SledJournal};
use arbitra_types::{AgreementIndex, AgreementState, Amount, NewAgreement, Operation, PartyAddress};

fn party(byte: u8) -> PartyAddress {
    PartyAddress::repeat_byte(byte)
}

fn request(amount: u64) -> NewAgreement {
    NewAgreement::new(party(0x11), party(0x22), party(0x33), Amount::from(amount))
}

#[tokio::test]
async fn test_sled_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let journal = Arc::new(SledJournal::open(dir.path()).unwrap());
        let ledger = Ledger::open(journal).await.unwrap();

        ledger.append(request(500), |_| {}).await.unwrap();
        ledger.append(request(900), |_| {}).await.unwrap();

        let guard = ledger.lock_index(AgreementIndex::new(0)).await.unwrap();
        ledger
            .commit(&guard, Operation::ApproveAsArbiter, party(0x22), |_| {})
            .await
            .unwrap();
        ledger
            .commit(&guard, Operation::ApproveEscrow, party(0x33), |_| {})
            .await
            .unwrap();
        drop(guard);

        let guard = ledger.lock_index(AgreementIndex::new(1)).await.unwrap();
        ledger
            .commit(&guard, Operation::Dismiss, party(0x22), |_| {})
            .await
            .unwrap();
    }

    let journal = Arc::new(SledJournal::open(dir.path()).unwrap());
    let ledger = Ledger::open(journal).await.unwrap();

    assert_eq!(ledger.journal_backend(), "sled");
    assert_eq!(ledger.len(), 2);
    assert_eq!(
        ledger.get(AgreementIndex::new(0)).unwrap().state(),
        AgreementState::Finalized
    );
    assert_eq!(
        ledger.get(AgreementIndex::new(1)).unwrap().state(),
        AgreementState::Dismissed
    );
    assert_eq!(
        ledger.get(AgreementIndex::new(1)).unwrap().amount,
        Amount::from(900u64)
    );

    let history = ledger.history().await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(verify_chain(&history).unwrap(), ledger.head().await);
}

#[tokio::test]
async fn test_notifications_match_journal_order() {
    let journal = Arc::new(SledJournal::temporary().unwrap());
    let ledger = Arc::new(Ledger::open(journal.clone()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..16u64 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let (_, notification) = ledger.append(request(100 + i), |_| {}).await.unwrap();
            notification
        }));
    }

    let mut notifications = Vec::new();
    for handle in handles {
        notifications.push(handle.await.unwrap());
    }
    notifications.sort_by_key(|n| n.sequence);

    let records = journal.load().await.unwrap();
    assert_eq!(records.len(), 16);
    for (record, notification) in records.iter().zip(&notifications) {
        assert_eq!(record.sequence, notification.sequence);
        assert_eq!(record.hash, notification.record_hash);
        // Index assignment follows commit order
        assert_eq!(
            notification.event.index(),
            AgreementIndex::new(record.sequence - 1)
        );
    }
}
