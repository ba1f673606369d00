use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use arbitra_escrow::{ApprovalPolicy, EscrowConfig, EscrowService, HandlerError, InMemoryCustody};
use arbitra_ledger::{verify_chain, Ledger};
use arbitra_types::{
    AgreementIndex, AgreementState, Amount, DenialReason, EscrowError, LedgerEvent, Notification,
    Operation, PartyAddress, Role,
};

const DEPOSITOR: u8 = 0xd0;
const ARBITER: u8 = 0xa0;
const BENEFICIARY: u8 = 0xb0;
const ANYONE: u8 = 0x99;

fn party(byte: u8) -> PartyAddress {
    PartyAddress::repeat_byte(byte)
}

async fn create(service: &EscrowService, amount: u64) -> AgreementIndex {
    service
        .create_agreement(party(DEPOSITOR), party(ARBITER), party(BENEFICIARY), Amount::from(amount))
        .await
        .unwrap()
        .index
}

fn reason(result: Result<arbitra_types::Receipt, EscrowError>) -> DenialReason {
    result
        .unwrap_err()
        .denial_reason()
        .expect("request should be denied")
}

#[tokio::test]
async fn test_approval_path_runs_to_retirement() {
    let service = EscrowService::in_memory();

    let index = create(&service, 1000).await;
    assert_eq!(index, AgreementIndex::new(0));
    let created = service.get_agreement(index).unwrap();
    assert!(!created.arbiter_approved);
    assert!(!created.escrow_approved);
    assert!(!created.dismissed);
    assert!(!created.deleted);

    let receipt = service.approve_as_arbiter(party(ARBITER), index).await.unwrap();
    assert!(receipt.agreement.arbiter_approved);

    assert_eq!(
        reason(service.approve_as_arbiter(party(BENEFICIARY), index).await),
        DenialReason::WrongRole
    );

    let receipt = service.approve_escrow(party(BENEFICIARY), index).await.unwrap();
    assert!(receipt.agreement.escrow_approved);
    assert!(receipt.disbursement.is_some());

    assert_eq!(
        reason(service.dismiss(party(ARBITER), index).await),
        DenialReason::AlreadyFinalized
    );

    let receipt = service.delete(party(ANYONE), index).await.unwrap();
    assert!(receipt.agreement.deleted);
    assert_eq!(receipt.agreement.state(), AgreementState::Retired);

    assert_eq!(
        reason(service.delete(party(ANYONE), index).await),
        DenialReason::AlreadyDeleted
    );
}

#[tokio::test]
async fn test_dismissed_agreement_is_terminal() {
    let service = EscrowService::in_memory();
    create(&service, 1000).await;
    let index = create(&service, 500).await;
    assert_eq!(index, AgreementIndex::new(1));

    let receipt = service.dismiss(party(ARBITER), index).await.unwrap();
    assert!(receipt.agreement.dismissed);

    assert_eq!(
        reason(service.approve_as_arbiter(party(ARBITER), index).await),
        DenialReason::AlreadyDismissed
    );
    assert_eq!(
        reason(service.delete(party(ANYONE), index).await),
        DenialReason::NotYetApproved
    );
    assert_eq!(
        reason(service.approve_escrow(party(BENEFICIARY), index).await),
        DenialReason::AlreadyDismissed
    );

    let after = service.get_agreement(index).unwrap();
    assert_eq!(after, receipt.agreement);
}

#[tokio::test]
async fn test_arbiter_may_be_allowed_to_release() {
    let config = EscrowConfig {
        policy: ApprovalPolicy {
            escrow_approvers: vec![Role::Arbiter],
            delete_open_to_anyone: false,
        },
        ..Default::default()
    };
    let service = EscrowService::new(
        Arc::new(Ledger::new()),
        Arc::new(InMemoryCustody::new()),
        config,
    );
    let index = create(&service, 10).await;

    service.approve_as_arbiter(party(ARBITER), index).await.unwrap();
    assert_eq!(
        reason(service.approve_escrow(party(BENEFICIARY), index).await),
        DenialReason::WrongRole
    );
    service.approve_escrow(party(ARBITER), index).await.unwrap();

    assert_eq!(
        reason(service.delete(party(ANYONE), index).await),
        DenialReason::WrongRole
    );
    service.delete(party(DEPOSITOR), index).await.unwrap();
}

#[tokio::test]
async fn test_notifications_follow_commit_order_without_duplicates() {
    let service = EscrowService::in_memory();
    let seen: Arc<Mutex<Vec<Notification>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let handler: Arc<dyn arbitra_escrow::NotificationHandler> =
        Arc::new(move |n: &Notification| -> Result<(), HandlerError> {
            sink.lock().push(n.clone());
            Ok(())
        });
    let id = service.notifications().subscribe(handler.clone());

    let first = create(&service, 100).await;
    service.approve_as_arbiter(party(ARBITER), first).await.unwrap();

    // Re-subscribing mid-stream keeps a single registration
    assert_eq!(service.notifications().subscribe(handler.clone()), id);

    let second = create(&service, 200).await;
    service.dismiss(party(ARBITER), second).await.unwrap();
    let _ = service.delete(party(ANYONE), second).await;
    service.approve_escrow(party(DEPOSITOR), first).await.unwrap();
    service.delete(party(ANYONE), first).await.unwrap();

    let seen = seen.lock().clone();
    let sequences: Vec<u64> = seen.iter().map(|n| n.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);

    let creations = seen
        .iter()
        .filter(|n| matches!(n.event, LedgerEvent::AgreementCreated { .. }))
        .count();
    assert_eq!(creations, 2);

    let operations: Vec<Option<Operation>> = seen.iter().map(|n| n.event.operation()).collect();
    assert_eq!(
        operations,
        vec![
            None,
            Some(Operation::ApproveAsArbiter),
            None,
            Some(Operation::Dismiss),
            Some(Operation::ApproveEscrow),
            Some(Operation::Delete),
        ]
    );

    // State change events carry both snapshots
    if let LedgerEvent::StateChanged { before, after, .. } = &seen[1].event {
        assert!(!before.arbiter_approved);
        assert!(after.arbiter_approved);
    } else {
        panic!("expected a state change");
    }

    // Notifications are the journal, record for record
    let history = service.ledger().history().await.unwrap();
    verify_chain(&history).unwrap();
    for (record, notification) in history.iter().zip(&seen) {
        assert_eq!(record.hash, notification.record_hash);
    }
}

#[tokio::test]
async fn test_failing_handler_does_not_abort_transition() {
    let service = EscrowService::in_memory();
    service
        .notifications()
        .subscribe_fn(|_| Err(HandlerError::new("webhook unreachable")));
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    service.notifications().subscribe_fn(move |_| {
        *counter.lock() += 1;
        Ok(())
    });

    let index = create(&service, 100).await;
    let receipt = service.approve_as_arbiter(party(ARBITER), index).await.unwrap();

    assert!(receipt.agreement.arbiter_approved);
    assert_eq!(*count.lock(), 2);
    assert_eq!(service.notifications().stats().handler_failures, 2);
}

#[tokio::test]
async fn test_stream_observer_sees_every_commit() {
    let service = EscrowService::in_memory();
    let mut stream = service.notifications().stream();

    let index = create(&service, 100).await;
    service.approve_as_arbiter(party(ARBITER), index).await.unwrap();

    let created = stream.recv().await.unwrap();
    assert_eq!(created.event.kind(), "agreement_created");
    let changed = stream.recv().await.unwrap();
    assert_eq!(changed.event.operation(), Some(Operation::ApproveAsArbiter));
    assert!(changed.sequence > created.sequence);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_assigns_gap_free_indices() {
    let service = Arc::new(EscrowService::in_memory());

    let mut handles = Vec::new();
    for i in 0..32u64 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_agreement(party(DEPOSITOR), party(ARBITER), party(BENEFICIARY), Amount::from(1 + i))
                .await
                .unwrap()
                .index
                .value()
        }));
    }

    let mut indices = HashSet::new();
    for handle in handles {
        indices.insert(handle.await.unwrap());
    }
    assert_eq!(indices, (0..32).collect::<HashSet<u64>>());

    let listed: Vec<u64> = service
        .list_agreements()
        .iter()
        .map(|a| a.index.value())
        .collect();
    assert_eq!(listed, (0..32).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_requests_on_one_index_apply_once() {
    let service = Arc::new(EscrowService::in_memory());
    let index = create(&service, 1000).await;
    service.approve_as_arbiter(party(ARBITER), index).await.unwrap();

    // Release and dismissal race; exactly one may win
    let mut handles = Vec::new();
    for i in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.approve_escrow(party(BENEFICIARY), index).await
            } else {
                service.dismiss(party(ARBITER), index).await
            }
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(e) => assert!(matches!(
                e.denial_reason(),
                Some(DenialReason::AlreadyFinalized | DenialReason::AlreadyDismissed)
            )),
        }
    }
    assert_eq!(committed, 1);

    let agreement = service.get_agreement(index).unwrap();
    assert!(agreement.escrow_approved != agreement.dismissed);
    assert!(agreement.flags_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_indices_progress_concurrently() {
    let service = Arc::new(EscrowService::in_memory());
    for _ in 0..8 {
        create(&service, 50).await;
    }

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let index = AgreementIndex::new(i);
            service.approve_as_arbiter(party(ARBITER), index).await?;
            service.approve_escrow(party(BENEFICIARY), index).await?;
            service.delete(party(ANYONE), index).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(service
        .list_agreements()
        .iter()
        .all(|a| a.state() == AgreementState::Retired));
    assert_eq!(service.ledger().head().await.sequence, 8 + 8 * 3);
}
