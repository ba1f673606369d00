//! Transition executor
//!
//! The only path by which agreements change. Every request is handled as:
//!
//! 1. Take the per-index lock (one in-flight mutation per agreement)
//! 2. Read the committed snapshot and authorize against it
//! 3. Reserve the custody side effect, if any
//! 4. Commit the flag through the ledger; the reservation is confirmed while
//!    the new snapshot is installed, then the notification is published
//! 5. On commit failure, cancel the reservation
//!
//! Readers never see a flag without its disbursement or the reverse.
//! [`EscrowService::position`] reads both under the agreement's lock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use arbitra_ledger::{Journal, Ledger};
use arbitra_types::{
    Agreement, AgreementIndex, Amount, EscrowError, NewAgreement, Operation, PartyAddress,
    Receipt, ReceiptId, Result,
};

use crate::custody::{Custody, InMemoryCustody};
use crate::notify::{NotificationChannel, DEFAULT_NOTIFICATION_BUFFER};
use crate::policy::{authorize, ApprovalPolicy};

/// Executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    #[serde(default)]
    pub policy: ApprovalPolicy,
    /// Capacity of the broadcast notification stream
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

fn default_notification_buffer() -> usize {
    DEFAULT_NOTIFICATION_BUFFER
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            policy: ApprovalPolicy::default(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

/// An agreement together with the funds custody holds for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscrowPosition {
    pub agreement: Agreement,
    pub held: Option<Amount>,
}

/// Escrow service: ledger, custody and notifications behind one API
pub struct EscrowService {
    ledger: Arc<Ledger>,
    custody: Arc<dyn Custody>,
    notifications: Arc<NotificationChannel>,
    policy: ApprovalPolicy,
    /// Serializes creation so custody is locked under the index the ledger assigns
    creation: Mutex<()>,
}

impl EscrowService {
    pub fn new(ledger: Arc<Ledger>, custody: Arc<dyn Custody>, config: EscrowConfig) -> Self {
        Self {
            ledger,
            custody,
            notifications: Arc::new(NotificationChannel::new(config.notification_buffer)),
            policy: config.policy,
            creation: Mutex::new(()),
        }
    }

    /// Service over an empty in-memory ledger and custody
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(Ledger::new()),
            Arc::new(InMemoryCustody::new()),
            EscrowConfig::default(),
        )
    }

    /// Open a service over an existing journal
    ///
    /// The ledger is replayed and custody holdings are rebuilt from it.
    pub async fn open(journal: Arc<dyn Journal>, config: EscrowConfig) -> Result<Self> {
        let ledger = Ledger::open(journal).await?;
        let custody = InMemoryCustody::from_agreements(&ledger.all())?;
        Ok(Self::new(Arc::new(ledger), Arc::new(custody), config))
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn custody(&self) -> &Arc<dyn Custody> {
        &self.custody
    }

    pub fn notifications(&self) -> &NotificationChannel {
        &self.notifications
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Open a new agreement funded by `depositor`
    pub async fn create_agreement(
        &self,
        depositor: PartyAddress,
        arbiter: PartyAddress,
        beneficiary: PartyAddress,
        amount: Amount,
    ) -> Result<Receipt> {
        let request = NewAgreement::new(depositor, arbiter, beneficiary, amount);
        if let Err(e) = request.validate() {
            warn!(caller = %depositor, error = %e, "Agreement rejected");
            return Err(e);
        }

        let _creation = self.creation.lock().await;
        let index = AgreementIndex::new(self.ledger.len() as u64);
        self.custody.lock(index, depositor, amount).await?;

        let notifications = self.notifications.clone();
        let appended = self
            .ledger
            .append(request, move |n| notifications.publish(n))
            .await;

        let (agreement, notification) = match appended {
            Ok(committed) if committed.0.index == index => committed,
            Ok((agreement, _)) => {
                // Something appended to the ledger outside this service
                error!(expected = %index, actual = %agreement.index, "Ledger index drifted");
                self.undo_lock(index).await;
                return Err(EscrowError::unavailable(
                    "ledger",
                    format!("expected {index}, ledger assigned {}", agreement.index),
                ));
            }
            Err(e) => {
                self.undo_lock(index).await;
                warn!(caller = %depositor, error = %e, "Agreement creation failed");
                return Err(e);
            }
        };

        info!(
            index = %agreement.index,
            depositor = %agreement.depositor,
            arbiter = %agreement.arbiter,
            beneficiary = %agreement.beneficiary,
            amount = %agreement.amount,
            sequence = notification.sequence,
            "Agreement created"
        );

        Ok(Receipt {
            id: ReceiptId::new(),
            index: agreement.index,
            operation: None,
            caller: depositor,
            before: None,
            agreement,
            disbursement: None,
            sequence: notification.sequence,
            record_hash: notification.record_hash,
            committed_at: notification.committed_at,
        })
    }

    /// Apply `operation` to the agreement at `index` on behalf of `caller`
    pub async fn execute(
        &self,
        operation: Operation,
        caller: PartyAddress,
        index: AgreementIndex,
    ) -> Result<Receipt> {
        let guard = match self.ledger.lock_index(index).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(index = %index, operation = %operation, caller = %caller, error = %e, "Request rejected");
                return Err(e);
            }
        };
        let current = self.ledger.get(index)?;

        if let Err(reason) = authorize(operation, &caller, &current, &self.policy) {
            warn!(
                index = %index,
                operation = %operation,
                caller = %caller,
                reason = reason.code(),
                "Request denied"
            );
            return Err(EscrowError::denied(operation, reason));
        }

        let disbursement = match operation {
            Operation::ApproveEscrow => Some(
                self.custody
                    .release(index, current.beneficiary, current.amount)
                    .await?,
            ),
            _ => None,
        };

        let custody = self.custody.clone();
        let reserved = disbursement.clone();
        let notifications = self.notifications.clone();
        let committed = self
            .ledger
            .commit_with(
                &guard,
                operation,
                caller,
                move |_| {
                    if let Some(disbursement) = &reserved {
                        custody.confirm(disbursement);
                    }
                },
                move |n| notifications.publish(n),
            )
            .await;

        let transition = match committed {
            Ok(transition) => transition,
            Err(e) => {
                if let Some(disbursement) = &disbursement {
                    if let Err(rollback) = self.custody.rollback(disbursement).await {
                        error!(
                            index = %index,
                            reference = %disbursement.reference,
                            error = %rollback,
                            "Custody rollback failed"
                        );
                    }
                }
                warn!(index = %index, operation = %operation, caller = %caller, error = %e, "Transition failed");
                return Err(e);
            }
        };

        info!(
            index = %index,
            operation = %operation,
            caller = %caller,
            state = %transition.after.state(),
            sequence = transition.notification.sequence,
            "Transition committed"
        );

        Ok(Receipt {
            id: ReceiptId::new(),
            index,
            operation: Some(operation),
            caller,
            before: Some(transition.before),
            agreement: transition.after,
            disbursement,
            sequence: transition.notification.sequence,
            record_hash: transition.notification.record_hash,
            committed_at: transition.notification.committed_at,
        })
    }

    pub async fn approve_as_arbiter(&self, caller: PartyAddress, index: AgreementIndex) -> Result<Receipt> {
        self.execute(Operation::ApproveAsArbiter, caller, index).await
    }

    pub async fn approve_escrow(&self, caller: PartyAddress, index: AgreementIndex) -> Result<Receipt> {
        self.execute(Operation::ApproveEscrow, caller, index).await
    }

    pub async fn dismiss(&self, caller: PartyAddress, index: AgreementIndex) -> Result<Receipt> {
        self.execute(Operation::Dismiss, caller, index).await
    }

    pub async fn delete(&self, caller: PartyAddress, index: AgreementIndex) -> Result<Receipt> {
        self.execute(Operation::Delete, caller, index).await
    }

    /// All agreements in creation order
    pub fn list_agreements(&self) -> Vec<Agreement> {
        self.ledger.all()
    }

    pub fn get_agreement(&self, index: AgreementIndex) -> Result<Agreement> {
        self.ledger.get(index)
    }

    /// Agreement and custody holding, read between transitions
    ///
    /// Waits for any in-flight request on `index` to finish.
    pub async fn position(&self, index: AgreementIndex) -> Result<EscrowPosition> {
        let _guard = self.ledger.lock_index(index).await?;
        let agreement = self.ledger.get(index)?;
        let held = self.custody.held(index).await;
        Ok(EscrowPosition { agreement, held })
    }

    async fn undo_lock(&self, index: AgreementIndex) {
        if let Err(e) = self.custody.unlock(index).await {
            error!(index = %index, error = %e, "Custody unlock failed");
        }
    }
}
