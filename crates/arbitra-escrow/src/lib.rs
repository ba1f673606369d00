//! Arbitra Escrow - Arbiter-governed escrow on top of the ledger
//!
//! - [`policy`]: the pure authorization engine and its configurable policy
//! - [`custody`]: where deposited funds sit until release
//! - [`notify`]: ordered fan-out of committed ledger changes
//! - [`service`]: the transition executor tying them together
//!
//! # Example
//!
//! ```no_run
//! use arbitra_escrow::EscrowService;
//! use arbitra_types::{Amount, PartyAddress};
//!
//! # async fn demo() -> arbitra_types::Result<()> {
//! let service = EscrowService::in_memory();
//! let depositor = PartyAddress::repeat_byte(0xd0);
//! let arbiter = PartyAddress::repeat_byte(0xa0);
//! let beneficiary = PartyAddress::repeat_byte(0xb0);
//!
//! let created = service
//!     .create_agreement(depositor, arbiter, beneficiary, Amount::from(1000u64))
//!     .await?;
//! service.approve_as_arbiter(arbiter, created.index).await?;
//! let released = service.approve_escrow(beneficiary, created.index).await?;
//! assert!(released.disbursement.is_some());
//! # Ok(())
//! # }
//! ```

pub mod custody;
pub mod notify;
pub mod policy;
pub mod service;

pub use custody::{Custody, InMemoryCustody};
pub use notify::{
    ChannelStats, HandlerError, NotificationChannel, NotificationHandler,
    DEFAULT_NOTIFICATION_BUFFER,
};
pub use policy::{authorize, permitted_operations, ApprovalPolicy};
pub use service::{EscrowConfig, EscrowPosition, EscrowService};
