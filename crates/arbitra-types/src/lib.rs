//! Arbitra Types - Canonical domain types for arbiter-governed escrow
//!
//! This crate contains all foundational types for Arbitra with zero dependencies
//! on other arbitra crates. It defines:
//!
//! - Identity types (PartyAddress, AgreementIndex, ReceiptId, SubscriptionId)
//! - 256-bit amounts in the smallest currency unit
//! - The escrow agreement entity and its derived lifecycle state
//! - Operations, roles and enumerated denial reasons
//! - Ledger events, notifications and receipts
//! - The error taxonomy shared by every layer
//!
//! # Lifecycle
//!
//! ```text
//! Created -> ArbiterApproved -> Finalized -> Retired
//!    \            |
//!     +-----------+-> Dismissed
//! ```

pub mod identity;
pub mod amount;
pub mod agreement;
pub mod operation;
pub mod event;
pub mod receipt;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use agreement::*;
pub use operation::*;
pub use event::*;
pub use receipt::*;
pub use error::*;

/// Version of the Arbitra types schema
pub const TYPES_VERSION: &str = "0.1.0";
