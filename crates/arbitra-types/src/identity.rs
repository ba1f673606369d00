//! Identity types for Arbitra
//!
//! Parties are identified by 20-byte account addresses supplied by the wallet
//! layer. Agreements are identified by their position in the ledger.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EscrowError, Result};

/// Macro to generate UUID-backed ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| EscrowError::serialization_fault(stringify!($name), e.to_string()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }
    };
}

define_id_type!(ReceiptId, "receipt", "Unique identifier for a transition receipt");
define_id_type!(SubscriptionId, "sub", "Unique identifier for a notification subscription");

/// Account address of a party to an agreement
///
/// The all-zero address never names a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyAddress(pub Address);

impl PartyAddress {
    /// The all-zero address
    pub const ZERO: Self = Self(Address::ZERO);

    /// Parse a hex address, with or without the `0x` prefix
    pub fn parse(s: &str) -> Result<Self> {
        let address = Address::from_str(s.trim())
            .map_err(|e| EscrowError::serialization_fault("address", e.to_string()))?;
        Ok(Self(address))
    }

    /// Build an address from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(Address::from(bytes))
    }

    /// Address filled with a single repeated byte (handy for fixtures)
    pub fn repeat_byte(byte: u8) -> Self {
        Self(Address::repeat_byte(byte))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_address(&self) -> &Address {
        &self.0
    }
}

impl fmt::Display for PartyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PartyAddress {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Address> for PartyAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

/// Stable position of an agreement in the ledger
///
/// Assigned at creation, strictly increasing, never reused.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgreementIndex(pub u64);

impl AgreementIndex {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Position in a creation-ordered sequence
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// The index assigned after this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AgreementIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for AgreementIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
