//! Amount type: unsigned 256-bit integers in the smallest currency unit
//!
//! Amounts are exchanged as raw integers (e.g. wei). Conversion to and from a
//! human-readable decimal string is exact in both directions so that the
//! presentation layer never loses precision.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{EscrowError, Result};

/// Decimal places of the native currency (wei per ether)
pub const ETHER_DECIMALS: u8 = 18;

/// Largest number of decimal places a U256 can meaningfully carry
pub const MAX_DECIMALS: u8 = 77;

/// Value held by an agreement, in the smallest currency unit
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Parse a raw integer amount (smallest unit, base 10)
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EscrowError::serialization_fault(
                "amount",
                format!("'{text}' is not an unsigned integer"),
            ));
        }
        U256::from_str_radix(text, 10)
            .map(Self)
            .map_err(|e| EscrowError::serialization_fault("amount", e.to_string()))
    }

    /// Parse a human decimal string (e.g. `"1.5"`) scaled by `decimals`
    pub fn parse_units(text: &str, decimals: u8) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(EscrowError::serialization_fault(
                "decimals",
                format!("at most {MAX_DECIMALS} decimals are supported"),
            ));
        }

        let text = text.trim();
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(EscrowError::serialization_fault("amount", "empty amount"));
        }
        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(whole) || !is_digits(fraction) {
            return Err(EscrowError::serialization_fault(
                "amount",
                format!("'{text}' is not an unsigned decimal number"),
            ));
        }
        if fraction.len() > decimals as usize {
            return Err(EscrowError::serialization_fault(
                "amount",
                format!("'{text}' has more than {decimals} fractional digits"),
            ));
        }

        let mut digits = String::with_capacity(whole.len() + decimals as usize);
        digits.push_str(whole);
        digits.push_str(fraction);
        digits.extend(std::iter::repeat('0').take(decimals as usize - fraction.len()));

        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }

        U256::from_str_radix(digits, 10)
            .map(Self)
            .map_err(|e| EscrowError::serialization_fault("amount", e.to_string()))
    }

    /// Parse an amount given in ether
    pub fn parse_ether(text: &str) -> Result<Self> {
        Self::parse_units(text, ETHER_DECIMALS)
    }

    /// Render as an exact decimal string scaled by `decimals`
    ///
    /// Trailing fractional zeros are trimmed; `parse_units` inverts this.
    pub fn format_units(&self, decimals: u8) -> String {
        let raw = self.0.to_string();
        let decimals = decimals as usize;
        if decimals == 0 {
            return raw;
        }

        let padded = if raw.len() <= decimals {
            format!("{}{}", "0".repeat(decimals + 1 - raw.len()), raw)
        } else {
            raw
        };
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        let fraction = fraction.trim_end_matches('0');

        if fraction.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{fraction}")
        }
    }

    /// Render in ether
    pub fn format_ether(&self) -> String {
        self.format_units(ETHER_DECIMALS)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}
