//! Type-safe domain types for the banking example

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when working with Money
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The result does not fit in the representable range
    #[error("amount overflow: {0} + {1}")]
    Overflow(Money, Money),

    /// More money was taken than available
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// The current balance
        available: Money,
        /// The requested amount
        requested: Money,
    },
}

/// A non-negative amount of money in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates money from cents (e.g., 1234 = $12.34).
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates money from whole dollars.
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// The amount in cents.
    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Adds two amounts.
    pub fn checked_add(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow(self, other))
    }

    /// Subtracts `other`, refusing to go below zero.
    pub fn checked_sub(self, other: Self) -> Result<Self, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(MoneyError::InsufficientFunds {
                available: self,
                requested: other,
            })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Account identifier: lowercase letters, digits and dashes.
#[nutype(
    sanitize(trim, lowercase),
    validate(not_empty, len_char_max = 64, predicate = |id: &str| id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AccountId(String);
