//! Events for the banking domain
//!
//! These events capture all state changes of an account.

use crate::banking::types::{AccountId, Money};
use serde::{Deserialize, Serialize};
use stepwise::Message;

/// Event emitted when a new account is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    /// The unique identifier for the account
    pub account_id: AccountId,
    /// Name of the account holder
    pub owner: String,
}

/// Event emitted when money is deposited into an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyDeposited {
    /// The account receiving the deposit
    pub account_id: AccountId,
    /// Amount being deposited
    pub amount: Money,
}

/// Event emitted when money is withdrawn from an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyWithdrawn {
    /// The account money is withdrawn from
    pub account_id: AccountId,
    /// Amount being withdrawn
    pub amount: Money,
}

/// Event emitted when an account is frozen for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFlagged {
    /// The flagged account
    pub account_id: AccountId,
    /// Why the account was flagged
    pub reason: String,
}

/// All possible events in the banking domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BankEvent {
    /// Account was opened
    AccountOpened(AccountOpened),
    /// Money was deposited
    MoneyDeposited(MoneyDeposited),
    /// Money was withdrawn
    MoneyWithdrawn(MoneyWithdrawn),
    /// Account was flagged
    AccountFlagged(AccountFlagged),
}

impl BankEvent {
    /// The account this event belongs to.
    pub const fn account_id(&self) -> &AccountId {
        match self {
            Self::AccountOpened(event) => &event.account_id,
            Self::MoneyDeposited(event) => &event.account_id,
            Self::MoneyWithdrawn(event) => &event.account_id,
            Self::AccountFlagged(event) => &event.account_id,
        }
    }
}

impl Message for BankEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::AccountOpened(_) => "AccountOpened",
            Self::MoneyDeposited(_) => "MoneyDeposited",
            Self::MoneyWithdrawn(_) => "MoneyWithdrawn",
            Self::AccountFlagged(_) => "AccountFlagged",
        }
    }
}

impl From<AccountOpened> for BankEvent {
    fn from(event: AccountOpened) -> Self {
        Self::AccountOpened(event)
    }
}

impl From<MoneyDeposited> for BankEvent {
    fn from(event: MoneyDeposited) -> Self {
        Self::MoneyDeposited(event)
    }
}

impl From<MoneyWithdrawn> for BankEvent {
    fn from(event: MoneyWithdrawn) -> Self {
        Self::MoneyWithdrawn(event)
    }
}

impl From<AccountFlagged> for BankEvent {
    fn from(event: AccountFlagged) -> Self {
        Self::AccountFlagged(event)
    }
}
