//! Account commands and the aggregate that decides them
//!
//! Every command targets one `account-<id>` stream. The [`Account`]
//! aggregate turns a command into events or rejects it with a
//! [`BankingError`]; [`AccountCommandHandler`] does the loading and saving
//! around that decision.

use crate::banking::events::{AccountFlagged, AccountOpened, BankEvent, MoneyDeposited, MoneyWithdrawn};
use crate::banking::types::{AccountId, Money, MoneyError};
use crate::banking::Bank;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise::repository::stream_for;
use stepwise::{Aggregate, CommandError, CommandHandler, Envelope, Message, RepositoryError, Services, StreamId};
use thiserror::Error;
use tracing::info;

/// Commands accepted by an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankCommand {
    /// Open a new account for `owner`
    OpenAccount {
        /// Name of the account holder
        owner: String,
    },
    /// Put money into the account
    Deposit {
        /// Amount to deposit
        amount: Money,
    },
    /// Take money out of the account
    Withdraw {
        /// Amount to withdraw
        amount: Money,
    },
    /// Freeze the account for review
    FlagAccount {
        /// Why the account is flagged
        reason: String,
    },
}

impl Message for BankCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenAccount { .. } => "OpenAccount",
            Self::Deposit { .. } => "Deposit",
            Self::Withdraw { .. } => "Withdraw",
            Self::FlagAccount { .. } => "FlagAccount",
        }
    }
}

/// Business rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankingError {
    /// The account was opened before
    #[error("account {0} is already open")]
    AlreadyOpen(AccountId),

    /// The account has not been opened
    #[error("account {0} does not exist")]
    NotFound(AccountId),

    /// Deposits and withdrawals must move money
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Flagged accounts cannot be withdrawn from
    #[error("account {0} is flagged for review")]
    Flagged(AccountId),

    /// The stream does not name an account
    #[error("'{0}' is not an account stream")]
    NotAnAccount(String),

    /// Balance arithmetic failed
    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl From<BankingError> for CommandError {
    fn from(error: BankingError) -> Self {
        Self::Rejected(error.to_string())
    }
}

/// The stream of account `id`.
pub fn account_stream(id: &AccountId) -> Result<StreamId, RepositoryError> {
    stream_for::<Account>(id.as_str())
}

/// The account a stream belongs to.
pub fn account_of(stream_id: &StreamId) -> Result<AccountId, BankingError> {
    stream_id
        .strip_prefix("account-")
        .and_then(|id| AccountId::try_new(id).ok())
        .ok_or_else(|| BankingError::NotAnAccount(stream_id.to_string()))
}

/// Account state folded from its events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Holder of the account, `None` until opened
    pub owner: Option<String>,
    /// Current balance
    pub balance: Money,
    /// Whether the account is frozen for review
    pub flagged: bool,
}

impl Aggregate for Account {
    type Event = BankEvent;
    const KIND: &'static str = "account";

    fn apply(&mut self, event: &BankEvent) {
        match event {
            BankEvent::AccountOpened(opened) => self.owner = Some(opened.owner.clone()),
            // Rules were checked when deciding, so replay never fails
            BankEvent::MoneyDeposited(deposit) => {
                self.balance = self.balance.checked_add(deposit.amount).unwrap_or(self.balance);
            }
            BankEvent::MoneyWithdrawn(withdrawal) => {
                self.balance = self.balance.checked_sub(withdrawal.amount).unwrap_or(Money::ZERO);
            }
            BankEvent::AccountFlagged(_) => self.flagged = true,
        }
    }
}

impl Account {
    /// Whether the account has been opened.
    pub const fn is_open(&self) -> bool {
        self.owner.is_some()
    }

    /// Decides which events `command` produces for this account.
    ///
    /// Flagging an already flagged account produces nothing.
    pub fn decide(&self, account_id: &AccountId, command: &BankCommand) -> Result<Vec<BankEvent>, BankingError> {
        match command {
            BankCommand::OpenAccount { owner } => {
                if self.is_open() {
                    return Err(BankingError::AlreadyOpen(account_id.clone()));
                }
                Ok(vec![AccountOpened {
                    account_id: account_id.clone(),
                    owner: owner.clone(),
                }
                .into()])
            }
            _ if !self.is_open() => Err(BankingError::NotFound(account_id.clone())),
            BankCommand::Deposit { amount } => {
                if *amount == Money::ZERO {
                    return Err(BankingError::ZeroAmount);
                }
                self.balance.checked_add(*amount)?;
                Ok(vec![MoneyDeposited {
                    account_id: account_id.clone(),
                    amount: *amount,
                }
                .into()])
            }
            BankCommand::Withdraw { amount } => {
                if *amount == Money::ZERO {
                    return Err(BankingError::ZeroAmount);
                }
                if self.flagged {
                    return Err(BankingError::Flagged(account_id.clone()));
                }
                self.balance.checked_sub(*amount)?;
                Ok(vec![MoneyWithdrawn {
                    account_id: account_id.clone(),
                    amount: *amount,
                }
                .into()])
            }
            BankCommand::FlagAccount { reason } => {
                if self.flagged {
                    return Ok(Vec::new());
                }
                Ok(vec![AccountFlagged {
                    account_id: account_id.clone(),
                    reason: reason.clone(),
                }
                .into()])
            }
        }
    }
}

/// Handles every [`BankCommand`] by loading, deciding and saving the account.
pub struct AccountCommandHandler {
    services: Services<Bank>,
}

impl AccountCommandHandler {
    /// Creates a handler working through `services`.
    pub fn new(services: &Services<Bank>) -> Self {
        Self {
            services: services.clone(),
        }
    }
}

#[async_trait]
impl CommandHandler<Bank> for AccountCommandHandler {
    async fn handle(&self, command: Envelope<BankCommand>) -> Result<(), CommandError> {
        let account_id = account_of(&command.stream_id)?;
        let repository = self.services.repository::<Account>();
        let mut account = repository.load(account_id.as_str()).await?;

        let events = account.state().decide(&account_id, &command.payload)?;
        let recorded = events.len();
        for event in events {
            account.record(event);
        }
        repository.save(&mut account).await?;

        info!(
            account = %account_id,
            command = command.payload.name(),
            recorded,
            version = account.version(),
            "command handled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId::try_new("alice").unwrap()
    }

    fn opened(balance: u64) -> Account {
        Account {
            owner: Some("Alice".to_string()),
            balance: Money::from_dollars(balance),
            flagged: false,
        }
    }

    #[test]
    fn opening_twice_is_rejected() {
        let error = opened(0)
            .decide(&alice(), &BankCommand::OpenAccount { owner: "Alice".to_string() })
            .unwrap_err();

        assert_eq!(error.to_string(), "account alice is already open");
    }

    #[test]
    fn commands_on_unopened_accounts_are_rejected() {
        let error = Account::default()
            .decide(&alice(), &BankCommand::Deposit { amount: Money::from_dollars(1) })
            .unwrap_err();

        assert_eq!(error, BankingError::NotFound(alice()));
    }

    #[test]
    fn withdrawals_cannot_overdraw() {
        let error = opened(5)
            .decide(&alice(), &BankCommand::Withdraw { amount: Money::from_dollars(6) })
            .unwrap_err();

        assert!(matches!(error, BankingError::Money(MoneyError::InsufficientFunds { .. })));
    }

    #[test]
    fn flagged_accounts_accept_deposits_but_not_withdrawals() {
        let mut account = opened(5);
        account.flagged = true;

        assert!(account
            .decide(&alice(), &BankCommand::Deposit { amount: Money::from_dollars(1) })
            .is_ok());
        assert_eq!(
            account.decide(&alice(), &BankCommand::Withdraw { amount: Money::from_dollars(1) }),
            Err(BankingError::Flagged(alice()))
        );
        assert_eq!(
            account.decide(&alice(), &BankCommand::FlagAccount { reason: "again".to_string() }),
            Ok(Vec::new())
        );
    }

    #[test]
    fn applying_events_tracks_the_balance() {
        let mut account = Account::default();
        for event in [
            BankEvent::from(AccountOpened { account_id: alice(), owner: "Alice".to_string() }),
            MoneyDeposited { account_id: alice(), amount: Money::from_dollars(10) }.into(),
            MoneyWithdrawn { account_id: alice(), amount: Money::from_dollars(4) }.into(),
        ] {
            account.apply(&event);
        }

        assert_eq!(account.balance, Money::from_dollars(6));
        assert!(account.is_open());
    }

    #[test]
    fn streams_round_trip_to_account_ids() {
        let stream = account_stream(&alice()).unwrap();

        assert_eq!(stream.as_str(), "account-alice");
        assert_eq!(account_of(&stream).unwrap(), alice());
        assert!(account_of(&StreamId::try_new("order-1").unwrap()).is_err());
    }
}
