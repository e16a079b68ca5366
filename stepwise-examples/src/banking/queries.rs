//! Queries answered from the balance read model

use crate::banking::projections::{Balance, BALANCES};
use crate::banking::types::{AccountId, Money};
use crate::banking::Bank;
use async_trait::async_trait;
use stepwise::{Message, QueryError, QueryHandler, ReadModels, RepositoryError, Services};

/// Questions about accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankQuery {
    /// The current balance of an account
    Balance {
        /// The account to look up
        account: AccountId,
    },
    /// Ids of every flagged account, in id order
    FlaggedAccounts,
}

impl Message for BankQuery {
    fn name(&self) -> &'static str {
        match self {
            Self::Balance { .. } => "Balance",
            Self::FlaggedAccounts => "FlaggedAccounts",
        }
    }
}

/// Answers to [`BankQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankAnswer {
    /// A balance
    Balance(Money),
    /// A list of account ids
    Accounts(Vec<String>),
}

fn read_model_error(error: RepositoryError) -> QueryError {
    QueryError::ReadModel(error.to_string())
}

/// Answers every [`BankQuery`] from the [`BALANCES`] collection.
pub struct BalanceQueryHandler {
    read_models: ReadModels,
}

impl BalanceQueryHandler {
    /// Creates a handler reading the services' read models.
    pub fn new(services: &Services<Bank>) -> Self {
        Self {
            read_models: services.read_models.clone(),
        }
    }
}

#[async_trait]
impl QueryHandler<Bank> for BalanceQueryHandler {
    async fn ask(&self, query: &BankQuery) -> Result<BankAnswer, QueryError> {
        match query {
            BankQuery::Balance { account } => self
                .read_models
                .get::<Balance>(BALANCES, account.as_str())
                .await
                .map_err(read_model_error)?
                .map(|balance| BankAnswer::Balance(balance.amount))
                .ok_or_else(|| QueryError::NotFound {
                    collection: BALANCES.to_string(),
                    id: account.to_string(),
                }),
            BankQuery::FlaggedAccounts => {
                let balances = self
                    .read_models
                    .list::<Balance>(BALANCES)
                    .await
                    .map_err(read_model_error)?;
                Ok(BankAnswer::Accounts(
                    balances
                        .into_iter()
                        .filter(|(_, balance)| balance.flagged)
                        .map(|(id, _)| id)
                        .collect(),
                ))
            }
        }
    }
}
