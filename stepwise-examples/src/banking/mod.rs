//! Banking example demonstrating accounts tested through scenarios
//!
//! This example shows a small event-sourced banking domain:
//! - Type-safe money handling with the Money type
//! - An `Account` aggregate deciding commands
//! - A balance projection and a query handler reading it
//! - A policy that reacts to large withdrawals by dispatching a command
//!
//! [`banking_scenario`] wires all of it into an in-memory scenario.

pub mod commands;
pub mod events;
pub mod projections;
pub mod queries;
pub mod types;

// Re-export commonly used types
pub use commands::{account_of, account_stream, Account, AccountCommandHandler, BankCommand, BankingError};
pub use events::{AccountFlagged, AccountOpened, BankEvent, MoneyDeposited, MoneyWithdrawn};
pub use projections::{Balance, BalanceProjection, LargeWithdrawalPolicy, BALANCES};
pub use queries::{BalanceQueryHandler, BankAnswer, BankQuery};
pub use types::{AccountId, Money, MoneyError};

use stepwise::{Domain, Provider, Scenario, ScenarioConfig, Services};
use stepwise_memory::in_memory_scenario;

/// The banking bounded context.
#[derive(Debug)]
pub struct Bank;

impl Domain for Bank {
    type Command = BankCommand;
    type Event = BankEvent;
    type Query = BankQuery;
    type Answer = BankAnswer;
}

/// An in-memory scenario with every banking handler, projection and
/// policy registered. Large withdrawals start at `threshold`.
pub fn banking_scenario(config: ScenarioConfig, threshold: Money) -> Scenario<Bank> {
    let mut scenario = in_memory_scenario::<Bank>(config);
    for name in ["OpenAccount", "Deposit", "Withdraw", "FlagAccount"] {
        scenario = scenario.given_command_handler(name, Provider::with_dependencies(AccountCommandHandler::new));
    }
    for name in ["Balance", "FlaggedAccounts"] {
        scenario = scenario.given_query_handler(name, Provider::with_dependencies(BalanceQueryHandler::new));
    }
    scenario
        .given_listener(Provider::with_dependencies(BalanceProjection::new))
        .given_listener(Provider::with_dependencies(move |services: &Services<Bank>| {
            LargeWithdrawalPolicy::new(services, threshold)
        }))
}
