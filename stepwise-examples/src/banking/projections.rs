//! Read models and policies fed by banking events

use crate::banking::commands::{account_stream, BankCommand};
use crate::banking::events::BankEvent;
use crate::banking::types::Money;
use crate::banking::Bank;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwise::errors::StepResult;
use stepwise::{Envelope, EventListener, ReadModels, Services};
use tracing::{info, warn};

/// Collection holding one [`Balance`] per account id.
pub const BALANCES: &str = "balances";

/// The balance read model of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Holder of the account
    pub owner: String,
    /// Current balance
    pub amount: Money,
    /// Whether the account is frozen for review
    pub flagged: bool,
}

impl Balance {
    fn apply(&mut self, event: &BankEvent) {
        match event {
            BankEvent::AccountOpened(opened) => self.owner.clone_from(&opened.owner),
            BankEvent::MoneyDeposited(deposit) => {
                self.amount = self.amount.checked_add(deposit.amount).unwrap_or(self.amount);
            }
            BankEvent::MoneyWithdrawn(withdrawal) => {
                self.amount = self.amount.checked_sub(withdrawal.amount).unwrap_or(Money::ZERO);
            }
            BankEvent::AccountFlagged(_) => self.flagged = true,
        }
    }
}

/// Maintains the [`BALANCES`] collection.
pub struct BalanceProjection {
    read_models: ReadModels,
}

impl BalanceProjection {
    /// Creates a projection writing to the services' read models.
    pub fn new(services: &Services<Bank>) -> Self {
        Self {
            read_models: services.read_models.clone(),
        }
    }
}

#[async_trait]
impl EventListener<BankEvent> for BalanceProjection {
    fn name(&self) -> &str {
        "balance-projection"
    }

    async fn on_event(&self, event: &Envelope<BankEvent>) -> StepResult {
        let account_id = event.payload.account_id();
        self.read_models
            .update(BALANCES, account_id.as_str(), |balance: &mut Balance| {
                balance.apply(&event.payload);
            })
            .await?;
        Ok(())
    }
}

/// Flags accounts that make a withdrawal at or above a threshold.
pub struct LargeWithdrawalPolicy {
    services: Services<Bank>,
    threshold: Money,
}

impl LargeWithdrawalPolicy {
    /// Withdrawals from this amount on are flagged by default.
    pub const DEFAULT_THRESHOLD: Money = Money::from_dollars(10_000);

    /// Creates a policy dispatching through `services`.
    pub fn new(services: &Services<Bank>, threshold: Money) -> Self {
        Self {
            services: services.clone(),
            threshold,
        }
    }
}

#[async_trait]
impl EventListener<BankEvent> for LargeWithdrawalPolicy {
    fn name(&self) -> &str {
        "large-withdrawal-policy"
    }

    async fn on_event(&self, event: &Envelope<BankEvent>) -> StepResult {
        let BankEvent::MoneyWithdrawn(withdrawal) = &event.payload else {
            return Ok(());
        };
        if withdrawal.amount < self.threshold {
            return Ok(());
        }

        warn!(
            account = %withdrawal.account_id,
            amount = %withdrawal.amount,
            threshold = %self.threshold,
            "large withdrawal"
        );
        let reason = format!("withdrawal of {} reached {}", withdrawal.amount, self.threshold);
        self.services
            .dispatch(
                account_stream(&withdrawal.account_id)?,
                BankCommand::FlagAccount { reason },
            )
            .await?;
        info!(account = %withdrawal.account_id, "account flagged");
        Ok(())
    }
}
