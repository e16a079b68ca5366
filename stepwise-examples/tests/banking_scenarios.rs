//! Banking behavior described as scenarios.

use async_trait::async_trait;
use proptest::prelude::*;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepwise::engine::{BreakpointHook, StepDescription};
use stepwise::errors::StepResult;
use stepwise::{CommandError, DebugMode, Envelope, ErrorMatcher, EventListener, Provider, Scenario, ScenarioConfig, StreamId};
use stepwise_examples::banking::{
    account_stream, banking_scenario, AccountFlagged, AccountId, AccountOpened, Balance, Bank, BankAnswer, BankCommand,
    BankEvent, BankQuery, LargeWithdrawalPolicy, Money, MoneyDeposited, MoneyWithdrawn, BALANCES,
};

fn account(id: &str) -> AccountId {
    AccountId::try_new(id).unwrap()
}

fn stream(id: &str) -> StreamId {
    account_stream(&account(id)).unwrap()
}

fn opened(id: &str, owner: &str) -> BankEvent {
    AccountOpened {
        account_id: account(id),
        owner: owner.to_string(),
    }
    .into()
}

fn deposited(id: &str, amount: Money) -> BankEvent {
    MoneyDeposited {
        account_id: account(id),
        amount,
    }
    .into()
}

fn withdrawn(id: &str, amount: Money) -> BankEvent {
    MoneyWithdrawn {
        account_id: account(id),
        amount,
    }
    .into()
}

fn bank() -> Scenario<Bank> {
    banking_scenario(ScenarioConfig::default(), LargeWithdrawalPolicy::DEFAULT_THRESHOLD)
}

#[tokio::test]
async fn opening_and_depositing_updates_the_balance() {
    bank()
        .when_command(stream("alice"), BankCommand::OpenAccount { owner: "Alice".to_string() })
        .then_events(vec![opened("alice", "Alice")])
        .when_command(stream("alice"), BankCommand::Deposit { amount: Money::from_dollars(50) })
        .then_events(vec![deposited("alice", Money::from_dollars(50))])
        .then_read_model(
            BALANCES,
            "alice",
            Balance {
                owner: "Alice".to_string(),
                amount: Money::from_dollars(50),
                flagged: false,
            },
        )
        .then_answer(
            BankQuery::Balance { account: account("alice") },
            BankAnswer::Balance(Money::from_dollars(50)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn overdrawing_is_rejected_and_changes_nothing() {
    bank()
        .given_events(
            stream("alice"),
            vec![opened("alice", "Alice"), deposited("alice", Money::from_dollars(5))],
        )
        .expect_next_step_to_fail("insufficient funds: available $5.00, requested $6.00")
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_dollars(6) })
        .then_no_events()
        .then_answer(
            BankQuery::Balance { account: account("alice") },
            BankAnswer::Balance(Money::from_dollars(5)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn opening_an_account_twice_is_rejected() {
    bank()
        .given_events(stream("alice"), vec![opened("alice", "Alice")])
        .expect_next_step_to_fail("account alice is already open")
        .when_command(stream("alice"), BankCommand::OpenAccount { owner: "Mallory".to_string() })
        .then_no_events()
        .await
        .unwrap();
}

#[tokio::test]
async fn unexpected_rejection_fails_with_the_handler_error() {
    let error = bank()
        .when_command(stream("bob"), BankCommand::Deposit { amount: Money::from_dollars(1) })
        .then_no_events()
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<CommandError>(),
        Some(CommandError::Rejected(reason)) if reason == "account bob does not exist"
    ));
}

#[tokio::test]
async fn large_withdrawal_flags_the_account() {
    // Given: an account with $500 and a policy flagging withdrawals from $100
    banking_scenario(ScenarioConfig::default(), Money::from_dollars(100))
        .given_events(
            stream("alice"),
            vec![opened("alice", "Alice"), deposited("alice", Money::from_dollars(500))],
        )
        // When: $150 is withdrawn
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_dollars(150) })
        // Then: the policy's command has run by the time the step settles
        .then_events(vec![
            withdrawn("alice", Money::from_dollars(150)),
            AccountFlagged {
                account_id: account("alice"),
                reason: "withdrawal of $150.00 reached $100.00".to_string(),
            }
            .into(),
        ])
        .then_read_model(
            BALANCES,
            "alice",
            Balance {
                owner: "Alice".to_string(),
                amount: Money::from_dollars(350),
                flagged: true,
            },
        )
        .then_answer(
            BankQuery::FlaggedAccounts,
            BankAnswer::Accounts(vec!["alice".to_string()]),
        )
        // And: further withdrawals are refused
        .expect_next_step_to_fail("account alice is flagged for review")
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_dollars(1) })
        .await
        .unwrap();
}

#[tokio::test]
async fn withdrawals_below_the_threshold_are_not_flagged() {
    banking_scenario(ScenarioConfig::default(), Money::from_dollars(100))
        .given_events(
            stream("alice"),
            vec![opened("alice", "Alice"), deposited("alice", Money::from_dollars(500))],
        )
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_cents(9_999) })
        .then_events(vec![withdrawn("alice", Money::from_cents(9_999))])
        .then_answer(BankQuery::FlaggedAccounts, BankAnswer::Accounts(Vec::new()))
        .await
        .unwrap();
}

#[derive(Debug, thiserror::Error)]
#[error("sms gateway down while notifying {account}")]
struct SmsGatewayDown {
    account: String,
}

struct SmsNotifier;

#[async_trait]
impl EventListener<BankEvent> for SmsNotifier {
    fn name(&self) -> &str {
        "sms-notifier"
    }

    async fn on_event(&self, event: &Envelope<BankEvent>) -> StepResult {
        match &event.payload {
            BankEvent::MoneyWithdrawn(withdrawal) => Err(SmsGatewayDown {
                account: withdrawal.account_id.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

#[tokio::test]
async fn notifier_failure_fails_the_withdrawal_step() {
    // Given: a notifier that cannot deliver withdrawal notices
    let scenario = bank()
        .given_listener(Provider::value(SmsNotifier))
        .given_events(
            stream("alice"),
            vec![opened("alice", "Alice"), deposited("alice", Money::from_dollars(20))],
        );

    // When: a withdrawal succeeds but the notifier fails in the background
    let error = scenario
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_dollars(5) })
        .then_events(vec![withdrawn("alice", Money::from_dollars(5))])
        .await
        .unwrap_err();

    // Then: the notifier's error fails the scenario
    let down = error.downcast_ref::<SmsGatewayDown>().unwrap();
    assert_eq!(down.account, "alice");
}

#[tokio::test]
async fn expected_notifier_failure_leaves_other_listeners_running() {
    bank()
        .given_listener(Provider::factory(|| SmsNotifier))
        .given_events(
            stream("alice"),
            vec![opened("alice", "Alice"), deposited("alice", Money::from_dollars(20))],
        )
        .expect_next_step_to_fail(ErrorMatcher::kind::<SmsGatewayDown>())
        .when_command(stream("alice"), BankCommand::Withdraw { amount: Money::from_dollars(5) })
        .then_answer(
            BankQuery::Balance { account: account("alice") },
            BankAnswer::Balance(Money::from_dollars(15)),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn events_carry_the_scenario_time() {
    let alice = stream("alice");
    bank()
        .given_time("2024-03-01T09:00:00Z")
        .unwrap()
        .given_events(alice.clone(), vec![opened("alice", "Alice")])
        .advance_time(Duration::from_secs(24 * 60 * 60))
        .when_command(alice.clone(), BankCommand::Deposit { amount: Money::from_dollars(10) })
        .then("the deposit is stamped a day later", move |services| async move {
            let stored = services.event_store.read_stream(&alice, 0).await?;
            assert_eq!(stored[0].envelope.timestamp.to_string(), "2024-03-01 09:00:00 UTC");
            assert_eq!(stored[1].envelope.timestamp.to_string(), "2024-03-02 09:00:00 UTC");
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn breakpoint_hands_the_next_step_to_the_hook() {
    // Given: debugging is on and a hook records what it is shown
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&seen);
    let hook: BreakpointHook = Arc::new(
        move |next: &StepDescription| -> Pin<Box<dyn Future<Output = ()> + Send>> {
            recorder.lock().unwrap().push(next.name().to_string());
            Box::pin(async {})
        },
    );
    let config = ScenarioConfig::builder().debug(DebugMode::On).build().unwrap();

    // When: a breakpoint precedes a command
    banking_scenario(config, LargeWithdrawalPolicy::DEFAULT_THRESHOLD)
        .with_breakpoint_hook(hook)
        .breakpoint()
        .when_command(stream("alice"), BankCommand::OpenAccount { owner: "Alice".to_string() })
        .await
        .unwrap();

    // Then: the hook saw that command's step, once
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ends_with("OpenAccount"), "{seen:?}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn balance_is_the_sum_of_deposits(amounts in prop::collection::vec(1u64..100_000, 1..6)) {
        let total = Money::from_cents(amounts.iter().sum());

        let mut scenario = bank().given_events(stream("carol"), vec![opened("carol", "Carol")]);
        for cents in amounts {
            scenario = scenario.when_command(
                stream("carol"),
                BankCommand::Deposit { amount: Money::from_cents(cents) },
            );
        }
        let scenario = scenario.then_answer(
            BankQuery::Balance { account: account("carol") },
            BankAnswer::Balance(total),
        );

        let outcome = tokio_test::block_on(scenario.run());
        prop_assert!(outcome.is_ok(), "{:?}", outcome.err());
    }
}

mod logging {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn handled_commands_are_logged_with_the_account() {
        bank()
            .when_command(stream("alice"), BankCommand::OpenAccount { owner: "Alice".to_string() })
            .await
            .unwrap();

        assert!(logs_contain("command handled"));
        assert!(logs_contain("account=alice"));
    }
}
