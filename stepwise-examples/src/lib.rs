//! Example domains tested with `stepwise` scenarios
//!
//! Each example is an ordinary event-sourced application: aggregates,
//! command handlers, projections and policies. Its tests under `tests/`
//! describe its behavior as given/when/then scenarios.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]

/// Banking example: accounts, deposits, withdrawals and a fraud policy
pub mod banking;
