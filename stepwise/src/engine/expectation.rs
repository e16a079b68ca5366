//! Expected step failures.
//!
//! `expect_next_step_to_fail` arms an [`ErrorMatcher`] for exactly one step.
//! That step's error is trapped and compared against the matcher instead of
//! aborting the scenario; afterwards normal propagation resumes.

use crate::errors::{ConfigError, HarnessError, StepError, StepResult};
use regex::Regex;
use std::error::Error;
use std::fmt;

type KindCheck = fn(&(dyn Error + 'static)) -> bool;

/// The shape an expected error must have.
#[derive(Clone)]
pub enum ErrorMatcher {
    /// The error's `Display` output equals this message exactly.
    Message(String),
    /// The error, or one of its sources, is of a given type.
    Kind {
        /// Type name, used in failure messages
        name: &'static str,
        /// Downcast check for the type
        check: KindCheck,
    },
    /// The error's `Display` output matches this pattern.
    Pattern(Regex),
}

fn is_kind<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(error), |current: &&(dyn Error + 'static)| (*current).source()).any(|e| e.is::<E>())
}

impl ErrorMatcher {
    /// Matches errors whose message is exactly `message`.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Matches errors of type `E` anywhere in the source chain.
    pub fn kind<E: Error + 'static>() -> Self {
        Self::Kind {
            name: std::any::type_name::<E>(),
            check: is_kind::<E>,
        }
    }

    /// Matches errors whose message matches `pattern`.
    ///
    /// An invalid pattern is a construction error and is reported right away.
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|error| ConfigError::InvalidValue {
                key: "pattern".to_string(),
                reason: error.to_string(),
            })
    }

    /// Whether `error` has the expected shape.
    pub fn matches(&self, error: &(dyn Error + Send + Sync + 'static)) -> bool {
        match self {
            Self::Message(message) => error.to_string() == *message,
            Self::Kind { check, .. } => check(error),
            Self::Pattern(pattern) => pattern.is_match(&error.to_string()),
        }
    }

    /// Turns the trapped outcome of `step` into the expectation's verdict:
    /// success when the step failed as expected, a [`HarnessError`]
    /// otherwise.
    pub fn verify(&self, step: &str, outcome: StepResult) -> StepResult {
        match outcome {
            Ok(()) => Err(HarnessError::MissingFailure {
                step: step.to_string(),
                expected: self.to_string(),
            }
            .into()),
            Err(error) if self.matches(error.as_ref()) => Ok(()),
            Err(error) => Err(mismatch(step, self, &error)),
        }
    }
}

fn mismatch(step: &str, matcher: &ErrorMatcher, actual: &StepError) -> StepError {
    HarnessError::UnexpectedFailure {
        step: step.to_string(),
        expected: matcher.to_string(),
        actual: actual.to_string(),
    }
    .into()
}

impl fmt::Display for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message:?}"),
            Self::Kind { name, .. } => write!(f, "an error of type {name}"),
            Self::Pattern(pattern) => write!(f, "an error matching /{}/", pattern.as_str()),
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Kind { name, .. } => f.debug_struct("Kind").field("name", name).finish(),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(pattern).finish(),
        }
    }
}

impl From<&str> for ErrorMatcher {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for ErrorMatcher {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<Regex> for ErrorMatcher {
    fn from(pattern: Regex) -> Self {
        Self::Pattern(pattern)
    }
}
