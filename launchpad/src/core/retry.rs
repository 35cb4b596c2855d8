//! Bounded retry for flaky operations.
//!
//! A pre-flight check runs once and is never retried. The operation itself is
//! attempted at most `max_attempts` times with a fixed delay in between, and
//! only errors whose kind is retryable consume another attempt.

use std::thread;
use std::time::Duration;

use crate::core::error::StepError;

/// Attempt budget for one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// An operation that can be retried.
pub trait Retryable {
    /// Label used in messages (e.g. `melos bootstrap`).
    fn label(&self) -> String;

    /// Check that the operation can run at all. Failures here are never retried.
    fn preflight(&mut self) -> Result<(), StepError>;

    /// Run one attempt (1-indexed). Returns a short success message.
    fn attempt(&mut self, attempt: u32) -> Result<String, StepError>;
}

/// Abstraction over waiting between attempts so tests do not sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub success: bool,
    /// Attempts actually consumed (0 when pre-flight failed).
    pub attempts: u32,
    pub message: String,
}

pub struct RetryExecutor<'a, S: Sleeper> {
    budget: RetryBudget,
    sleeper: &'a S,
}

impl<'a, S: Sleeper> RetryExecutor<'a, S> {
    pub fn new(budget: RetryBudget, sleeper: &'a S) -> Self {
        Self { budget, sleeper }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// Run `operation` within the budget.
    pub fn run_with_retry<O: Retryable>(&self, operation: &mut O) -> RetryReport {
        let label = operation.label();
        if let Err(err) = operation.preflight() {
            return RetryReport {
                success: false,
                attempts: 0,
                message: format!("{label} cannot run: {err}"),
            };
        }

        let max_attempts = self.budget.max_attempts;
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match operation.attempt(attempt) {
                Ok(message) => {
                    let message = if attempt > 1 {
                        format!("{message} (succeeded after {attempt} attempts)")
                    } else {
                        message
                    };
                    return RetryReport {
                        success: true,
                        attempts: attempt,
                        message,
                    };
                }
                Err(err) if !err.is_retryable() => {
                    return RetryReport {
                        success: false,
                        attempts: attempt,
                        message: format!("{label} failed: {err}"),
                    };
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.budget.delay);
                    }
                }
            }
        }

        RetryReport {
            success: false,
            attempts: max_attempts,
            message: format!("{label} failed after {max_attempts} attempts: {last_error}"),
        }
    }
}
