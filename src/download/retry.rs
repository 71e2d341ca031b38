//! Bounded, immediate retry for asset requests.
//!
//! A bad response (wrong status or content type) counts against the budget;
//! the request is repeated straight away with no backoff. Transport failures
//! are not routed through the policy at all.
//!
//! # Example
//!
//! ```
//! use mox_core::download::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.should_retry(1), RetryDecision::Retry { attempt: 2 });
//! assert_eq!(policy.should_retry(6), RetryDecision::Abandon { attempts: 6 });
//! ```

use tracing::debug;

use super::constants::MAX_RETRIES;

/// Decision taken after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the request again.
    Retry {
        /// 1-indexed number of the attempt about to be made.
        attempt: u32,
    },

    /// Give up on this volume.
    Abandon {
        /// Total attempts made.
        attempts: u32,
    },
}

/// Retry budget for one download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides what to do after `failures` consecutive bad responses.
    #[must_use]
    pub fn should_retry(&self, failures: u32) -> RetryDecision {
        if failures > self.max_retries {
            debug!(failures, max_retries = self.max_retries, "retry budget exhausted");
            RetryDecision::Abandon { attempts: failures }
        } else {
            RetryDecision::Retry {
                attempt: failures.saturating_add(1),
            }
        }
    }
}
