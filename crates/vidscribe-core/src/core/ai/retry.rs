//! Retry / Backoff Policy
//!
//! Decision function: given a failed attempt, decide whether to try again
//! and how long to wait first.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::provider::FailureClass;

/// Default number of total attempts per call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed wait between attempts
pub const DEFAULT_FIXED_WAIT: Duration = Duration::from_secs(25);

/// Default first exponential backoff wait
pub const DEFAULT_BACKOFF_SEED: Duration = Duration::from_secs(2);

/// Upper bound for any computed or hinted wait
const MAX_WAIT: Duration = Duration::from_secs(600);

/// Primary wait strategy of a provider variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same wait before every retry
    Fixed,
    /// Seed wait doubling per attempt for rate-limit and network failures
    Exponential,
}

/// Outcome of [`RetryPolicy::decide`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub wait: Duration,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            retry: false,
            wait: Duration::ZERO,
        }
    }
}

/// Retry limits and wait parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub fixed_wait: Duration,
    pub backoff_seed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fixed_wait: DEFAULT_FIXED_WAIT,
            backoff_seed: DEFAULT_BACKOFF_SEED,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, fixed_wait: Duration, backoff_seed: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            fixed_wait,
            backoff_seed,
        }
    }

    /// Decides what to do after attempt number `attempt` (zero-based) failed.
    ///
    /// A provider hint overrides the computed wait for this attempt only.
    /// Hints longer than ten minutes are capped at ten minutes.
    pub fn decide(
        &self,
        class: FailureClass,
        attempt: u32,
        hint: Option<Duration>,
        strategy: BackoffStrategy,
    ) -> RetryDecision {
        if !class.is_retryable() || attempt + 1 >= self.max_attempts {
            return RetryDecision::give_up();
        }

        let wait = match hint {
            Some(hint) => cap_hint(hint),
            None => self.computed_wait(class, attempt, strategy).min(MAX_WAIT),
        };

        RetryDecision { retry: true, wait }
    }

    fn computed_wait(&self, class: FailureClass, attempt: u32, strategy: BackoffStrategy) -> Duration {
        match strategy {
            BackoffStrategy::Exponential if class.is_rate_limit_or_network() => {
                let factor = 2u32.saturating_pow(attempt);
                self.backoff_seed.saturating_mul(factor)
            }
            _ => self.fixed_wait,
        }
    }
}

fn cap_hint(hint: Duration) -> Duration {
    if hint > MAX_WAIT {
        warn!(
            requested_secs = hint.as_secs_f64(),
            capped_secs = MAX_WAIT.as_secs(),
            "Provider asked for a longer wait than allowed; capping"
        );
        return MAX_WAIT;
    }
    hint
}

/// Parses a `Retry-After` value given in (possibly fractional) seconds.
///
/// HTTP-date values and negatives are treated as absent. Values above ten
/// minutes are capped.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    if seconds > MAX_WAIT.as_secs_f64() {
        warn!(
            requested_secs = seconds,
            capped_secs = MAX_WAIT.as_secs(),
            "Retry-After exceeds the longest allowed wait; capping"
        );
        return Some(MAX_WAIT);
    }
    Some(Duration::from_secs_f64(seconds))
}
