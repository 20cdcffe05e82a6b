//! Failure policies: what to do when a transition handler fails

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::event::{duration_millis, FailureStrategy};
use crate::instance::Job;

use super::HandlerError;

/// Decides the [`FailureStrategy`] for a failed job
///
/// Consulted by the job executor after every failed attempt; the decision is
/// journaled with the failed event, so it is durable and replayed verbatim.
pub trait FailurePolicy: Send + Sync + 'static {
    /// Decide what happens to `job` after its `failure_count`-th failure
    fn decide(&self, job: &Job, failure_count: u32, error: &HandlerError) -> FailureStrategy;
}

/// Block on the first failure. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockPolicy;

impl FailurePolicy for BlockPolicy {
    fn decide(&self, _job: &Job, _failure_count: u32, _error: &HandlerError) -> FailureStrategy {
        FailureStrategy::BlockTransition
    }
}

/// Retry with exponential backoff, then block
///
/// # Example
///
/// ```
/// use petriflow_engine::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::exponential()
///     .with_max_retries(3)
///     .with_initial_delay(Duration::from_millis(100));
///
/// // First retry after ~100ms, second after ~200ms, third after ~400ms,
/// // fourth failure blocks the transition.
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Maximum number of retries before blocking
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier applied per failed attempt (2.0 = exponential doubling)
    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0) to spread retry storms
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl BackoffPolicy {
    /// Exponential backoff with sensible defaults
    ///
    /// - 5 retries
    /// - 1 second initial delay
    /// - 60 second max delay
    /// - 2x backoff coefficient
    /// - no jitter
    pub fn exponential() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            jitter: 0.0,
        }
    }

    /// Fixed-interval retries (no backoff)
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the upper bound on any single delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Set the jitter factor (clamped to 0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the retry following the given failure (1-based)
    pub fn delay_for(&self, failure_count: u32) -> Duration {
        let exponent = failure_count.saturating_sub(1);
        let base = self.initial_delay.as_secs_f64()
            * self.backoff_coefficient.powi(exponent as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..=range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

impl FailurePolicy for BackoffPolicy {
    fn decide(&self, _job: &Job, failure_count: u32, error: &HandlerError) -> FailureStrategy {
        if !error.retryable || failure_count > self.max_retries {
            FailureStrategy::BlockTransition
        } else {
            FailureStrategy::retry(self.delay_for(failure_count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use petriflow_net::Marking;
    use serde_json::json;

    fn job() -> Job {
        Job {
            id: 1,
            correlation_id: None,
            transition_id: "t".into(),
            consume: Marking::new(),
            input: json!(null),
            started_at: Utc::now(),
            failure: None,
        }
    }

    #[test]
    fn test_block_policy_always_blocks() {
        let strategy = BlockPolicy.decide(&job(), 1, &HandlerError::retryable("x"));
        assert_eq!(strategy, FailureStrategy::BlockTransition);
    }

    #[test]
    fn test_backoff_delays_double() {
        let policy = BackoffPolicy::exponential();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_max_delay_cap() {
        let policy = BackoffPolicy::exponential().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(50), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(3), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_blocks_after_exhaustion() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(10), 2);
        let err = HandlerError::retryable("x");

        assert!(policy.decide(&job(), 1, &err).retries());
        assert!(policy.decide(&job(), 2, &err).retries());
        assert!(policy.decide(&job(), 3, &err).blocks());
    }

    #[test]
    fn test_backoff_blocks_on_fatal_error() {
        let policy = BackoffPolicy::exponential();
        let strategy = policy.decide(&job(), 1, &HandlerError::fatal("bad input"));
        assert!(strategy.blocks());
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = BackoffPolicy::fixed(Duration::from_secs(10), 1).with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay_for(1).as_secs_f64();
            assert!((5.0..=15.0).contains(&delay));
        }
    }
}
