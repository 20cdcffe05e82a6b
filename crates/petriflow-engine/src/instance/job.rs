//! Jobs: in-flight or failed firing attempts

use chrono::{DateTime, Utc};
use petriflow_net::{Marking, TransitionId};
use serde::{Deserialize, Serialize};

use crate::event::FailureStrategy;

/// Job identifier, monotonic within one instance
pub type JobId = u64;

/// The failure state of a job after one or more failed attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    /// How many attempts have failed so far
    pub failure_count: u32,

    /// When the most recent attempt failed
    pub failure_time: DateTime<Utc>,

    /// Why the most recent attempt failed
    pub reason: String,

    /// What the engine decided to do about it
    pub strategy: FailureStrategy,
}

/// A firing attempt of a transition, with its reserved input tokens
///
/// The tokens in `consume` were subtracted from the instance marking when
/// the job was created; they return to circulation only through the
/// `produced` marking of the eventual fired event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier, monotonic within the instance
    pub id: JobId,

    /// Caller-supplied tag enforcing at-most-once firing
    pub correlation_id: Option<String>,

    /// The transition this job fires
    pub transition_id: TransitionId,

    /// Reserved input tokens
    pub consume: Marking,

    /// User input handed to the transition handler
    pub input: serde_json::Value,

    /// When the job was created
    pub started_at: DateTime<Utc>,

    /// Present after at least one failed attempt
    pub failure: Option<JobFailure>,
}

impl Job {
    /// A job is active while it has not failed terminally: either it never
    /// failed, or its strategy keeps retrying.
    pub fn is_active(&self) -> bool {
        match &self.failure {
            None => true,
            Some(f) => f.strategy.retries(),
        }
    }

    /// A job is blocked when its failure strategy is `BlockTransition`; it
    /// stays in the job table until overridden.
    pub fn is_blocked(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.strategy.blocks())
    }

    /// Number of failed attempts so far
    pub fn failure_count(&self) -> u32 {
        self.failure.as_ref().map(|f| f.failure_count).unwrap_or(0)
    }
}
