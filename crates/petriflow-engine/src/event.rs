//! Instance events: the authoritative mutation log
//!
//! Every state change of a process instance is journaled as one of these
//! events before it becomes observable. Events are immutable once written;
//! the instance is reconstructed by folding them in sequence order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use petriflow_net::{Marking, TransitionId};
use serde::{Deserialize, Serialize};

use crate::instance::JobId;

/// What the engine does with a failed transition job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Keep the job in place, blocked, until an operator overrides it
    BlockTransition,

    /// Re-execute the job after a delay; its tokens stay reserved
    RetryWithDelay {
        /// Delay before the next attempt
        #[serde(with = "duration_millis")]
        delay: Duration,
    },

    /// Treat the failure as a firing: place `produced` and fold `output`
    ///
    /// `produced` must structurally match the transition's output arc
    /// weights.
    Continue {
        produced: Marking,
        output: Option<serde_json::Value>,
    },
}

impl FailureStrategy {
    /// Shorthand for `RetryWithDelay`
    pub fn retry(delay: Duration) -> Self {
        Self::RetryWithDelay { delay }
    }

    /// Whether this strategy schedules another attempt
    pub fn retries(&self) -> bool {
        matches!(self, Self::RetryWithDelay { .. })
    }

    /// Whether this strategy blocks the job until overridden
    pub fn blocks(&self) -> bool {
        matches!(self, Self::BlockTransition)
    }
}

/// Events stored in the instance journal
///
/// The three variants are the whole persisted surface of an instance; no
/// snapshots are kept. Replaying them through
/// [`Instance::apply`](crate::instance::Instance::apply) in sequence order
/// rebuilds the live state exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceEvent {
    /// The instance was created with an initial marking and user state
    Initialized {
        marking: Marking,
        state: serde_json::Value,
    },

    /// A transition fired: tokens consumed, tokens produced, output folded
    /// into the user state
    TransitionFired {
        job_id: JobId,
        transition_id: TransitionId,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        consumed: Marking,
        produced: Marking,
        output: Option<serde_json::Value>,
    },

    /// A transition job failed; its tokens stay reserved and the chosen
    /// strategy decides what happens next
    TransitionFailed {
        job_id: JobId,
        transition_id: TransitionId,
        correlation_id: Option<String>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        consumed: Marking,
        input: serde_json::Value,
        reason: String,
        strategy: FailureStrategy,
    },
}

impl InstanceEvent {
    /// The job this event belongs to, if any
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Initialized { .. } => None,
            Self::TransitionFired { job_id, .. } | Self::TransitionFailed { job_id, .. } => {
                Some(*job_id)
            }
        }
    }

    /// The transition this event belongs to, if any
    pub fn transition_id(&self) -> Option<&TransitionId> {
        match self {
            Self::Initialized { .. } => None,
            Self::TransitionFired { transition_id, .. }
            | Self::TransitionFailed { transition_id, .. } => Some(transition_id),
        }
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = InstanceEvent::Initialized {
            marking: Marking::new().with_token("a", json!(1)),
            state: json!({}),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"initialized\""));

        let parsed: InstanceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_failed_event_round_trip() {
        let event = InstanceEvent::TransitionFailed {
            job_id: 3,
            transition_id: "ship".into(),
            correlation_id: Some("order-1".to_string()),
            started_at: Utc::now(),
            failed_at: Utc::now(),
            consumed: Marking::new().with_token("packed", json!("box")),
            input: json!({"carrier": "acme"}),
            reason: "carrier unreachable".to_string(),
            strategy: FailureStrategy::retry(Duration::from_millis(250)),
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: InstanceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_strategy_predicates() {
        assert!(FailureStrategy::BlockTransition.blocks());
        assert!(!FailureStrategy::BlockTransition.retries());
        assert!(FailureStrategy::retry(Duration::ZERO).retries());
        assert!(!FailureStrategy::Continue {
            produced: Marking::new(),
            output: None
        }
        .blocks());
    }

    #[test]
    fn test_retry_delay_persisted_as_millis() {
        let strategy = FailureStrategy::retry(Duration::from_secs(2));
        let json = serde_json::to_string(&strategy).unwrap();
        assert!(json.contains("\"delay\":2000"));
    }

    #[test]
    fn test_event_accessors() {
        let init = InstanceEvent::Initialized {
            marking: Marking::new(),
            state: json!(null),
        };
        assert_eq!(init.job_id(), None);
        assert_eq!(init.transition_id(), None);

        let fired = InstanceEvent::TransitionFired {
            job_id: 9,
            transition_id: "pack".into(),
            correlation_id: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            consumed: Marking::new(),
            produced: Marking::new(),
            output: None,
        };
        assert_eq!(fired.job_id(), Some(9));
        assert_eq!(fired.transition_id(), Some(&"pack".into()));
    }
}
