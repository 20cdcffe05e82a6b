//! Instance state and the pure event fold
//!
//! [`Instance`] is the snapshot the actor owns: the current marking, the
//! user's accumulated state, the job table and the correlation-id set.
//! [`Instance::apply`] folds one journaled event into the snapshot; replaying
//! the whole journal through it rebuilds the instance exactly.
//!
//! ## Reservation model
//!
//! Creating a job subtracts its `consume` tokens from the marking without
//! journaling anything; the reservation is only durable once a fired or
//! failed event lands. `apply` therefore distinguishes the live path (the job
//! is in the table, its tokens are already gone) from the replay path (no
//! job, so the event itself re-creates the reservation). Either way the
//! invariant holds that the live marking plus the reserved tokens of every
//! job equals the marking derived from fired events alone.

mod job;

#[cfg(test)]
mod proptests;

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use petriflow_net::{Marking, MarkingError, PetriNet, TransitionId};

use crate::event::InstanceEvent;
use crate::runtime::StateReducer;

pub use job::{Job, JobFailure, JobId};

/// Why a fire request produced no job
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRejection {
    /// The transition id is unknown to the net
    #[error("unknown transition: {0}")]
    TransitionNotFound(TransitionId),

    /// The available marking does not satisfy the transition's input arcs
    #[error("transition {transition_id} is not enabled: {reason}")]
    NotEnabled {
        transition_id: TransitionId,
        reason: String,
    },

    /// The correlation id was already used by an earlier firing or an
    /// in-flight job
    #[error("correlation id already received: {0}")]
    AlreadyReceived(String),
}

/// A structurally invalid event reached the fold
///
/// Events are validated before journaling, so hitting one of these during
/// replay means the journal is corrupt; the error is fatal to the instance.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// `Initialized` applied to an instance that already has events
    #[error("initialized event applied at sequence {0}")]
    AlreadyInitialized(u64),

    /// A transition event applied before any `Initialized` event
    #[error("transition event applied before initialization")]
    NotInitialized,

    /// The event's consumed marking is not covered by the instance marking
    #[error(transparent)]
    Marking(#[from] MarkingError),
}

/// The mutable-over-time snapshot of one process instance
#[derive(Debug, Clone)]
pub struct Instance {
    /// Identifier of this process instance
    pub process_id: String,

    /// Strictly increasing event counter; an applied event's index equals
    /// the post-apply value
    pub sequence_nr: u64,

    /// Current marking, net of tokens reserved by jobs
    pub marking: Marking,

    /// User-defined accumulated state, updated by the event reducer
    pub state: serde_json::Value,

    /// All active or failed-blocked jobs
    pub jobs: BTreeMap<JobId, Job>,

    /// Correlation ids seen so far; enforces at-most-once firing
    pub received_correlation_ids: HashSet<String>,

    next_job_id: JobId,
}

impl Instance {
    /// A fresh, uninitialized instance
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            sequence_nr: 0,
            marking: Marking::new(),
            state: serde_json::Value::Null,
            jobs: BTreeMap::new(),
            received_correlation_ids: HashSet::new(),
            next_job_id: 1,
        }
    }

    /// Whether an `Initialized` event has been applied
    pub fn is_initialized(&self) -> bool {
        self.sequence_nr > 0
    }

    /// Jobs that are still in flight or awaiting a retry
    pub fn active_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().filter(|j| j.is_active())
    }

    /// Whether any job is still active
    pub fn has_active_jobs(&self) -> bool {
        self.active_jobs().next().is_some()
    }

    /// Tokens reserved by all jobs, active and blocked
    pub fn reserved_marking(&self) -> Marking {
        let mut reserved = Marking::new();
        for job in self.jobs.values() {
            reserved.merge(&job.consume);
        }
        reserved
    }

    /// Whether a correlation id was already used, either by a journaled
    /// firing or an in-flight job
    pub fn has_received(&self, correlation_id: &str) -> bool {
        self.received_correlation_ids.contains(correlation_id)
            || self
                .jobs
                .values()
                .any(|j| j.correlation_id.as_deref() == Some(correlation_id))
    }

    /// Validate and create a job for an explicit fire request
    ///
    /// On success the job's `consume` tokens are reserved (subtracted from
    /// the marking) and the job is registered in the job table. Nothing is
    /// journaled; the reservation becomes durable with the job's first fired
    /// or failed event.
    pub fn create_job(
        &mut self,
        net: &PetriNet,
        transition_id: TransitionId,
        input: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<Job, JobRejection> {
        if net.transition(&transition_id).is_none() {
            return Err(JobRejection::TransitionNotFound(transition_id));
        }
        if let Some(corr) = &correlation_id {
            if self.has_received(corr) {
                return Err(JobRejection::AlreadyReceived(corr.clone()));
            }
        }

        let mut params = net.enabled_parameters_for(&self.marking, &transition_id);
        if params.is_empty() {
            let reason = net
                .disabled_reason(&self.marking, &transition_id)
                .unwrap_or_else(|| "not enabled".to_string());
            return Err(JobRejection::NotEnabled {
                transition_id,
                reason,
            });
        }
        let consume = params.remove(0);

        Ok(self.reserve_job(transition_id, consume, input, correlation_id))
    }

    /// Create one job per enabled automated transition until fixpoint
    ///
    /// Enablement is evaluated against the remaining marking, so each created
    /// job's reservation is visible to the next iteration. Transitions in id
    /// order, first enabled parameter each; transitions with a failed job are
    /// skipped until the failure resolves. Deterministic.
    pub fn all_enabled_jobs(&mut self, net: &PetriNet) -> Vec<Job> {
        let mut created = Vec::new();
        loop {
            let skip: HashSet<TransitionId> = self
                .jobs
                .values()
                .filter(|j| j.failure.is_some())
                .map(|j| j.transition_id.clone())
                .collect();

            let next = net
                .transitions()
                .filter(|t| t.automated && !skip.contains(&t.id))
                .find(|t| net.is_enabled(&self.marking, &t.id))
                .map(|t| t.id.clone());

            let Some(transition_id) = next else {
                break;
            };
            let mut params = net.enabled_parameters_for(&self.marking, &transition_id);
            let Some(consume) = (!params.is_empty()).then(|| params.remove(0)) else {
                break;
            };
            created.push(self.reserve_job(
                transition_id,
                consume,
                serde_json::Value::Null,
                None,
            ));
        }
        created
    }

    /// Rewrite the failure strategy of a failed job (operator override)
    ///
    /// Returns `false` if the job does not exist or never failed. This is an
    /// in-memory mutation only: the journaled failure keeps its original
    /// strategy, a replay restores it, and the override must be re-issued
    /// after a restart.
    pub fn override_failure_strategy(
        &mut self,
        job_id: JobId,
        strategy: crate::event::FailureStrategy,
    ) -> bool {
        match self.jobs.get_mut(&job_id).and_then(|j| j.failure.as_mut()) {
            Some(failure) => {
                failure.strategy = strategy;
                true
            }
            None => false,
        }
    }

    /// Fold one event into the snapshot
    ///
    /// Total for structurally valid events; an error means the event should
    /// never have been journaled.
    pub fn apply(
        &mut self,
        event: &InstanceEvent,
        reducer: &dyn StateReducer,
    ) -> Result<(), ApplyError> {
        match event {
            InstanceEvent::Initialized { marking, state } => {
                if self.sequence_nr != 0 {
                    return Err(ApplyError::AlreadyInitialized(self.sequence_nr));
                }
                self.marking = marking.clone();
                self.state = state.clone();
            }

            InstanceEvent::TransitionFired {
                job_id,
                correlation_id,
                consumed,
                produced,
                output,
                ..
            } => {
                if self.sequence_nr == 0 {
                    return Err(ApplyError::NotInitialized);
                }
                if self.jobs.remove(job_id).is_none() {
                    // Replay path: the live reservation never happened here.
                    self.marking = self.marking.subtract(consumed)?;
                }
                self.marking.merge(produced);
                if let Some(corr) = correlation_id {
                    self.received_correlation_ids.insert(corr.clone());
                }
                if let Some(output) = output {
                    let state = std::mem::take(&mut self.state);
                    self.state = reducer.reduce(state, output);
                }
                self.next_job_id = self.next_job_id.max(job_id + 1);
            }

            InstanceEvent::TransitionFailed {
                job_id,
                transition_id,
                correlation_id,
                started_at,
                failed_at,
                consumed,
                input,
                reason,
                strategy,
            } => {
                if self.sequence_nr == 0 {
                    return Err(ApplyError::NotInitialized);
                }
                let failure_count = self.jobs.get(job_id).map(Job::failure_count).unwrap_or(0) + 1;
                let failure = JobFailure {
                    failure_count,
                    failure_time: *failed_at,
                    reason: reason.clone(),
                    strategy: strategy.clone(),
                };
                match self.jobs.get_mut(job_id) {
                    Some(job) => job.failure = Some(failure),
                    None => {
                        // Replay path: re-create the job and its reservation.
                        self.marking = self.marking.subtract(consumed)?;
                        self.jobs.insert(
                            *job_id,
                            Job {
                                id: *job_id,
                                correlation_id: correlation_id.clone(),
                                transition_id: transition_id.clone(),
                                consume: consumed.clone(),
                                input: input.clone(),
                                started_at: *started_at,
                                failure: Some(failure),
                            },
                        );
                    }
                }
                self.next_job_id = self.next_job_id.max(job_id + 1);
            }
        }

        self.sequence_nr += 1;
        Ok(())
    }

    fn reserve_job(
        &mut self,
        transition_id: TransitionId,
        consume: Marking,
        input: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Job {
        // `consume` came out of `enabled_parameters_for`, so it is covered.
        if let Ok(rest) = self.marking.subtract(&consume) {
            self.marking = rest;
        }
        let job = Job {
            id: self.next_job_id,
            correlation_id,
            transition_id,
            consume,
            input,
            started_at: Utc::now(),
            failure: None,
        };
        self.next_job_id += 1;
        self.jobs.insert(job.id, job.clone());
        job
    }
}
