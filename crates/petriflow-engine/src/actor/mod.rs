//! The process instance actor
//!
//! One instance = one mailbox = one logical thread. All state transitions
//! happen in mailbox order inside a single tokio task; transition handlers
//! and timers run elsewhere and only ever talk back through messages.
//!
//! Persistence gating: a command that produces an event journals it first.
//! The mailbox is not polled while an append is in flight, so state-mutating
//! commands are deferred until the journal confirms, and neither a reply nor
//! an in-memory mutation can precede the commit. A journal failure stops the
//! actor without applying anything; a restart replays the committed prefix.

mod protocol;

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use petriflow_net::PetriNet;
use petriflow_net::TransitionId;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::event::{FailureStrategy, InstanceEvent};
use crate::instance::{ApplyError, Instance, Job, JobId, JobRejection};
use crate::journal::{persistence_id, EventJournal, JournalError};
use crate::runtime::{HandlerError, JobContext, ProcessRuntime};
use crate::scheduler::RetryScheduler;

pub use protocol::{InitializeReply, InstanceState, StateReply, TransitionResponse};

use protocol::{Command, Msg, Responder};

/// Configuration of one process instance
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Process type, part of the persistence id
    pub process_type: String,

    /// Process id, part of the persistence id
    pub process_id: String,

    /// If set, the actor stops itself after being idle (no enabled automated
    /// work, no active jobs) for this long
    pub idle_ttl: Option<Duration>,
}

impl InstanceConfig {
    /// Configuration with no idle TTL
    pub fn new(process_type: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            process_type: process_type.into(),
            process_id: process_id.into(),
            idle_ttl: None,
        }
    }

    /// Stop the actor after this long without work
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = Some(ttl);
        self
    }

    /// The journal key of this instance
    pub fn persistence_id(&self) -> String {
        persistence_id(&self.process_type, &self.process_id)
    }
}

/// Error from `spawn`: the journaled history could not be replayed
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The journal failed
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// The first journaled event is not an initialization event
    #[error("first journaled event is not an initialization event")]
    FirstEventNotInitialized,

    /// A journaled event references a transition the net does not know
    #[error("journaled event references unknown transition: {0}")]
    UnknownTransition(TransitionId),

    /// A journaled event failed to apply
    #[error("corrupt journal: {0}")]
    Corrupt(#[from] ApplyError),
}

/// Error from handle methods: the actor is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// The instance actor has stopped; commands can no longer be delivered
    #[error("process instance stopped")]
    Stopped,
}

/// The state-owning actor behind a [`ProcessInstanceHandle`]
///
/// Spawn with [`ProcessInstance::spawn`]; interact through the handle. The
/// actor stops on `Stop`, on idle-TTL expiry, on any command while
/// uninitialized, or on an infrastructure failure.
pub struct ProcessInstance {
    config: InstanceConfig,
    persistence_id: String,
    net: Arc<PetriNet>,
    runtime: Arc<ProcessRuntime>,
    journal: Arc<dyn EventJournal>,

    /// `None` while uninitialized
    instance: Option<Instance>,

    /// Reply channels of in-flight jobs, kept across retries
    responders: HashMap<JobId, Responder>,

    retries: RetryScheduler<Msg>,
    tx: mpsc::UnboundedSender<Msg>,
}

impl ProcessInstance {
    /// Replay the journal, rebuild the instance and start the actor
    ///
    /// Recovery is deterministic and journals nothing: the event fold
    /// rebuilds the marking, state and job table; failed jobs that were
    /// retrying are re-armed relative to their original failure time
    /// (overdue retries execute immediately). With an empty journal the
    /// actor starts uninitialized and waits for `Initialize`.
    #[instrument(
        skip_all,
        fields(process_type = %config.process_type, process_id = %config.process_id)
    )]
    pub async fn spawn(
        config: InstanceConfig,
        net: Arc<PetriNet>,
        runtime: Arc<ProcessRuntime>,
        journal: Arc<dyn EventJournal>,
    ) -> Result<ProcessInstanceHandle, RecoveryError> {
        let persistence_id = config.persistence_id();
        let events = journal.replay(&persistence_id).await?;

        let instance = if events.is_empty() {
            None
        } else {
            if !matches!(events[0].1, InstanceEvent::Initialized { .. }) {
                return Err(RecoveryError::FirstEventNotInitialized);
            }
            let mut instance = Instance::new(config.process_id.clone());
            for (_, event) in &events {
                if let Some(t) = event.transition_id() {
                    if net.transition(t).is_none() {
                        return Err(RecoveryError::UnknownTransition(t.clone()));
                    }
                }
                instance.apply(event, runtime.reducer())?;
            }
            info!(
                sequence_nr = instance.sequence_nr,
                jobs = instance.jobs.len(),
                "recovered instance from journal"
            );
            Some(instance)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ProcessInstanceHandle {
            tx: tx.clone(),
            process_id: config.process_id.clone(),
        };
        let recovered = instance.is_some();
        let actor = ProcessInstance {
            config,
            persistence_id,
            net,
            runtime,
            journal,
            instance,
            responders: HashMap::new(),
            retries: RetryScheduler::new(tx.clone()),
            tx,
        };
        tokio::spawn(actor.run(rx, recovered));
        Ok(handle)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>, recovered: bool) {
        if recovered {
            self.schedule_recovered_retries();
            self.step();
        }

        while let Some(msg) = rx.recv().await {
            let flow = if self.instance.is_some() {
                self.handle_running(msg).await
            } else {
                self.handle_uninitialized(msg).await
            };
            if flow.is_break() {
                break;
            }
        }

        self.retries.cancel_all();
        debug!(process_id = %self.config.process_id, "process instance stopped");
    }

    // =========================================================================
    // Uninitialized state
    // =========================================================================

    async fn handle_uninitialized(&mut self, msg: Msg) -> ControlFlow<()> {
        match msg {
            Msg::Command(Command::Initialize {
                marking,
                state,
                reply,
            }) => {
                let event = InstanceEvent::Initialized { marking, state };
                if let Err(e) = self.journal.append(&self.persistence_id, 0, &event).await {
                    error!(error = %e, "journal append failed; stopping instance");
                    return ControlFlow::Break(());
                }

                let mut instance = Instance::new(self.config.process_id.clone());
                if let Err(e) = instance.apply(&event, self.runtime.reducer()) {
                    error!(error = %e, "failed to apply initialization event");
                    return ControlFlow::Break(());
                }
                let sequence_nr = instance.sequence_nr;
                self.instance = Some(instance);

                info!(sequence_nr, "instance initialized");
                let _ = reply.send(InitializeReply::Initialized { sequence_nr });
                self.step();
                ControlFlow::Continue(())
            }

            // Any other command means the caller expected an existing
            // instance; report that and let the actor wind down.
            Msg::Command(Command::FireTransition { reply, .. })
            | Msg::Command(Command::OverrideFailure { reply, .. }) => {
                let _ = reply.send(TransitionResponse::Uninitialized {
                    process_id: self.config.process_id.clone(),
                });
                ControlFlow::Break(())
            }
            Msg::Command(Command::GetState { reply }) => {
                let _ = reply.send(StateReply::Uninitialized {
                    process_id: self.config.process_id.clone(),
                });
                ControlFlow::Break(())
            }
            Msg::Command(Command::Stop { .. }) => ControlFlow::Break(()),

            // Internal messages cannot precede initialization.
            Msg::JobResult { .. } | Msg::RetryDue { .. } | Msg::IdleStop { .. } => {
                warn!("internal message before initialization; ignoring");
                ControlFlow::Continue(())
            }
        }
    }

    // =========================================================================
    // Running state
    // =========================================================================

    async fn handle_running(&mut self, msg: Msg) -> ControlFlow<()> {
        match msg {
            Msg::Command(Command::Initialize { reply, .. }) => {
                let _ = reply.send(InitializeReply::AlreadyInitialized);
                ControlFlow::Continue(())
            }

            Msg::Command(Command::FireTransition {
                transition_id,
                input,
                correlation_id,
                reply,
            }) => {
                self.handle_fire(transition_id, input, correlation_id, reply);
                ControlFlow::Continue(())
            }

            Msg::Command(Command::GetState { reply }) => {
                if let Some(instance) = self.instance.as_ref() {
                    let _ = reply.send(StateReply::State(InstanceState {
                        sequence_nr: instance.sequence_nr,
                        marking: instance.marking.clone(),
                        state: instance.state.clone(),
                        jobs: instance.jobs.values().cloned().collect(),
                    }));
                }
                ControlFlow::Continue(())
            }

            Msg::Command(Command::OverrideFailure {
                job_id,
                strategy,
                reply,
            }) => self.handle_override(job_id, strategy, reply).await,

            Msg::Command(Command::Stop { delete_history }) => {
                self.retries.cancel_all();
                if delete_history {
                    let sequence_nr = self
                        .instance
                        .as_ref()
                        .map(|i| i.sequence_nr)
                        .unwrap_or_default();
                    match self
                        .journal
                        .delete_up_to(&self.persistence_id, sequence_nr)
                        .await
                    {
                        Ok(()) => info!(sequence_nr, "journal history deleted"),
                        Err(e) => error!(error = %e, "journal deletion failed"),
                    }
                }
                ControlFlow::Break(())
            }

            Msg::JobResult { event } => self.ingest_event(event).await,

            Msg::RetryDue { job_id } => {
                self.retries.forget(job_id);
                let job = self
                    .instance
                    .as_ref()
                    .and_then(|i| i.jobs.get(&job_id))
                    .filter(|j| j.is_active())
                    .cloned();
                match job {
                    Some(job) => self.execute_job(job),
                    None => debug!(job_id, "stale retry timer; job no longer active"),
                }
                ControlFlow::Continue(())
            }

            Msg::IdleStop { sequence_nr } => {
                let idle = self.instance.as_ref().is_some_and(|i| {
                    i.sequence_nr == sequence_nr && !i.has_active_jobs()
                });
                if idle {
                    info!(sequence_nr, "idle TTL expired; stopping instance");
                    ControlFlow::Break(())
                } else {
                    debug!(sequence_nr, "stale idle-stop timer; instance advanced");
                    ControlFlow::Continue(())
                }
            }
        }
    }

    fn handle_fire(
        &mut self,
        transition_id: TransitionId,
        input: serde_json::Value,
        correlation_id: Option<String>,
        reply: Responder,
    ) {
        let net = Arc::clone(&self.net);
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        match instance.create_job(&net, transition_id, input, correlation_id) {
            Ok(job) => {
                self.responders.insert(job.id, reply);
                self.execute_job(job);
            }
            Err(JobRejection::AlreadyReceived(correlation_id)) => {
                let _ = reply.send(TransitionResponse::AlreadyReceived { correlation_id });
            }
            Err(JobRejection::TransitionNotFound(transition_id)) => {
                let _ = reply.send(TransitionResponse::NotEnabled {
                    transition_id,
                    reason: "unknown transition".to_string(),
                });
            }
            Err(JobRejection::NotEnabled {
                transition_id,
                reason,
            }) => {
                let _ = reply.send(TransitionResponse::NotEnabled {
                    transition_id,
                    reason,
                });
            }
        }
    }

    /// Apply the override admissibility table
    ///
    /// | new strategy     | admissible when  | action                        |
    /// |------------------|------------------|-------------------------------|
    /// | retry with delay | blocked          | re-arm (inline when zero)     |
    /// | continue         | blocked          | synthesize a fired event      |
    /// | block            | retry pending    | cancel timer, journal a block |
    async fn handle_override(
        &mut self,
        job_id: JobId,
        strategy: FailureStrategy,
        reply: Responder,
    ) -> ControlFlow<()> {
        let job = self
            .instance
            .as_ref()
            .and_then(|i| i.jobs.get(&job_id))
            .cloned();
        let Some(job) = job else {
            let _ = reply.send(TransitionResponse::InvalidCommand {
                reason: format!("no job with id {job_id}"),
            });
            return ControlFlow::Continue(());
        };
        let current = job.failure.clone();

        match (strategy, current) {
            (FailureStrategy::RetryWithDelay { delay }, Some(failure))
                if failure.strategy.blocks() =>
            {
                info!(job_id, ?delay, "override: blocked job switched to retry");
                if let Some(instance) = self.instance.as_mut() {
                    instance.override_failure_strategy(
                        job_id,
                        FailureStrategy::RetryWithDelay { delay },
                    );
                }
                self.responders.insert(job_id, reply);
                if delay.is_zero() {
                    self.execute_job(job);
                } else {
                    self.retries.schedule(job_id, delay, Msg::RetryDue { job_id });
                }
                ControlFlow::Continue(())
            }

            (FailureStrategy::Continue { produced, output }, Some(failure))
                if failure.strategy.blocks() =>
            {
                if produced.multiplicities() != *self.net.output_weights(&job.transition_id) {
                    let _ = reply.send(TransitionResponse::InvalidCommand {
                        reason: "Invalid marking provided".to_string(),
                    });
                    return ControlFlow::Continue(());
                }
                info!(job_id, "override: blocked job resolved by continue");
                let fired = InstanceEvent::TransitionFired {
                    job_id,
                    transition_id: job.transition_id.clone(),
                    correlation_id: job.correlation_id.clone(),
                    started_at: job.started_at,
                    completed_at: Utc::now(),
                    consumed: job.consume.clone(),
                    produced,
                    output,
                };
                self.responders.insert(job_id, reply);
                self.ingest_event(fired).await
            }

            (FailureStrategy::BlockTransition, Some(failure))
                if failure.strategy.retries() =>
            {
                // Only act if the pending retry was actually prevented.
                if self.retries.cancel(job_id) {
                    info!(job_id, "override: pending retry cancelled, blocking job");
                    let failed = InstanceEvent::TransitionFailed {
                        job_id,
                        transition_id: job.transition_id.clone(),
                        correlation_id: job.correlation_id.clone(),
                        started_at: job.started_at,
                        failed_at: Utc::now(),
                        consumed: job.consume.clone(),
                        input: job.input.clone(),
                        reason: failure.reason.clone(),
                        strategy: FailureStrategy::BlockTransition,
                    };
                    self.responders.insert(job_id, reply);
                    self.ingest_event(failed).await
                } else {
                    let _ = reply.send(TransitionResponse::InvalidCommand {
                        reason: "retry is no longer pending".to_string(),
                    });
                    ControlFlow::Continue(())
                }
            }

            _ => {
                let _ = reply.send(TransitionResponse::InvalidCommand {
                    reason: "override not admissible for the job's current state".to_string(),
                });
                ControlFlow::Continue(())
            }
        }
    }

    // =========================================================================
    // Event ingestion (journal, apply, reply, iterate)
    // =========================================================================

    /// Journal and apply one transition event, reply to the job's responder,
    /// then iterate
    ///
    /// A failed event with a `Continue` strategy loops back as a synthesized
    /// fired event through this same path, so it shares the journal-first
    /// gating and the reply ordering of an ordinary firing.
    async fn ingest_event(&mut self, event: InstanceEvent) -> ControlFlow<()> {
        let mut event = self.validate_strategy(event);

        loop {
            let Some(instance) = self.instance.as_mut() else {
                return ControlFlow::Continue(());
            };

            if let Err(e) = self
                .journal
                .append(&self.persistence_id, instance.sequence_nr, &event)
                .await
            {
                error!(error = %e, "journal append failed; stopping instance");
                return ControlFlow::Break(());
            }
            if let Err(e) = instance.apply(&event, self.runtime.reducer()) {
                error!(error = %e, "journaled event failed to apply; stopping instance");
                return ControlFlow::Break(());
            }
            let sequence_nr = instance.sequence_nr;

            match event {
                InstanceEvent::TransitionFired {
                    job_id,
                    transition_id,
                    correlation_id,
                    consumed,
                    produced,
                    output,
                    ..
                } => {
                    debug!(job_id, %transition_id, sequence_nr, "transition fired");
                    self.retries.cancel(job_id);
                    if let Some(responder) = self.responders.remove(&job_id) {
                        let _ = responder.send(TransitionResponse::Fired {
                            job_id,
                            transition_id,
                            correlation_id,
                            consumed,
                            produced,
                            output,
                            sequence_nr,
                        });
                    }
                    self.step();
                    return ControlFlow::Continue(());
                }

                InstanceEvent::TransitionFailed {
                    job_id,
                    transition_id,
                    correlation_id,
                    started_at,
                    consumed,
                    reason,
                    strategy,
                    ..
                } => match strategy {
                    FailureStrategy::RetryWithDelay { delay } => {
                        warn!(job_id, %transition_id, %reason, ?delay, "transition failed; retrying");
                        if let Some(responder) = self.responders.get(&job_id) {
                            let _ = responder.send(TransitionResponse::Failed {
                                job_id,
                                transition_id,
                                reason,
                                strategy: FailureStrategy::RetryWithDelay { delay },
                                sequence_nr,
                            });
                        }
                        if delay.is_zero() {
                            let job = self
                                .instance
                                .as_ref()
                                .and_then(|i| i.jobs.get(&job_id))
                                .cloned();
                            if let Some(job) = job {
                                self.execute_job(job);
                            }
                        } else {
                            self.retries.schedule(job_id, delay, Msg::RetryDue { job_id });
                        }
                        return ControlFlow::Continue(());
                    }

                    FailureStrategy::Continue { produced, output } => {
                        warn!(job_id, %transition_id, %reason, "transition failed; continuing as fired");
                        event = InstanceEvent::TransitionFired {
                            job_id,
                            transition_id,
                            correlation_id,
                            started_at,
                            completed_at: Utc::now(),
                            consumed,
                            produced,
                            output,
                        };
                        // Loop: journal and apply the synthesized firing.
                    }

                    FailureStrategy::BlockTransition => {
                        warn!(job_id, %transition_id, %reason, "transition failed; blocked");
                        self.retries.cancel(job_id);
                        if let Some(responder) = self.responders.remove(&job_id) {
                            let _ = responder.send(TransitionResponse::Failed {
                                job_id,
                                transition_id,
                                reason,
                                strategy: FailureStrategy::BlockTransition,
                                sequence_nr,
                            });
                        }
                        return ControlFlow::Continue(());
                    }
                },

                InstanceEvent::Initialized { .. } => {
                    warn!("unexpected initialization event from executor; ignoring");
                    return ControlFlow::Continue(());
                }
            }
        }
    }

    /// Structural validation before journaling: a policy-supplied `Continue`
    /// whose produced marking does not match the transition's output arcs is
    /// downgraded to a block (operator overrides get `InvalidCommand`
    /// instead, before reaching this path).
    fn validate_strategy(&self, event: InstanceEvent) -> InstanceEvent {
        match event {
            InstanceEvent::TransitionFailed {
                job_id,
                transition_id,
                correlation_id,
                started_at,
                failed_at,
                consumed,
                input,
                reason,
                strategy: FailureStrategy::Continue { produced, output },
            } => {
                let strategy = if produced.multiplicities()
                    == *self.net.output_weights(&transition_id)
                {
                    FailureStrategy::Continue { produced, output }
                } else {
                    warn!(
                        job_id,
                        %transition_id,
                        "continue strategy produced an invalid marking; blocking instead"
                    );
                    FailureStrategy::BlockTransition
                };
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
                }
            }
            other => other,
        }
    }

    // =========================================================================
    // Job execution and iteration
    // =========================================================================

    /// Create jobs for every enabled automated transition and dispatch them;
    /// arm the idle-stop timer when there is nothing left to do
    fn step(&mut self) {
        let net = Arc::clone(&self.net);
        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        let new_jobs = instance.all_enabled_jobs(&net);
        let sequence_nr = instance.sequence_nr;
        let idle = new_jobs.is_empty() && !instance.has_active_jobs();

        for job in new_jobs {
            self.execute_job(job);
        }

        if idle {
            if let Some(ttl) = self.config.idle_ttl {
                debug!(?ttl, sequence_nr, "instance idle; arming idle-stop timer");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(ttl).await;
                    let _ = tx.send(Msg::IdleStop { sequence_nr });
                });
            }
        }
    }

    /// Run a job's handler off the mailbox thread; the result re-enters the
    /// mailbox as a `JobResult` message
    fn execute_job(&self, job: Job) {
        let attempt = job.failure_count() + 1;
        debug!(job_id = job.id, transition_id = %job.transition_id, attempt, "executing job");

        let net = Arc::clone(&self.net);
        let runtime = Arc::clone(&self.runtime);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = run_job(net, runtime, job, attempt).await;
            let _ = tx.send(Msg::JobResult { event });
        });
    }

    /// Re-arm retry timers for jobs recovered in a retrying state
    fn schedule_recovered_retries(&mut self) {
        let Some(instance) = self.instance.as_ref() else {
            return;
        };

        let mut overdue = Vec::new();
        let mut pending = Vec::new();
        for job in instance.jobs.values() {
            let Some(failure) = &job.failure else {
                continue;
            };
            let FailureStrategy::RetryWithDelay { delay } = &failure.strategy else {
                continue;
            };
            let fire_at = failure.failure_time
                + chrono::Duration::from_std(*delay).unwrap_or_else(|_| chrono::Duration::zero());
            let remaining = fire_at - Utc::now();
            match remaining.to_std() {
                Ok(remaining) if !remaining.is_zero() => pending.push((job.id, remaining)),
                _ => overdue.push(job.clone()),
            }
        }

        for job in overdue {
            info!(job_id = job.id, "recovered retry overdue; executing now");
            self.execute_job(job);
        }
        for (job_id, delay) in pending {
            info!(job_id, ?delay, "recovered retry re-armed");
            self.retries.schedule(job_id, delay, Msg::RetryDue { job_id });
        }
    }
}

/// Build the fired or failed event for one job attempt
async fn run_job(
    net: Arc<PetriNet>,
    runtime: Arc<ProcessRuntime>,
    job: Job,
    attempt: u32,
) -> InstanceEvent {
    let started_at = Utc::now();

    let result = match runtime.handler(&job.transition_id) {
        Some(handler) => {
            let ctx = JobContext {
                job_id: job.id,
                transition_id: job.transition_id.clone(),
                input: job.input.clone(),
                consumed: job.consume.clone(),
                attempt,
            };
            // Run the handler in its own task so a panic becomes a failure
            // message instead of tearing anything down.
            match tokio::spawn(async move { handler.fire(&ctx).await }).await {
                Ok(result) => result,
                Err(join_error) => Err(HandlerError::fatal(format!(
                    "transition handler panicked: {join_error}"
                ))),
            }
        }
        None => Err(HandlerError::fatal(format!(
            "no handler registered for transition {}",
            job.transition_id
        ))),
    };

    match result {
        Ok(output) => {
            let produced = net.produced_marking(&job.transition_id, Some(&output));
            InstanceEvent::TransitionFired {
                job_id: job.id,
                transition_id: job.transition_id.clone(),
                correlation_id: job.correlation_id.clone(),
                started_at,
                completed_at: Utc::now(),
                consumed: job.consume.clone(),
                produced,
                output: Some(output),
            }
        }
        Err(error) => {
            let strategy = runtime.decide_failure(&job, attempt, &error);
            InstanceEvent::TransitionFailed {
                job_id: job.id,
                transition_id: job.transition_id.clone(),
                correlation_id: job.correlation_id.clone(),
                started_at,
                failed_at: Utc::now(),
                consumed: job.consume.clone(),
                input: job.input.clone(),
                reason: error.message,
                strategy,
            }
        }
    }
}

/// Cloneable command surface of a running [`ProcessInstance`]
#[derive(Debug, Clone)]
pub struct ProcessInstanceHandle {
    tx: mpsc::UnboundedSender<Msg>,
    process_id: String,
}

impl ProcessInstanceHandle {
    /// The process id this handle commands
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Initialize the instance with a marking and user state
    ///
    /// Replies only after the initialization event is journaled.
    pub async fn initialize(
        &self,
        marking: petriflow_net::Marking,
        state: serde_json::Value,
    ) -> Result<InitializeReply, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::Command(Command::Initialize {
            marking,
            state,
            reply,
        }))?;
        rx.await.map_err(|_| ActorError::Stopped)
    }

    /// Fire a transition; returns the response channel
    ///
    /// The first response arrives only after the corresponding event is
    /// journaled. A retrying job responds `Failed` first, then `Fired` when
    /// a later attempt succeeds, on the same channel.
    pub fn fire_transition(
        &self,
        transition_id: impl Into<TransitionId>,
        input: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<mpsc::UnboundedReceiver<TransitionResponse>, ActorError> {
        let (reply, rx) = mpsc::unbounded_channel();
        self.send(Msg::Command(Command::FireTransition {
            transition_id: transition_id.into(),
            input,
            correlation_id,
            reply,
        }))?;
        Ok(rx)
    }

    /// Fire a transition and wait for the first response
    pub async fn fire_transition_and_wait(
        &self,
        transition_id: impl Into<TransitionId>,
        input: serde_json::Value,
        correlation_id: Option<String>,
    ) -> Result<TransitionResponse, ActorError> {
        let mut rx = self.fire_transition(transition_id, input, correlation_id)?;
        rx.recv().await.ok_or(ActorError::Stopped)
    }

    /// Current projection of the instance
    pub async fn get_state(&self) -> Result<StateReply, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::Command(Command::GetState { reply }))?;
        rx.await.map_err(|_| ActorError::Stopped)
    }

    /// Override the failure strategy of a failed job; returns the response
    /// channel
    ///
    /// Success is the resulting `Fired`/`Failed` response; an inadmissible
    /// override responds `InvalidCommand` without mutating anything.
    pub fn override_failure(
        &self,
        job_id: JobId,
        strategy: FailureStrategy,
    ) -> Result<mpsc::UnboundedReceiver<TransitionResponse>, ActorError> {
        let (reply, rx) = mpsc::unbounded_channel();
        self.send(Msg::Command(Command::OverrideFailure {
            job_id,
            strategy,
            reply,
        }))?;
        Ok(rx)
    }

    /// Override and wait for the first response
    pub async fn override_failure_and_wait(
        &self,
        job_id: JobId,
        strategy: FailureStrategy,
    ) -> Result<TransitionResponse, ActorError> {
        let mut rx = self.override_failure(job_id, strategy)?;
        rx.recv().await.ok_or(ActorError::Stopped)
    }

    /// Stop the actor, optionally deleting the journaled history first
    ///
    /// No reply; await [`stopped`](Self::stopped) to observe termination.
    pub fn stop(&self, delete_history: bool) -> Result<(), ActorError> {
        self.send(Msg::Command(Command::Stop { delete_history }))
    }

    /// Resolves once the actor has terminated
    pub async fn stopped(&self) {
        self.tx.closed().await
    }

    fn send(&self, msg: Msg) -> Result<(), ActorError> {
        self.tx.send(msg).map_err(|_| ActorError::Stopped)
    }
}
