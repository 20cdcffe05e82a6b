//! The command/reply protocol consumed by the instance mailbox

use petriflow_net::{Marking, TransitionId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::event::{FailureStrategy, InstanceEvent};
use crate::instance::{Job, JobId};

/// Multi-shot reply channel for fire/override commands
///
/// A single fire request can legitimately answer more than once: a failed
/// attempt with a retry strategy replies `Failed` first and `Fired` when a
/// later attempt succeeds.
pub(crate) type Responder = mpsc::UnboundedSender<TransitionResponse>;

/// Everything that can land in the mailbox
#[derive(Debug)]
pub(crate) enum Msg {
    /// External command
    Command(Command),

    /// A job executor finished; the event has not been journaled yet
    JobResult { event: InstanceEvent },

    /// A retry timer fired for a job
    RetryDue { job_id: JobId },

    /// The idle-TTL timer fired; stale if the instance advanced since
    IdleStop { sequence_nr: u64 },
}

/// External commands
#[derive(Debug)]
pub(crate) enum Command {
    Initialize {
        marking: Marking,
        state: serde_json::Value,
        reply: oneshot::Sender<InitializeReply>,
    },
    FireTransition {
        transition_id: TransitionId,
        input: serde_json::Value,
        correlation_id: Option<String>,
        reply: Responder,
    },
    GetState {
        reply: oneshot::Sender<StateReply>,
    },
    OverrideFailure {
        job_id: JobId,
        strategy: FailureStrategy,
        reply: Responder,
    },
    Stop {
        delete_history: bool,
    },
}

/// Reply to an `Initialize` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeReply {
    /// The instance was created; the initialization event is journaled
    Initialized { sequence_nr: u64 },

    /// The instance already has a journaled history
    AlreadyInitialized,
}

/// Reply to a `GetState` command
#[derive(Debug, Clone, PartialEq)]
pub enum StateReply {
    /// The current projection of the instance
    State(InstanceState),

    /// The instance was never initialized (the actor stops after replying)
    Uninitialized { process_id: String },
}

/// Projection of the live instance returned by `GetState`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceState {
    /// Sequence number of the last applied event
    pub sequence_nr: u64,

    /// Current marking, net of tokens reserved by jobs
    pub marking: Marking,

    /// The user's accumulated state
    pub state: serde_json::Value,

    /// Snapshot of all active and failed-blocked jobs
    pub jobs: Vec<Job>,
}

/// Replies delivered on fire/override channels
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResponse {
    /// The transition fired; the event is journaled
    Fired {
        job_id: JobId,
        transition_id: TransitionId,
        correlation_id: Option<String>,
        consumed: Marking,
        produced: Marking,
        output: Option<serde_json::Value>,
        sequence_nr: u64,
    },

    /// The attempt failed; the event is journaled and `strategy` says what
    /// happens next
    Failed {
        job_id: JobId,
        transition_id: TransitionId,
        reason: String,
        strategy: FailureStrategy,
        sequence_nr: u64,
    },

    /// The fire request was rejected: the transition is not enabled
    NotEnabled {
        transition_id: TransitionId,
        reason: String,
    },

    /// The correlation id was already used
    AlreadyReceived { correlation_id: String },

    /// The instance was never initialized (the actor stops after replying)
    Uninitialized { process_id: String },

    /// The command was not admissible in the instance's current state
    InvalidCommand { reason: String },
}
