//! # Process instance engine
//!
//! A persistent, event-sourced runtime for one colored Petri-net process
//! instance: fires transitions when their input marking is satisfied,
//! journals every state change before it becomes observable, recovers
//! deterministically by replaying the journal, and orchestrates
//! block/retry/continue handling for failing transitions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ProcessInstance                          │
//! │  (single-threaded mailbox: commands, job results, timers)   │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ EventJournal │   │  ProcessRuntime  │   │  RetryScheduler  │
//! │ (append-only │   │ (handlers,       │   │ (cancellable     │
//! │  log, replay)│   │  failure policy, │   │  one-shot timers)│
//! │              │   │  state reducer)  │   │                  │
//! └──────────────┘   └──────────────────┘   └──────────────────┘
//! ```
//!
//! Transition handlers run on the tokio pool, never on the mailbox thread;
//! they communicate only by returning a value, which the actor turns into a
//! journaled [`InstanceEvent`]. The pure net model lives in [`petriflow_net`].
//!
//! ## Example
//!
//! ```ignore
//! use petriflow_engine::prelude::*;
//!
//! let net = Arc::new(
//!     PetriNet::builder()
//!         .place(Place::new("a"))
//!         .place(Place::new("b"))
//!         .transition(Transition::new("move"))
//!         .input_arc("a", "move", 1)
//!         .output_arc("move", "b", 1)
//!         .build()?,
//! );
//!
//! let runtime = Arc::new(ProcessRuntime::new().with_handler_fn("move", |job| async move {
//!     Ok(serde_json::json!({ "moved": true }))
//! }));
//!
//! let journal = Arc::new(InMemoryJournal::new());
//! let handle = ProcessInstance::spawn(
//!     InstanceConfig::new("demo", "instance-1"),
//!     net,
//!     runtime,
//!     journal,
//! )
//! .await?;
//!
//! handle.initialize(Marking::new().with_token("a", json!(1)), json!({})).await?;
//! let response = handle.fire_transition_and_wait("move", json!(null), None).await?;
//! ```

pub mod actor;
pub mod event;
pub mod instance;
pub mod journal;
pub mod runtime;
pub mod scheduler;

/// Prelude for common imports
pub mod prelude {
    pub use crate::actor::{
        ActorError, InitializeReply, InstanceConfig, InstanceState, ProcessInstance,
        ProcessInstanceHandle, RecoveryError, StateReply, TransitionResponse,
    };
    pub use crate::event::{FailureStrategy, InstanceEvent};
    pub use crate::instance::{Instance, Job, JobFailure, JobId, JobRejection};
    pub use crate::journal::{EventJournal, InMemoryJournal, JournalError};
    pub use crate::runtime::{
        BackoffPolicy, BlockPolicy, FailurePolicy, HandlerError, HandlerRegistry, JobContext,
        MergeReducer, NullReducer, ProcessRuntime, StateReducer, TransitionHandler,
    };
    pub use petriflow_net::{
        Marking, PetriNet, Place, PlaceId, Token, TokenSet, Transition, TransitionId,
    };
}

// Re-export key types at crate root
pub use actor::{
    ActorError, InitializeReply, InstanceConfig, InstanceState, ProcessInstance,
    ProcessInstanceHandle, RecoveryError, StateReply, TransitionResponse,
};
pub use event::{FailureStrategy, InstanceEvent};
pub use instance::{Instance, Job, JobFailure, JobId, JobRejection};
pub use journal::{EventJournal, InMemoryJournal, JournalError};
pub use runtime::{
    BackoffPolicy, BlockPolicy, FailurePolicy, HandlerError, HandlerRegistry, JobContext,
    MergeReducer, NullReducer, ProcessRuntime, StateReducer, TransitionHandler,
};
