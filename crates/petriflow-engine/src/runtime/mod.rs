//! The user-supplied runtime policy
//!
//! Everything the engine does not decide itself, loaded at construction
//! time:
//! - [`TransitionHandler`]: the effectful interaction code per transition
//! - [`FailurePolicy`]: block / retry-with-delay / continue decisions
//! - [`StateReducer`]: the pure fold from outputs into accumulated state

mod handler;
mod policy;
mod reducer;

use std::sync::Arc;

use petriflow_net::TransitionId;

use crate::event::FailureStrategy;
use crate::instance::Job;

pub use handler::{HandlerError, HandlerRegistry, JobContext, TransitionHandler};
pub use policy::{BackoffPolicy, BlockPolicy, FailurePolicy};
pub use reducer::{MergeReducer, NullReducer, StateReducer};

/// The runtime policy bundle handed to a process instance at spawn
///
/// Defaults: no handlers, [`BlockPolicy`], [`NullReducer`].
pub struct ProcessRuntime {
    handlers: HandlerRegistry,
    failure_policy: Arc<dyn FailurePolicy>,
    reducer: Arc<dyn StateReducer>,
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRuntime {
    /// A runtime with no handlers, blocking on every failure
    pub fn new() -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            failure_policy: Arc::new(BlockPolicy),
            reducer: Arc::new(NullReducer),
        }
    }

    /// Register a handler for a transition
    pub fn with_handler(
        mut self,
        transition_id: impl Into<TransitionId>,
        handler: impl TransitionHandler,
    ) -> Self {
        self.handlers.register(transition_id, handler);
        self
    }

    /// Register an async closure as a handler
    pub fn with_handler_fn<F, Fut>(mut self, transition_id: impl Into<TransitionId>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, HandlerError>>
            + Send
            + 'static,
    {
        self.handlers.register_fn(transition_id, f);
        self
    }

    /// Replace the whole handler registry
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Set the failure policy
    pub fn with_failure_policy(mut self, policy: impl FailurePolicy) -> Self {
        self.failure_policy = Arc::new(policy);
        self
    }

    /// Set the state reducer
    pub fn with_reducer(mut self, reducer: impl StateReducer) -> Self {
        self.reducer = Arc::new(reducer);
        self
    }

    /// Look up the handler for a transition
    pub fn handler(&self, transition_id: &TransitionId) -> Option<Arc<dyn TransitionHandler>> {
        self.handlers.get(transition_id)
    }

    /// Decide the failure strategy for a failed job
    pub fn decide_failure(
        &self,
        job: &Job,
        failure_count: u32,
        error: &HandlerError,
    ) -> FailureStrategy {
        self.failure_policy.decide(job, failure_count, error)
    }

    /// The state reducer
    pub fn reducer(&self) -> &dyn StateReducer {
        self.reducer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use petriflow_net::Marking;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_default_runtime_blocks() {
        let runtime = ProcessRuntime::new();
        let job = Job {
            id: 1,
            correlation_id: None,
            transition_id: "t".into(),
            consume: Marking::new(),
            input: json!(null),
            started_at: Utc::now(),
            failure: None,
        };

        let strategy = runtime.decide_failure(&job, 1, &HandlerError::retryable("x"));
        assert!(strategy.blocks());
        assert!(runtime.handler(&"t".into()).is_none());
    }

    #[tokio::test]
    async fn test_builder_wires_everything() {
        let runtime = ProcessRuntime::new()
            .with_handler_fn("t", |_job| async { Ok(json!("ok")) })
            .with_failure_policy(BackoffPolicy::fixed(Duration::from_millis(5), 2))
            .with_reducer(MergeReducer);

        let handler = runtime.handler(&"t".into()).expect("handler registered");
        let ctx = JobContext {
            job_id: 1,
            transition_id: "t".into(),
            input: json!(null),
            consumed: Marking::new(),
            attempt: 1,
        };
        assert_eq!(handler.fire(&ctx).await.unwrap(), json!("ok"));

        let merged = runtime.reducer().reduce(json!({"a": 1}), &json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }
}
