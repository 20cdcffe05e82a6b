//! Transition handlers: the user-supplied interaction code

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use petriflow_net::{Marking, TransitionId};
use serde::{Deserialize, Serialize};

use crate::instance::JobId;

/// Error type for transition handler failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerError {
    /// Error message, recorded in the failed event
    pub message: String,

    /// Whether the failure policy may retry this failure
    ///
    /// Non-retryable failures block the transition regardless of the
    /// configured policy.
    pub retryable: bool,
}

impl HandlerError {
    /// Create a retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

/// Everything a handler may inspect about the job it is firing
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job identifier
    pub job_id: JobId,

    /// The transition being fired
    pub transition_id: TransitionId,

    /// User input from the fire request (`null` for automated firings)
    pub input: serde_json::Value,

    /// The tokens this firing consumes
    pub consumed: Marking,

    /// Attempt number, 1-based
    pub attempt: u32,
}

/// A transition's effectful interaction code
///
/// Handlers run on the tokio pool, never on the instance's mailbox thread,
/// and must not touch instance state: they communicate only through their
/// return value. The returned output is folded into the user state and
/// placed on the transition's output arcs as the produced token color.
///
/// # Errors
///
/// Return [`HandlerError::retryable`] for transient failures the failure
/// policy may retry, [`HandlerError::fatal`] for permanent ones.
#[async_trait]
pub trait TransitionHandler: Send + Sync + 'static {
    /// Fire the transition
    async fn fire(&self, job: &JobContext) -> Result<serde_json::Value, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TransitionHandler for FnHandler<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
{
    async fn fire(&self, job: &JobContext) -> Result<serde_json::Value, HandlerError> {
        (self.0)(job.clone()).await
    }
}

/// Transition id → handler lookup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TransitionId, Arc<dyn TransitionHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a transition
    pub fn register(
        &mut self,
        transition_id: impl Into<TransitionId>,
        handler: impl TransitionHandler,
    ) {
        self.handlers
            .insert(transition_id.into(), Arc::new(handler));
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(&mut self, transition_id: impl Into<TransitionId>, f: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
    {
        self.register(transition_id, FnHandler(f));
    }

    /// Look up the handler for a transition
    pub fn get(&self, transition_id: &TransitionId) -> Option<Arc<dyn TransitionHandler>> {
        self.handlers.get(transition_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> JobContext {
        JobContext {
            job_id: 1,
            transition_id: "t".into(),
            input: json!({"n": 2}),
            consumed: Marking::new(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_register_fn_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("t", |job: JobContext| async move {
            let n = job.input.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!({ "doubled": n * 2 }))
        });

        let handler = registry.get(&"t".into()).expect("handler registered");
        let output = handler.fire(&context()).await.unwrap();
        assert_eq!(output, json!({"doubled": 4}));

        assert!(registry.get(&"missing".into()).is_none());
    }

    #[test]
    fn test_handler_error_constructors() {
        let transient = HandlerError::retryable("timeout");
        assert!(transient.retryable);
        assert_eq!(transient.to_string(), "timeout");

        let fatal = HandlerError::fatal("bad input");
        assert!(!fatal.retryable);
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        let err: HandlerError = anyhow::anyhow!("downstream unavailable").into();
        assert!(err.retryable);
        assert_eq!(err.message, "downstream unavailable");
    }
}
