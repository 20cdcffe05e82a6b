//! The event journal: the consumed persistence interface
//!
//! An append-only log keyed by persistence id. The engine journals every
//! event through [`EventJournal::append`] before applying it to in-memory
//! state or replying to a caller; recovery replays the log in sequence
//! order. Implementations must serialize writes per persistence id.

mod memory;

use async_trait::async_trait;

use crate::event::InstanceEvent;

pub use memory::InMemoryJournal;

/// The persistence key for one process instance
pub fn persistence_id(process_type: &str, process_id: &str) -> String {
    format!("process-{process_type}-{process_id}")
}

/// Error type for journal operations
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The expected sequence number did not match the journal's
    #[error("sequence conflict: expected {expected}, actual {actual}")]
    SequenceConflict { expected: u64, actual: u64 },

    /// An event failed to (de)serialize
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store failed
    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-only event log, one stream per persistence id
///
/// `append` is gated on the caller's expected sequence number so a restarted
/// or duplicated writer cannot interleave: the journal is the serialization
/// point for an instance's history.
#[async_trait]
pub trait EventJournal: Send + Sync + 'static {
    /// Append one event, expecting the stream to be at `expected_sequence_nr`
    ///
    /// Returns the new highest sequence number (`expected_sequence_nr + 1`).
    async fn append(
        &self,
        persistence_id: &str,
        expected_sequence_nr: u64,
        event: &InstanceEvent,
    ) -> Result<u64, JournalError>;

    /// All events of a stream in sequence order (empty for unknown ids)
    async fn replay(&self, persistence_id: &str) -> Result<Vec<(u64, InstanceEvent)>, JournalError>;

    /// Delete events with sequence number up to and including `sequence_nr`
    ///
    /// A partial delete keeps the sequence numbering; deleting the entire
    /// stream removes it, so a later writer starts fresh at zero.
    async fn delete_up_to(&self, persistence_id: &str, sequence_nr: u64)
        -> Result<(), JournalError>;

    /// The highest sequence number of a stream (0 for unknown ids)
    async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<u64, JournalError>;
}
