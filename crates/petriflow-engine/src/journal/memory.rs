//! In-memory implementation of EventJournal

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::event::InstanceEvent;

use super::{EventJournal, JournalError};

struct Stream {
    /// (sequence_nr, serialized event) in append order
    events: Vec<(u64, String)>,
    highest: u64,
}

/// In-memory implementation of [`EventJournal`]
///
/// Primarily for tests and demos. Events round-trip through their JSON wire
/// format on replay, so this journal exercises the same serialization path a
/// durable backend would.
///
/// # Example
///
/// ```
/// use petriflow_engine::InMemoryJournal;
///
/// let journal = InMemoryJournal::new();
/// ```
#[derive(Default)]
pub struct InMemoryJournal {
    streams: RwLock<HashMap<String, Stream>>,
}

impl InMemoryJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained events in a stream (for tests)
    pub fn event_count(&self, persistence_id: &str) -> usize {
        self.streams
            .read()
            .get(persistence_id)
            .map(|s| s.events.len())
            .unwrap_or(0)
    }

    /// Drop all streams (for tests)
    pub fn clear(&self) {
        self.streams.write().clear();
    }
}

#[async_trait]
impl EventJournal for InMemoryJournal {
    async fn append(
        &self,
        persistence_id: &str,
        expected_sequence_nr: u64,
        event: &InstanceEvent,
    ) -> Result<u64, JournalError> {
        let serialized = serde_json::to_string(event)?;
        let mut streams = self.streams.write();
        let stream = streams
            .entry(persistence_id.to_string())
            .or_insert_with(|| Stream {
                events: vec![],
                highest: 0,
            });

        if stream.highest != expected_sequence_nr {
            return Err(JournalError::SequenceConflict {
                expected: expected_sequence_nr,
                actual: stream.highest,
            });
        }

        stream.highest += 1;
        stream.events.push((stream.highest, serialized));
        Ok(stream.highest)
    }

    async fn replay(
        &self,
        persistence_id: &str,
    ) -> Result<Vec<(u64, InstanceEvent)>, JournalError> {
        let streams = self.streams.read();
        let Some(stream) = streams.get(persistence_id) else {
            return Ok(vec![]);
        };

        stream
            .events
            .iter()
            .map(|(seq, serialized)| {
                let event = serde_json::from_str(serialized)?;
                Ok((*seq, event))
            })
            .collect()
    }

    async fn delete_up_to(
        &self,
        persistence_id: &str,
        sequence_nr: u64,
    ) -> Result<(), JournalError> {
        let mut streams = self.streams.write();
        let Some(stream) = streams.get_mut(persistence_id) else {
            return Ok(());
        };

        stream.events.retain(|(seq, _)| *seq > sequence_nr);
        if stream.events.is_empty() && stream.highest <= sequence_nr {
            // Whole history gone: the stream id can be reused from scratch.
            streams.remove(persistence_id);
        }
        Ok(())
    }

    async fn highest_sequence_nr(&self, persistence_id: &str) -> Result<u64, JournalError> {
        Ok(self
            .streams
            .read()
            .get(persistence_id)
            .map(|s| s.highest)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petriflow_net::Marking;
    use serde_json::json;

    fn init_event() -> InstanceEvent {
        InstanceEvent::Initialized {
            marking: Marking::new().with_token("a", json!(1)),
            state: json!({}),
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let journal = InMemoryJournal::new();

        let seq = journal.append("pid", 0, &init_event()).await.unwrap();
        assert_eq!(seq, 1);

        let replayed = journal.replay("pid").await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, 1);
        assert_eq!(replayed[0].1, init_event());
    }

    #[tokio::test]
    async fn test_sequence_conflict() {
        let journal = InMemoryJournal::new();
        journal.append("pid", 0, &init_event()).await.unwrap();

        let err = journal.append("pid", 0, &init_event()).await.unwrap_err();
        assert!(matches!(
            err,
            JournalError::SequenceConflict {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_replay_unknown_stream_is_empty() {
        let journal = InMemoryJournal::new();
        assert!(journal.replay("nope").await.unwrap().is_empty());
        assert_eq!(journal.highest_sequence_nr("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_delete_keeps_numbering() {
        let journal = InMemoryJournal::new();
        journal.append("pid", 0, &init_event()).await.unwrap();
        journal.append("pid", 1, &init_event()).await.unwrap();

        journal.delete_up_to("pid", 1).await.unwrap();

        let replayed = journal.replay("pid").await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, 2);
        // Numbering continues past the deleted prefix
        assert_eq!(journal.highest_sequence_nr("pid").await.unwrap(), 2);
        let seq = journal.append("pid", 2, &init_event()).await.unwrap();
        assert_eq!(seq, 3);
    }

    #[tokio::test]
    async fn test_full_delete_resets_stream() {
        let journal = InMemoryJournal::new();
        journal.append("pid", 0, &init_event()).await.unwrap();
        journal.append("pid", 1, &init_event()).await.unwrap();

        journal.delete_up_to("pid", 2).await.unwrap();

        assert_eq!(journal.event_count("pid"), 0);
        assert_eq!(journal.highest_sequence_nr("pid").await.unwrap(), 0);
        // A fresh writer can reuse the id from sequence zero
        let seq = journal.append("pid", 0, &init_event()).await.unwrap();
        assert_eq!(seq, 1);
    }

    #[tokio::test]
    async fn test_streams_are_isolated() {
        let journal = InMemoryJournal::new();
        journal.append("one", 0, &init_event()).await.unwrap();

        assert_eq!(journal.event_count("one"), 1);
        assert_eq!(journal.event_count("two"), 0);
        journal.append("two", 0, &init_event()).await.unwrap();
        assert_eq!(journal.event_count("two"), 1);
    }
}
