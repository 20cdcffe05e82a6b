//! State reducers: folding transition outputs into the accumulated state

/// Pure fold from transition outputs into the user's accumulated state
///
/// Applied once per fired event, both live and during replay, so it must be
/// deterministic and side-effect free.
pub trait StateReducer: Send + Sync + 'static {
    /// Fold one transition output into the state
    fn reduce(&self, state: serde_json::Value, output: &serde_json::Value) -> serde_json::Value;
}

/// Keep the state unchanged, discarding outputs
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReducer;

impl StateReducer for NullReducer {
    fn reduce(&self, state: serde_json::Value, _output: &serde_json::Value) -> serde_json::Value {
        state
    }
}

/// Shallow JSON object merge
///
/// When both state and output are objects, the output's keys overwrite the
/// state's; otherwise the output replaces the state wholesale.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReducer;

impl StateReducer for MergeReducer {
    fn reduce(&self, state: serde_json::Value, output: &serde_json::Value) -> serde_json::Value {
        match (state, output) {
            (serde_json::Value::Object(mut base), serde_json::Value::Object(incoming)) => {
                for (key, value) in incoming {
                    base.insert(key.clone(), value.clone());
                }
                serde_json::Value::Object(base)
            }
            (_, output) => output.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_reducer_keeps_state() {
        let state = NullReducer.reduce(json!({"a": 1}), &json!({"b": 2}));
        assert_eq!(state, json!({"a": 1}));
    }

    #[test]
    fn test_merge_reducer_overwrites_keys() {
        let state = MergeReducer.reduce(json!({"a": 1, "b": 1}), &json!({"b": 2, "c": 3}));
        assert_eq!(state, json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_merge_reducer_replaces_non_objects() {
        let state = MergeReducer.reduce(json!(null), &json!({"a": 1}));
        assert_eq!(state, json!({"a": 1}));

        let state = MergeReducer.reduce(json!({"a": 1}), &json!("done"));
        assert_eq!(state, json!("done"));
    }
}
