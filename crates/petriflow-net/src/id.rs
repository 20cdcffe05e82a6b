//! Stable identifiers for net nodes

use serde::{Deserialize, Serialize};

/// Identifier of a place (a typed token container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

/// Identifier of a transition (a node with input and output arcs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(String);

macro_rules! id_impls {
    ($ty:ident) => {
        impl $ty {
            /// Create a new identifier from any string-like input
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_impls!(PlaceId);
id_impls!(TransitionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_id_conversions() {
        let a = PlaceId::new("incoming");
        let b = PlaceId::from("incoming");
        let c = PlaceId::from("incoming".to_string());

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "incoming");
        assert_eq!(a.to_string(), "incoming");
    }

    #[test]
    fn test_ids_are_ordered() {
        let mut ids = vec![
            TransitionId::from("ship"),
            TransitionId::from("pack"),
            TransitionId::from("validate"),
        ];
        ids.sort();

        assert_eq!(ids[0].as_str(), "pack");
        assert_eq!(ids[2].as_str(), "validate");
    }

    #[test]
    fn test_id_serialization_is_transparent() {
        let id = PlaceId::from("a");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"a\"");

        let parsed: PlaceId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
