//! The immutable net graph and its enablement queries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{PlaceId, TransitionId};
use crate::marking::Marking;
use crate::tokenset::Token;

/// Error from net construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Two places share an id
    #[error("duplicate place: {0}")]
    DuplicatePlace(PlaceId),

    /// Two transitions share an id
    #[error("duplicate transition: {0}")]
    DuplicateTransition(TransitionId),

    /// An arc references a place that was never inserted
    #[error("arc references unknown place: {0}")]
    UnknownPlace(PlaceId),

    /// An arc references a transition that was never inserted
    #[error("arc references unknown transition: {0}")]
    UnknownTransition(TransitionId),

    /// Arc weights must be at least one
    #[error("zero-weight arc between {place} and {transition}")]
    ZeroWeight {
        place: PlaceId,
        transition: TransitionId,
    },

    /// A transition with no input arcs could fire unboundedly
    #[error("transition {0} has no input arcs")]
    NoInputs(TransitionId),
}

/// A place: a typed container tokens reside in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    /// Stable identifier
    pub id: PlaceId,

    /// Human-readable label (defaults to the id)
    pub label: String,
}

impl Place {
    /// Create a place whose label equals its id
    pub fn new(id: impl Into<PlaceId>) -> Self {
        let id = id.into();
        let label = id.to_string();
        Self { id, label }
    }

    /// Set a human-readable label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// A transition: consumes tokens from its input places, produces tokens in
/// its output places
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Stable identifier
    pub id: TransitionId,

    /// Human-readable label (defaults to the id)
    pub label: String,

    /// Automated transitions are fired by the engine as soon as they are
    /// enabled; manual transitions wait for an explicit fire command.
    pub automated: bool,
}

impl Transition {
    /// Create a manual transition whose label equals its id
    pub fn new(id: impl Into<TransitionId>) -> Self {
        let id = id.into();
        let label = id.to_string();
        Self {
            id,
            label,
            automated: false,
        }
    }

    /// Mark this transition as automated
    pub fn automated(mut self) -> Self {
        self.automated = true;
        self
    }

    /// Set a human-readable label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Immutable colored Petri net: places, transitions and weighted arcs
///
/// Construct through [`PetriNetBuilder`]. All queries are pure; all
/// enumerations visit places and transitions in id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetriNet {
    places: BTreeMap<PlaceId, Place>,
    transitions: BTreeMap<TransitionId, Transition>,
    input_arcs: BTreeMap<TransitionId, BTreeMap<PlaceId, u32>>,
    output_arcs: BTreeMap<TransitionId, BTreeMap<PlaceId, u32>>,
}

impl PetriNet {
    /// Start building a net
    pub fn builder() -> PetriNetBuilder {
        PetriNetBuilder::default()
    }

    /// Look up a place
    pub fn place(&self, id: &PlaceId) -> Option<&Place> {
        self.places.get(id)
    }

    /// Look up a transition
    pub fn transition(&self, id: &TransitionId) -> Option<&Transition> {
        self.transitions.get(id)
    }

    /// All transitions, in id order
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    /// All places, in id order
    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    /// Input arc weights of a transition (empty map if unknown)
    pub fn input_weights(&self, transition: &TransitionId) -> &BTreeMap<PlaceId, u32> {
        self.input_arcs.get(transition).unwrap_or(&EMPTY_WEIGHTS)
    }

    /// Output arc weights of a transition (empty map if unknown)
    pub fn output_weights(&self, transition: &TransitionId) -> &BTreeMap<PlaceId, u32> {
        self.output_arcs.get(transition).unwrap_or(&EMPTY_WEIGHTS)
    }

    /// The marking a transition produces for a given output value
    ///
    /// One token carrying `output` (or `null` when absent) is placed on each
    /// output place per unit of arc weight. Callers that need differently
    /// shaped productions (operator overrides, continue strategies) supply an
    /// explicit marking instead, validated against [`Self::output_weights`].
    pub fn produced_marking(&self, transition: &TransitionId, output: Option<&Token>) -> Marking {
        let token = output.cloned().unwrap_or(Token::Null);
        let mut marking = Marking::new();
        for (place, weight) in self.output_weights(transition) {
            for _ in 0..*weight {
                marking.put(place.clone(), token.clone());
            }
        }
        marking
    }

    /// Cheap enablement check: does `marking` hold enough tokens on every
    /// input place of `transition`?
    pub fn is_enabled(&self, marking: &Marking, transition: &TransitionId) -> bool {
        let weights = match self.input_arcs.get(transition) {
            Some(w) => w,
            None => return false,
        };
        weights
            .iter()
            .all(|(place, weight)| marking.multiplicity(place) >= *weight)
    }

    /// Human-readable reason why `transition` is not enabled, if it isn't
    pub fn disabled_reason(&self, marking: &Marking, transition: &TransitionId) -> Option<String> {
        let weights = self.input_arcs.get(transition)?;
        weights.iter().find_map(|(place, weight)| {
            (marking.multiplicity(place) < *weight)
                .then(|| format!("not enough tokens in {place}"))
        })
    }

    /// Every distinct token combination that could fire `transition`
    ///
    /// Empty iff the transition is not enabled under `marking`. Combinations
    /// are enumerated deterministically: input places in id order, token
    /// draws per [`crate::TokenSet::selections`].
    pub fn enabled_parameters_for(
        &self,
        marking: &Marking,
        transition: &TransitionId,
    ) -> Vec<Marking> {
        let weights = match self.input_arcs.get(transition) {
            Some(w) => w,
            None => return vec![],
        };

        let mut combinations = vec![Marking::new()];
        for (place, weight) in weights {
            let draws = match marking.tokens(place) {
                Some(tokens) => tokens.selections(*weight),
                None => vec![],
            };
            if draws.is_empty() {
                return vec![];
            }
            let mut next = Vec::with_capacity(combinations.len() * draws.len());
            for partial in &combinations {
                for draw in &draws {
                    let mut extended = partial.clone();
                    extended.add_all(place.clone(), draw);
                    next.push(extended);
                }
            }
            combinations = next;
        }
        combinations
    }

    /// Enablement over the whole net: for every transition, the alternative
    /// consumable input markings (empty vec = disabled)
    pub fn enabled_parameters(&self, marking: &Marking) -> BTreeMap<TransitionId, Vec<Marking>> {
        self.transitions
            .keys()
            .map(|t| (t.clone(), self.enabled_parameters_for(marking, t)))
            .collect()
    }
}

static EMPTY_WEIGHTS: BTreeMap<PlaceId, u32> = BTreeMap::new();

/// Validating builder for [`PetriNet`]
///
/// # Example
///
/// ```
/// use petriflow_net::{PetriNet, Place, Transition};
///
/// let net = PetriNet::builder()
///     .place(Place::new("a"))
///     .place(Place::new("b"))
///     .transition(Transition::new("move"))
///     .input_arc("a", "move", 1)
///     .output_arc("move", "b", 1)
///     .build()
///     .unwrap();
///
/// assert!(net.transition(&"move".into()).is_some());
/// ```
#[derive(Debug, Default)]
pub struct PetriNetBuilder {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    input_arcs: Vec<(PlaceId, TransitionId, u32)>,
    output_arcs: Vec<(TransitionId, PlaceId, u32)>,
}

impl PetriNetBuilder {
    /// Insert a place
    pub fn place(mut self, place: Place) -> Self {
        self.places.push(place);
        self
    }

    /// Insert a transition
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Insert an input arc: `transition` consumes `weight` tokens from `place`
    pub fn input_arc(
        mut self,
        place: impl Into<PlaceId>,
        transition: impl Into<TransitionId>,
        weight: u32,
    ) -> Self {
        self.input_arcs.push((place.into(), transition.into(), weight));
        self
    }

    /// Insert an output arc: `transition` produces `weight` tokens in `place`
    pub fn output_arc(
        mut self,
        transition: impl Into<TransitionId>,
        place: impl Into<PlaceId>,
        weight: u32,
    ) -> Self {
        self.output_arcs.push((transition.into(), place.into(), weight));
        self
    }

    /// Validate and build the net
    pub fn build(self) -> Result<PetriNet, BuildError> {
        let mut places = BTreeMap::new();
        for place in self.places {
            if places.insert(place.id.clone(), place.clone()).is_some() {
                return Err(BuildError::DuplicatePlace(place.id));
            }
        }

        let mut transitions = BTreeMap::new();
        let mut input_arcs: BTreeMap<TransitionId, BTreeMap<PlaceId, u32>> = BTreeMap::new();
        let mut output_arcs: BTreeMap<TransitionId, BTreeMap<PlaceId, u32>> = BTreeMap::new();
        for transition in self.transitions {
            let id = transition.id.clone();
            if transitions.insert(id.clone(), transition).is_some() {
                return Err(BuildError::DuplicateTransition(id));
            }
            input_arcs.insert(id.clone(), BTreeMap::new());
            output_arcs.insert(id, BTreeMap::new());
        }

        for (place, transition, weight) in self.input_arcs {
            if !places.contains_key(&place) {
                return Err(BuildError::UnknownPlace(place));
            }
            let weights = input_arcs
                .get_mut(&transition)
                .ok_or(BuildError::UnknownTransition(transition.clone()))?;
            if weight == 0 {
                return Err(BuildError::ZeroWeight { place, transition });
            }
            *weights.entry(place).or_insert(0) += weight;
        }

        for (transition, place, weight) in self.output_arcs {
            if !places.contains_key(&place) {
                return Err(BuildError::UnknownPlace(place));
            }
            let weights = output_arcs
                .get_mut(&transition)
                .ok_or(BuildError::UnknownTransition(transition.clone()))?;
            if weight == 0 {
                return Err(BuildError::ZeroWeight { place, transition });
            }
            *weights.entry(place).or_insert(0) += weight;
        }

        for (id, weights) in &input_arcs {
            if weights.is_empty() {
                return Err(BuildError::NoInputs(id.clone()));
            }
        }

        Ok(PetriNet {
            places,
            transitions,
            input_arcs,
            output_arcs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenset::TokenSet;
    use serde_json::json;

    fn simple_net() -> PetriNet {
        PetriNet::builder()
            .place(Place::new("a"))
            .place(Place::new("b"))
            .transition(Transition::new("move"))
            .input_arc("a", "move", 1)
            .output_arc("move", "b", 1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_unknown_endpoints() {
        let err = PetriNet::builder()
            .place(Place::new("a"))
            .transition(Transition::new("t"))
            .input_arc("missing", "t", 1)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::UnknownPlace("missing".into()));

        let err = PetriNet::builder()
            .place(Place::new("a"))
            .input_arc("a", "ghost", 1)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::UnknownTransition("ghost".into()));
    }

    #[test]
    fn test_builder_rejects_zero_weight_and_no_inputs() {
        let err = PetriNet::builder()
            .place(Place::new("a"))
            .transition(Transition::new("t"))
            .input_arc("a", "t", 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::ZeroWeight { .. }));

        let err = PetriNet::builder()
            .place(Place::new("a"))
            .transition(Transition::new("t"))
            .output_arc("t", "a", 1)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::NoInputs("t".into()));
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = PetriNet::builder()
            .place(Place::new("a"))
            .place(Place::new("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicatePlace("a".into()));
    }

    #[test]
    fn test_enablement() {
        let net = simple_net();
        let t = TransitionId::from("move");

        let empty = Marking::new();
        assert!(!net.is_enabled(&empty, &t));
        assert_eq!(
            net.disabled_reason(&empty, &t),
            Some("not enough tokens in a".to_string())
        );
        assert!(net.enabled_parameters_for(&empty, &t).is_empty());

        let marking = Marking::new().with_token("a", json!("tok"));
        assert!(net.is_enabled(&marking, &t));
        assert_eq!(net.disabled_reason(&marking, &t), None);

        let params = net.enabled_parameters_for(&marking, &t);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0], Marking::new().with_token("a", json!("tok")));
    }

    #[test]
    fn test_enabled_parameters_enumerates_alternatives() {
        let net = simple_net();
        let t = TransitionId::from("move");

        let marking = Marking::new()
            .with_token("a", json!("x"))
            .with_token("a", json!("y"));

        let params = net.enabled_parameters_for(&marking, &t);
        assert_eq!(params.len(), 2);
        // Insertion order decides the first alternative
        assert_eq!(params[0], Marking::new().with_token("a", json!("x")));
        assert_eq!(params[1], Marking::new().with_token("a", json!("y")));
    }

    #[test]
    fn test_enabled_parameters_synchronizing_transition() {
        let net = PetriNet::builder()
            .place(Place::new("a"))
            .place(Place::new("b"))
            .place(Place::new("c"))
            .transition(Transition::new("join"))
            .input_arc("a", "join", 1)
            .input_arc("b", "join", 2)
            .output_arc("join", "c", 1)
            .build()
            .unwrap();
        let t = TransitionId::from("join");

        let partial = Marking::new()
            .with_token("a", json!(1))
            .with_token("b", json!(2));
        assert!(!net.is_enabled(&partial, &t));
        assert_eq!(
            net.disabled_reason(&partial, &t),
            Some("not enough tokens in b".to_string())
        );

        let full = Marking::new()
            .with_token("a", json!(1))
            .with("b", TokenSet::repeated(json!(2), 2));
        let params = net.enabled_parameters_for(&full, &t);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].multiplicity(&"a".into()), 1);
        assert_eq!(params[0].multiplicity(&"b".into()), 2);
    }

    #[test]
    fn test_produced_marking_follows_output_weights() {
        let net = PetriNet::builder()
            .place(Place::new("in"))
            .place(Place::new("out"))
            .transition(Transition::new("dup"))
            .input_arc("in", "dup", 1)
            .output_arc("dup", "out", 2)
            .build()
            .unwrap();

        let produced = net.produced_marking(&"dup".into(), Some(&json!({"ok": true})));
        assert_eq!(produced.multiplicity(&"out".into()), 2);

        let silent = net.produced_marking(&"dup".into(), None);
        assert_eq!(silent.tokens(&"out".into()).unwrap().multiplicity(&json!(null)), 2);
    }

    #[test]
    fn test_enabled_parameters_over_whole_net() {
        let net = PetriNet::builder()
            .place(Place::new("a"))
            .place(Place::new("b"))
            .transition(Transition::new("first"))
            .transition(Transition::new("second"))
            .input_arc("a", "first", 1)
            .output_arc("first", "b", 1)
            .input_arc("b", "second", 1)
            .output_arc("second", "a", 1)
            .build()
            .unwrap();

        let marking = Marking::new().with_token("a", json!(0));
        let all = net.enabled_parameters(&marking);

        assert_eq!(all[&TransitionId::from("first")].len(), 1);
        assert!(all[&TransitionId::from("second")].is_empty());
    }
}
