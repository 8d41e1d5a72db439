//! Labeled Markov Decision Processes as learned by stochastic automata
//! learning.
//!
//! An [`Mdp`] is defined through an [`MdpBuilder`] by adding states (each
//! carrying an observation label) and per-input probability distributions
//! over successor states. Then an [`Mdp`] is built from the builder and can
//! be walked along traces, though the definition itself can no longer be
//! altered.
//!
//! Learned MDPs are *output-deterministic*: within a single distribution
//! `δ(s, i)` all successor observations are distinct, so any trace has at
//! most one consistent path and a well-defined probability.

use crate::{Action, Observation, Trace};
use std::collections::BTreeMap;
use thiserror::Error;

/// Probability mass must sum to one up to this tolerance.
pub const PROB_TOLERANCE: f64 = 1e-9;

/// The conventional observation of the synthetic start state introduced by
/// stochastic-Mealy-to-MDP conversion.
pub const START_OBSERVATION: &str = "____start";

// Use of "Newtype" pattern to define different types of indexes.
/// A state of an [`Mdp`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    /// The position of the state in the MDP's state table.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Errors returned while defining an [`Mdp`].
#[derive(Debug, Clone, Error)]
pub enum MdpError {
    /// The state does not belong to this MDP.
    #[error("state {0:?} does not belong to this MDP")]
    MissingState(StateId),
    /// A distribution for this state and input was already given.
    #[error("state {0:?} already has a distribution for input {1:?}")]
    DuplicateDistribution(StateId, Action),
    /// Output-determinism violation: two successors share an observation.
    #[error("distribution of state {0:?} under input {1:?} has two successors observing {2:?}")]
    DuplicateObservation(StateId, Action, Observation),
    /// Transition probabilities must be in (0, 1].
    #[error("probability {1} of a transition from state {0:?} is not in (0, 1]")]
    InvalidProbability(StateId, f64),
    /// The distribution's mass does not sum to one.
    #[error("distribution of state {0:?} under input {1:?} has total mass {2}")]
    UnnormalizedDistribution(StateId, Action, f64),
    /// A distribution with no successors.
    #[error("empty distribution for state {0:?} under input {1:?}")]
    EmptyDistribution(StateId, Action),
}

/// A builder type for [`Mdp`].
#[derive(Debug, Clone)]
pub struct MdpBuilder {
    labels: Vec<Observation>,
    // Distributions are indexed by source state.
    transitions: Vec<BTreeMap<Action, Vec<(StateId, f64)>>>,
}

impl MdpBuilder {
    const INITIAL_STATE: StateId = StateId(0);

    /// Creates a new builder whose initial state carries the given
    /// observation label.
    pub fn new(initial_observation: impl Into<Observation>) -> Self {
        let mut builder = Self {
            labels: Vec::new(),
            transitions: Vec::new(),
        };
        let initial = builder.add_state(initial_observation);
        assert_eq!(initial, Self::INITIAL_STATE);
        builder
    }

    /// The initial state, created by [`MdpBuilder::new`].
    pub fn initial_state(&self) -> StateId {
        Self::INITIAL_STATE
    }

    /// Adds a new state with the given observation label.
    pub fn add_state(&mut self, observation: impl Into<Observation>) -> StateId {
        // States are indexed progressively.
        let idx = self.labels.len();
        self.labels.push(observation.into());
        self.transitions.push(BTreeMap::new());
        StateId(idx)
    }

    /// Adds the probability distribution over successors of `source` under
    /// `input`.
    ///
    /// The distribution must be nonempty, its mass must sum to one up to
    /// [`PROB_TOLERANCE`], and its successor observations must be pairwise
    /// distinct.
    pub fn add_distribution(
        &mut self,
        source: StateId,
        input: impl Into<Action>,
        successors: Vec<(StateId, f64)>,
    ) -> Result<(), MdpError> {
        let input = input.into();
        if source.0 >= self.labels.len() {
            return Err(MdpError::MissingState(source));
        }
        if successors.is_empty() {
            return Err(MdpError::EmptyDistribution(source, input));
        }
        let mut mass = 0f64;
        for (i, &(target, p)) in successors.iter().enumerate() {
            if target.0 >= self.labels.len() {
                return Err(MdpError::MissingState(target));
            }
            if !(p > 0f64 && p <= 1f64) {
                return Err(MdpError::InvalidProbability(source, p));
            }
            mass += p;
            let observation = &self.labels[target.0];
            if successors[..i]
                .iter()
                .any(|(other, _)| &self.labels[other.0] == observation)
            {
                return Err(MdpError::DuplicateObservation(
                    source,
                    input,
                    observation.clone(),
                ));
            }
        }
        if (mass - 1f64).abs() > PROB_TOLERANCE {
            return Err(MdpError::UnnormalizedDistribution(source, input, mass));
        }
        if self.transitions[source.0].contains_key(&input) {
            return Err(MdpError::DuplicateDistribution(source, input));
        }
        self.transitions[source.0].insert(input, successors);
        Ok(())
    }

    /// Builds the (immutable) [`Mdp`].
    pub fn build(mut self) -> Mdp {
        self.labels.shrink_to_fit();
        self.transitions.shrink_to_fit();
        Mdp {
            labels: self.labels,
            transitions: self.transitions,
        }
    }
}

/// A labeled MDP over a finite input alphabet and finite observation set.
#[derive(Debug, Clone)]
pub struct Mdp {
    labels: Vec<Observation>,
    transitions: Vec<BTreeMap<Action, Vec<(StateId, f64)>>>,
}

impl Mdp {
    /// The initial state.
    pub fn initial_state(&self) -> StateId {
        MdpBuilder::INITIAL_STATE
    }

    /// The number of states.
    pub fn num_states(&self) -> usize {
        self.labels.len()
    }

    /// The observation label of a state.
    pub fn observation(&self, state: StateId) -> &str {
        &self.labels[state.0]
    }

    /// All states with their observation labels.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &str)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, obs)| (StateId(idx), obs.as_str()))
    }

    /// The distributions leaving a state, ordered by input.
    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = (&str, &[(StateId, f64)])> {
        self.transitions[state.0]
            .iter()
            .map(|(input, successors)| (input.as_str(), successors.as_slice()))
    }

    /// The distribution `δ(state, input)`, if the input is enabled.
    pub fn distribution(&self, state: StateId, input: &str) -> Option<&[(StateId, f64)]> {
        self.transitions[state.0].get(input).map(Vec::as_slice)
    }

    /// The unique successor of `state` under `input` observing
    /// `observation`, with its probability. Uniqueness holds by
    /// output-determinism.
    pub fn successor(
        &self,
        state: StateId,
        input: &str,
        observation: &str,
    ) -> Option<(StateId, f64)> {
        self.distribution(state, input)?
            .iter()
            .find(|&&(target, _)| self.labels[target.0] == observation)
            .copied()
    }

    /// The state reached by walking the trace from the initial state, or
    /// `None` if the trace is not realizable in this MDP.
    pub fn trace_state(&self, trace: &Trace) -> Option<StateId> {
        trace
            .steps()
            .iter()
            .try_fold(self.initial_state(), |state, (input, obs)| {
                self.successor(state, input, obs).map(|(target, _)| target)
            })
    }

    /// The probability of the trace's unique consistent path, or zero if no
    /// such path exists.
    pub fn trace_probability(&self, trace: &Trace) -> f64 {
        let mut state = self.initial_state();
        let mut probability = 1f64;
        for (input, obs) in trace.steps() {
            match self.successor(state, input, obs) {
                Some((target, p)) => {
                    probability *= p;
                    state = target;
                }
                None => return 0f64,
            }
        }
        probability
    }

    /// The input alphabet: every input enabled in some state, sorted.
    pub fn input_alphabet(&self) -> Vec<Action> {
        let mut alphabet: Vec<Action> = self
            .transitions
            .iter()
            .flat_map(|t| t.keys().cloned())
            .collect();
        alphabet.sort_unstable();
        alphabet.dedup();
        alphabet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin_mdp() -> Mdp {
        let mut builder = MdpBuilder::new(START_OBSERVATION);
        let initial = builder.initial_state();
        let heads = builder.add_state("heads");
        let tails = builder.add_state("tails");
        builder
            .add_distribution(initial, "flip", vec![(heads, 0.5), (tails, 0.5)])
            .unwrap();
        builder
            .add_distribution(heads, "flip", vec![(heads, 1.0)])
            .unwrap();
        builder
            .add_distribution(tails, "flip", vec![(tails, 1.0)])
            .unwrap();
        builder.build()
    }

    fn trace(steps: &[(&str, &str)]) -> Trace {
        steps
            .iter()
            .map(|(i, o)| (i.to_string(), o.to_string()))
            .collect()
    }

    #[test]
    fn output_determinism_enforced() {
        let mut builder = MdpBuilder::new(START_OBSERVATION);
        let initial = builder.initial_state();
        let a = builder.add_state("same");
        let b = builder.add_state("same");
        let err = builder
            .add_distribution(initial, "go", vec![(a, 0.5), (b, 0.5)])
            .unwrap_err();
        assert!(matches!(err, MdpError::DuplicateObservation(..)));
    }

    #[test]
    fn unnormalized_distribution_rejected() {
        let mut builder = MdpBuilder::new(START_OBSERVATION);
        let initial = builder.initial_state();
        let a = builder.add_state("x");
        let err = builder
            .add_distribution(initial, "go", vec![(a, 0.5)])
            .unwrap_err();
        assert!(matches!(err, MdpError::UnnormalizedDistribution(..)));
    }

    #[test]
    fn trace_walking() {
        let mdp = coin_mdp();
        let t = trace(&[("flip", "heads"), ("flip", "heads")]);
        let state = mdp.trace_state(&t).unwrap();
        assert_eq!(mdp.observation(state), "heads");
        assert!((mdp.trace_probability(&t) - 0.5).abs() < 1e-12);

        let impossible = trace(&[("flip", "heads"), ("flip", "tails")]);
        assert!(mdp.trace_state(&impossible).is_none());
        assert_eq!(mdp.trace_probability(&impossible), 0f64);
    }

    #[test]
    fn alphabet_is_sorted_and_deduplicated() {
        let mdp = coin_mdp();
        assert_eq!(mdp.input_alphabet(), vec!["flip".to_string()]);
    }
}
