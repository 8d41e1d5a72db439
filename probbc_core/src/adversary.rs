//! Deterministic memoryless schedulers synthesized by the model checker.
//!
//! An [`Adversary`] resolves the nondeterminism of an MDP: it prescribes
//! one input per adversary state and, for every observation the SUT may
//! answer with, a probability distribution over successor adversary states.
//! The distribution arises because the model checker's export lists every
//! concrete MDP successor separately; successors sharing an observation are
//! collapsed into a single belief update and renormalized per observation.

use crate::{Action, Observation};
use hashbrown::HashMap;
use thiserror::Error;

/// Probability mass per source state and action must sum to one up to this
/// tolerance.
const MASS_TOLERANCE: f64 = 1e-9;

/// One row of a scheduler export: a transition of the adversary-induced
/// chain, annotated with the observation of its target state.
#[derive(Debug, Clone)]
pub struct AdversaryRow {
    /// Source adversary state.
    pub source: usize,
    /// The input the scheduler picks at `source`.
    pub action: Action,
    /// Target adversary state.
    pub target: usize,
    /// Transition probability.
    pub probability: f64,
    /// Observation label of the target state.
    pub target_observation: Observation,
}

/// Errors detected while assembling an [`Adversary`] from export rows.
#[derive(Debug, Clone, Error)]
pub enum AdversaryError {
    /// A deterministic scheduler prescribes one action per state.
    #[error("state {state} is given two actions, {first:?} and {second:?}")]
    ConflictingActions {
        /// Offending source state.
        state: usize,
        /// Action of an earlier row.
        first: Action,
        /// Action of the conflicting row.
        second: Action,
    },
    /// The outgoing mass of a state does not sum to one.
    #[error("outgoing probabilities of state {state} under {action:?} sum to {total}")]
    UnnormalizedState {
        /// Offending source state.
        state: usize,
        /// The state's action.
        action: Action,
        /// Total outgoing mass found.
        total: f64,
    },
}

/// A deterministic memoryless scheduler over adversary states.
///
/// Immutable once assembled; the strategy bridge only borrows it.
#[derive(Debug, Clone)]
pub struct Adversary {
    initial: usize,
    num_states: usize,
    strategy: HashMap<usize, Action>,
    next: HashMap<(usize, Action, Observation), Vec<(usize, f64)>>,
}

impl Adversary {
    /// Assembles an adversary from export rows.
    ///
    /// Verifies that every source state appears with exactly one action and
    /// that its outgoing mass sums to one; then renormalizes the successors
    /// sharing a `(source, action, observation)` key so each belief update
    /// is a probability distribution.
    pub fn from_rows(
        initial: usize,
        rows: impl IntoIterator<Item = AdversaryRow>,
    ) -> Result<Self, AdversaryError> {
        let mut strategy: HashMap<usize, Action> = HashMap::new();
        let mut mass: HashMap<usize, f64> = HashMap::new();
        let mut next: HashMap<(usize, Action, Observation), Vec<(usize, f64)>> = HashMap::new();
        let mut num_states = initial + 1;
        for row in rows {
            num_states = num_states.max(row.source + 1).max(row.target + 1);
            match strategy.get(&row.source) {
                None => {
                    strategy.insert(row.source, row.action.clone());
                }
                Some(action) if *action != row.action => {
                    return Err(AdversaryError::ConflictingActions {
                        state: row.source,
                        first: action.clone(),
                        second: row.action,
                    });
                }
                Some(_) => {}
            }
            *mass.entry(row.source).or_insert(0f64) += row.probability;
            next.entry((row.source, row.action, row.target_observation))
                .or_default()
                .push((row.target, row.probability));
        }
        for (state, total) in mass {
            if (total - 1f64).abs() > MASS_TOLERANCE {
                return Err(AdversaryError::UnnormalizedState {
                    state,
                    action: strategy[&state].clone(),
                    total,
                });
            }
        }
        // Collapse successors sharing an observation into one distribution.
        for successors in next.values_mut() {
            let total: f64 = successors.iter().map(|(_, p)| p).sum();
            for (_, p) in successors.iter_mut() {
                *p /= total;
            }
        }
        Ok(Self {
            initial,
            num_states,
            strategy,
            next,
        })
    }

    /// The adversary state corresponding to the MDP's initial state.
    pub fn initial_state(&self) -> usize {
        self.initial
    }

    /// An upper bound on state indices, for sizing belief vectors.
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// The action the scheduler prescribes at `state`, if it visits it.
    pub fn action(&self, state: usize) -> Option<&str> {
        self.strategy.get(&state).map(String::as_str)
    }

    /// The belief-update distribution for taking `action` at `state` and
    /// observing `observation`.
    pub fn successors(
        &self,
        state: usize,
        action: &str,
        observation: &str,
    ) -> Option<&[(usize, f64)]> {
        self.next
            .get(&(state, action.to_owned(), observation.to_owned()))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source: usize, action: &str, target: usize, probability: f64, obs: &str) -> AdversaryRow {
        AdversaryRow {
            source,
            action: action.to_string(),
            target,
            probability,
            target_observation: obs.to_string(),
        }
    }

    #[test]
    fn conflicting_actions_rejected() {
        let err = Adversary::from_rows(
            0,
            vec![row(0, "go1", 1, 0.5, "x"), row(0, "go2", 2, 0.5, "y")],
        )
        .unwrap_err();
        assert!(matches!(err, AdversaryError::ConflictingActions { .. }));
    }

    #[test]
    fn unnormalized_state_rejected() {
        let err = Adversary::from_rows(0, vec![row(0, "go1", 1, 0.5, "x")]).unwrap_err();
        assert!(matches!(
            err,
            AdversaryError::UnnormalizedState { state: 0, .. }
        ));
    }

    #[test]
    fn successors_sharing_observation_are_renormalized() {
        // Two concrete successors observing "x" with masses 0.25 each, one
        // observing "y" with mass 0.5.
        let adversary = Adversary::from_rows(
            0,
            vec![
                row(0, "go", 1, 0.25, "x"),
                row(0, "go", 2, 0.25, "x"),
                row(0, "go", 3, 0.5, "y"),
            ],
        )
        .unwrap();
        let xs = adversary.successors(0, "go", "x").unwrap();
        let total: f64 = xs.iter().map(|(_, p)| p).sum();
        assert!((total - 1f64).abs() < 1e-12);
        assert!(xs.iter().all(|&(_, p)| (p - 0.5).abs() < 1e-12));
        let ys = adversary.successors(0, "go", "y").unwrap();
        assert_eq!(ys, &[(3, 1.0)]);
        assert_eq!(adversary.action(0), Some("go"));
        assert_eq!(adversary.num_states(), 4);
    }
}
