//! Stateful executor of a synthesized adversary against the live SUT.
//!
//! The bridge tracks a belief distribution over adversary states: the SUT
//! only reveals observations, and several adversary states may be
//! consistent with the observations seen so far. [`StrategyBridge::next_action`]
//! answers which input the scheduler mandates next;
//! [`StrategyBridge::update`] folds an observed output into the belief.

use crate::adversary::Adversary;
use crate::Observation;
use thiserror::Error;

/// Belief mass must sum to one up to this tolerance.
const BELIEF_TOLERANCE: f64 = 1e-12;

/// Errors signalled by the bridge while executing a strategy.
///
/// Both variants mean the SUT left the synthesized scheduler's domain; the
/// statistical model checker consumes them as counterexample candidates
/// rather than propagating them.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The scheduler does not prescribe a unique action on the support of
    /// the current belief.
    #[error("strategy prescribes no unique action for the current belief")]
    AmbiguousStrategy,
    /// The observed output has probability zero under the current belief.
    #[error("observation {0:?} has probability zero under the current belief")]
    InconsistentObservation(Observation),
}

/// Belief-tracking executor of an [`Adversary`].
///
/// The bridge borrows the parsed scheduler tables and never mutates them;
/// its only state is the belief vector, and [`StrategyBridge::update`] is a
/// pure function of belief and observation. Replaying a trace therefore
/// yields the same belief regardless of interleaved
/// [`StrategyBridge::next_action`] queries.
#[derive(Debug, Clone)]
pub struct StrategyBridge<'a> {
    adversary: &'a Adversary,
    belief: Vec<f64>,
}

impl<'a> StrategyBridge<'a> {
    /// Creates a bridge with the belief concentrated on the adversary's
    /// initial state.
    pub fn new(adversary: &'a Adversary) -> Self {
        let mut bridge = Self {
            adversary,
            belief: vec![0f64; adversary.num_states()],
        };
        bridge.reset();
        bridge
    }

    /// Resets the belief to a Dirac distribution on the initial state.
    pub fn reset(&mut self) {
        self.belief.fill(0f64);
        self.belief[self.adversary.initial_state()] = 1f64;
    }

    /// The belief mass currently assigned to an adversary state.
    pub fn belief(&self, state: usize) -> f64 {
        self.belief.get(state).copied().unwrap_or(0f64)
    }

    /// The input the scheduler mandates for the current belief.
    ///
    /// The scheduler is memoryless per observation, so all states in the
    /// belief's support must agree on the action; disagreement (or a
    /// support state the scheduler never visits) is [`BridgeError::AmbiguousStrategy`].
    pub fn next_action(&self) -> Result<&'a str, BridgeError> {
        let mut action: Option<&'a str> = None;
        for (state, &mass) in self.belief.iter().enumerate() {
            if mass <= 0f64 {
                continue;
            }
            let prescribed = self
                .adversary
                .action(state)
                .ok_or(BridgeError::AmbiguousStrategy)?;
            match action {
                None => action = Some(prescribed),
                Some(existing) if existing != prescribed => {
                    return Err(BridgeError::AmbiguousStrategy);
                }
                Some(_) => {}
            }
        }
        action.ok_or(BridgeError::AmbiguousStrategy)
    }

    /// Folds the observation seen after taking `action` into the belief:
    /// `b'(q') = Σ_q b(q) · τ(q, observation)(q')`, renormalized.
    ///
    /// Fails with [`BridgeError::InconsistentObservation`] if the resulting
    /// mass is zero; the belief is left unchanged in that case.
    pub fn update(&mut self, action: &str, observation: &str) -> Result<(), BridgeError> {
        let mut next = vec![0f64; self.belief.len()];
        let mut total = 0f64;
        for (state, &mass) in self.belief.iter().enumerate() {
            if mass <= 0f64 {
                continue;
            }
            if let Some(successors) = self.adversary.successors(state, action, observation) {
                for &(target, p) in successors {
                    next[target] += mass * p;
                    total += mass * p;
                }
            }
        }
        if total <= BELIEF_TOLERANCE {
            return Err(BridgeError::InconsistentObservation(observation.to_owned()));
        }
        // Support states without a matching transition lose their mass.
        for mass in next.iter_mut() {
            *mass /= total;
        }
        self.belief = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adversary::AdversaryRow;

    const SIX: &str = "agree__c1_tails__c2_tails__six";
    const FIVE: &str = "agree__c1_tails__c2_tails__five";

    fn row(source: usize, action: &str, target: usize, probability: f64, obs: &str) -> AdversaryRow {
        AdversaryRow {
            source,
            action: action.to_string(),
            target,
            probability,
            target_observation: obs.to_string(),
        }
    }

    // Cut-down version of the scheduler PRISM synthesizes for the shared
    // coin protocol: state 0 plays go2 and moves to 42 on "six", 42 plays
    // go2 and moves to 47 on "five".
    fn fixture() -> Adversary {
        Adversary::from_rows(
            0,
            vec![row(0, "go2", 42, 1.0, SIX), row(42, "go2", 47, 1.0, FIVE)],
        )
        .unwrap()
    }

    #[test]
    fn follows_strategy() {
        let adversary = fixture();
        let mut bridge = StrategyBridge::new(&adversary);
        assert_eq!(bridge.next_action().unwrap(), "go2");
        bridge.update("go2", SIX).unwrap();
        assert_eq!(bridge.belief(42), 1.0);
        assert_eq!(bridge.next_action().unwrap(), "go2");
        bridge.update("go2", FIVE).unwrap();
        assert_eq!(bridge.belief(47), 1.0);
    }

    #[test]
    fn reset_clears_belief() {
        let adversary = fixture();
        let mut bridge = StrategyBridge::new(&adversary);
        bridge.update("go2", SIX).unwrap();
        assert_eq!(bridge.belief(42), 1.0);
        bridge.reset();
        assert_eq!(bridge.belief(42), 0.0);
        assert_eq!(bridge.belief(0), 1.0);
    }

    #[test]
    fn impossible_observation_is_inconsistent() {
        let adversary = fixture();
        let mut bridge = StrategyBridge::new(&adversary);
        let err = bridge.update("go2", "disagree").unwrap_err();
        assert!(matches!(err, BridgeError::InconsistentObservation(_)));
        // Belief is untouched by the failed update.
        assert_eq!(bridge.belief(0), 1.0);
    }

    #[test]
    fn belief_stays_normalized_under_mass_loss() {
        // State 0 splits between 1 and 2 on "x"; only state 1 has a
        // transition on the following "y".
        let adversary = Adversary::from_rows(
            0,
            vec![
                row(0, "go", 1, 0.5, "x"),
                row(0, "go", 2, 0.5, "x"),
                row(1, "go", 3, 1.0, "y"),
                row(2, "go", 4, 1.0, "z"),
            ],
        )
        .unwrap();
        let mut bridge = StrategyBridge::new(&adversary);
        bridge.update("go", "x").unwrap();
        assert_eq!(bridge.belief(1), 0.5);
        assert_eq!(bridge.belief(2), 0.5);
        bridge.update("go", "y").unwrap();
        assert_eq!(bridge.belief(3), 1.0);
        let total: f64 = (0..adversary.num_states()).map(|q| bridge.belief(q)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn replayed_belief_ignores_action_queries() {
        let adversary = fixture();
        let mut queried = StrategyBridge::new(&adversary);
        queried.next_action().unwrap();
        queried.update("go2", SIX).unwrap();
        queried.next_action().unwrap();
        queried.update("go2", FIVE).unwrap();

        let mut silent = StrategyBridge::new(&adversary);
        silent.update("go2", SIX).unwrap();
        silent.update("go2", FIVE).unwrap();

        for state in 0..adversary.num_states() {
            assert_eq!(queried.belief(state), silent.belief(state));
        }
    }

    #[test]
    fn disagreeing_support_is_ambiguous() {
        let adversary = Adversary::from_rows(
            0,
            vec![
                row(0, "go", 1, 0.5, "x"),
                row(0, "go", 2, 0.5, "x"),
                row(1, "go1", 3, 1.0, "y"),
                row(2, "go2", 4, 1.0, "y"),
            ],
        )
        .unwrap();
        let mut bridge = StrategyBridge::new(&adversary);
        bridge.update("go", "x").unwrap();
        assert!(matches!(
            bridge.next_action(),
            Err(BridgeError::AmbiguousStrategy)
        ));
    }
}
