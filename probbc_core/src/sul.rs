//! The system-under-test boundary.
//!
//! Everything the core needs from a SUT is one reset-and-step interface
//! plus interaction counters; the learner's own adapter implements [`Sul`].
//! [`MdpSul`] simulates a known MDP behind the same interface, which is how
//! benchmark models are checked without real hardware.

use crate::mdp::{Mdp, StateId};
use crate::{Action, Observation};
use rand::Rng;
use thiserror::Error;

/// A system-under-test behaving as an unknown MDP.
///
/// Errors of the underlying system are propagated unchanged through every
/// core routine, including the refinement oracle.
pub trait Sul {
    /// The SUT's own failure type.
    type Error;

    /// Brings the SUT back to its initial state.
    fn reset(&mut self) -> Result<(), Self::Error>;

    /// Feeds one input and returns the SUT's observation.
    fn step(&mut self, input: &str) -> Result<Observation, Self::Error>;

    /// The number of resets performed so far.
    fn num_queries(&self) -> usize;

    /// The number of steps performed so far.
    fn num_steps(&self) -> usize;
}

/// Errors of the [`MdpSul`] simulator.
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    /// The input has no distribution in the current state.
    #[error("input {0:?} is not enabled in state {1:?}")]
    InputNotEnabled(Action, StateId),
}

/// Simulates a known MDP as a SUT by Monte Carlo sampling.
#[derive(Debug, Clone)]
pub struct MdpSul<R: Rng> {
    mdp: Mdp,
    rng: R,
    current: StateId,
    num_queries: usize,
    num_steps: usize,
}

impl<R: Rng> MdpSul<R> {
    /// Creates a simulator positioned at the MDP's initial state.
    pub fn new(mdp: Mdp, rng: R) -> Self {
        let current = mdp.initial_state();
        Self {
            mdp,
            rng,
            current,
            num_queries: 0,
            num_steps: 0,
        }
    }

    /// The simulated MDP.
    pub fn mdp(&self) -> &Mdp {
        &self.mdp
    }
}

impl<R: Rng> Sul for MdpSul<R> {
    type Error = SimulationError;

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.current = self.mdp.initial_state();
        self.num_queries += 1;
        Ok(())
    }

    fn step(&mut self, input: &str) -> Result<Observation, Self::Error> {
        let successors = self
            .mdp
            .distribution(self.current, input)
            .ok_or_else(|| SimulationError::InputNotEnabled(input.to_owned(), self.current))?;
        self.num_steps += 1;
        let sample: f64 = self.rng.random();
        let mut cumulative = 0f64;
        for &(target, p) in successors {
            cumulative += p;
            if sample < cumulative {
                self.current = target;
                return Ok(self.mdp.observation(target).to_owned());
            }
        }
        // Rounding may leave the last successor a sliver short of 1.
        let &(target, _) = successors.last().expect("distributions are nonempty");
        self.current = target;
        Ok(self.mdp.observation(target).to_owned())
    }

    fn num_queries(&self) -> usize {
        self.num_queries
    }

    fn num_steps(&self) -> usize {
        self.num_steps
    }
}
