//! Core of **probbc**, a probabilistic black-box model checker based on
//! active automata learning.
//!
//! A system-under-test behaving as an unknown Markov Decision Process is
//! learned by an external L*-style stochastic learner; this crate provides
//! the learner's equivalence oracle. Each round, the oracle has a
//! probabilistic model checker synthesize an optimal adversary against the
//! current hypothesis, replays that adversary on the live SUT while
//! tracking a belief over adversary states, and uses statistical
//! hypothesis testing plus trace-frequency analysis to either confirm the
//! predicted probability or extract a counterexample that refines the
//! hypothesis.[^1]
//!
//! [^1]: Aichernig, B. K., & Tappler, M. (2019). *Probabilistic black-box
//!   reachability checking revisited*. Formal Methods in System Design.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adversary;
pub mod bridge;
pub mod frequency;
pub mod mdp;
pub mod oracle;
pub mod property;
pub mod smc;
pub mod sul;
mod trace;

pub use adversary::{Adversary, AdversaryError, AdversaryRow};
pub use bridge::{BridgeError, StrategyBridge};
pub use frequency::{compare_frequency, compare_frequency_with_tail};
pub use mdp::{Mdp, MdpBuilder, MdpError, START_OBSERVATION, StateId};
pub use oracle::{
    CheckOutcome, FrequencyStrategy, ModelChecker, OracleConfig, RefinementOracle, RoundPaths,
};
pub use property::{BoundedReachability, TraceEvaluator, Verdict};
pub use smc::{
    NeverBreaking, ObservationTable, SmcOutcome, StatisticalModelChecker, binomial_test_two_sided,
};
pub use sul::{MdpSul, SimulationError, Sul};
pub use trace::{Action, Observation, Trace};
