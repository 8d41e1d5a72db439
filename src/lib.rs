//! # probbc
//!
//! A probabilistic black-box model checker based on active automata
//! learning.
//!
//! Given a system-under-test behaving as an unknown Markov Decision
//! Process and a reachability property, probbc has PRISM synthesize an
//! optimal adversary against a hypothesis model, replays the adversary on
//! the SUT, and combines statistical hypothesis testing with
//! trace-frequency analysis to confirm the prediction or extract a
//! counterexample. The refinement oracle, strategy bridge and statistical
//! model checker live in [`probbc_core`]; the PRISM interop in
//! [`probbc_prism`]; this crate wires them into a command-line tool that
//! validates a known benchmark model against its own simulation.

mod cli;
mod parser;
mod traces;

pub use cli::*;
pub use parser::load;
