//! Property evaluation on finite traces.
//!
//! The property itself is held opaque: the core only needs a decider that
//! classifies a finite trace as satisfying, violating, or too short to
//! tell. [`BoundedReachability`] is the evaluator matching the
//! step-counter encoding used for the model checker: reach one of the
//! target observations within a fixed number of steps.

use crate::{Observation, Trace};
use std::collections::HashSet;

/// Verdict of a property decider on a finite trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The trace satisfies the property.
    Satisfied,
    /// The trace violates the property.
    Violated,
    /// The trace is too short to decide; keep executing.
    Inconclusive,
}

/// A pure decider for a property on finite traces.
pub trait TraceEvaluator {
    /// Classifies the trace.
    fn evaluate(&self, trace: &Trace) -> Verdict;
}

/// Bounded reachability: one of the target observations must occur within
/// `horizon` steps.
#[derive(Debug, Clone)]
pub struct BoundedReachability {
    targets: HashSet<Observation>,
    horizon: usize,
}

impl BoundedReachability {
    /// Creates the evaluator for the given target observations and step
    /// horizon.
    pub fn new(targets: impl IntoIterator<Item = Observation>, horizon: usize) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            horizon,
        }
    }

    /// The step horizon.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// The target observations.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }
}

impl TraceEvaluator for BoundedReachability {
    fn evaluate(&self, trace: &Trace) -> Verdict {
        if trace
            .steps()
            .iter()
            .take(self.horizon)
            .any(|(_, obs)| self.targets.contains(obs))
        {
            Verdict::Satisfied
        } else if trace.len() >= self.horizon {
            Verdict::Violated
        } else {
            Verdict::Inconclusive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(steps: &[(&str, &str)]) -> Trace {
        steps
            .iter()
            .map(|(i, o)| (i.to_string(), o.to_string()))
            .collect()
    }

    #[test]
    fn verdicts() {
        let prop = BoundedReachability::new(["goal".to_string()], 3);
        assert_eq!(prop.evaluate(&Trace::new()), Verdict::Inconclusive);
        assert_eq!(
            prop.evaluate(&trace(&[("a", "miss")])),
            Verdict::Inconclusive
        );
        assert_eq!(prop.evaluate(&trace(&[("a", "goal")])), Verdict::Satisfied);
        assert_eq!(
            prop.evaluate(&trace(&[("a", "miss"), ("a", "miss"), ("a", "miss")])),
            Verdict::Violated
        );
        // A target first reached past the horizon does not count.
        assert_eq!(
            prop.evaluate(&trace(&[
                ("a", "miss"),
                ("a", "miss"),
                ("a", "miss"),
                ("a", "goal")
            ])),
            Verdict::Violated
        );
    }
}
