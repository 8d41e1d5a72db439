//! Execution traces of a system-under-test.
//!
//! A trace is the alternating sequence `i₀ o₀ i₁ o₁ … iₙ oₙ` of inputs fed
//! to the SUT and observations it produced in response. Traces are the
//! common currency of the statistical model checker, the frequency
//! comparator and the refinement oracle: every counterexample handed back
//! to the learner is a [`Trace`].

use std::fmt;

/// An input symbol of the SUT's finite input alphabet.
pub type Action = String;

/// An observation symbol of the SUT's finite output alphabet.
pub type Observation = String;

/// An alternating sequence of inputs and observations, stored pairwise.
///
/// The derived ordering is lexicographic on the step sequence; the
/// frequency comparator relies on it for deterministic tie-breaking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trace(Vec<(Action, Observation)>);

impl Trace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one input/observation step.
    pub fn push(&mut self, input: Action, observation: Observation) {
        self.0.push((input, observation));
    }

    /// Removes all steps.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The number of complete steps (half the alternating length).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the trace has no steps.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The steps as input/observation pairs.
    pub fn steps(&self) -> &[(Action, Observation)] {
        &self.0
    }

    /// The trace restricted to its first `len` steps.
    pub fn prefix(&self, len: usize) -> Trace {
        Trace(self.0[..len].to_vec())
    }

    /// The last step, if any.
    pub fn last(&self) -> Option<&(Action, Observation)> {
        self.0.last()
    }

    /// Splits off the last step, yielding the prefix and the final
    /// input/observation pair. `None` on an empty trace.
    pub fn split_last(&self) -> Option<(Trace, &Action, &Observation)> {
        self.0
            .last()
            .map(|(input, obs)| (self.prefix(self.0.len() - 1), input, obs))
    }

    /// The input projection `i₀ i₁ … iₙ`.
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(input, _)| input.as_str())
    }
}

impl FromIterator<(Action, Observation)> for Trace {
    fn from_iter<I: IntoIterator<Item = (Action, Observation)>>(iter: I) -> Self {
        Trace(iter.into_iter().collect())
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (input, obs) in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{input} {obs}")?;
            first = false;
        }
        Ok(())
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
    fn split_last() {
        let t = trace(&[("a", "x"), ("b", "y")]);
        let (prefix, input, obs) = t.split_last().unwrap();
        assert_eq!(prefix, trace(&[("a", "x")]));
        assert_eq!(input, "b");
        assert_eq!(obs, "y");
        assert!(Trace::new().split_last().is_none());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let shorter = trace(&[("a", "x")]);
        let longer = trace(&[("a", "x"), ("a", "x")]);
        let other = trace(&[("b", "x")]);
        assert!(shorter < longer);
        assert!(longer < other);
    }

    #[test]
    fn display_alternates() {
        let t = trace(&[("go1", "heads"), ("go2", "tails")]);
        assert_eq!(t.to_string(), "go1 heads go2 tails");
    }
}
