//! Statistical model checking of the SUT under a synthesized scheduler.
//!
//! The checker repeatedly executes the SUT while the strategy bridge picks
//! inputs, classifies each finished trace against the property, and keeps
//! the sampled traces for the frequency comparator. The aggregate
//! satisfaction count feeds an exact two-sided binomial test against the
//! probability the model checker predicted for the hypothesis.

use crate::bridge::StrategyBridge;
use crate::property::{TraceEvaluator, Verdict};
use crate::sul::Sul;
use crate::Trace;
use log::debug;

/// Read-only view of the learner's observation table.
///
/// The statistical model checker probes it after every sampled trace: a
/// trace that breaks closedness or consistency must be handed back to the
/// learner before any further sampling.
pub trait ObservationTable {
    /// Whether adding this trace would leave the table no longer closed
    /// and consistent.
    fn is_trace_breaking(&self, trace: &Trace) -> bool;
}

/// Table handle for runs outside a learning loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBreaking;

impl ObservationTable for NeverBreaking {
    fn is_trace_breaking(&self, _trace: &Trace) -> bool {
        false
    }
}

/// How a statistical model checking run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmcOutcome {
    /// The SUT produced a behavior the scheduler assigns probability zero;
    /// the partial trace witnesses the deviation.
    Counterexample(Trace),
    /// A sampled trace breaks the learner's observation table; the round
    /// must be abandoned so the learner can process it.
    TableBroken,
    /// All executions ran to a verdict.
    Completed,
}

/// Statistical model checker driving a SUT through a strategy bridge.
pub struct StatisticalModelChecker<'a, S: Sul> {
    sul: &'a mut S,
    bridge: StrategyBridge<'a>,
    evaluator: &'a dyn TraceEvaluator,
    table: Option<&'a dyn ObservationTable>,
    num_exec: usize,
    max_trace_len: usize,
    return_cex: bool,
    exec_count_sat: usize,
    exec_count_vio: usize,
    num_steps: usize,
    exec_sample: Vec<Trace>,
    satisfied_exec_sample: Vec<Trace>,
}

impl<'a, S: Sul> StatisticalModelChecker<'a, S> {
    /// Creates a checker for `num_exec` executions; traces longer than
    /// `max_trace_len` steps are cut off and counted as violations.
    pub fn new(
        sul: &'a mut S,
        bridge: StrategyBridge<'a>,
        evaluator: &'a dyn TraceEvaluator,
        table: Option<&'a dyn ObservationTable>,
        num_exec: usize,
        max_trace_len: usize,
        return_cex: bool,
    ) -> Self {
        Self {
            sul,
            bridge,
            evaluator,
            table,
            num_exec,
            max_trace_len,
            return_cex,
            exec_count_sat: 0,
            exec_count_vio: 0,
            num_steps: 0,
            exec_sample: Vec::new(),
            satisfied_exec_sample: Vec::new(),
        }
    }

    /// Samples up to `num_exec` executions of the SUT under the scheduler.
    ///
    /// Only SUT failures propagate; strategy-bridge failures become
    /// counterexamples (when `return_cex`) or count as violations.
    pub fn run(&mut self) -> Result<SmcOutcome, S::Error> {
        for _ in 0..self.num_exec {
            self.sul.reset()?;
            self.bridge.reset();
            let mut trace = Trace::new();
            loop {
                let input = match self.bridge.next_action() {
                    Ok(input) => input.to_owned(),
                    Err(err) => {
                        debug!("strategy bridge: {err}");
                        if self.return_cex && !trace.is_empty() {
                            return Ok(SmcOutcome::Counterexample(trace));
                        }
                        self.exec_count_vio += 1;
                        self.exec_sample.push(trace);
                        break;
                    }
                };
                let observation = self.sul.step(&input)?;
                self.num_steps += 1;
                trace.push(input.clone(), observation.clone());
                if let Err(err) = self.bridge.update(&input, &observation) {
                    debug!("strategy bridge: {err}");
                    if self.return_cex {
                        return Ok(SmcOutcome::Counterexample(trace));
                    }
                    self.exec_count_vio += 1;
                    self.exec_sample.push(trace);
                    break;
                }
                match self.evaluator.evaluate(&trace) {
                    Verdict::Satisfied => {
                        self.exec_count_sat += 1;
                        self.satisfied_exec_sample.push(trace.clone());
                        self.exec_sample.push(trace);
                        break;
                    }
                    Verdict::Violated => {
                        self.exec_count_vio += 1;
                        self.exec_sample.push(trace);
                        break;
                    }
                    Verdict::Inconclusive if trace.len() >= self.max_trace_len => {
                        // Length cap, counted as a violation.
                        self.exec_count_vio += 1;
                        self.exec_sample.push(trace);
                        break;
                    }
                    Verdict::Inconclusive => {}
                }
            }
            if let Some(table) = self.table {
                let sampled = self.exec_sample.last().expect("an execution was recorded");
                if table.is_trace_breaking(sampled) {
                    return Ok(SmcOutcome::TableBroken);
                }
            }
        }
        Ok(SmcOutcome::Completed)
    }

    /// Executions that satisfied the property.
    pub fn exec_count_sat(&self) -> usize {
        self.exec_count_sat
    }

    /// Executions that violated the property (including capped ones).
    pub fn exec_count_vio(&self) -> usize {
        self.exec_count_vio
    }

    /// Executions that ran to a verdict.
    pub fn executed(&self) -> usize {
        self.exec_count_sat + self.exec_count_vio
    }

    /// Total SUT steps performed.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// The empirical satisfaction probability, if any execution ran.
    pub fn estimate(&self) -> Option<f64> {
        let executed = self.executed();
        (executed > 0).then(|| self.exec_count_sat as f64 / executed as f64)
    }

    /// Two-sided p-value of the satisfaction count against the
    /// hypothesis's predicted probability; `None` when no execution ran.
    pub fn p_value(&self, hypothesis_value: f64) -> Option<f64> {
        let executed = self.executed();
        (executed > 0).then(|| {
            binomial_test_two_sided(
                self.exec_count_sat as u64,
                executed as u64,
                hypothesis_value,
            )
        })
    }

    /// All sampled traces.
    pub fn exec_sample(&self) -> &[Trace] {
        &self.exec_sample
    }

    /// The satisfying sampled traces.
    pub fn satisfied_exec_sample(&self) -> &[Trace] {
        &self.satisfied_exec_sample
    }

    /// Consumes the checker, yielding `(all, satisfying)` sampled traces.
    pub fn into_samples(self) -> (Vec<Trace>, Vec<Trace>) {
        (self.exec_sample, self.satisfied_exec_sample)
    }
}

/// Exact two-sided binomial test of H₀: success probability = `p0`.
///
/// Returns the summed probability mass of all outcomes that are no more
/// likely than the observed one (minimum-likelihood method, as in
/// scipy.stats.binomtest), computed in log space to stay stable for
/// thousands of trials.
pub fn binomial_test_two_sided(successes: u64, trials: u64, p0: f64) -> f64 {
    debug_assert!(successes <= trials);
    if trials == 0 {
        return 1f64;
    }
    if p0 <= 0f64 {
        return if successes == 0 { 1f64 } else { 0f64 };
    }
    if p0 >= 1f64 {
        return if successes == trials { 1f64 } else { 0f64 };
    }
    let observed = ln_binomial_pmf(successes, trials, p0);
    // Relative slack absorbs floating-point noise in the comparison.
    let cutoff = observed + 1e-7;
    let mut p_value = 0f64;
    for k in 0..=trials {
        let mass = ln_binomial_pmf(k, trials, p0);
        if mass <= cutoff {
            p_value += mass.exp();
        }
    }
    p_value.min(1f64)
}

fn ln_binomial_pmf(k: u64, n: u64, p: f64) -> f64 {
    ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1f64 - p).ln()
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_gamma(n as f64 + 1f64) - ln_gamma(k as f64 + 1f64) - ln_gamma((n - k) as f64 + 1f64)
}

// Lanczos approximation with g = 7, n = 9.
// Press, Teukolsky, Vetterling, Flannery, *Numerical Recipes* (3rd ed.),
// §6.1.
const LANCZOS: [f64; 9] = [
    0.99999999999980993,
    676.5203681218851,
    -1259.1392167224028,
    771.32342877765313,
    -176.61502916214059,
    12.507343278686905,
    -0.13857109526572012,
    9.9843695780195716e-6,
    1.5056327351493116e-7,
];

/// Natural logarithm of the gamma function, for arguments ≥ 1.
fn ln_gamma(x: f64) -> f64 {
    let x = x - 1f64;
    let mut acc = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2f64 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}
