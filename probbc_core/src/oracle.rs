//! The counterexample-producing equivalence oracle driving refinement.
//!
//! Once per learner round, [`RefinementOracle::find_cex`] hands the current
//! hypothesis to the model checker, replays the synthesized adversary on
//! the SUT through the strategy bridge, and decides between: a concrete
//! counterexample trace, abandoning the round because the learner's table
//! broke, or falling back to random-walk equivalence testing. Every
//! recoverable fault degrades to the random-walk path; only SUT failures
//! escape.

use crate::adversary::Adversary;
use crate::bridge::StrategyBridge;
use crate::frequency::{compare_frequency, compare_frequency_with_tail};
use crate::mdp::Mdp;
use crate::property::TraceEvaluator;
use crate::smc::{NeverBreaking, ObservationTable, SmcOutcome, StatisticalModelChecker};
use crate::sul::Sul;
use crate::{Action, Trace};
use log::{debug, info, warn};
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};

/// Multiplier applied to the reset probability after every fruitless
/// random walk, so that longer traces get sampled in the limit.
const RESET_PROB_DISCOUNT: f64 = 0.90;

/// The per-round file layout shared between the oracle and the model
/// checker: hypothesis model, step-counter-augmented model, synthesized
/// adversary, and the state/transition/label exports.
#[derive(Debug, Clone)]
pub struct RoundPaths {
    /// The emitted hypothesis model.
    pub model: PathBuf,
    /// The hypothesis model with the bounded step counter injected.
    pub converted: PathBuf,
    /// The synthesized adversary.
    pub adversary: PathBuf,
    /// The state-space export.
    pub states: PathBuf,
    /// The transition export.
    pub transitions: PathBuf,
    /// The label export.
    pub labels: PathBuf,
}

impl RoundPaths {
    /// The standard layout under an output directory.
    pub fn new(output_dir: &Path) -> Self {
        let model = output_dir.join("hypothesis.prism");
        Self {
            converted: model.with_extension("prism.convert"),
            adversary: output_dir.join("adv.tra"),
            states: model.with_extension("prism.sta"),
            transitions: model.with_extension("prism.tra"),
            labels: model.with_extension("prism.lab"),
            model,
        }
    }

    fn all(&self) -> [&Path; 6] {
        [
            &self.model,
            &self.converted,
            &self.adversary,
            &self.states,
            &self.transitions,
            &self.labels,
        ]
    }
}

/// Outcome of one model-checking invocation on a hypothesis.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// A probability was computed and an adversary synthesized.
    Computed {
        /// The probability of the property on the hypothesis under the
        /// optimal adversary.
        value: f64,
        /// The parsed adversary.
        adversary: Adversary,
    },
    /// No probability was computed, e.g. because the property's atomic
    /// propositions do not occur in the model.
    NoProbability,
    /// A probability was computed but no adversary was produced
    /// (typically a degenerate property).
    NoAdversary {
        /// The probability reported without an adversary.
        value: f64,
    },
    /// The model checker failed or its exports were malformed.
    Failure,
}

/// The model-checking boundary of the oracle.
///
/// Implementations emit the hypothesis into `paths`, run the external
/// checker, and parse its exports back; all failures fold into
/// [`CheckOutcome`] so the oracle can degrade instead of aborting.
pub trait ModelChecker {
    /// Checks the property on the hypothesis and synthesizes an optimal
    /// adversary.
    fn synthesize(&mut self, hypothesis: &Mdp, paths: &RoundPaths) -> CheckOutcome;
}

/// Which frequency comparison extracts counterexamples after a rejected
/// hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyStrategy {
    /// Compare last-step transition probabilities.
    #[default]
    Tail,
    /// Compare whole-trace probabilities.
    WholeTrace,
}

/// Configuration of a [`RefinementOracle`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Directory for per-round artifacts.
    pub output_dir: PathBuf,
    /// Executions per statistical model checking run.
    pub smc_max_exec: usize,
    /// Safety cap on trace length during SMC.
    pub max_trace_len: usize,
    /// Rejection bound for the hypothesis test, also used as the
    /// frequency-deviation bound.
    pub statistical_test_bound: f64,
    /// Reset probability of the random walk at construction.
    pub initial_reset_prob: f64,
    /// Step budget per random-walk equivalence test.
    pub eq_num_steps: usize,
    /// Skip the SMC-based counterexample extraction and hypothesis test,
    /// keeping only classical equivalence testing.
    pub only_classical_eq: bool,
    /// Snapshot every round's artifacts under `rounds/r{N}/`.
    pub save_per_round: bool,
    /// The frequency comparison variant.
    pub frequency_strategy: FrequencyStrategy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            smc_max_exec: 5000,
            max_trace_len: 1000,
            statistical_test_bound: 0.025,
            initial_reset_prob: 0.25,
            eq_num_steps: 2000,
            only_classical_eq: false,
            save_per_round: false,
            frequency_strategy: FrequencyStrategy::Tail,
        }
    }
}

/// The equivalence oracle of the learning loop.
///
/// Owns the SUT, the model-checker boundary, the per-round file paths and
/// the exploration state (round counter, decaying reset probability).
pub struct RefinementOracle<S: Sul, C: ModelChecker> {
    config: OracleConfig,
    paths: RoundPaths,
    alphabet: Vec<Action>,
    sul: S,
    checker: C,
    evaluator: Box<dyn TraceEvaluator>,
    rng: SmallRng,
    rounds: usize,
    reset_prob: f64,
    num_queries: usize,
    num_steps: usize,
    hypothesis_value: Option<f64>,
    learned_strategy: Option<Adversary>,
}

impl<S: Sul, C: ModelChecker> RefinementOracle<S, C> {
    /// Creates an oracle over the given input alphabet.
    ///
    /// Panics if the alphabet is empty or the initial reset probability is
    /// not in `(0, 1]`.
    pub fn new(
        config: OracleConfig,
        alphabet: Vec<Action>,
        sul: S,
        checker: C,
        evaluator: Box<dyn TraceEvaluator>,
        rng: SmallRng,
    ) -> Self {
        assert!(!alphabet.is_empty(), "input alphabet is empty");
        assert!(
            config.initial_reset_prob > 0f64 && config.initial_reset_prob <= 1f64,
            "reset probability must be in (0, 1]"
        );
        if let Err(err) = std::fs::create_dir_all(&config.output_dir) {
            warn!(
                "failed to create output directory {}: {err}",
                config.output_dir.display()
            );
        }
        let paths = RoundPaths::new(&config.output_dir);
        let reset_prob = config.initial_reset_prob;
        Self {
            config,
            paths,
            alphabet,
            sul,
            checker,
            evaluator,
            rng,
            rounds: 0,
            reset_prob,
            num_queries: 0,
            num_steps: 0,
            hypothesis_value: None,
            learned_strategy: None,
        }
    }

    /// Searches for a counterexample to the hypothesis, without a learner
    /// observation table.
    pub fn find_cex(&mut self, hypothesis: &Mdp) -> Result<Option<Trace>, S::Error> {
        self.find_cex_with_table(hypothesis, &NeverBreaking)
    }

    /// Searches for a counterexample to the hypothesis.
    ///
    /// Returns `Ok(None)` both when no counterexample was found and when a
    /// sampled trace broke the observation table (the learner recovers by
    /// processing its own data either way). Only SUT failures are errors.
    pub fn find_cex_with_table(
        &mut self,
        hypothesis: &Mdp,
        table: &dyn ObservationTable,
    ) -> Result<Option<Trace>, S::Error> {
        self.rounds += 1;
        debug!("refinement round {}", self.rounds);
        self.remove_round_artifacts();
        self.hypothesis_value = None;

        let outcome = self.checker.synthesize(hypothesis, &self.paths);
        if self.config.save_per_round {
            self.save_round_artifacts();
            info!(
                "round {}: hypothesis size {}, SUL {} queries / {} steps, equivalence testing {} queries / {} steps",
                self.rounds,
                hypothesis.num_states(),
                self.sul.num_queries(),
                self.sul.num_steps(),
                self.num_queries,
                self.num_steps
            );
        }

        let (value, adversary) = match outcome {
            CheckOutcome::Computed { value, adversary } => (value, adversary),
            CheckOutcome::NoProbability | CheckOutcome::Failure => {
                info!("model checker computed no probability; equivalence testing only");
                return self.random_walk(hypothesis);
            }
            CheckOutcome::NoAdversary { value } => {
                info!("model checker computed {value} but no adversary; equivalence testing only");
                return self.random_walk(hypothesis);
            }
        };
        self.hypothesis_value = Some(value);
        info!("hypothesis probability: {value}");

        let mut smc = StatisticalModelChecker::new(
            &mut self.sul,
            StrategyBridge::new(&adversary),
            self.evaluator.as_ref(),
            Some(table),
            self.config.smc_max_exec,
            self.config.max_trace_len,
            true,
        );
        let smc_outcome = smc.run()?;
        let executed = smc.executed();
        let smc_steps = smc.num_steps();
        let estimate = smc.estimate();
        let p_value = smc.p_value(value);
        let (exec_sample, satisfied_sample) = smc.into_samples();
        self.learned_strategy = Some(adversary);
        info!("SMC executed the SUT for {smc_steps} steps ({executed} queries)");

        if !self.config.only_classical_eq {
            match smc_outcome {
                SmcOutcome::Counterexample(trace) => {
                    info!("counterexample from SMC: {trace}");
                    return Ok(Some(trace));
                }
                SmcOutcome::TableBroken => {
                    info!("observation table is no longer closed and consistent; abandoning round");
                    return Ok(None);
                }
                SmcOutcome::Completed => {}
            }
            if let (Some(estimate), Some(p_value)) = (estimate, p_value) {
                info!("SUT estimate {estimate}, hypothesis {value}, two-sided p-value {p_value}");
                if p_value < self.config.statistical_test_bound {
                    info!("hypothesis rejected; comparing trace frequencies");
                    let cex = match self.config.frequency_strategy {
                        FrequencyStrategy::Tail => compare_frequency_with_tail(
                            &exec_sample,
                            hypothesis,
                            self.config.statistical_test_bound,
                        ),
                        FrequencyStrategy::WholeTrace => compare_frequency(
                            &satisfied_sample,
                            &exec_sample,
                            hypothesis,
                            self.config.statistical_test_bound,
                        ),
                    };
                    if let Some(cex) = cex {
                        info!("counterexample from frequency comparison: {cex}");
                        return Ok(Some(cex));
                    }
                    info!("no counterexample from frequency comparison");
                }
            }
        }

        self.random_walk(hypothesis)
    }

    /// Random-walk equivalence testing, discounting the reset probability
    /// when it comes up empty.
    fn random_walk(&mut self, hypothesis: &Mdp) -> Result<Option<Trace>, S::Error> {
        debug!(
            "random walk over {} steps with reset probability {}",
            self.config.eq_num_steps, self.reset_prob
        );
        let cex = self.walk(hypothesis)?;
        match &cex {
            Some(trace) => info!("counterexample from equivalence testing: {trace}"),
            None => self.discount_reset_prob(),
        }
        Ok(cex)
    }

    fn walk(&mut self, hypothesis: &Mdp) -> Result<Option<Trace>, S::Error> {
        self.sul.reset()?;
        self.num_queries += 1;
        let mut state = hypothesis.initial_state();
        let mut trace = Trace::new();
        for _ in 0..self.config.eq_num_steps {
            if self.rng.random_bool(self.reset_prob) {
                self.sul.reset()?;
                self.num_queries += 1;
                state = hypothesis.initial_state();
                trace.clear();
            }
            let input = self
                .alphabet
                .choose(&mut self.rng)
                .expect("alphabet is nonempty")
                .clone();
            let observation = self.sul.step(&input)?;
            self.num_steps += 1;
            let successor = hypothesis.successor(state, &input, &observation);
            trace.push(input, observation);
            match successor {
                Some((target, _)) => state = target,
                // The SUT produced an observation the hypothesis does not
                // predict from this state.
                None => return Ok(Some(trace)),
            }
        }
        Ok(None)
    }

    fn discount_reset_prob(&mut self) {
        self.reset_prob *= RESET_PROB_DISCOUNT;
        info!("discounted reset probability to {}", self.reset_prob);
    }

    fn remove_round_artifacts(&self) {
        for path in self.paths.all() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove stale artifact {}: {err}", path.display()),
            }
        }
    }

    fn save_round_artifacts(&self) {
        let dir = self
            .config
            .output_dir
            .join("rounds")
            .join(format!("r{}", self.rounds));
        if let Err(err) = std::fs::create_dir_all(&dir) {
            warn!("failed to create {}: {err}", dir.display());
            return;
        }
        info!("saving round artifacts to {}", dir.display());
        for path in self.paths.all() {
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            if let Err(err) = std::fs::copy(path, dir.join(name)) {
                warn!("failed to snapshot {}: {err}", path.display());
            }
        }
    }

    /// Rounds played so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// The current reset probability of the random walk.
    pub fn reset_prob(&self) -> f64 {
        self.reset_prob
    }

    /// The probability the model checker reported for the last hypothesis
    /// it could handle.
    pub fn hypothesis_value(&self) -> Option<f64> {
        self.hypothesis_value
    }

    /// The adversary synthesized in the last successful round.
    pub fn learned_strategy(&self) -> Option<&Adversary> {
        self.learned_strategy.as_ref()
    }

    /// SUT resets spent on equivalence testing.
    pub fn num_queries(&self) -> usize {
        self.num_queries
    }

    /// SUT steps spent on equivalence testing.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// The SUT.
    pub fn sul(&self) -> &S {
        &self.sul
    }

    /// The SUT, mutably.
    pub fn sul_mut(&mut self) -> &mut S {
        &mut self.sul
    }

    /// The per-round file layout.
    pub fn paths(&self) -> &RoundPaths {
        &self.paths
    }

    /// The oracle's configuration.
    pub fn config(&self) -> &OracleConfig {
        &self.config
    }
}
