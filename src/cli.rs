use crate::parser;
use crate::traces::TraceWriter;
use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use probbc_core::{
    BoundedReachability, FrequencyStrategy, MdpSul, OracleConfig, RefinementOracle,
    StatisticalModelChecker, StrategyBridge, Sul, TraceEvaluator, Verdict,
};
use probbc_prism::PrismChecker;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Output {
    /// Human-readable report
    Human,
    /// JSON-serialized report
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Bar {
    /// Fancy Unicode progress bars
    Unicode,
    /// Basic ASCII progress bars
    Ascii,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Frequency {
    /// Compare last-step transition probabilities
    Tail,
    /// Compare whole-trace probabilities
    Whole,
}

#[derive(Serialize)]
struct Report {
    rounds: usize,
    counterexamples: usize,
    hypothesis_value: Option<f64>,
    estimate: Option<f64>,
    p_value: Option<f64>,
    sul_queries: usize,
    sul_steps: usize,
    eq_queries: usize,
    eq_steps: usize,
}

/// A probabilistic black-box model checker based on automata learning
#[derive(Clone, Parser)]
#[deny(missing_docs)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path of the JSON model simulated as the system-under-test
    #[arg(value_hint = clap::ValueHint::FilePath)]
    path: PathBuf,
    /// Path of the PRISM binary
    #[arg(long, default_value = "prism")]
    prism: PathBuf,
    /// PRISM properties file; generated from the targets when omitted
    #[arg(long)]
    props: Option<PathBuf>,
    /// Target observation(s) of the reachability property
    #[arg(short, long = "target", required = true)]
    targets: Vec<String>,
    /// Step horizon of the reachability property
    #[arg(long, default_value = "10")]
    horizon: usize,
    /// Maximum number of refinement rounds
    #[arg(short, long, default_value = "10")]
    rounds: usize,
    /// Executions per statistical model checking run
    #[arg(long, default_value = "5000")]
    smc_exec: usize,
    /// Rejection bound of the statistical test and frequency comparison
    #[arg(long, default_value = "0.025")]
    bound: f64,
    /// Initial reset probability of random-walk equivalence testing
    #[arg(long, default_value = "0.25")]
    reset_prob: f64,
    /// Step budget per random-walk equivalence test
    #[arg(long, default_value = "2000")]
    eq_steps: usize,
    /// Frequency comparison used for counterexample extraction
    #[arg(value_enum, long, default_value = "tail")]
    frequency: Frequency,
    /// Directory for generated files
    #[arg(short, long, default_value = "results")]
    output_dir: PathBuf,
    /// Snapshot every round's artifacts under rounds/
    #[arg(long, default_value = "false")]
    save_rounds: bool,
    /// Saves validation traces in gz-compressed csv format
    #[arg(long = "traces", default_value = "false")]
    traces: bool,
    /// Output format of the report
    #[arg(value_enum, short = 'O', long, default_value = "human")]
    out: Output,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Progress bar during the refinement rounds
    #[arg(value_enum, short, long)]
    bar: Option<Bar>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let mdp = parser::load(&self.path)?;
        let alphabet = mdp.input_alphabet();
        if alphabet.is_empty() {
            bail!("the model enables no input");
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory {}",
                self.output_dir.display()
            )
        })?;
        let props = match &self.props {
            Some(path) => path.clone(),
            None => {
                let path = self.output_dir.join("prop.props");
                std::fs::write(&path, target_formula(&self.targets))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                path
            }
        };

        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let evaluator = BoundedReachability::new(self.targets.iter().cloned(), self.horizon);
        let config = OracleConfig {
            output_dir: self.output_dir.clone(),
            smc_max_exec: self.smc_exec,
            statistical_test_bound: self.bound,
            initial_reset_prob: self.reset_prob,
            eq_num_steps: self.eq_steps,
            save_per_round: self.save_rounds,
            frequency_strategy: match self.frequency {
                Frequency::Tail => FrequencyStrategy::Tail,
                Frequency::Whole => FrequencyStrategy::WholeTrace,
            },
            ..OracleConfig::default()
        };
        let max_trace_len = config.max_trace_len;
        let mut oracle = RefinementOracle::new(
            config,
            alphabet,
            MdpSul::new(mdp.clone(), SmallRng::seed_from_u64(rng.random())),
            PrismChecker::new(self.prism.clone(), props, self.horizon),
            Box::new(evaluator.clone()),
            rng,
        );

        // Validate the model against its own simulation: the refinement
        // oracle treats the model as the hypothesis and the simulator as
        // the black box, so any counterexample is a statistical deviation
        // the model checker's prediction cannot explain.
        let bar = self.progress_bar();
        let mut counterexamples = 0;
        for _ in 0..self.rounds {
            match oracle.find_cex(&mdp)? {
                Some(cex) => {
                    counterexamples += 1;
                    bar.println(format!("counterexample: {cex}"));
                }
                None => {
                    break;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        // Final validation under the last synthesized strategy, as the
        // learning loop performs after convergence.
        let mut estimate = None;
        let mut p_value = None;
        if let Some(adversary) = oracle.learned_strategy().cloned() {
            let hypothesis_value = oracle.hypothesis_value();
            let mut smc = StatisticalModelChecker::new(
                oracle.sul_mut(),
                StrategyBridge::new(&adversary),
                &evaluator,
                None,
                self.smc_exec,
                max_trace_len,
                false,
            );
            smc.run()?;
            estimate = smc.estimate();
            p_value = hypothesis_value.and_then(|value| smc.p_value(value));
            info!(
                "final SMC with {} executions: estimate {estimate:?}",
                smc.executed()
            );
            if self.traces {
                let mut writer = TraceWriter::new(&self.output_dir)?;
                for trace in smc.exec_sample() {
                    let satisfied = evaluator.evaluate(trace) == Verdict::Satisfied;
                    writer.write(trace, satisfied)?;
                }
            }
        }

        let report = Report {
            rounds: oracle.rounds(),
            counterexamples,
            hypothesis_value: oracle.hypothesis_value(),
            estimate,
            p_value,
            sul_queries: oracle.sul().num_queries(),
            sul_steps: oracle.sul().num_steps(),
            eq_queries: oracle.num_queries(),
            eq_steps: oracle.num_steps(),
        };
        match self.out {
            Output::Human => print_report(&report),
            Output::Json => println!(
                "{}",
                serde_json::to_string(&report).context("failed to serialize report")?
            ),
        }
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        let bar = match self.bar {
            None => return ProgressBar::hidden(),
            Some(Bar::Unicode) => ProgressBar::new(self.rounds as u64),
            Some(Bar::Ascii) => {
                let bar = ProgressBar::new(self.rounds as u64);
                bar.set_style(
                    ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                        .expect("valid template")
                        .progress_chars("#>-"),
                );
                bar
            }
        };
        bar.set_message("refinement rounds");
        bar
    }
}

/// The PRISM query for reaching any of the target observations; each
/// observation is the conjunction of its atomic propositions.
fn target_formula(targets: &[String]) -> String {
    let disjuncts = targets
        .iter()
        .map(|target| {
            let parts = target
                .split("__")
                .filter(|part| !part.is_empty())
                .map(|part| format!("\"{part}\""))
                .collect::<Vec<_>>()
                .join(" & ");
            format!("({parts})")
        })
        .collect::<Vec<_>>()
        .join(" | ");
    format!("Pmax=? [ F ({disjuncts}) ]\n")
}

fn print_report(report: &Report) {
    println!("Refinement rounds: {}", report.rounds);
    println!("Counterexamples: {}", report.counterexamples);
    match report.hypothesis_value {
        Some(value) => println!("Hypothesis probability: {value}"),
        None => println!("Hypothesis probability: not computed"),
    }
    match report.estimate {
        Some(estimate) => println!("SUT estimate: {estimate}"),
        None => println!("SUT estimate: no validation run"),
    }
    if let Some(p_value) = report.p_value {
        println!("Two-sided p-value: {p_value}");
    }
    println!(
        "SUL usage: {} queries, {} steps",
        report.sul_queries, report.sul_steps
    );
    println!(
        "Equivalence testing: {} queries, {} steps",
        report.eq_queries, report.eq_steps
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_conjoins_observation_parts() {
        assert_eq!(
            target_formula(&["agree__heads".to_string(), "six".to_string()]),
            "Pmax=? [ F ((\"agree\" & \"heads\") | (\"six\")) ]\n"
        );
    }
}
