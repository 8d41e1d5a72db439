//! PRISM interop for the **probbc** model checker.
//!
//! Implements the refinement oracle's model-checking boundary with the
//! [PRISM](https://www.prismmodelchecker.org/) probabilistic model
//! checker: the hypothesis MDP is serialized into PRISM's module syntax,
//! augmented with a bounded step counter, checked as a subprocess, and the
//! exported optimal adversary is parsed back for the strategy bridge.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod driver;
mod emit;
mod export;

pub use driver::{ModelCheckRun, PrismDriver};
pub use emit::{add_step_counter, mdp_to_prism};
pub use export::{ExportError, read_adversary};

use anyhow::Context;
use log::{error, warn};
use probbc_core::{CheckOutcome, Mdp, ModelChecker, RoundPaths};
use std::path::PathBuf;

/// Module name given to emitted hypothesis models.
const MODULE_NAME: &str = "hypothesis";

/// PRISM-backed implementation of the oracle's [`ModelChecker`] boundary.
///
/// All failures (subprocess, exit status, malformed exports) fold into
/// [`CheckOutcome`], so the oracle degrades to equivalence testing instead
/// of aborting the learning run.
pub struct PrismChecker {
    driver: PrismDriver,
    properties: PathBuf,
    horizon: usize,
}

impl PrismChecker {
    /// Creates a checker invoking `binary` on `properties`, bounding every
    /// hypothesis with a step counter up to `horizon`.
    pub fn new(binary: impl Into<PathBuf>, properties: impl Into<PathBuf>, horizon: usize) -> Self {
        Self {
            driver: PrismDriver::new(binary),
            properties: properties.into(),
            horizon,
        }
    }

    fn try_synthesize(&self, hypothesis: &Mdp, paths: &RoundPaths) -> anyhow::Result<CheckOutcome> {
        let model = mdp_to_prism(hypothesis, MODULE_NAME);
        std::fs::write(&paths.model, &model)
            .with_context(|| format!("failed to write model {}", paths.model.display()))?;
        let converted = add_step_counter(&model, self.horizon);
        std::fs::write(&paths.converted, converted).with_context(|| {
            format!("failed to write converted model {}", paths.converted.display())
        })?;

        let run = self
            .driver
            .evaluate(&paths.converted, &self.properties, paths)?;
        if run.failed {
            return Ok(CheckOutcome::Failure);
        }
        let Some(&value) = run.results.first() else {
            return Ok(CheckOutcome::NoProbability);
        };
        if !paths.adversary.is_file() {
            return Ok(CheckOutcome::NoAdversary { value });
        }
        match read_adversary(&paths.adversary, &paths.states, &paths.labels) {
            Ok(adversary) => Ok(CheckOutcome::Computed { value, adversary }),
            Err(err) => {
                warn!("malformed model-checker export: {err}");
                Ok(CheckOutcome::Failure)
            }
        }
    }
}

impl ModelChecker for PrismChecker {
    fn synthesize(&mut self, hypothesis: &Mdp, paths: &RoundPaths) -> CheckOutcome {
        match self.try_synthesize(hypothesis, paths) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("model checking failed: {err:#}");
                CheckOutcome::Failure
            }
        }
    }
}
