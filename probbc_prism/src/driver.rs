//! Subprocess driver for the external model checker.
//!
//! PRISM is run once per refinement round with flags to export the
//! synthesized adversary and the state/transition/label files. Its stdout
//! is consumed line by line to completion: `Result:` lines yield property
//! probabilities in order, `Exception in thread`/`Error:` lines mark the
//! run failed. Stderr is redirected to a log file next to the model and
//! scanned afterwards.

use anyhow::Context;
use log::{debug, warn};
use probbc_core::RoundPaths;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

static RESULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Result:\s*(\d+\.\d+)").expect("valid regex"));
static EXCEPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Exception in thread").expect("valid regex"));
static ERROR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Error:").expect("valid regex"));

/// What one model-checker run reported.
#[derive(Debug, Clone, Default)]
pub struct ModelCheckRun {
    /// One probability per property, in output order.
    pub results: Vec<f64>,
    /// Whether an exception, error line, or abnormal exit was seen.
    pub failed: bool,
}

/// Launcher for the external model-checker binary.
#[derive(Debug, Clone)]
pub struct PrismDriver {
    binary: PathBuf,
}

impl PrismDriver {
    /// Creates a driver for the given binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The model-checker binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Checks `properties` on `model`, exporting the adversary and the
    /// state space into `paths`.
    ///
    /// Only failures to launch or talk to the subprocess are errors;
    /// everything the model checker itself reports lands in the returned
    /// [`ModelCheckRun`].
    pub fn evaluate(
        &self,
        model: &Path,
        properties: &Path,
        paths: &RoundPaths,
    ) -> anyhow::Result<ModelCheckRun> {
        // The model checker runs from its install directory, so every path
        // it receives must be absolute.
        let log_path = model.with_extension("log");
        let log_file = File::create(&log_path)
            .with_context(|| format!("failed to create log file {}", log_path.display()))?;
        let mut command = Command::new(&self.binary);
        command
            .arg("-exportadvmdp")
            .arg(absolute(&paths.adversary)?)
            .arg("-exportstates")
            .arg(absolute(&paths.states)?)
            .arg("-exporttrans")
            .arg(absolute(&paths.transitions)?)
            .arg("-exportlabels")
            .arg(absolute(&paths.labels)?)
            .arg(absolute(model)?)
            .arg(absolute(properties)?)
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log_file));
        if let Some(dir) = self.binary.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start model checker {}", self.binary.display()))?;

        let mut run = ModelCheckRun::default();
        let stdout = child.stdout.take().expect("stdout was piped");
        for line in BufReader::new(stdout).lines() {
            let line = line.context("failed to read model checker output")?;
            debug!(target: "prism", "{line}");
            scan_line(&line, &mut run);
        }
        let status = child.wait().context("failed to wait for model checker")?;
        if !status.success() {
            warn!("model checker exited with {status}");
            run.failed = true;
        }
        match std::fs::read_to_string(&log_path) {
            Ok(stderr) => {
                for line in stderr.lines() {
                    debug!(target: "prism", "{line}");
                    scan_line(line, &mut run);
                }
            }
            Err(err) => warn!("failed to read {}: {err}", log_path.display()),
        }
        Ok(run)
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("failed to absolutize path {}", path.display()))
}

fn scan_line(line: &str, run: &mut ModelCheckRun) {
    if EXCEPTION.is_match(line) || ERROR.is_match(line) {
        warn!("model checker: {line}");
        run.failed = true;
    }
    if let Some(captures) = RESULT.captures(line) {
        match captures[1].parse::<f64>() {
            Ok(value) => run.results.push(value),
            Err(err) => warn!("unparsable probability in {line:?}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_results_in_order() {
        let mut run = ModelCheckRun::default();
        scan_line("Building model...", &mut run);
        scan_line("Result: 0.5 (value in the initial state)", &mut run);
        scan_line("Result: 0.25 (value in the initial state)", &mut run);
        assert_eq!(run.results, vec![0.5, 0.25]);
        assert!(!run.failed);
    }

    #[test]
    fn marks_exceptions_and_errors() {
        let mut run = ModelCheckRun::default();
        scan_line("Exception in thread \"main\" java.lang.OutOfMemoryError", &mut run);
        assert!(run.failed);
        let mut run = ModelCheckRun::default();
        scan_line("Error: Could not parse property", &mut run);
        assert!(run.failed);
        // Mid-line mentions do not count.
        let mut run = ModelCheckRun::default();
        scan_line("no Error: here", &mut run);
        assert!(!run.failed);
    }

    #[test]
    fn ignores_integer_results() {
        // The scanner deliberately requires a decimal point.
        let mut run = ModelCheckRun::default();
        scan_line("Result: 1 (value in the initial state)", &mut run);
        assert!(run.results.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn drives_a_fake_model_checker() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let binary = dir.path().join("prism");
        std::fs::write(
            &binary,
            "#!/bin/sh\necho 'Building model...'\necho 'Result: 0.75 (value in the initial state)'\n",
        )?;
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))?;
        let paths = RoundPaths::new(dir.path());
        std::fs::write(&paths.converted, "mdp\n")?;
        let properties = dir.path().join("prop.props");
        std::fs::write(&properties, "Pmax=? [ F \"goal\" ]\n")?;

        let driver = PrismDriver::new(&binary);
        let run = driver.evaluate(&paths.converted, &properties, &paths)?;
        assert_eq!(run.results, vec![0.75]);
        assert!(!run.failed);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn abnormal_exit_is_a_failure() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let binary = dir.path().join("prism");
        std::fs::write(&binary, "#!/bin/sh\necho 'Error: no model' >&2\nexit 1\n")?;
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))?;
        let paths = RoundPaths::new(dir.path());
        std::fs::write(&paths.converted, "mdp\n")?;
        let properties = dir.path().join("prop.props");
        std::fs::write(&properties, "Pmax=? [ F \"goal\" ]\n")?;

        let driver = PrismDriver::new(&binary);
        let run = driver.evaluate(&paths.converted, &properties, &paths)?;
        assert!(run.failed);
        assert!(run.results.is_empty());
        Ok(())
    }
}
