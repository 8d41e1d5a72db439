//! Reader for the model checker's export files.
//!
//! PRISM is invoked with flags to export the reachable state space
//! (`.sta`), the transition matrix (`.tra`), the label valuation (`.lab`)
//! and the synthesized optimal scheduler (`adv.tra`). This module parses
//! the exports back into a [`probbc_core::Adversary`] for the strategy
//! bridge.
//!
//! Observation labels are re-assembled from the label file: the
//! observation of a state is the `__`-join of its true atomic
//! propositions, sorted, with the `init`/`deadlock` bookkeeping labels
//! excluded; a state without propositions is the synthetic start state.

use probbc_core::{Adversary, AdversaryError, AdversaryRow, Observation, START_OBSERVATION};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while reading model-checker exports.
///
/// Every variant means the export is unusable for this round; the caller
/// degrades to equivalence testing instead of aborting the learning run.
#[derive(Debug, Error)]
pub enum ExportError {
    /// An export file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// A line did not parse as the file format prescribes.
    #[error("{path}:{line}: unparsable export row {row:?}")]
    MalformedRow {
        /// The offending file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// The offending line.
        row: String,
    },
    /// The label file marks no state as initial.
    #[error("label export declares no initial state")]
    MissingInitialState,
    /// The label file marks several states as initial.
    #[error("label export declares multiple initial states")]
    AmbiguousInitialState,
    /// The scheduler tables are internally inconsistent.
    #[error(transparent)]
    Adversary(#[from] AdversaryError),
}

struct LabelExport {
    initial: usize,
    observations: HashMap<usize, Observation>,
}

/// Reads the adversary, state and label exports into a scheduler usable by
/// the strategy bridge.
pub fn read_adversary(
    adversary: &Path,
    states: &Path,
    labels: &Path,
) -> Result<Adversary, ExportError> {
    let label_export = parse_labels(labels)?;
    let num_states = parse_states(states)?;
    if label_export.initial >= num_states {
        return Err(ExportError::MalformedRow {
            path: labels.to_path_buf(),
            line: 0,
            row: format!("initial state {} beyond state space", label_export.initial),
        });
    }
    let rows = parse_adversary_rows(adversary, &label_export.observations, num_states)?;
    Ok(Adversary::from_rows(label_export.initial, rows)?)
}

fn read_file(path: &Path) -> Result<String, ExportError> {
    std::fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn malformed(path: &Path, line: usize, row: &str) -> ExportError {
    ExportError::MalformedRow {
        path: path.to_path_buf(),
        line: line + 1,
        row: row.to_string(),
    }
}

/// Parses the `.lab` export: a header declaring label names, then one line
/// per state listing the indices of its true labels.
fn parse_labels(path: &Path) -> Result<LabelExport, ExportError> {
    let content = read_file(path)?;
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let (header_idx, header) = lines.next().ok_or(ExportError::MissingInitialState)?;
    let mut names: HashMap<usize, &str> = HashMap::new();
    for token in header.split_whitespace() {
        let (index, name) = token
            .split_once('=')
            .ok_or_else(|| malformed(path, header_idx, header))?;
        let index: usize = index
            .parse()
            .map_err(|_| malformed(path, header_idx, header))?;
        names.insert(index, name.trim_matches('"'));
    }

    let mut initial = None;
    let mut observations = HashMap::new();
    for (idx, line) in lines {
        let (state, indices) = line
            .split_once(':')
            .ok_or_else(|| malformed(path, idx, line))?;
        let state: usize = state
            .trim()
            .parse()
            .map_err(|_| malformed(path, idx, line))?;
        let mut parts = Vec::new();
        for index in indices.split_whitespace() {
            let index: usize = index.parse().map_err(|_| malformed(path, idx, line))?;
            let name = names
                .get(&index)
                .ok_or_else(|| malformed(path, idx, line))?;
            match *name {
                "init" => {
                    if initial.replace(state).is_some() {
                        return Err(ExportError::AmbiguousInitialState);
                    }
                }
                "deadlock" => {}
                observation => parts.push(observation),
            }
        }
        parts.sort_unstable();
        let observation = if parts.is_empty() {
            START_OBSERVATION.to_string()
        } else {
            parts.join("__")
        };
        observations.insert(state, observation);
    }
    Ok(LabelExport {
        initial: initial.ok_or(ExportError::MissingInitialState)?,
        observations,
    })
}

/// Parses the `.sta` export (a variable-name header, then `id:(values)`
/// rows) and returns the number of states.
fn parse_states(path: &Path) -> Result<usize, ExportError> {
    let content = read_file(path)?;
    let mut num_states = 0;
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('(') {
            continue;
        }
        let (state, values) = line
            .split_once(':')
            .ok_or_else(|| malformed(path, idx, line))?;
        let state: usize = state.parse().map_err(|_| malformed(path, idx, line))?;
        if !(values.trim().starts_with('(') && values.trim().ends_with(')')) {
            return Err(malformed(path, idx, line));
        }
        num_states = num_states.max(state + 1);
    }
    Ok(num_states)
}

/// Parses the adversary export. Rows are `src choice dst prob action` (the
/// five-field MDP form) or `src dst prob action` (the four-field induced
/// chain form); the trailing action label is mandatory because the bridge
/// needs action names. A leading summary line of numbers is skipped.
fn parse_adversary_rows(
    path: &Path,
    observations: &HashMap<usize, Observation>,
    num_states: usize,
) -> Result<Vec<AdversaryRow>, ExportError> {
    let content = read_file(path)?;
    let mut rows = Vec::new();
    let mut header = true;
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if header
            && (2..=3).contains(&fields.len())
            && fields.iter().all(|f| f.parse::<f64>().is_ok())
        {
            header = false;
            continue;
        }
        header = false;
        let (source, target, probability, action) = match fields.as_slice() {
            [source, _choice, target, probability, action] => {
                (*source, *target, *probability, *action)
            }
            [source, target, probability, action] => (*source, *target, *probability, *action),
            _ => return Err(malformed(path, idx, line)),
        };
        let source: usize = source.parse().map_err(|_| malformed(path, idx, line))?;
        let target: usize = target.parse().map_err(|_| malformed(path, idx, line))?;
        let probability: f64 = probability.parse().map_err(|_| malformed(path, idx, line))?;
        if source >= num_states || target >= num_states {
            return Err(malformed(path, idx, line));
        }
        // PRISM only lists states with at least one true label; the rest
        // carry the synthetic start observation.
        let target_observation = observations
            .get(&target)
            .cloned()
            .unwrap_or_else(|| START_OBSERVATION.to_string());
        rows.push(AdversaryRow {
            source,
            action: action.to_string(),
            target,
            probability,
            target_observation,
        });
    }
    Ok(rows)
}
