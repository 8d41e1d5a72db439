//! Emitter for the model checker's module syntax.
//!
//! A hypothesis MDP becomes a single module with a `loc` state variable:
//! one guarded command per state and input, probabilistic updates for the
//! successor distribution, and one atomic proposition per observation
//! part. A second pass injects a bounded step counter so that unbounded
//! reachability queries on the converted model answer bounded-reachability
//! questions about the hypothesis.

use probbc_core::{Mdp, START_OBSERVATION};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Serializes the MDP into model-checker syntax.
///
/// Observations are split on `__` into atomic propositions, each emitted
/// as a `label` over the states whose observation contains it; the
/// synthetic start observation is emitted without propositions, so reading
/// the exports back re-assembles the original labels.
pub fn mdp_to_prism(mdp: &Mdp, name: &str) -> String {
    let mut propositions: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
    for (state, observation) in mdp.states() {
        if observation == START_OBSERVATION {
            continue;
        }
        for part in observation.split("__").filter(|part| !part.is_empty()) {
            propositions.entry(part).or_default().insert(state.index());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "mdp");
    let _ = writeln!(out);
    let _ = writeln!(out, "module {name}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "\tloc : [0..{}] init {};",
        mdp.num_states() - 1,
        mdp.initial_state().index()
    );
    let _ = writeln!(out);
    for (state, _) in mdp.states() {
        for (input, successors) in mdp.outgoing(state) {
            let updates = successors
                .iter()
                .map(|(target, p)| format!("{p}:(loc'={})", target.index()))
                .collect::<Vec<_>>()
                .join(" + ");
            let _ = writeln!(out, "\t[{input}] loc={} -> {updates};", state.index());
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "endmodule");
    let _ = writeln!(out);
    for (proposition, states) in propositions {
        let guard = states
            .iter()
            .map(|state| format!("loc={state}"))
            .collect::<Vec<_>>()
            .join("|");
        let _ = writeln!(out, "label \"{proposition}\" = {guard};");
    }
    out
}

/// Rewrites an emitted model to track the number of steps taken.
///
/// Declares a counter `c` bounded by `horizon`, conjoins `c<horizon` to
/// every command guard and `(c'=c+1)` to every update, so the converted
/// model deadlocks once the horizon is exhausted.
pub fn add_step_counter(model: &str, horizon: usize) -> String {
    let mut out = String::with_capacity(model.len() + 128);
    for line in model.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("loc :") {
            out.push_str(line);
            out.push('\n');
            let _ = writeln!(out, "\tc : [0..{horizon}] init 0;");
        } else if trimmed.starts_with('[') {
            let Some((head, updates)) = line.split_once("->") else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            let updates = updates
                .trim()
                .trim_end_matches(';')
                .split(" + ")
                .map(|update| format!("{update}&(c'=c+1)"))
                .collect::<Vec<_>>()
                .join(" + ");
            let _ = writeln!(out, "{} & c<{horizon} -> {updates};", head.trim_end());
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
