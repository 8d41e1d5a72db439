//! Parser for the JSON model format describing benchmark SUTs.
//!
//! A model file names its states, gives each an observation and, per
//! input, a map from successor states to probabilities:
//!
//! ```json
//! {
//!     "initial": "start",
//!     "states": {
//!         "start": {
//!             "observation": "____start",
//!             "transitions": { "flip": { "heads": 0.5, "tails": 0.5 } }
//!         },
//!         "heads": { "observation": "heads", "transitions": { "flip": { "heads": 1.0 } } },
//!         "tails": { "observation": "tails", "transitions": { "flip": { "tails": 1.0 } } }
//!     }
//! }
//! ```

use anyhow::{Context, anyhow};
use log::info;
use probbc_core::{Mdp, MdpBuilder, StateId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
struct ModelFile {
    initial: String,
    states: BTreeMap<String, StateDecl>,
}

#[derive(Debug, Clone, Deserialize)]
struct StateDecl {
    observation: String,
    #[serde(default)]
    transitions: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Loads an MDP from a JSON model file.
pub fn load(path: &Path) -> anyhow::Result<Mdp> {
    info!(target: "parser", "parsing MDP model file '{}'", path.display());
    let reader = File::open(path)
        .with_context(|| format!("failed to open model file '{}'", path.display()))?;
    let model: ModelFile = serde_json::de::from_reader(reader)
        .with_context(|| format!("failed to parse model file '{}'", path.display()))?;
    build(model).with_context(|| format!("ill-formed model in '{}'", path.display()))
}

fn build(model: ModelFile) -> anyhow::Result<Mdp> {
    let initial = model
        .states
        .get(&model.initial)
        .ok_or_else(|| anyhow!("initial state {:?} is not declared", model.initial))?;
    let mut builder = MdpBuilder::new(initial.observation.clone());

    // The initial state takes id 0; the others follow in declaration
    // order.
    let mut ids: BTreeMap<&str, StateId> = BTreeMap::new();
    ids.insert(&model.initial, builder.initial_state());
    for (name, decl) in &model.states {
        if name != &model.initial {
            ids.insert(name, builder.add_state(decl.observation.clone()));
        }
    }

    for (name, decl) in &model.states {
        let source = ids[name.as_str()];
        for (input, successors) in &decl.transitions {
            let successors = successors
                .iter()
                .map(|(target, &probability)| {
                    ids.get(target.as_str())
                        .map(|&id| (id, probability))
                        .ok_or_else(|| {
                            anyhow!(
                                "transition of {name:?} on {input:?} targets undeclared state {target:?}"
                            )
                        })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            builder
                .add_distribution(source, input.clone(), successors)
                .with_context(|| format!("transition of {name:?} on {input:?}"))?;
        }
    }
    Ok(builder.build())
}
