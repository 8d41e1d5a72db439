#![cfg(unix)]

use probbc_core::{CheckOutcome, Mdp, MdpBuilder, ModelChecker, RoundPaths, START_OBSERVATION};
use probbc_prism::PrismChecker;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn coin_mdp() -> Mdp {
    let mut builder = MdpBuilder::new(START_OBSERVATION);
    let initial = builder.initial_state();
    let heads = builder.add_state("heads");
    let tails = builder.add_state("tails");
    builder
        .add_distribution(initial, "flip", vec![(heads, 0.5), (tails, 0.5)])
        .unwrap();
    builder
        .add_distribution(heads, "flip", vec![(heads, 1.0)])
        .unwrap();
    builder
        .add_distribution(tails, "flip", vec![(tails, 1.0)])
        .unwrap();
    builder.build()
}

fn fake_prism(dir: &Path, script: &str) -> std::path::PathBuf {
    let binary = dir.join("prism");
    fs::write(&binary, script).unwrap();
    fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
    binary
}

// Stands in for PRISM: exports a scheduler for the fair coin and reports
// the reachability probability of heads.
const SYNTHESIZING: &str = r#"#!/bin/sh
cat > "$2" <<'EOF'
3 3
0 0 1 0.5 flip
0 0 2 0.5 flip
1 0 1 1 flip
2 0 2 1 flip
EOF
cat > "$4" <<'EOF'
(loc,c)
0:(0,0)
1:(1,1)
2:(2,1)
EOF
cat > "$8" <<'EOF'
0="init" 1="heads" 2="tails"
0: 0
1: 1
2: 2
EOF
echo 'Building model...'
echo 'Result: 0.5 (value in the initial state)'
"#;

#[test]
fn synthesizes_an_adversary() {
    let dir = tempfile::tempdir().unwrap();
    let properties = dir.path().join("prop.props");
    fs::write(&properties, "Pmax=? [ F \"heads\" ]\n").unwrap();
    let binary = fake_prism(dir.path(), SYNTHESIZING);
    let paths = RoundPaths::new(dir.path());

    let mut checker = PrismChecker::new(binary, properties, 5);
    match checker.synthesize(&coin_mdp(), &paths) {
        CheckOutcome::Computed { value, adversary } => {
            assert_eq!(value, 0.5);
            assert_eq!(adversary.initial_state(), 0);
            assert_eq!(adversary.action(0), Some("flip"));
            assert_eq!(adversary.successors(0, "flip", "heads").unwrap(), &[(1, 1.0)]);
        }
        outcome => panic!("expected a synthesized adversary, got {outcome:?}"),
    }
    // Both the plain and the step-counter-augmented model were emitted.
    assert!(paths.model.is_file());
    let converted = fs::read_to_string(&paths.converted).unwrap();
    assert!(converted.contains("c : [0..5] init 0;"));
}

#[test]
fn silent_checker_means_no_probability() {
    let dir = tempfile::tempdir().unwrap();
    let properties = dir.path().join("prop.props");
    fs::write(&properties, "Pmax=? [ F \"missing\" ]\n").unwrap();
    let binary = fake_prism(dir.path(), "#!/bin/sh\necho 'Building model...'\n");
    let paths = RoundPaths::new(dir.path());

    let mut checker = PrismChecker::new(binary, properties, 5);
    assert!(matches!(
        checker.synthesize(&coin_mdp(), &paths),
        CheckOutcome::NoProbability
    ));
}

#[test]
fn missing_adversary_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let properties = dir.path().join("prop.props");
    fs::write(&properties, "Pmax=? [ F \"heads\" ]\n").unwrap();
    let binary = fake_prism(
        dir.path(),
        "#!/bin/sh\necho 'Result: 1.0 (value in the initial state)'\n",
    );
    let paths = RoundPaths::new(dir.path());

    let mut checker = PrismChecker::new(binary, properties, 5);
    assert!(matches!(
        checker.synthesize(&coin_mdp(), &paths),
        CheckOutcome::NoAdversary { value } if value == 1.0
    ));
}

#[test]
fn crashing_checker_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let properties = dir.path().join("prop.props");
    fs::write(&properties, "Pmax=? [ F \"heads\" ]\n").unwrap();
    let binary = fake_prism(
        dir.path(),
        "#!/bin/sh\necho 'Exception in thread \"main\" java.lang.OutOfMemoryError'\nexit 1\n",
    );
    let paths = RoundPaths::new(dir.path());

    let mut checker = PrismChecker::new(binary, properties, 5);
    assert!(matches!(
        checker.synthesize(&coin_mdp(), &paths),
        CheckOutcome::Failure
    ));
}
