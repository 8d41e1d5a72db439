use std::path::Path;

#[test]
fn loads_the_coin_model() {
    let mdp = probbc::load(Path::new("./tests/coin.json")).unwrap();
    assert_eq!(mdp.num_states(), 3);
    assert_eq!(mdp.input_alphabet(), vec!["flip".to_string()]);
}

#[cfg(unix)]
mod end_to_end {
    use clap::Parser;
    use probbc::Cli;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    // Stands in for PRISM: exports the optimal scheduler for the fair
    // coin and reports the reachability probability of heads.
    const FAKE_PRISM: &str = r#"#!/bin/sh
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
echo 'Result: 0.5 (value in the initial state)'
"#;

    #[test]
    fn validates_the_coin_model() {
        let dir = tempfile::tempdir().unwrap();
        let prism = dir.path().join("prism");
        fs::write(&prism, FAKE_PRISM).unwrap();
        fs::set_permissions(&prism, fs::Permissions::from_mode(0o755)).unwrap();
        let output_dir = dir.path().join("results");

        let cli = Cli::parse_from([
            "probbc",
            "./tests/coin.json",
            "--prism",
            prism.to_str().unwrap(),
            "--target",
            "heads",
            "--horizon",
            "3",
            "--rounds",
            "2",
            "--smc-exec",
            "300",
            "--eq-steps",
            "300",
            "--output-dir",
            output_dir.to_str().unwrap(),
            "--traces",
            "--seed",
            "11",
            "--out",
            "json",
        ]);
        cli.run().unwrap();

        // The generated property, the emitted models and the validation
        // traces are all in place.
        let props = fs::read_to_string(output_dir.join("prop.props")).unwrap();
        assert_eq!(props, "Pmax=? [ F ((\"heads\")) ]\n");
        assert!(output_dir.join("hypothesis.prism").is_file());
        assert!(output_dir.join("hypothesis.prism.convert").is_file());
        assert!(output_dir.join("adv.tra").is_file());
        let successes = fs::read_dir(output_dir.join("traces/successes")).unwrap();
        assert!(successes.count() > 0);
    }
}
