use qf_core::{FieldIndex, InvariantOracle};
use qf_oracle::command::parse_line;
use qf_oracle::{CommandOracle, OracleSpec};

fn field(d: u64) -> FieldIndex {
    FieldIndex::new(d).expect("squarefree index")
}

#[test]
fn parses_five_and_six_column_lines() {
    let inv = parse_line(field(2), "8,1,1 + 1*sqrt(2),0.8813735870195429,1.4142135623730951")
        .expect("five columns");
    assert_eq!(inv.discriminant, 8);
    assert_eq!(inv.fundamental_unit, "1 + 1*sqrt(2)");

    let inv = parse_line(field(6), "6,24,1,\"5 + 2*sqrt(6)\",2.29,2.44").expect("six columns");
    assert_eq!(inv.class_number, 1);
    assert_eq!(inv.fundamental_unit, "5 + 2*sqrt(6)");
}

#[test]
fn rejects_mismatched_echo_and_bad_values() {
    let err = parse_line(field(6), "7,28,1,u,2.7,2.6").unwrap_err();
    assert_eq!(err.code, "oracle-echo");
    let err = parse_line(field(6), "24,one,u,2.7,2.6").unwrap_err();
    assert_eq!(err.context.get("column"), Some(&"hK".to_string()));
    let err = parse_line(field(6), "24,1").unwrap_err();
    assert_eq!(err.code, "oracle-parse");
}

#[cfg(unix)]
#[test]
fn runs_external_program_per_field() {
    let oracle = CommandOracle::new(
        "/bin/sh",
        vec![
            "-c".to_string(),
            "echo \"$1,-$1,1,1,1.0,1.0\"".to_string(),
            "oracle".to_string(),
        ],
    );
    let inv = oracle.invariants(field(11)).expect("command oracle");
    assert_eq!(inv.discriminant, -11);
    assert_eq!(inv.fundamental_unit, "1");
    assert!(oracle.name().starts_with("command:"));
}

#[cfg(unix)]
#[test]
fn failing_program_reports_field() {
    let oracle = CommandOracle::new(
        "/bin/sh",
        vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
    );
    let err = oracle.invariants(field(7)).unwrap_err();
    assert_eq!(err.info().code, "oracle-exit");
    assert_eq!(err.info().context.get("d"), Some(&"7".to_string()));
    assert_eq!(err.info().context.get("stderr"), Some(&"boom".to_string()));
}

#[test]
fn oracle_spec_parses_from_yaml() {
    let spec: OracleSpec = serde_yaml::from_str("kind: native").expect("native");
    assert_eq!(spec, OracleSpec::Native);
    assert_eq!(spec.build().expect("build").name(), "native");

    let spec: OracleSpec =
        serde_yaml::from_str("kind: command\nprogram: sage\nargs: [invariants.sage]")
            .expect("command");
    assert!(matches!(spec, OracleSpec::Command { ref args, .. } if args.len() == 1));

    let empty = OracleSpec::Command {
        program: "".into(),
        args: Vec::new(),
    };
    assert!(empty.build().is_err());
}
