//! Integration tests: declaration/evaluation vectors.
//!
//! Each fixture in tests/fixtures/ has:
//! - case.json: inputs, flags (in declaration order) and supplied values
//! - expect.json: either the resolved flag map or the error class and the
//!   step that raised it (a flag name, or `evaluate`)

use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use wafsynth_kernel::{ConditionEngine, ConfigInput, Expr, InputValues};

#[derive(Deserialize)]
struct Case {
    fragment: String,
    inputs: Vec<ConfigInput>,
    flags: Vec<FlagCase>,
    values: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct FlagCase {
    name: String,
    expr: Expr,
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_json(path: &PathBuf) -> Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("failed to parse {}: {e}", path.display()))
}

fn run_case(case: Case) -> Value {
    let mut engine = ConditionEngine::new(case.fragment);
    for input in case.inputs {
        if let Err(e) = engine.add_input(input.clone()) {
            return json!({ "error": e.class(), "at": input.name });
        }
    }
    for flag in case.flags {
        if let Err(e) = engine.declare_flag(&flag.name, flag.expr) {
            return json!({ "error": e.class(), "at": flag.name });
        }
    }
    let values: InputValues = case.values;
    match engine.evaluate(&values) {
        Ok(res) => json!({ "flags": res.flags }),
        Err(e) => json!({ "error": e.class(), "at": "evaluate" }),
    }
}

fn run_fixture(name: &str) {
    let dir = fixtures_dir().join(name);
    let case_path = dir.join("case.json");
    let expected = read_json(&dir.join("expect.json"));
    let case: Case = serde_json::from_value(read_json(&case_path))
        .unwrap_or_else(|e| panic!("bad case {}: {e}", case_path.display()));

    let got = run_case(case);
    assert_eq!(
        got,
        expected,
        "\n\nFixture: {name}\n\nGot:\n{}\n\nExpected:\n{}\n",
        serde_json::to_string_pretty(&got).unwrap(),
        serde_json::to_string_pretty(&expected).unwrap(),
    );
}

#[test]
fn golden_umbrella_flags() {
    run_fixture("golden_umbrella_flags");
}

#[test]
fn golden_partition_arms() {
    run_fixture("golden_partition_arms");
}

#[test]
fn golden_numeric_equality() {
    run_fixture("golden_numeric_equality");
}

#[test]
fn adversarial_forward_reference() {
    run_fixture("adversarial_forward_reference");
}

#[test]
fn adversarial_self_reference() {
    run_fixture("adversarial_self_reference");
}

#[test]
fn adversarial_out_of_domain_value() {
    run_fixture("adversarial_out_of_domain_value");
}

#[test]
fn adversarial_unknown_input() {
    run_fixture("adversarial_unknown_input");
}
