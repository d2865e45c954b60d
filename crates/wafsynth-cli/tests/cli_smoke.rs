use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "wafsynth-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write_config(&self, body: &str) -> PathBuf {
        let path = self.path.join("wafsynth.toml");
        fs::write(&path, body).expect("config should be written");
        path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

const ATHENA_CONFIG: &str = r#"
[stack]
name = "edge-waf"

[inputs]
ActivateHttpFloodProtectionParam = "yes - Amazon Athena log parser"
ActivateScannersProbesProtectionParam = "no"
ActivateBadBotProtectionParam = "yes"
EndpointType = "ALB"
RequestThreshold = 500
"#;

fn run_wafsynth<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_wafsynth");
    Command::new(bin)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("wafsynth command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}):\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn inputs_lists_the_root_registry() {
    let tmp = TempDirGuard::new("inputs");
    let config = tmp.path().join("absent.toml");
    let output = run_wafsynth([
        OsStr::new("inputs"),
        OsStr::new("--json"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["fragment"], "root");
    let names: Vec<&str> = payload["inputs"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|i| i["name"].as_str())
        .collect();
    assert!(names.contains(&"EndpointType"));
    assert!(names.contains(&"WAFRuleKeysTypeParam"));
    assert!(!names.contains(&"ParentStackName"));

    let text = run_wafsynth([
        OsStr::new("inputs"),
        OsStr::new("--fragment"),
        OsStr::new("webacl"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&text);
    assert!(stdout_text(&text).contains("ParentStackName"));
}

#[test]
fn resolve_reports_root_and_child_flags() {
    let tmp = TempDirGuard::new("resolve");
    let config = tmp.write_config(ATHENA_CONFIG);

    let root = run_wafsynth([
        OsStr::new("resolve"),
        OsStr::new("--json"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&root);
    let payload = parse_json_stdout(&root);
    assert_eq!(payload["flags"]["BadBotAthenaWafLogActivated"], true);
    assert_eq!(payload["flags"]["CreateFirehoseAthenaStack"], true);
    assert_eq!(payload["inputs"]["RequestThreshold"], "500");

    let child = run_wafsynth([
        OsStr::new("resolve"),
        OsStr::new("--fragment"),
        OsStr::new("firehose-athena"),
        OsStr::new("--json"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&child);
    let payload = parse_json_stdout(&child);
    assert_eq!(payload["flags"]["HttpFloodAthenaLogParser"], true);
    assert_eq!(payload["flags"]["ALBScannersProbesAthenaLogParser"], false);
}

#[test]
fn resolve_fails_for_an_excluded_child() {
    let tmp = TempDirGuard::new("excluded");
    let config = tmp.path().join("absent.toml");
    let output = run_wafsynth([
        OsStr::new("resolve"),
        OsStr::new("--fragment"),
        OsStr::new("firehose-athena"),
        OsStr::new("--json"),
        OsStr::new("--set"),
        OsStr::new("ActivateHttpFloodProtectionParam=no"),
        OsStr::new("--set"),
        OsStr::new("ActivateScannersProbesProtectionParam=no"),
        OsStr::new("--set"),
        OsStr::new("ActivateBadBotProtectionParam=no"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_failure(&output);
    assert_eq!(parse_json_stdout(&output)["instantiated"], false);
}

#[test]
fn synth_writes_the_artifact_set() {
    let tmp = TempDirGuard::new("synth");
    let config = tmp.write_config(ATHENA_CONFIG);
    let out = tmp.path().join("artifact.json");

    let output = run_wafsynth([
        OsStr::new("synth"),
        OsStr::new("--json"),
        OsStr::new("--out"),
        out.as_os_str(),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&output);
    let summary = parse_json_stdout(&output);
    assert_eq!(summary["ok"], true);
    assert_eq!(summary["stack"], "edge-waf");
    assert_eq!(
        summary["fragments"],
        serde_json::json!(["root", "webacl", "firehose-athena"])
    );

    let artifact: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(artifact["stack"], "edge-waf");
    assert_eq!(artifact["fragments"].as_array().unwrap().len(), 3);

    let again = run_wafsynth([
        OsStr::new("synth"),
        OsStr::new("--json"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_success(&again);
    assert_eq!(parse_json_stdout(&again)["digest"], summary["digest"]);
}

#[test]
fn synth_rejects_an_invalid_combination() {
    let tmp = TempDirGuard::new("invalid");
    let config = tmp.path().join("absent.toml");
    let output = run_wafsynth([
        OsStr::new("synth"),
        OsStr::new("--json"),
        OsStr::new("--set"),
        OsStr::new("AppAccessLogBucket=my-app-logs"),
        OsStr::new("--set"),
        OsStr::new("WAFRuleKeysTypeParam=IP+Custom Header"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_failure(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["error"]["class"], "invalid_config_combination");
    assert!(
        payload["error"]["message"]
            .as_str()
            .unwrap()
            .contains("HTTPFloodRuleCustomHeaderValidation")
    );
}

#[test]
fn drift_check_passes_for_the_shipped_stack() {
    let output = run_wafsynth(["drift-check", "--json", "--config", "no-such-wafsynth.toml"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["boundaries"].as_array().unwrap().len(), 2);
}

#[test]
fn chain_lists_timers_in_order() {
    let output = run_wafsynth(["chain", "--json", "--config", "no-such-wafsynth.toml"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    let chain = &payload["chains"][0];
    assert_eq!(chain["fragment"], "webacl");
    let ops = chain["chain"]["ops"].as_array().unwrap();
    assert_eq!(ops.len(), 12);
    assert_eq!(ops[0], "TimerWhiteV4");
    assert_eq!(ops[6], "TimerWhiteV6");

    let text = run_wafsynth(["chain", "--config", "no-such-wafsynth.toml"]);
    assert_success(&text);
    assert!(stdout_text(&text).contains("TimerBlackV4 (after TimerWhiteV4)"));
}

#[test]
fn empty_stack_name_is_a_config_error() {
    let tmp = TempDirGuard::new("config");
    let config = tmp.write_config("[stack]\nname = \"\"\n");
    let output = run_wafsynth([
        OsStr::new("chain"),
        OsStr::new("--config"),
        config.as_os_str(),
    ]);
    assert_failure(&output);
    assert!(String::from_utf8_lossy(&output.stderr).contains("stack.name"));
}
