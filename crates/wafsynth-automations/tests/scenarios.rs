use serde_json::Value;
use wafsynth_automations::constants::{
    ATHENA_LOG_PARSER, FIREHOSE_ATHENA, KEYS_IP_CUSTOM_HEADER, LAMBDA_LOG_PARSER, NO,
    RATE_BASED_RULE, ROOT, WEBACL, YES,
};
use wafsynth_automations::flags::{self, BAD_BOT_ARMS};
use wafsynth_automations::webacl::{TIMER_CHAIN, timer_order};
use wafsynth_automations::{firehose_athena, security_automations};
use wafsynth_kernel::bridge::enumerate_inputs;
use wafsynth_kernel::expr::{and, flag, not};
use wafsynth_kernel::{
    FlagCatalog, InputValues, OpState, Synthesis, SynthError, ThrottleRun, synthesize,
};

const HTTP_FLOOD: &str = "ActivateHttpFloodProtectionParam";
const SCANNERS: &str = "ActivateScannersProbesProtectionParam";
const BAD_BOT: &str = "ActivateBadBotProtectionParam";
const REPUTATION: &str = "ActivateReputationListsProtectionParam";

fn values(pairs: &[(&str, &str)]) -> InputValues {
    let mut values = InputValues::from([(
        "AppAccessLogBucket".to_string(),
        "my-app-logs".to_string(),
    )]);
    for (k, v) in pairs {
        values.insert(k.to_string(), v.to_string());
    }
    values
}

fn synth(pairs: &[(&str, &str)]) -> Synthesis {
    let stack = security_automations().expect("stack builds");
    synthesize(&stack, &values(pairs)).expect("synthesis succeeds")
}

fn rule_priorities(synthesis: &Synthesis) -> Vec<i64> {
    let web_acl = synthesis
        .fragment(WEBACL)
        .and_then(|f| f.unit("WAFWebACL"))
        .and_then(|u| u.properties.as_ref())
        .expect("web ACL rendered");
    web_acl["Rules"]
        .as_array()
        .expect("rules list")
        .iter()
        .filter_map(|r| r["Priority"].as_i64())
        .collect()
}

#[test]
fn athena_flood_parser_routes_bad_bot_through_athena() {
    let synthesis = synth(&[
        (HTTP_FLOOD, ATHENA_LOG_PARSER),
        (SCANNERS, NO),
        (BAD_BOT, YES),
    ]);
    let root = synthesis.fragment(ROOT).unwrap();
    assert_eq!(root.flags["BadBotAthenaWafLogActivated"], true);
    assert_eq!(root.flags["BadBotWafLogActivated"], false);
    assert_eq!(root.flags["CreateFirehoseAthenaStack"], true);
    assert!(root.unit("LambdaAthenaWafLogParser").is_some());
    assert!(root.unit("LambdaAthenaAppLogParser").is_none());

    let firehose = synthesis.fragment(FIREHOSE_ATHENA).unwrap();
    assert!(firehose.unit("GlueWafAccessLogsTable").is_some());
    assert!(firehose.unit("ALBGlueAppAccessLogsTable").is_none());
    assert!(firehose.outputs.contains_key("WAFLogAthenaQueryWorkGroup"));
}

#[test]
fn empty_custom_header_is_rejected() {
    let stack = security_automations().unwrap();
    let err = synthesize(
        &stack,
        &values(&[("WAFRuleKeysTypeParam", KEYS_IP_CUSTOM_HEADER)]),
    )
    .unwrap_err();
    match err {
        SynthError::InvalidConfigCombination { rule, inputs, .. } => {
            assert_eq!(rule, "HTTPFloodRuleCustomHeaderValidation");
            assert!(inputs.contains("WAFRuleKeysTypeParam=IP+Custom Header"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let ok = synthesize(
        &stack,
        &values(&[
            ("WAFRuleKeysTypeParam", KEYS_IP_CUSTOM_HEADER),
            ("CustomHeaderNameParam", "X-Forwarded-For"),
        ]),
    );
    assert!(ok.is_ok());
}

#[test]
fn defaults_need_an_app_access_log_bucket() {
    let stack = security_automations().unwrap();
    let err = synthesize(&stack, &InputValues::new()).unwrap_err();
    assert_eq!(err.class(), "invalid_config_combination");
    assert!(err.to_string().contains("AppAccessLogBucketRequired"));
}

#[test]
fn rate_based_rule_needs_a_usable_threshold() {
    let stack = security_automations().unwrap();
    let err = synthesize(
        &stack,
        &values(&[(HTTP_FLOOD, RATE_BASED_RULE), ("RequestThreshold", "5")]),
    )
    .unwrap_err();
    assert!(matches!(err, SynthError::InvalidConfigCombination { .. }));

    // The lambda parser has no such floor.
    let ok = synthesize(
        &stack,
        &values(&[(HTTP_FLOOD, LAMBDA_LOG_PARSER), ("RequestThreshold", "5")]),
    );
    assert!(ok.is_ok());
}

#[test]
fn bad_bot_arms_partition_the_bad_bot_cases() {
    let stack = security_automations().unwrap();
    let root = &stack.fragment(ROOT).unwrap().engine;
    let assignments = enumerate_inputs(root, &[HTTP_FLOOD, SCANNERS, BAD_BOT]);
    assert_eq!(assignments.len(), 4 * 3 * 2);
    for values in assignments {
        let res = root.evaluate(&values).unwrap();
        let on = BAD_BOT_ARMS
            .iter()
            .filter(|arm| res.flag(arm) == Some(true))
            .count();
        let expected = usize::from(res.flag("BadBotProtectionActivated") == Some(true));
        assert_eq!(on, expected, "{values:?}");
    }
}

#[test]
fn umbrella_flags_cover_their_members() {
    let implications = [
        ("HttpFloodLambdaLogParser", "HttpFloodProtectionActivated"),
        ("HttpFloodAthenaLogParser", "HttpFloodProtectionActivated"),
        ("HttpFloodProtectionActivated", "HttpFloodProtectionLogParserActivated"),
        ("BadBotLambdaLogParserActivated", "HttpFloodProtectionLogParserActivated"),
        ("HttpFloodProtectionLogParserActivated", "LogParser"),
        ("ScannersProbesProtectionActivated", "LogParser"),
        ("AthenaLogParser", "CreateFirehoseAthenaStack"),
        ("HttpFloodProtectionLogParserActivated", "CreateFirehoseAthenaStack"),
        ("HttpFloodProtectionLogParserActivated", "CreateS3LoggingBucket"),
        ("SNSEmail", "IPRetentionPeriod"),
    ];
    let stack = security_automations().unwrap();
    let root = &stack.fragment(ROOT).unwrap().engine;
    for values in enumerate_inputs(
        root,
        &[HTTP_FLOOD, SCANNERS, BAD_BOT, "AppAccessLogBucketLoggingStatusParam"],
    ) {
        let res = root.evaluate(&values).unwrap();
        for (member, umbrella) in implications {
            if res.flag(member) == Some(true) {
                assert_eq!(res.flag(umbrella), Some(true), "{member} without {umbrella}");
            }
        }
    }
}

#[test]
fn synthesis_is_deterministic() {
    let pairs = [(HTTP_FLOOD, LAMBDA_LOG_PARSER), (REPUTATION, NO)];
    let first = synth(&pairs);
    let second = synth(&pairs);
    assert_eq!(first, second);
    assert_eq!(first.digest().unwrap(), second.digest().unwrap());

    let other = synth(&[(HTTP_FLOOD, ATHENA_LOG_PARSER), (REPUTATION, NO)]);
    assert_ne!(first.digest().unwrap(), other.digest().unwrap());
}

#[test]
fn shipped_stack_has_no_boundary_drift() {
    let stack = security_automations().unwrap();
    let reports = stack.check_drift().unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(!report.flags_checked.is_empty());
        assert!(report.assignments > 0);
    }
    let firehose = reports.iter().find(|r| r.child == FIREHOSE_ATHENA).unwrap();
    assert!(
        firehose
            .flags_checked
            .contains(&"HttpFloodProtectionLogParserActivated".to_string())
    );
}

/// The shipped catalog with one formula edited, as a hand-maintained child
/// copy would drift.
fn drifted_catalog() -> FlagCatalog {
    flags::catalog()
        .entries()
        .iter()
        .fold(FlagCatalog::new(), |catalog, entry| {
            let expr = if entry.name == "BadBotLambdaLogParserActivated" {
                and([
                    not(flag("HttpFloodLambdaLogParser")),
                    not(flag("ScannersProbesLambdaLogParser")),
                    flag("BadBotProtectionActivated"),
                ])
            } else {
                entry.expr.clone()
            };
            catalog.define(&entry.name, expr, &entry.description)
        })
}

#[test]
fn edited_child_formula_is_reported_as_drift() {
    let mut stack = security_automations().unwrap();
    let drifted = firehose_athena::fragment(&drifted_catalog()).unwrap();
    let slot = stack
        .fragments
        .iter_mut()
        .find(|f| f.id() == FIREHOSE_ATHENA)
        .unwrap();
    *slot = drifted;

    match stack.check_drift().unwrap_err() {
        SynthError::BoundaryDrift {
            child,
            flag,
            parent_value,
            child_value,
            ..
        } => {
            assert_eq!(child, FIREHOSE_ATHENA);
            assert!(
                flag == "BadBotLambdaLogParserActivated"
                    || flag == "HttpFloodProtectionLogParserActivated",
                "{flag}"
            );
            assert_ne!(parent_value, child_value);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn disabled_protections_leave_no_trace() {
    let synthesis = synth(&[
        (HTTP_FLOOD, NO),
        (SCANNERS, NO),
        (BAD_BOT, NO),
        (REPUTATION, NO),
    ]);
    assert!(synthesis.fragment(FIREHOSE_ATHENA).is_none());

    let root = synthesis.fragment(ROOT).unwrap();
    assert!(root.unit("FirehoseAthenaStack").is_none());
    assert!(root.unit("WafLogBucket").is_none());
    assert!(root.unit("LogParser").is_none());
    assert!(!root.outputs.contains_key("BadBotHoneypotEndpoint"));
    let policies = root
        .unit("LambdaRoleCustomResource")
        .and_then(|u| u.properties.as_ref())
        .map(|p| p["Policies"].clone())
        .unwrap();
    let names: Vec<&str> = policies
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["PolicyName"].as_str())
        .collect();
    assert_eq!(names, vec!["WAFAccess"]);

    let webacl = synthesis.fragment(WEBACL).unwrap();
    assert!(webacl.unit("WAFHttpFloodSetV4").is_none());
    assert!(webacl.unit("WAFWhitelistSetV4").is_some());
    assert!(!webacl.outputs.contains_key("WAFHttpFloodSetV4Arn"));
    assert!(webacl.outputs.contains_key("WAFBlacklistSetV6Arn"));

    let priorities = rule_priorities(&synthesis);
    assert!(priorities.contains(&0));
    assert!(priorities.contains(&1));
    for gone in [3, 5, 17, 18, 19, 20] {
        assert!(!priorities.contains(&gone), "rule {gone} emitted");
    }
}

#[test]
fn rate_based_rule_replaces_the_flood_ip_set_rule() {
    let synthesis = synth(&[(HTTP_FLOOD, RATE_BASED_RULE)]);
    let priorities = rule_priorities(&synthesis);
    assert!(priorities.contains(&19));
    assert!(!priorities.contains(&18));
}

#[test]
fn parent_reads_only_outputs_the_child_produced() {
    let synthesis = synth(&[(HTTP_FLOOD, LAMBDA_LOG_PARSER), (BAD_BOT, YES)]);
    let root = synthesis.fragment(ROOT).unwrap();
    let env = root
        .unit("LogParser")
        .and_then(|u| u.properties.as_ref())
        .map(|p| p["Environment"].clone())
        .unwrap();
    assert_eq!(
        env["IP_SET_ID_HTTP_FLOODV4"],
        Value::String("${WebACLStack.Outputs.WAFHttpFloodSetV4Arn}".to_string())
    );
    assert_eq!(env["BAD_BOT_LAMBDA_WAF_ENABLED"], Value::String("true".to_string()));
    assert!(env.get("IP_SET_ID_REPUTATIONV4").is_none());
}

#[test]
fn timers_release_ip_sets_one_at_a_time() {
    let stack = security_automations().unwrap();
    let webacl = stack.fragment(WEBACL).unwrap();
    let chain = webacl
        .chains
        .iter()
        .find(|c| c.name == TIMER_CHAIN)
        .unwrap();
    assert_eq!(chain.ops, timer_order());
    assert_eq!(chain.ops.len(), 12);

    let mut run = ThrottleRun::new(chain);
    assert_eq!(run.schedule_next().as_deref(), Some("TimerWhiteV4"));
    assert_eq!(run.schedule_next(), None);
    run.complete("TimerWhiteV4").unwrap();
    assert_eq!(run.schedule_next().as_deref(), Some("TimerBlackV4"));
    run.fail("TimerBlackV4").unwrap();
    assert!(run.is_blocked());
    assert_eq!(run.schedule_next(), None);
    assert_eq!(run.state("TimerWhiteV6"), Some(OpState::Pending));

    let synthesis = synth(&[]);
    let timer = synthesis
        .fragment(WEBACL)
        .and_then(|f| f.unit("TimerWhiteV6"))
        .unwrap();
    assert!(timer.depends_on.contains(&"TimerBadBotV4".to_string()));
}
