//! The webacl fragment: IP sets, their creation timers, the Web ACL and
//! the outputs the root reads back.

use crate::constants::{
    BAD_BOT_LABEL, BAD_BOT_PROD_STAGE, BAD_BOT_STAGE, IP_SET_GROUPS, IpSetGroup, IpVersion,
    MANAGED_RULE_GROUPS, ManagedRuleGroup, SOLUTION_VERSION, TIME_WINDOWS, TIMER_SECONDS, WEBACL,
    ip_set_group,
};
use crate::flags::webacl_flags;
use crate::inputs;
use serde_json::json;
use wafsynth_kernel::expr::{eq, flag};
use wafsynth_kernel::{
    Choice, ConditionEngine, Expr, FlagCatalog, FragmentSpec, OutputSpec, Result, ThrottleChain,
    UnitSpec,
};

/// Name of the chain serializing IP set creation.
pub const TIMER_CHAIN: &str = "ipset-timers";

const INPUTS: [&str; 17] = [
    "ActivateSqlInjectionProtectionParam",
    "SqlInjectionProtectionSensitivityLevelParam",
    "ActivateCrossSiteScriptingProtectionParam",
    "ActivateHttpFloodProtectionParam",
    "ActivateScannersProbesProtectionParam",
    "ActivateReputationListsProtectionParam",
    "ActivateBadBotProtectionParam",
    "RequestThreshold",
    "RegionScope",
    "ParentStackName",
    "GlueAccessLogsDatabase",
    "GlueAppAccessLogsTable",
    "GlueWafAccessLogsTable",
    "LogLevel",
    "WAFRuleKeysTypeParam",
    "CustomHeaderNameParam",
    "TimeWindowThresholdParam",
];

/// Timer units in creation order: every V4 set, then every V6 set.
pub fn timer_order() -> Vec<String> {
    IpVersion::ALL
        .iter()
        .flat_map(|&v| IP_SET_GROUPS.iter().map(move |g| g.timer_id(v)))
        .collect()
}

fn group_condition(group: &IpSetGroup) -> Expr {
    group.flag.map(flag).unwrap_or(Expr::True)
}

fn empty() -> Choice {
    Choice::literal(json!({}))
}

fn stack_sub(suffix: &str) -> Choice {
    Choice::sub(&format!("${{ParentStackName}}{suffix}"))
}

fn visibility(metric: &str) -> Choice {
    Choice::map([
        ("SampledRequestsEnabled", Choice::boolean(true)),
        ("CloudWatchMetricsEnabled", Choice::boolean(true)),
        ("MetricName", stack_sub(metric)),
    ])
}

fn rule_entries(
    name: &str,
    priority: i64,
    action: &str,
    statement: Choice,
) -> Vec<(String, Choice)> {
    vec![
        ("Name".to_string(), stack_sub(name)),
        ("Priority".to_string(), Choice::number(priority)),
        ("Action".to_string(), Choice::map([(action, empty())])),
        ("VisibilityConfig".to_string(), visibility(name)),
        ("Statement".to_string(), statement),
    ]
}

fn rule(name: &str, priority: i64, action: &str, statement: Choice) -> Choice {
    Choice::map(rule_entries(name, priority, action, statement))
}

fn any_of<I: IntoIterator<Item = Choice>>(statements: I) -> Choice {
    Choice::map([(
        "OrStatement",
        Choice::map([("Statements", Choice::list(statements))]),
    )])
}

fn ip_sets_statement(group: &IpSetGroup) -> Choice {
    any_of(IpVersion::ALL.map(|v| {
        Choice::map([(
            "IPSetReferenceStatement",
            Choice::map([("Arn", Choice::attr(&group.set_id(v), "Arn"))]),
        )])
    }))
}

fn managed_rule(group: &ManagedRuleGroup) -> Choice {
    Choice::when(
        flag(group.flag),
        Choice::map([
            (
                "Name",
                Choice::text(&format!("AWS-{}", group.rule_name)),
            ),
            ("Priority", Choice::number(group.priority)),
            ("OverrideAction", Choice::literal(json!({ "None": {} }))),
            (
                "VisibilityConfig",
                Choice::literal(json!({
                    "SampledRequestsEnabled": true,
                    "CloudWatchMetricsEnabled": true,
                    "MetricName": format!("MetricFor{}", group.metric_suffix()),
                })),
            ),
            (
                "Statement",
                Choice::literal(json!({
                    "ManagedRuleGroupStatement": {
                        "VendorName": "AWS",
                        "Name": group.rule_name,
                    }
                })),
            ),
        ]),
    )
}

fn transforms() -> Choice {
    Choice::literal(json!([
        { "Priority": 1, "Type": "URL_DECODE" },
        { "Priority": 2, "Type": "HTML_ENTITY_DECODE" },
    ]))
}

/// CONTINUE, MATCH or NO_MATCH, picked by the protection's mode flags.
fn oversize_handling(protection: &str) -> Choice {
    let mode = |suffix: &str| flag(&format!("{protection}{suffix}"));
    Choice::select(
        mode("ContinueActivated"),
        Choice::text("CONTINUE"),
        Choice::select(
            mode("MatchActivated"),
            Choice::text("MATCH"),
            Choice::select(
                mode("NoMatchActivated"),
                Choice::text("NO_MATCH"),
                Choice::text("CONTINUE"),
            ),
        ),
    )
}

fn inspected_fields(protection: &str, headers: &[&str]) -> Vec<Choice> {
    let mut fields = vec![
        Choice::literal(json!({ "QueryString": {} })),
        Choice::map([(
            "Body",
            Choice::map([("OversizeHandling", oversize_handling(protection))]),
        )]),
        Choice::literal(json!({ "UriPath": {} })),
    ];
    fields.extend(
        headers
            .iter()
            .map(|h| Choice::literal(json!({ "SingleHeader": { "Name": h } }))),
    );
    fields
}

fn sql_injection_rule() -> Choice {
    let protection = "SqlInjectionProtection";
    let statements = inspected_fields(protection, &["authorization", "cookie"])
        .into_iter()
        .map(|field| {
            Choice::map([(
                "SqliMatchStatement",
                Choice::map([
                    ("FieldToMatch", field),
                    ("TextTransformations", transforms()),
                    (
                        "SensitivityLevel",
                        Choice::input("SqlInjectionProtectionSensitivityLevelParam"),
                    ),
                ]),
            )])
        });
    Choice::when(
        flag("SqlInjectionProtectionActivated"),
        rule("SqlInjectionRule", 15, "Block", any_of(statements)),
    )
}

fn cross_site_scripting_rule() -> Choice {
    let protection = "CrossSiteScriptingProtection";
    let statements = inspected_fields(protection, &["cookie"])
        .into_iter()
        .map(|field| {
            Choice::map([(
                "XssMatchStatement",
                Choice::map([
                    ("FieldToMatch", field),
                    ("TextTransformations", transforms()),
                ]),
            )])
        });
    Choice::when(
        flag("CrossSiteScriptingProtectionActivated"),
        rule("XssRule", 16, "Block", any_of(statements)),
    )
}

/// Aggregation keys besides the source IP, one branch per key type.
fn custom_keys() -> Choice {
    let ip = || Choice::literal(json!({ "IP": {} }));
    Choice::select(
        flag("IsDefaultIP"),
        Choice::Absent,
        Choice::select(
            flag("IsCustomHeaderSelected"),
            Choice::list([
                Choice::map([(
                    "Header",
                    Choice::map([
                        ("Name", Choice::input("CustomHeaderNameParam")),
                        ("TextTransformations", transforms()),
                    ]),
                )]),
                ip(),
            ]),
            Choice::select(
                flag("IsUriPathSelected"),
                Choice::list([
                    Choice::map([(
                        "UriPath",
                        Choice::map([("TextTransformations", transforms())]),
                    )]),
                    ip(),
                ]),
                Choice::when(
                    flag("IsHttpMethodSelected"),
                    Choice::list([Choice::literal(json!({ "HTTPMethod": {} })), ip()]),
                ),
            ),
        ),
    )
}

/// Evaluation window in seconds for the chosen window in minutes.
pub fn evaluation_window() -> Choice {
    TIME_WINDOWS
        .iter()
        .rev()
        .fold(Choice::Absent, |otherwise, (minutes, seconds)| {
            Choice::select(
                eq("TimeWindowThresholdParam", &minutes.to_string()),
                Choice::number(*seconds),
                otherwise,
            )
        })
}

fn rate_based_rule() -> Choice {
    let statement = Choice::map([(
        "RateBasedStatement",
        Choice::map([
            (
                "AggregateKeyType",
                Choice::select(
                    flag("IsDefaultIP"),
                    Choice::text("IP"),
                    Choice::text("CUSTOM_KEYS"),
                ),
            ),
            ("CustomKeys", custom_keys()),
            ("EvaluationWindowSec", evaluation_window()),
            ("Limit", Choice::input("RequestThreshold")),
        ]),
    )]);
    Choice::when(
        flag("HttpFloodProtectionRateBasedRuleActivated"),
        rule("HttpFloodRateBasedRule", 19, "Block", statement),
    )
}

fn bad_bot_filter_rule() -> Choice {
    let starts_with = |stage: &str| {
        Choice::literal(json!({
            "ByteMatchStatement": {
                "FieldToMatch": { "UriPath": {} },
                "PositionalConstraint": "STARTS_WITH",
                "SearchString": format!("/{stage}"),
                "TextTransformations": [{ "Type": "URL_DECODE", "Priority": 0 }],
            }
        }))
    };
    let mut entries = rule_entries(
        "BadBotRuleFilter",
        20,
        "Block",
        any_of([starts_with(BAD_BOT_PROD_STAGE), starts_with(BAD_BOT_STAGE)]),
    );
    entries.push((
        "RuleLabels".to_string(),
        Choice::literal(json!([{ "Name": BAD_BOT_LABEL }])),
    ));
    Choice::when(flag("BadBotProtectionActivated"), Choice::map(entries))
}

fn ip_set_rule(unit: &str, name: &str, priority: i64) -> Choice {
    match ip_set_group(unit) {
        Some(group) => Choice::when(
            group_condition(group),
            rule(name, priority, "Block", ip_sets_statement(group)),
        ),
        None => Choice::Absent,
    }
}

fn web_acl() -> UnitSpec {
    let [white, black, ..] = &IP_SET_GROUPS;
    let mut rules = vec![
        rule("WhitelistRule", 0, "Allow", ip_sets_statement(white)),
        rule("BlacklistRule", 1, "Block", ip_sets_statement(black)),
    ];
    rules.extend(MANAGED_RULE_GROUPS.iter().map(managed_rule));
    rules.extend([
        ip_set_rule("WAFHttpFloodSet", "HttpFloodRegularRule", 18),
        rate_based_rule(),
        ip_set_rule("WAFScannersProbesSet", "ScannersAndProbesRule", 17),
        ip_set_rule("WAFReputationListsSet", "IPReputationListsRule", 3),
        ip_set_rule("WAFBadBotSet", "BadBotRule", 5),
        sql_injection_rule(),
        cross_site_scripting_rule(),
        bad_bot_filter_rule(),
    ]);

    let mut unit = UnitSpec::new("WAFWebACL", "AWS::WAFv2::WebACL").props(Choice::map([
        ("Name", Choice::input("ParentStackName")),
        ("Description", Choice::text("Custom WAFWebACL")),
        ("Scope", Choice::input("RegionScope")),
        ("DefaultAction", Choice::literal(json!({ "Allow": {} }))),
        ("VisibilityConfig", visibility("MaliciousRequesters")),
        ("Rules", Choice::list(rules)),
    ]));
    for group in &IP_SET_GROUPS {
        if group.flag.is_none() {
            for v in IpVersion::ALL {
                unit = unit.after(&group.set_id(v));
            }
        }
    }
    unit
}

fn ip_set(group: &IpSetGroup, version: IpVersion) -> UnitSpec {
    UnitSpec::new(&group.set_id(version), "AWS::WAFv2::IPSet")
        .when(group_condition(group))
        .after(&group.timer_id(version))
        .props(Choice::map([
            ("Scope", Choice::sub("${RegionScope}")),
            ("IPAddressVersion", Choice::text(version.address_version())),
            ("Name", Choice::sub(&group.name_template(version))),
            ("Addresses", Choice::list(Vec::new())),
        ]))
}

fn timer_units() -> Vec<UnitSpec> {
    let mut units = vec![
        UnitSpec::new("LambdaRoleCustomTimer", "AWS::IAM::Role").props(Choice::literal(json!({
            "AssumeRolePolicyDocument": { "Service": "lambda.amazonaws.com" },
            "LogGroup": "${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/lambda/*CustomTimer*",
        }))),
        UnitSpec::new("CustomTimer", "AWS::Lambda::Function")
            .after("LambdaRoleCustomTimer")
            .props(Choice::map([
                ("Role", Choice::attr("LambdaRoleCustomTimer", "Arn")),
                (
                    "Environment",
                    Choice::map([
                        ("SECONDS", Choice::text(&TIMER_SECONDS.to_string())),
                        ("LOG_LEVEL", Choice::input("LogLevel")),
                        ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
                    ]),
                ),
            ])),
    ];
    for id in timer_order() {
        units.push(
            UnitSpec::new(&id, "Custom::Timer")
                .after("CustomTimer")
                .props(Choice::map([(
                    "ServiceToken",
                    Choice::attr("CustomTimer", "Arn"),
                )])),
        );
    }
    units
}

fn outputs() -> Vec<OutputSpec> {
    let mut outputs = Vec::new();
    for group in &IP_SET_GROUPS {
        for v in IpVersion::ALL {
            let set = group.set_id(v);
            let condition = group_condition(group);
            outputs.push(
                OutputSpec::new(&format!("{set}Arn"), Choice::attr(&set, "Arn"))
                    .when(condition.clone()),
            );
            outputs.push(
                OutputSpec::new(&format!("{set}Id"), Choice::attr(&set, "Id"))
                    .when(condition.clone()),
            );
            outputs.push(
                OutputSpec::new(
                    &group.name_output(v),
                    Choice::sub(&group.name_template(v)),
                )
                .when(condition),
            );
        }
    }
    outputs.extend([
        OutputSpec::new(
            "GlueAccessLogsDatabase",
            Choice::input("GlueAccessLogsDatabase"),
        ),
        OutputSpec::new(
            "GlueAppAccessLogsTable",
            Choice::input("GlueAppAccessLogsTable"),
        ),
        OutputSpec::new(
            "GlueWafAccessLogsTable",
            Choice::input("GlueWafAccessLogsTable"),
        ),
        OutputSpec::new("WAFWebACL", Choice::reference("WAFWebACL")),
        OutputSpec::new("WAFWebACLArn", Choice::attr("WAFWebACL", "Arn")),
        OutputSpec::new("WAFWebACLMetricName", stack_sub("MaliciousRequesters")),
        OutputSpec::new(
            "IPReputationListsMetricName",
            stack_sub("IPReputationListsRule"),
        ),
        OutputSpec::new("Version", Choice::text(SOLUTION_VERSION)),
        OutputSpec::new("CustomTimerFunctionName", Choice::reference("CustomTimer")),
    ]);
    outputs
}

pub fn fragment(catalog: &FlagCatalog) -> Result<FragmentSpec> {
    let mut engine = ConditionEngine::new(WEBACL);
    let managed: Vec<&str> = MANAGED_RULE_GROUPS.iter().map(|g| g.param).collect();
    inputs::declare(&mut engine, &managed)?;
    inputs::declare(&mut engine, &INPUTS)?;
    catalog.declare_into(&mut engine, &webacl_flags())?;

    let mut spec = FragmentSpec::new(engine);
    spec.units.extend(timer_units());
    for v in IpVersion::ALL {
        spec.units
            .extend(IP_SET_GROUPS.iter().map(|g| ip_set(g, v)));
    }
    spec.units.push(web_acl());
    spec.outputs = outputs();
    spec.add_chain(ThrottleChain::new(TIMER_CHAIN, timer_order(), TIMER_SECONDS))?;
    Ok(spec)
}
