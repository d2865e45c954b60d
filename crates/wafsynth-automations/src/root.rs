//! The root fragment: every user input, the 32 root flags, the deployment
//! rules and the units that live beside the two children.

use crate::constants::{
    BAD_BOT_PROD_STAGE, BAD_BOT_STAGE, FIREHOSE_ATHENA, FIREHOSE_ATHENA_STACK,
    IP_SET_GROUPS, IpVersion, KEYS_IP_CUSTOM_HEADER, LOG_LEVEL, MANAGED_RULE_GROUPS, ROOT,
    SCOPE_CLOUDFRONT, SCOPE_REGIONAL, SOLUTION_VERSION, WEBACL, WEBACL_STACK, ip_set_group,
};
use crate::flags::ROOT_FLAGS;
use crate::inputs::root_inputs;
use serde_json::json;
use wafsynth_kernel::expr::{at_least, eq, flag, ne};
use wafsynth_kernel::{
    AssertionRule, Choice, ConditionEngine, FlagCatalog, FragmentBoundary, FragmentSpec,
    OutputSpec, Result, UnitSpec,
};

/// Inputs the webacl child receives verbatim.
const WEBACL_MIRRORED: [&str; 10] = [
    "ActivateSqlInjectionProtectionParam",
    "SqlInjectionProtectionSensitivityLevelParam",
    "ActivateCrossSiteScriptingProtectionParam",
    "ActivateHttpFloodProtectionParam",
    "ActivateScannersProbesProtectionParam",
    "ActivateReputationListsProtectionParam",
    "ActivateBadBotProtectionParam",
    "RequestThreshold",
    "WAFRuleKeysTypeParam",
    "CustomHeaderNameParam",
];

const FIREHOSE_MIRRORED: [&str; 9] = [
    "ActivateHttpFloodProtectionParam",
    "ActivateScannersProbesProtectionParam",
    "EndpointType",
    "AppAccessLogBucket",
    "ActivateBadBotProtectionParam",
    "ErrorThreshold",
    "RequestThreshold",
    "WAFBlockPeriod",
    "TimeWindowThresholdParam",
];

fn yes_no(name: &str) -> Choice {
    Choice::select(flag(name), Choice::text("yes"), Choice::text("no"))
}

fn true_false(name: &str) -> Choice {
    Choice::select(flag(name), Choice::text("true"), Choice::text("false"))
}

fn region_scope() -> Choice {
    Choice::select(
        flag("AlbEndpoint"),
        Choice::text(SCOPE_REGIONAL),
        Choice::text(SCOPE_CLOUDFRONT),
    )
}

fn log_type() -> Choice {
    Choice::select(
        flag("AlbEndpoint"),
        Choice::text("alb"),
        Choice::text("cloudfront"),
    )
}

fn webacl_output(name: &str) -> Choice {
    Choice::attr(WEBACL_STACK, &format!("Outputs.{name}"))
}

fn firehose_output(name: &str) -> Choice {
    Choice::attr(FIREHOSE_ATHENA_STACK, &format!("Outputs.{name}"))
}

fn service_token(function: &str) -> (&'static str, Choice) {
    ("ServiceToken", Choice::attr(function, "Arn"))
}

fn lambda_role(id: &str, gate: &str, statements: Choice) -> UnitSpec {
    UnitSpec::new(id, "AWS::IAM::Role")
        .when(flag(gate))
        .props(Choice::map([
            (
                "AssumeRolePolicyDocument",
                Choice::literal(json!({ "Service": "lambda.amazonaws.com" })),
            ),
            ("Policies", statements),
        ]))
}

fn policy(name: &str, resource: Choice) -> Choice {
    Choice::map([
        ("PolicyName", Choice::text(name)),
        ("Resource", resource),
    ])
}

fn function(id: &str, role: &str, environment: Choice) -> UnitSpec {
    UnitSpec::new(id, "AWS::Lambda::Function")
        .after(role)
        .props(Choice::map([
            ("Role", Choice::attr(role, "Arn")),
            ("Environment", environment),
        ]))
}

/// `IP_SET_ID_<KEY>V4`, `IP_SET_NAME_<KEY>V6` and so on for one IP set
/// group, read back from the webacl child and present only under `gate`.
fn ip_set_environment(unit: &str, key: &str, gate: &str) -> Vec<(String, Choice)> {
    let Some(group) = ip_set_group(unit) else {
        return Vec::new();
    };
    let mut vars = Vec::new();
    for v in IpVersion::ALL {
        vars.push((
            format!("IP_SET_ID_{key}{}", v.suffix()),
            Choice::when(flag(gate), webacl_output(&format!("{}Arn", group.set_id(v)))),
        ));
        vars.push((
            format!("IP_SET_NAME_{key}{}", v.suffix()),
            Choice::when(flag(gate), webacl_output(&group.name_output(v))),
        ));
    }
    vars
}

fn requirement_units() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("LambdaRoleHelper", "AWS::IAM::Role").props(Choice::literal(json!({
            "AssumeRolePolicyDocument": { "Service": "lambda.amazonaws.com" },
        }))),
        function(
            "Helper",
            "LambdaRoleHelper",
            Choice::map([
                ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
                ("SCOPE", region_scope()),
                ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
            ]),
        ),
        UnitSpec::new("CheckRequirements", "Custom::CheckRequirements")
            .after("Helper")
            .props(Choice::map([
                service_token("Helper"),
                ("AthenaLogParser", yes_no("AthenaLogParser")),
                (
                    "HttpFloodProtectionRateBasedRuleActivated",
                    yes_no("HttpFloodProtectionRateBasedRuleActivated"),
                ),
                (
                    "HttpFloodProtectionLogParserActivated",
                    yes_no("HttpFloodProtectionLogParserActivated"),
                ),
                (
                    "ProtectionActivatedScannersProbes",
                    yes_no("ScannersProbesProtectionActivated"),
                ),
                ("AppAccessLogBucket", Choice::input("AppAccessLogBucket")),
                ("Region", Choice::reference("AWS::Region")),
                ("EndpointType", Choice::input("EndpointType")),
                ("RequestThreshold", Choice::input("RequestThreshold")),
            ])),
        UnitSpec::new("CreateUniqueID", "Custom::CreateUUID")
            .after("Helper")
            .props(Choice::map([service_token("Helper")])),
        UnitSpec::new("CreateDeliveryStreamName", "Custom::CreateDeliveryStreamName")
            .when(flag("HttpFloodProtectionLogParserActivated"))
            .after("Helper")
            .props(Choice::map([
                service_token("Helper"),
                ("StackName", Choice::reference("AWS::StackName")),
            ])),
        UnitSpec::new("CreateGlueDatabaseName", "Custom::CreateGlueDatabaseName")
            .when(flag("AthenaLogParser"))
            .after("Helper")
            .props(Choice::map([
                service_token("Helper"),
                ("StackName", Choice::reference("AWS::StackName")),
            ])),
    ]
}

fn bucket_units() -> Vec<UnitSpec> {
    let encryption = || {
        Choice::literal(json!({
            "ServerSideEncryptionConfiguration": [
                { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
            ]
        }))
    };
    vec![
        UnitSpec::new("AccessLoggingBucket", "AWS::S3::Bucket")
            .when(flag("CreateS3LoggingBucket"))
            .props(Choice::map([
                ("BucketEncryption", encryption()),
                ("OwnershipControls", Choice::literal(json!({ "ObjectOwnership": "ObjectWriter" }))),
            ])),
        UnitSpec::new("WafLogBucket", "AWS::S3::Bucket")
            .when(flag("HttpFloodProtectionLogParserActivated"))
            .after("AccessLoggingBucket")
            .props(Choice::map([
                ("BucketEncryption", encryption()),
                (
                    "LoggingConfiguration",
                    Choice::map([
                        (
                            "DestinationBucketName",
                            Choice::reference("AccessLoggingBucket"),
                        ),
                        ("LogFilePrefix", Choice::text("WAF_Logs/")),
                    ]),
                ),
            ])),
    ]
}

fn custom_resource_units() -> Vec<UnitSpec> {
    let policies = Choice::list([
        Choice::when(
            flag("HttpFloodProtectionLogParserActivated"),
            policy("S3AccessGeneralWafLog", Choice::attr("WafLogBucket", "Arn")),
        ),
        Choice::when(
            flag("ScannersProbesLambdaLogParser"),
            policy(
                "S3AppAccessPut",
                Choice::sub("arn:${AWS::Partition}:s3:::${AppAccessLogBucket}/*"),
            ),
        ),
        Choice::when(
            flag("HttpFloodLambdaLogParser"),
            policy("S3WafAccessPut", Choice::attr("WafLogBucket", "Arn")),
        ),
        Choice::when(
            flag("CustomResourceLambdaAccess"),
            policy(
                "LambdaAccess",
                Choice::sub("arn:${AWS::Partition}:lambda:${AWS::Region}:${AWS::AccountId}:function:*"),
            ),
        ),
        Choice::when(
            flag("HttpFloodProtectionLogParserActivated"),
            policy(
                "WAFLogsAccess",
                firehose_output("FirehoseWAFLogsDeliveryStreamArn"),
            ),
        ),
        Choice::when(
            flag("ScannersProbesProtectionActivated"),
            policy(
                "S3BucketLoggingAccess",
                Choice::sub("arn:${AWS::Partition}:s3:::${AppAccessLogBucket}"),
            ),
        ),
        policy("WAFAccess", webacl_output("WAFWebACLArn")),
    ]);

    vec![
        UnitSpec::new("LambdaRoleCustomResource", "AWS::IAM::Role").props(Choice::map([
            (
                "AssumeRolePolicyDocument",
                Choice::literal(json!({ "Service": "lambda.amazonaws.com" })),
            ),
            ("Policies", policies),
        ])),
        function(
            "CustomResource",
            "LambdaRoleCustomResource",
            Choice::map([
                ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
                ("SCOPE", region_scope()),
                ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
            ]),
        ),
        UnitSpec::new("ConfigureAWSWAFLogs", "Custom::ConfigureAWSWAFLogs")
            .when(flag("HttpFloodProtectionLogParserActivated"))
            .after(FIREHOSE_ATHENA_STACK)
            .props(Choice::map([
                service_token("CustomResource"),
                ("WAFWebACLArn", webacl_output("WAFWebACLArn")),
                (
                    "DeliveryStreamArn",
                    firehose_output("FirehoseWAFLogsDeliveryStreamArn"),
                ),
            ])),
        UnitSpec::new("ConfigureWafLogBucket", "Custom::ConfigureWafLogBucket")
            .when(flag("HttpFloodProtectionLogParserActivated"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("WafLogBucket", Choice::reference("WafLogBucket")),
                (
                    "LogParser",
                    Choice::when(flag("LogParser"), Choice::attr("LogParser", "Arn")),
                ),
                ("HttpFloodLambdaLogParser", yes_no("HttpFloodLambdaLogParser")),
                (
                    "BadBotLambdaLogParser",
                    yes_no("BadBotLambdaLogParserActivated"),
                ),
                ("HttpFloodAthenaLogParser", yes_no("HttpFloodAthenaLogParser")),
            ])),
    ]
}

fn log_parser_units() -> Vec<UnitSpec> {
    let schedule = Choice::select(
        flag("IsAthenaQueryRunEveryMinute"),
        Choice::text("rate(1 minute)"),
        Choice::sub("rate(${AthenaQueryRunTimeScheduleParam} minutes)"),
    );

    let mut environment: Vec<(String, Choice)> = [
        ("BAD_BOT_LAMBDA_WAF_ENABLED", true_false("BadBotWafLogActivated")),
        (
            "BAD_BOT_LAMBDA_ACCESS_LOG_ENABLED",
            true_false("BadBotLambdaAccessLogActivated"),
        ),
        (
            "BAD_BOT_ATHENA_WAF_ENABLED",
            true_false("BadBotAthenaWafLogActivated"),
        ),
        (
            "BAD_BOT_ATHENA_ACCESS_LOG_ENABLED",
            true_false("BadBotAthenaAccessLogActivated"),
        ),
        ("BAD_BOT_LOG_PARSER", true_false("BadBotLambdaLogParserActivated")),
        (
            "APP_ACCESS_LOG_BUCKET",
            Choice::when(
                flag("ScannersProbesProtectionActivated"),
                Choice::input("AppAccessLogBucket"),
            ),
        ),
        (
            "WAF_ACCESS_LOG_BUCKET",
            Choice::when(
                flag("HttpFloodProtectionLogParserActivated"),
                Choice::reference("WafLogBucket"),
            ),
        ),
        ("UUID", Choice::attr("CreateUniqueID", "UUID")),
        ("REGION", Choice::reference("AWS::Region")),
        ("SCOPE", region_scope()),
        ("LOG_TYPE", log_type()),
        ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
        ("STACK_NAME", Choice::reference("AWS::StackName")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    environment.extend(ip_set_environment(
        "WAFHttpFloodSet",
        "HTTP_FLOOD",
        "HttpFloodProtectionActivated",
    ));
    environment.extend(ip_set_environment(
        "WAFScannersProbesSet",
        "SCANNERS_PROBES",
        "ScannersProbesProtectionActivated",
    ));
    environment.extend(ip_set_environment(
        "WAFBadBotSet",
        "BAD_BOT",
        "BadBotProtectionActivated",
    ));
    environment.extend(
        [
            ("WAF_BLOCK_PERIOD", Choice::input("WAFBlockPeriod")),
            ("ERROR_THRESHOLD", Choice::input("ErrorThreshold")),
            ("REQUEST_THRESHOLD", Choice::input("RequestThreshold")),
            (
                "REQUEST_THRESHOLD_BY_COUNTRY",
                Choice::input("RequestThresholdByCountryParam"),
            ),
            (
                "HTTP_FLOOD_ATHENA_GROUP_BY",
                Choice::input("HTTPFloodAthenaQueryGroupByParam"),
            ),
            (
                "ATHENA_QUERY_RUN_SCHEDULE",
                Choice::input("AthenaQueryRunTimeScheduleParam"),
            ),
            (
                "BAD_BOT_URLS",
                Choice::text(&format!("{BAD_BOT_PROD_STAGE}|{BAD_BOT_STAGE}")),
            ),
            ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v)),
    );

    let athena_rule = |id: &str, gate: &str, target: Choice| {
        UnitSpec::new(id, "AWS::Events::Rule")
            .when(flag(gate))
            .props(Choice::map([
                ("ScheduleExpression", schedule.clone()),
                (
                    "Targets",
                    Choice::list([Choice::map([
                        ("Arn", Choice::attr("LogParser", "Arn")),
                        ("Id", Choice::text("LogParser")),
                        ("Input", target),
                    ])]),
                ),
            ]))
    };

    vec![
        lambda_role(
            "LambdaRoleLogParser",
            "LogParser",
            Choice::list([
                Choice::when(
                    flag("ScannersProbesProtectionActivated"),
                    policy(
                        "LogParserAppAccessLogBucket",
                        Choice::sub("arn:${AWS::Partition}:s3:::${AppAccessLogBucket}/*"),
                    ),
                ),
                Choice::when(
                    flag("HttpFloodProtectionLogParserActivated"),
                    policy("LogParserWafLogBucket", Choice::attr("WafLogBucket", "Arn")),
                ),
                Choice::when(
                    flag("AthenaLogParser"),
                    policy(
                        "AthenaQueries",
                        firehose_output("GlueAccessLogsDatabase"),
                    ),
                ),
            ]),
        ),
        function("LogParser", "LambdaRoleLogParser", Choice::map(environment))
            .when(flag("LogParser")),
        athena_rule(
            "LambdaAthenaAppLogParser",
            "ScannersProbesAthenaLogParser",
            Choice::map([
                ("resourceType", Choice::text("LambdaAthenaAppLogParser")),
                (
                    "glueAccessLogsDatabase",
                    firehose_output("GlueAccessLogsDatabase"),
                ),
                ("accessLogBucket", Choice::input("AppAccessLogBucket")),
                (
                    "glueAppAccessLogsTable",
                    firehose_output("GlueAppAccessLogsTable"),
                ),
                (
                    "athenaWorkGroup",
                    firehose_output("WAFAppAccessLogAthenaQueryWorkGroup"),
                ),
            ]),
        ),
        athena_rule(
            "LambdaAthenaWafLogParser",
            "HttpFloodAthenaLogParser",
            Choice::map([
                ("resourceType", Choice::text("LambdaAthenaWAFLogParser")),
                (
                    "glueAccessLogsDatabase",
                    firehose_output("GlueAccessLogsDatabase"),
                ),
                ("accessLogBucket", Choice::reference("WafLogBucket")),
                (
                    "glueWafAccessLogsTable",
                    firehose_output("GlueWafAccessLogsTable"),
                ),
                ("athenaWorkGroup", firehose_output("WAFLogAthenaQueryWorkGroup")),
            ]),
        ),
        UnitSpec::new("LambdaInvokePermissionAppLogParserS3", "AWS::Lambda::Permission")
            .when(flag("LogParser"))
            .props(Choice::map([
                ("FunctionName", Choice::attr("LogParser", "Arn")),
                ("Action", Choice::text("lambda:InvokeFunction")),
                ("Principal", Choice::text("s3.amazonaws.com")),
                ("SourceAccount", Choice::reference("AWS::AccountId")),
            ])),
        UnitSpec::new("GenerateWafLogParserConfFile", "Custom::GenerateWafLogParserConfFile")
            .when(flag("HttpFloodLambdaLogParser"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("StackName", Choice::reference("AWS::StackName")),
                ("WafAccessLogBucket", Choice::reference("WafLogBucket")),
                ("RequestThreshold", Choice::input("RequestThreshold")),
                ("WAFBlockPeriod", Choice::input("WAFBlockPeriod")),
            ])),
        UnitSpec::new("GenerateAppLogParserConfFile", "Custom::GenerateAppLogParserConfFile")
            .when(flag("ScannersProbesLambdaLogParser"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("StackName", Choice::reference("AWS::StackName")),
                ("AppAccessLogBucket", Choice::input("AppAccessLogBucket")),
                ("ErrorThreshold", Choice::input("ErrorThreshold")),
                ("WAFBlockPeriod", Choice::input("WAFBlockPeriod")),
            ])),
        UnitSpec::new("LogsForPartition", "AWS::Lambda::Function")
            .when(flag("ScannersProbesAthenaLogParser"))
            .after("LambdaRoleCustomResource")
            .props(Choice::map([
                ("Role", Choice::attr("LambdaRoleCustomResource", "Arn")),
                (
                    "Environment",
                    Choice::map([
                        (
                            "KEEP_ORIGINAL_DATA",
                            Choice::input("KeepDataInOriginalS3Location"),
                        ),
                        ("ENDPOINT", Choice::input("EndpointType")),
                        ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
                    ]),
                ),
            ])),
        UnitSpec::new("ConfigureAppAccessLogBucket", "Custom::ConfigureAppAccessLogBucket")
            .when(flag("ScannersProbesProtectionActivated"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("AppAccessLogBucket", Choice::input("AppAccessLogBucket")),
                (
                    "AppAccessLogBucketPrefix",
                    Choice::input("AppAccessLogBucketPrefixParam"),
                ),
                ("LogParser", Choice::attr("LogParser", "Arn")),
                (
                    "ScannersProbesLambdaLogParser",
                    yes_no("ScannersProbesLambdaLogParser"),
                ),
                (
                    "ScannersProbesAthenaLogParser",
                    yes_no("ScannersProbesAthenaLogParser"),
                ),
                (
                    "MoveS3LogsForPartition",
                    Choice::when(
                        flag("ScannersProbesAthenaLogParser"),
                        Choice::attr("LogsForPartition", "Arn"),
                    ),
                ),
                (
                    "AccessLoggingBucket",
                    Choice::when(
                        flag("TurnOnAppAccessLogBucketLogging"),
                        Choice::reference("AccessLoggingBucket"),
                    ),
                ),
            ])),
    ]
}

fn athena_partition_units() -> Vec<UnitSpec> {
    vec![
        lambda_role(
            "LambdaRoleAddAthenaPartitions",
            "AthenaLogParser",
            Choice::list([policy(
                "AddAthenaPartitionsForAppAccessLog",
                firehose_output("GlueAccessLogsDatabase"),
            )]),
        ),
        function(
            "AddAthenaPartitions",
            "LambdaRoleAddAthenaPartitions",
            Choice::map([("LOG_LEVEL", Choice::text(LOG_LEVEL))]),
        )
        .when(flag("AthenaLogParser")),
        UnitSpec::new("CustomAddAthenaPartitions", "Custom::AddAthenaPartitions")
            .when(flag("AthenaLogParser"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("AddAthenaPartitionsLambda", Choice::reference("AddAthenaPartitions")),
                (
                    "ResourceType",
                    Choice::text("CustomResource"),
                ),
                (
                    "GlueAccessLogsDatabase",
                    firehose_output("GlueAccessLogsDatabase"),
                ),
                (
                    "AppAccessLogBucket",
                    Choice::when(
                        flag("ScannersProbesAthenaLogParser"),
                        Choice::input("AppAccessLogBucket"),
                    ),
                ),
                (
                    "GlueAppAccessLogsTable",
                    Choice::when(
                        flag("ScannersProbesAthenaLogParser"),
                        firehose_output("GlueAppAccessLogsTable"),
                    ),
                ),
                (
                    "GlueWafAccessLogsTable",
                    Choice::when(
                        flag("HttpFloodAthenaLogParser"),
                        firehose_output("GlueWafAccessLogsTable"),
                    ),
                ),
                (
                    "WafLogBucket",
                    Choice::when(
                        flag("HttpFloodAthenaLogParser"),
                        Choice::reference("WafLogBucket"),
                    ),
                ),
                (
                    "AthenaWorkGroup",
                    firehose_output("WAFAddPartitionAthenaQueryWorkGroup"),
                ),
            ])),
    ]
}

fn reputation_list_units() -> Vec<UnitSpec> {
    let gate = "ReputationListsProtectionActivated";
    let mut environment: Vec<(String, Choice)> =
        ip_set_environment("WAFReputationListsSet", "REPUTATION", gate);
    environment.extend(
        [
            ("SCOPE", region_scope()),
            ("LOG_TYPE", log_type()),
            ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
            ("STACK_NAME", Choice::reference("AWS::StackName")),
            (
                "IPREPUTATIONLIST_METRICNAME",
                webacl_output("IPReputationListsMetricName"),
            ),
            ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v)),
    );
    vec![
        lambda_role(
            "LambdaRoleReputationListsParser",
            gate,
            Choice::list([policy("WAFGetAndUpdateIPSet", webacl_output("WAFWebACLArn"))]),
        ),
        function(
            "ReputationListsParser",
            "LambdaRoleReputationListsParser",
            Choice::map(environment),
        )
        .when(flag(gate)),
        UnitSpec::new("ReputationListsParserEventsRule", "AWS::Events::Rule")
            .when(flag(gate))
            .props(Choice::map([
                ("ScheduleExpression", Choice::text("rate(1 hour)")),
                (
                    "Targets",
                    Choice::list([Choice::map([
                        ("Arn", Choice::attr("ReputationListsParser", "Arn")),
                        ("Id", Choice::text("ReputationListsParser")),
                    ])]),
                ),
            ])),
        UnitSpec::new("UpdateReputationListsOnLoad", "Custom::UpdateReputationLists")
            .when(flag(gate))
            .after(WEBACL_STACK)
            .props(Choice::map([(
                "ServiceToken",
                Choice::attr("ReputationListsParser", "Arn"),
            )])),
    ]
}

fn bad_bot_units() -> Vec<UnitSpec> {
    let gate = "BadBotProtectionActivated";
    let mut environment: Vec<(String, Choice)> =
        ip_set_environment("WAFBadBotSet", "BAD_BOT", gate);
    environment.extend(
        [
            ("SCOPE", region_scope()),
            ("LOG_TYPE", log_type()),
            ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
            ("REGION", Choice::reference("AWS::Region")),
            ("SOLUTION_VERSION", Choice::text(SOLUTION_VERSION)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v)),
    );
    vec![
        lambda_role(
            "LambdaRoleBadBot",
            gate,
            Choice::list([policy("WAFGetAndUpdateIPSet", webacl_output("WAFBadBotSetV4Arn"))]),
        ),
        function("BadBotParser", "LambdaRoleBadBot", Choice::map(environment)).when(flag(gate)),
        UnitSpec::new("ApiGatewayBadBot", "AWS::ApiGateway::RestApi")
            .when(flag(gate))
            .after("BadBotParser")
            .props(Choice::map([
                ("Name", Choice::text("Security Automation - WAF Bad Bot API")),
                ("Integration", Choice::attr("BadBotParser", "Arn")),
                (
                    "Stages",
                    Choice::literal(json!([BAD_BOT_PROD_STAGE, BAD_BOT_STAGE])),
                ),
            ])),
    ]
}

fn ip_retention_units() -> Vec<UnitSpec> {
    let gate = || flag("IPRetentionPeriod");
    let retained_sets: Vec<Choice> = IP_SET_GROUPS
        .iter()
        .filter(|g| g.flag.is_none())
        .flat_map(|g| IpVersion::ALL.map(|v| webacl_output(&g.name_output(v))))
        .collect();
    vec![
        UnitSpec::new("IPRetentionDDBTable", "AWS::DynamoDB::Table")
            .when(gate())
            .props(Choice::literal(json!({
                "KeySchema": [
                    { "AttributeName": "IPSetId", "KeyType": "HASH" },
                    { "AttributeName": "ExpirationTime", "KeyType": "RANGE" }
                ],
                "TimeToLiveSpecification": { "AttributeName": "ExpirationTime", "Enabled": true },
                "StreamSpecification": { "StreamViewType": "OLD_IMAGE" },
            }))),
        lambda_role(
            "LambdaRoleSetIPRetention",
            "IPRetentionPeriod",
            Choice::list([policy("DDBAccess", Choice::attr("IPRetentionDDBTable", "Arn"))]),
        ),
        lambda_role(
            "LambdaRoleRemoveExpiredIP",
            "IPRetentionPeriod",
            Choice::list([
                policy("DDBStreamAccess", Choice::attr("IPRetentionDDBTable", "StreamArn")),
                Choice::when(
                    flag("SNSEmail"),
                    policy("SNSPublish", Choice::reference("IPExpirationSNSTopic")),
                ),
            ]),
        ),
        function(
            "SetIPRetention",
            "LambdaRoleSetIPRetention",
            Choice::map([
                ("TABLE_NAME", Choice::reference("IPRetentionDDBTable")),
                ("STACK_NAME", Choice::reference("AWS::StackName")),
                (
                    "IP_RETENTION_PERIOD_ALLOWED_MINUTE",
                    Choice::input("IPRetentionPeriodAllowedParam"),
                ),
                (
                    "IP_RETENTION_PERIOD_DENIED_MINUTE",
                    Choice::input("IPRetentionPeriodDeniedParam"),
                ),
                (
                    "REMOVE_EXPIRED_IP_LAMBDA_ROLE_NAME",
                    Choice::reference("LambdaRoleRemoveExpiredIP"),
                ),
                ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
            ]),
        )
        .when(gate()),
        function(
            "RemoveExpiredIP",
            "LambdaRoleRemoveExpiredIP",
            Choice::map([
                ("SNS_EMAIL", yes_no("SNSEmail")),
                (
                    "SNS_TOPIC_ARN",
                    Choice::when(flag("SNSEmail"), Choice::reference("IPExpirationSNSTopic")),
                ),
                ("STACK_NAME", Choice::reference("AWS::StackName")),
                ("LOG_LEVEL", Choice::text(LOG_LEVEL)),
            ]),
        )
        .when(gate()),
        UnitSpec::new("SetIPRetentionEventsRule", "AWS::Events::Rule")
            .when(gate())
            .props(Choice::map([
                (
                    "EventPattern",
                    Choice::map([
                        ("source", Choice::literal(json!(["aws.wafv2"]))),
                        (
                            "detail",
                            Choice::map([
                                (
                                    "eventName",
                                    Choice::literal(json!(["UpdateIPSet"])),
                                ),
                                (
                                    "requestParameters",
                                    Choice::map([("name", Choice::list(retained_sets))]),
                                ),
                            ]),
                        ),
                    ]),
                ),
                (
                    "Targets",
                    Choice::list([Choice::map([
                        ("Arn", Choice::attr("SetIPRetention", "Arn")),
                        ("Id", Choice::text("SetIPRetentionLambda")),
                    ])]),
                ),
            ])),
        UnitSpec::new("LambdaInvokePermissionSetIPRetention", "AWS::Lambda::Permission")
            .when(gate())
            .props(Choice::map([
                ("FunctionName", Choice::reference("SetIPRetention")),
                ("Action", Choice::text("lambda:InvokeFunction")),
                ("Principal", Choice::text("events.amazonaws.com")),
                ("SourceArn", Choice::attr("SetIPRetentionEventsRule", "Arn")),
            ])),
        UnitSpec::new("DDBStreamToLambdaESMapping", "AWS::Lambda::EventSourceMapping")
            .when(gate())
            .props(Choice::map([
                ("FunctionName", Choice::attr("RemoveExpiredIP", "Arn")),
                ("EventSourceArn", Choice::attr("IPRetentionDDBTable", "StreamArn")),
                ("StartingPosition", Choice::text("LATEST")),
                (
                    "FilterCriteria",
                    Choice::literal(json!({
                        "Filters": [{ "Pattern": "{\"eventName\":[\"REMOVE\"],\"userIdentity\":{\"type\":[\"Service\"],\"principalId\":[\"dynamodb.amazonaws.com\"]}}" }]
                    })),
                ),
            ])),
        UnitSpec::new("IPExpirationSNSTopic", "AWS::SNS::Topic")
            .when(flag("SNSEmail"))
            .props(Choice::map([
                ("DisplayName", Choice::text("AWS WAF Security Automations IP Expiration Notification")),
                ("TopicName", Choice::sub("${AWS::StackName}-IPExpirationSNSTopic")),
            ])),
        UnitSpec::new("SetIPSNS", "AWS::SNS::Subscription")
            .when(flag("SNSEmail"))
            .props(Choice::map([
                ("Protocol", Choice::text("email")),
                ("Endpoint", Choice::input("SNSEmailParam")),
                ("TopicArn", Choice::reference("IPExpirationSNSTopic")),
            ])),
    ]
}

/// Function names whose log groups get the retention period.
fn retained_log_groups() -> Choice {
    Choice::map([
        ("Helper", Choice::reference("Helper")),
        ("CustomResource", Choice::reference("CustomResource")),
        ("CustomTimer", webacl_output("CustomTimerFunctionName")),
        (
            "LogParser",
            Choice::when(flag("LogParser"), Choice::reference("LogParser")),
        ),
        (
            "AddAthenaPartitions",
            Choice::when(flag("AthenaLogParser"), Choice::reference("AddAthenaPartitions")),
        ),
        (
            "ReputationListsParser",
            Choice::when(
                flag("ReputationListsProtectionActivated"),
                Choice::reference("ReputationListsParser"),
            ),
        ),
        (
            "BadBotParser",
            Choice::when(
                flag("BadBotProtectionActivated"),
                Choice::reference("BadBotParser"),
            ),
        ),
        (
            "SetIPRetention",
            Choice::when(flag("IPRetentionPeriod"), Choice::reference("SetIPRetention")),
        ),
        (
            "RemoveExpiredIP",
            Choice::when(flag("IPRetentionPeriod"), Choice::reference("RemoveExpiredIP")),
        ),
    ])
}

fn configure_web_acl() -> UnitSpec {
    let mut props: Vec<(String, Choice)> = vec![
        ("ServiceToken".to_string(), Choice::attr("CustomResource", "Arn")),
        ("WAFWebACL".to_string(), webacl_output("WAFWebACL")),
        ("SNSEmailParam".to_string(), yes_no("SNSEmail")),
        (
            "UserDefinedAppAccessLogBucketPrefixParam".to_string(),
            yes_no("UserDefinedAppAccessLogBucketPrefix"),
        ),
        (
            "RequestThresholdByCountryParam".to_string(),
            yes_no("RequestThresholdByCountry"),
        ),
    ];
    for name in [
        "ActivateSqlInjectionProtectionParam",
        "ActivateCrossSiteScriptingProtectionParam",
        "ActivateHttpFloodProtectionParam",
        "ActivateScannersProbesProtectionParam",
        "ActivateReputationListsProtectionParam",
        "ActivateBadBotProtectionParam",
        "KeepDataInOriginalS3Location",
        "IPRetentionPeriodAllowedParam",
        "IPRetentionPeriodDeniedParam",
        "AppAccessLogBucketLoggingStatusParam",
        "HTTPFloodAthenaQueryGroupByParam",
        "AthenaQueryRunTimeScheduleParam",
    ] {
        props.push((name.to_string(), Choice::input(name)));
    }
    props.extend(
        MANAGED_RULE_GROUPS
            .iter()
            .map(|g| (g.param.to_string(), Choice::input(g.param))),
    );
    for v in IpVersion::ALL {
        for group in &IP_SET_GROUPS {
            let key = group.unit.trim_end_matches("Set");
            let id = webacl_output(&format!("{}Id", group.set_id(v)));
            let name = webacl_output(&group.name_output(v));
            let (id, name) = match group.flag {
                Some(gate) => (Choice::when(flag(gate), id), Choice::when(flag(gate), name)),
                None => (id, name),
            };
            props.push((format!("{key}SetIP{}", v.suffix()), id));
            props.push((format!("{key}SetIP{}Name", v.suffix()), name));
        }
    }
    props.push(("SOLUTION_VERSION".to_string(), Choice::text(SOLUTION_VERSION)));
    UnitSpec::new("ConfigureWebAcl", "Custom::ConfigureWebAcl")
        .after(WEBACL_STACK)
        .props(Choice::map(props))
}

fn reporting_units() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("MonitoringDashboard", "AWS::CloudWatch::Dashboard")
            .after(WEBACL_STACK)
            .props(Choice::map([
                ("DashboardName", Choice::sub("${AWS::StackName}-${AWS::Region}")),
                ("WebACL", webacl_output("WAFWebACL")),
                ("MetricName", webacl_output("WAFWebACLMetricName")),
                (
                    "Region",
                    Choice::select(
                        flag("AlbEndpoint"),
                        Choice::reference("AWS::Region"),
                        Choice::text("us-east-1"),
                    ),
                ),
            ])),
        UnitSpec::new("CloudWatchLogRetention", "Custom::SetCloudWatchLogGroupRetention")
            .when(flag("LogGroupRetentionEnabled"))
            .props(Choice::map([
                service_token("CustomResource"),
                ("StackName", Choice::reference("AWS::StackName")),
                ("LogGroupRetention", Choice::input("LogGroupRetentionParam")),
                ("SolutionVersion", Choice::text(SOLUTION_VERSION)),
                ("FunctionNames", retained_log_groups()),
            ])),
        configure_web_acl(),
    ]
}

fn webacl_boundary() -> FragmentBoundary {
    let mut boundary =
        FragmentBoundary::new(ROOT, WEBACL, WEBACL_STACK).depends_on("CheckRequirements");
    for group in &MANAGED_RULE_GROUPS {
        boundary = boundary.mirror(group.param);
    }
    for name in WEBACL_MIRRORED {
        boundary = boundary.mirror(name);
    }
    boundary
        .mirror("TimeWindowThresholdParam")
        .forward("LogLevel", Choice::text(LOG_LEVEL))
        .forward("ParentStackName", Choice::reference("AWS::StackName"))
        .forward("RegionScope", region_scope())
        .forward(
            "GlueAccessLogsDatabase",
            Choice::select(
                flag("AthenaLogParser"),
                firehose_output("GlueAccessLogsDatabase"),
                Choice::text(""),
            ),
        )
        .forward(
            "GlueAppAccessLogsTable",
            Choice::select(
                flag("ScannersProbesAthenaLogParser"),
                firehose_output("GlueAppAccessLogsTable"),
                Choice::text(""),
            ),
        )
        .forward(
            "GlueWafAccessLogsTable",
            Choice::select(
                flag("HttpFloodAthenaLogParser"),
                firehose_output("GlueWafAccessLogsTable"),
                Choice::text(""),
            ),
        )
}

fn firehose_athena_boundary() -> FragmentBoundary {
    let mut boundary = FragmentBoundary::new(ROOT, FIREHOSE_ATHENA, FIREHOSE_ATHENA_STACK)
        .when(flag("CreateFirehoseAthenaStack"))
        .depends_on("CheckRequirements");
    for name in FIREHOSE_MIRRORED {
        boundary = boundary.mirror(name);
    }
    let log_parser = || flag("HttpFloodProtectionLogParserActivated");
    boundary
        .forward("UUID", Choice::attr("CreateUniqueID", "UUID"))
        .forward("ParentStackName", Choice::reference("AWS::StackName"))
        .forward(
            "WafLogBucket",
            Choice::select(log_parser(), Choice::reference("WafLogBucket"), Choice::text("")),
        )
        .forward(
            "WafLogBucketArn",
            Choice::select(
                log_parser(),
                Choice::attr("WafLogBucket", "Arn"),
                Choice::text(""),
            ),
        )
        .forward(
            "GlueDatabaseName",
            Choice::select(
                flag("AthenaLogParser"),
                Choice::attr("CreateGlueDatabaseName", "DatabaseName"),
                Choice::text(""),
            ),
        )
        .forward(
            "DeliveryStreamName",
            Choice::select(
                log_parser(),
                Choice::attr("CreateDeliveryStreamName", "DeliveryStreamName"),
                Choice::text(""),
            ),
        )
}

/// Deployment rules checked before anything is emitted.
pub fn rules() -> Vec<AssertionRule> {
    vec![
        AssertionRule::new(
            "HTTPFloodRuleCustomHeaderValidation",
            eq("WAFRuleKeysTypeParam", KEYS_IP_CUSTOM_HEADER),
            ne("CustomHeaderNameParam", ""),
            "CustomHeaderName is required when IP + Custom Header is selected",
        ),
        AssertionRule::new(
            "AppAccessLogBucketRequired",
            flag("ScannersProbesProtectionActivated"),
            ne("AppAccessLogBucket", ""),
            "AppAccessLogBucket is required when scanner and probe protection is activated",
        ),
        AssertionRule::new(
            "RateBasedRuleMinimumThreshold",
            flag("HttpFloodProtectionRateBasedRuleActivated"),
            at_least("RequestThreshold", 10),
            "RequestThreshold must be at least 10 for the WAF rate-based rule",
        ),
    ]
}

fn outputs() -> Vec<OutputSpec> {
    vec![
        OutputSpec::new("SolutionVersion", Choice::text(SOLUTION_VERSION)),
        OutputSpec::new("WAFWebACL", webacl_output("WAFWebACL")),
        OutputSpec::new("WAFWebACLArn", webacl_output("WAFWebACLArn")),
        OutputSpec::new("WafLogBucket", Choice::reference("WafLogBucket"))
            .when(flag("HttpFloodProtectionLogParserActivated")),
        OutputSpec::new("AppAccessLogBucket", Choice::input("AppAccessLogBucket"))
            .when(flag("ScannersProbesProtectionActivated")),
        OutputSpec::new("BadBotHoneypotEndpoint", Choice::attr("ApiGatewayBadBot", "Endpoint"))
            .when(flag("BadBotProtectionActivated")),
        OutputSpec::new("EndpointType", Choice::input("EndpointType")),
    ]
}

pub fn fragment(catalog: &FlagCatalog) -> Result<FragmentSpec> {
    let mut engine = ConditionEngine::new(ROOT);
    for input in root_inputs() {
        engine.add_input(input)?;
    }
    catalog.declare_into(&mut engine, &ROOT_FLAGS)?;

    let mut spec = FragmentSpec::new(engine);
    spec.rules = rules();
    for units in [
        requirement_units(),
        bucket_units(),
        custom_resource_units(),
        log_parser_units(),
        athena_partition_units(),
        reputation_list_units(),
        bad_bot_units(),
        ip_retention_units(),
        reporting_units(),
    ] {
        spec.units.extend(units);
    }
    spec.outputs = outputs();
    spec.children = vec![webacl_boundary(), firehose_athena_boundary()];
    Ok(spec)
}
