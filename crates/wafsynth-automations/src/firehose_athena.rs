//! The firehose-athena fragment: WAF log delivery, the Glue catalog over
//! both log sources and the Athena work groups that query them.
//!
//! The root instantiates it only under `CreateFirehoseAthenaStack`.

use crate::constants::{DEFAULT_BUFFER_SECONDS, FIREHOSE_ATHENA, SOLUTION_VERSION};
use crate::flags::FIREHOSE_ATHENA_FLAGS;
use crate::inputs;
use crate::webacl::evaluation_window;
use serde_json::json;
use wafsynth_kernel::expr::flag;
use wafsynth_kernel::{
    Choice, ConditionEngine, FlagCatalog, FragmentSpec, OutputSpec, Result, UnitSpec,
};

const INPUTS: [&str; 15] = [
    "UUID",
    "ActivateHttpFloodProtectionParam",
    "ActivateScannersProbesProtectionParam",
    "EndpointType",
    "AppAccessLogBucket",
    "ParentStackName",
    "ActivateBadBotProtectionParam",
    "ErrorThreshold",
    "RequestThreshold",
    "WAFBlockPeriod",
    "TimeWindowThresholdParam",
    "WafLogBucket",
    "WafLogBucketArn",
    "GlueDatabaseName",
    "DeliveryStreamName",
];

fn delivery_stream() -> [UnitSpec; 2] {
    let gate = flag("HttpFloodProtectionLogParserActivated");
    let role = UnitSpec::new("FirehoseWAFLogsDeliveryStreamRole", "AWS::IAM::Role")
        .when(gate.clone())
        .props(Choice::map([
            (
                "AssumeRolePolicyDocument",
                Choice::literal(json!({ "Service": "firehose.amazonaws.com" })),
            ),
            (
                "Resources",
                Choice::list([
                    Choice::input("WafLogBucketArn"),
                    Choice::sub("${WafLogBucketArn}/*"),
                ]),
            ),
        ]));
    // The Lambda parser consumes one buffer per rate window.
    let interval = Choice::select(
        flag("HttpFloodLambdaLogParser"),
        evaluation_window(),
        Choice::number(DEFAULT_BUFFER_SECONDS),
    );
    let stream = UnitSpec::new(
        "FirehoseWAFLogsDeliveryStream",
        "AWS::KinesisFirehose::DeliveryStream",
    )
    .when(gate)
    .after("FirehoseWAFLogsDeliveryStreamRole")
    .props(Choice::map([
        ("DeliveryStreamName", Choice::input("DeliveryStreamName")),
        ("DeliveryStreamType", Choice::text("DirectPut")),
        (
            "ExtendedS3DestinationConfiguration",
            Choice::map([
                ("BucketARN", Choice::input("WafLogBucketArn")),
                (
                    "BufferingHints",
                    Choice::map([
                        ("IntervalInSeconds", interval),
                        ("SizeInMBs", Choice::number(5)),
                    ]),
                ),
                ("CompressionFormat", Choice::text("GZIP")),
                (
                    "Prefix",
                    Choice::text(
                        "AWSLogs/year=!{timestamp:yyyy}/month=!{timestamp:MM}/day=!{timestamp:dd}/hour=!{timestamp:HH}/",
                    ),
                ),
                (
                    "ErrorOutputPrefix",
                    Choice::text("AWSErrorLogs/result=!{firehose:error-output-type}/"),
                ),
                (
                    "RoleARN",
                    Choice::attr("FirehoseWAFLogsDeliveryStreamRole", "Arn"),
                ),
            ]),
        ),
    ]));
    [role, stream]
}

fn glue_table(id: &str, table: &str, location: &str) -> UnitSpec {
    UnitSpec::new(id, "AWS::Glue::Table")
        .after("GlueAccessLogsDatabase")
        .props(Choice::map([
            ("CatalogId", Choice::reference("AWS::AccountId")),
            ("DatabaseName", Choice::reference("GlueAccessLogsDatabase")),
            (
                "TableInput",
                Choice::map([
                    ("Name", Choice::text(table)),
                    ("TableType", Choice::text("EXTERNAL_TABLE")),
                    ("Location", Choice::sub(location)),
                ]),
            ),
        ]))
}

fn glue_catalog() -> Vec<UnitSpec> {
    vec![
        UnitSpec::new("GlueAccessLogsDatabase", "AWS::Glue::Database")
            .when(flag("AthenaLogParser"))
            .props(Choice::map([
                ("CatalogId", Choice::reference("AWS::AccountId")),
                (
                    "DatabaseInput",
                    Choice::map([("Name", Choice::input("GlueDatabaseName"))]),
                ),
            ])),
        glue_table("GlueWafAccessLogsTable", "waf_access_logs", "s3://${WafLogBucket}/AWSLogs/")
            .when(flag("HttpFloodAthenaLogParser")),
        glue_table(
            "ALBGlueAppAccessLogsTable",
            "app_access_logs",
            "s3://${AppAccessLogBucket}/AWSLogs-Partitioned/",
        )
        .when(flag("ALBScannersProbesAthenaLogParser")),
        glue_table(
            "CloudFrontGlueAppAccessLogsTable",
            "app_access_logs",
            "s3://${AppAccessLogBucket}/AWSLogs-Partitioned/",
        )
        .when(flag("CloudFrontScannersProbesAthenaLogParser")),
    ]
}

fn work_group(id: &str, gate: &str) -> UnitSpec {
    UnitSpec::new(id, "AWS::Athena::WorkGroup")
        .when(flag(gate))
        .props(Choice::map([
            ("Name", Choice::sub(&format!("{id}-${{UUID}}"))),
            ("State", Choice::text("ENABLED")),
            (
                "WorkGroupConfiguration",
                Choice::literal(json!({ "PublishCloudWatchMetricsEnabled": true })),
            ),
        ]))
}

fn outputs() -> Vec<OutputSpec> {
    vec![
        OutputSpec::new("Version", Choice::text(SOLUTION_VERSION)),
        OutputSpec::new(
            "GlueWafAccessLogsTable",
            Choice::reference("GlueWafAccessLogsTable"),
        )
        .when(flag("HttpFloodAthenaLogParser")),
        OutputSpec::new(
            "GlueAppAccessLogsTable",
            Choice::select(
                flag("AlbEndpoint"),
                Choice::reference("ALBGlueAppAccessLogsTable"),
                Choice::reference("CloudFrontGlueAppAccessLogsTable"),
            ),
        )
        .when(flag("ScannersProbesAthenaLogParser")),
        OutputSpec::new(
            "GlueAccessLogsDatabase",
            Choice::reference("GlueAccessLogsDatabase"),
        )
        .when(flag("AthenaLogParser")),
        OutputSpec::new(
            "WAFAddPartitionAthenaQueryWorkGroup",
            Choice::reference("WAFAddPartitionAthenaQueryWorkGroup"),
        )
        .when(flag("AthenaLogParser")),
        OutputSpec::new(
            "WAFLogAthenaQueryWorkGroup",
            Choice::reference("WAFLogAthenaQueryWorkGroup"),
        )
        .when(flag("HttpFloodAthenaLogParser")),
        OutputSpec::new(
            "WAFAppAccessLogAthenaQueryWorkGroup",
            Choice::reference("WAFAppAccessLogAthenaQueryWorkGroup"),
        )
        .when(flag("ScannersProbesAthenaLogParser")),
        OutputSpec::new(
            "FirehoseWAFLogsDeliveryStreamArn",
            Choice::attr("FirehoseWAFLogsDeliveryStream", "Arn"),
        )
        .when(flag("HttpFloodProtectionLogParserActivated")),
    ]
}

pub fn fragment(catalog: &FlagCatalog) -> Result<FragmentSpec> {
    let mut engine = ConditionEngine::new(FIREHOSE_ATHENA);
    inputs::declare(&mut engine, &INPUTS)?;
    catalog.declare_into(&mut engine, &FIREHOSE_ATHENA_FLAGS)?;

    let mut spec = FragmentSpec::new(engine);
    spec.units.extend(delivery_stream());
    spec.units.extend(glue_catalog());
    spec.units.extend([
        work_group("WAFAddPartitionAthenaQueryWorkGroup", "AthenaLogParser"),
        work_group("WAFLogAthenaQueryWorkGroup", "HttpFloodAthenaLogParser"),
        work_group(
            "WAFAppAccessLogAthenaQueryWorkGroup",
            "ScannersProbesAthenaLogParser",
        ),
    ]);
    spec.outputs = outputs();
    Ok(spec)
}
