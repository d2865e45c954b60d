//! The flag catalog: every activation flag of the deployment, defined once.
//!
//! Fragments select the flags they need by name. A child never restates a
//! formula, so the root and its children cannot drift apart by editing.

use crate::constants::{
    ATHENA_LOG_PARSER, DEFAULT_APP_LOG_PREFIX, ENDPOINT_ALB, KEYS_IP, KEYS_IP_CUSTOM_HEADER,
    KEYS_IP_HTTP_METHOD, KEYS_IP_URI, LAMBDA_LOG_PARSER, MANAGED_RULE_GROUPS, NO,
    RATE_BASED_RULE, YES, YES_MATCH, YES_NO_MATCH,
};
use wafsynth_kernel::FlagCatalog;
use wafsynth_kernel::expr::{and, eq, flag, ne, not, or};

const HTTP_FLOOD: &str = "ActivateHttpFloodProtectionParam";
const SCANNERS: &str = "ActivateScannersProbesProtectionParam";

/// The four mutually exclusive ways bad-bot protection reads logs.
pub const BAD_BOT_ARMS: [&str; 4] = [
    "BadBotWafLogActivated",
    "BadBotLambdaAccessLogActivated",
    "BadBotAthenaWafLogActivated",
    "BadBotAthenaAccessLogActivated",
];

/// Flags the root fragment declares, in catalog order.
pub const ROOT_FLAGS: [&str; 32] = [
    "HttpFloodProtectionRateBasedRuleActivated",
    "HttpFloodLambdaLogParser",
    "HttpFloodAthenaLogParser",
    "ScannersProbesLambdaLogParser",
    "BadBotProtectionActivated",
    "HttpFloodProtectionActivated",
    "ScannersProbesAthenaLogParser",
    "BadBotLambdaLogParserActivated",
    "HttpFloodProtectionLogParserActivated",
    "ScannersProbesProtectionActivated",
    "AthenaLogParser",
    "LogParser",
    "CreateFirehoseAthenaStack",
    "ReputationListsProtectionActivated",
    "AlbEndpoint",
    "CustomResourceLambdaAccess",
    "IPRetentionAllowedPeriod",
    "IPRetentionDeniedPeriod",
    "IPRetentionPeriod",
    "SNSEmailProvided",
    "SNSEmail",
    "AppAccessLogBucketLoggingOff",
    "TurnOnAppAccessLogBucketLogging",
    "CreateS3LoggingBucket",
    "UserDefinedAppAccessLogBucketPrefix",
    "RequestThresholdByCountry",
    "IsAthenaQueryRunEveryMinute",
    "LogGroupRetentionEnabled",
    "BadBotWafLogActivated",
    "BadBotLambdaAccessLogActivated",
    "BadBotAthenaWafLogActivated",
    "BadBotAthenaAccessLogActivated",
];

pub const FIREHOSE_ATHENA_FLAGS: [&str; 13] = [
    "AlbEndpoint",
    "CloudFrontEndpoint",
    "HttpFloodLambdaLogParser",
    "HttpFloodAthenaLogParser",
    "ScannersProbesAthenaLogParser",
    "ALBScannersProbesAthenaLogParser",
    "CloudFrontScannersProbesAthenaLogParser",
    "ScannersProbesLambdaLogParser",
    "AthenaLogParser",
    "BadBotProtectionActivated",
    "BadBotLambdaLogParserActivated",
    "HttpFloodProtectionActivated",
    "HttpFloodProtectionLogParserActivated",
];

/// Webacl flags other than the managed rule-group switches.
pub const WEBACL_FLAGS: [&str; 20] = [
    "SqlInjectionProtectionActivated",
    "SqlInjectionProtectionContinueActivated",
    "SqlInjectionProtectionMatchActivated",
    "SqlInjectionProtectionNoMatchActivated",
    "CrossSiteScriptingProtectionActivated",
    "CrossSiteScriptingProtectionContinueActivated",
    "CrossSiteScriptingProtectionMatchActivated",
    "CrossSiteScriptingProtectionNoMatchActivated",
    "HttpFloodLambdaLogParser",
    "HttpFloodAthenaLogParser",
    "HttpFloodProtectionActivated",
    "HttpFloodProtectionRateBasedRuleActivated",
    "ScannersProbesAthenaLogParser",
    "ScannersProbesLambdaLogParser",
    "ScannersProbesProtectionActivated",
    "ReputationListsProtectionActivated",
    "BadBotProtectionActivated",
    "IsDefaultIP",
    "IsCustomHeaderSelected",
    "IsUriPathSelected",
];

/// Every webacl flag, managed rule groups included.
pub fn webacl_flags() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = MANAGED_RULE_GROUPS.iter().map(|g| g.flag).collect();
    names.extend(WEBACL_FLAGS);
    names.push("IsHttpMethodSelected");
    names
}

pub fn catalog() -> FlagCatalog {
    let catalog = FlagCatalog::new()
        .define(
            "HttpFloodProtectionRateBasedRuleActivated",
            eq(HTTP_FLOOD, RATE_BASED_RULE),
            "HTTP flood is handled by a WAF rate-based rule.",
        )
        .define(
            "HttpFloodLambdaLogParser",
            eq(HTTP_FLOOD, LAMBDA_LOG_PARSER),
            "HTTP flood is detected by the Lambda log parser.",
        )
        .define(
            "HttpFloodAthenaLogParser",
            eq(HTTP_FLOOD, ATHENA_LOG_PARSER),
            "HTTP flood is detected by Athena queries.",
        )
        .define(
            "ScannersProbesLambdaLogParser",
            eq(SCANNERS, LAMBDA_LOG_PARSER),
            "Scanners and probes are detected by the Lambda log parser.",
        )
        .define(
            "BadBotProtectionActivated",
            eq("ActivateBadBotProtectionParam", YES),
            "",
        )
        .define(
            "HttpFloodProtectionActivated",
            or([flag("HttpFloodLambdaLogParser"), flag("HttpFloodAthenaLogParser")]),
            "HTTP flood is detected from logs.",
        )
        .define(
            "ScannersProbesAthenaLogParser",
            eq(SCANNERS, ATHENA_LOG_PARSER),
            "Scanners and probes are detected by Athena queries.",
        )
        .define(
            "BadBotLambdaLogParserActivated",
            and([
                not(flag("HttpFloodLambdaLogParser")),
                not(flag("ScannersProbesLambdaLogParser")),
                not(flag("HttpFloodAthenaLogParser")),
                not(flag("ScannersProbesAthenaLogParser")),
                flag("BadBotProtectionActivated"),
            ]),
            "Bad bot needs the WAF log pipeline on its own.",
        )
        .define(
            "HttpFloodProtectionLogParserActivated",
            or([
                flag("HttpFloodProtectionActivated"),
                flag("BadBotLambdaLogParserActivated"),
            ]),
            "WAF logs are delivered and parsed.",
        )
        .define(
            "ScannersProbesProtectionActivated",
            or([
                flag("ScannersProbesLambdaLogParser"),
                flag("ScannersProbesAthenaLogParser"),
            ]),
            "",
        )
        .define(
            "AthenaLogParser",
            or([
                flag("HttpFloodAthenaLogParser"),
                flag("ScannersProbesAthenaLogParser"),
            ]),
            "Some protection runs Athena queries.",
        )
        .define(
            "LogParser",
            or([
                flag("HttpFloodProtectionLogParserActivated"),
                flag("ScannersProbesProtectionActivated"),
            ]),
            "The log parser function is needed.",
        )
        .define(
            "CreateFirehoseAthenaStack",
            or([
                flag("HttpFloodProtectionLogParserActivated"),
                flag("AthenaLogParser"),
            ]),
            "The firehose-athena fragment is instantiated.",
        )
        .define(
            "ReputationListsProtectionActivated",
            eq("ActivateReputationListsProtectionParam", YES),
            "",
        )
        .define("AlbEndpoint", eq("EndpointType", ENDPOINT_ALB), "")
        .define(
            "CustomResourceLambdaAccess",
            or([
                flag("ReputationListsProtectionActivated"),
                flag("AthenaLogParser"),
            ]),
            "The custom resource may invoke other functions.",
        )
        .define(
            "IPRetentionAllowedPeriod",
            ne("IPRetentionPeriodAllowedParam", "-1"),
            "",
        )
        .define(
            "IPRetentionDeniedPeriod",
            ne("IPRetentionPeriodDeniedParam", "-1"),
            "",
        )
        .define(
            "IPRetentionPeriod",
            or([
                flag("IPRetentionAllowedPeriod"),
                flag("IPRetentionDeniedPeriod"),
            ]),
            "Retained IPs expire.",
        )
        .define("SNSEmailProvided", ne("SNSEmailParam", ""), "")
        .define(
            "SNSEmail",
            and([flag("IPRetentionPeriod"), flag("SNSEmailProvided")]),
            "Expiring IPs are announced by mail.",
        )
        .define(
            "AppAccessLogBucketLoggingOff",
            eq("AppAccessLogBucketLoggingStatusParam", NO),
            "",
        )
        .define(
            "TurnOnAppAccessLogBucketLogging",
            and([
                flag("ScannersProbesProtectionActivated"),
                flag("AppAccessLogBucketLoggingOff"),
            ]),
            "",
        )
        .define(
            "CreateS3LoggingBucket",
            or([
                flag("HttpFloodProtectionLogParserActivated"),
                flag("TurnOnAppAccessLogBucketLogging"),
            ]),
            "An access-logging bucket is needed.",
        )
        .define(
            "UserDefinedAppAccessLogBucketPrefix",
            ne("AppAccessLogBucketPrefixParam", DEFAULT_APP_LOG_PREFIX),
            "",
        )
        .define(
            "RequestThresholdByCountry",
            ne("RequestThresholdByCountryParam", ""),
            "",
        )
        .define(
            "IsAthenaQueryRunEveryMinute",
            eq("AthenaQueryRunTimeScheduleParam", "1"),
            "",
        )
        .define(
            "LogGroupRetentionEnabled",
            ne("LogGroupRetentionParam", "-1"),
            "",
        )
        .define(
            "BadBotWafLogActivated",
            and([
                flag("BadBotProtectionActivated"),
                or([
                    flag("HttpFloodLambdaLogParser"),
                    flag("BadBotLambdaLogParserActivated"),
                ]),
            ]),
            "Bad bot reads WAF logs through the Lambda parser.",
        )
        .define(
            "BadBotLambdaAccessLogActivated",
            and([
                flag("BadBotProtectionActivated"),
                and([
                    not(flag("HttpFloodLambdaLogParser")),
                    flag("ScannersProbesLambdaLogParser"),
                ]),
            ]),
            "Bad bot reads access logs through the Lambda parser.",
        )
        .define(
            "BadBotAthenaWafLogActivated",
            and([
                flag("BadBotProtectionActivated"),
                and([
                    not(flag("HttpFloodLambdaLogParser")),
                    not(flag("ScannersProbesLambdaLogParser")),
                    flag("HttpFloodAthenaLogParser"),
                ]),
            ]),
            "Bad bot reads WAF logs through Athena.",
        )
        .define(
            "BadBotAthenaAccessLogActivated",
            and([
                flag("BadBotProtectionActivated"),
                and([
                    not(flag("HttpFloodLambdaLogParser")),
                    not(flag("ScannersProbesLambdaLogParser")),
                    not(flag("HttpFloodAthenaLogParser")),
                    flag("ScannersProbesAthenaLogParser"),
                ]),
            ]),
            "Bad bot reads access logs through Athena.",
        )
        // Child-only flags.
        .define("CloudFrontEndpoint", not(flag("AlbEndpoint")), "")
        .define(
            "ALBScannersProbesAthenaLogParser",
            and([flag("ScannersProbesAthenaLogParser"), flag("AlbEndpoint")]),
            "",
        )
        .define(
            "CloudFrontScannersProbesAthenaLogParser",
            and([
                flag("ScannersProbesAthenaLogParser"),
                flag("CloudFrontEndpoint"),
            ]),
            "",
        );

    let catalog = MANAGED_RULE_GROUPS.iter().fold(catalog, |c, g| {
        c.define(g.flag, eq(g.param, YES), g.rule_name)
    });

    catalog
        .define(
            "SqlInjectionProtectionActivated",
            ne("ActivateSqlInjectionProtectionParam", NO),
            "",
        )
        .define(
            "SqlInjectionProtectionContinueActivated",
            eq("ActivateSqlInjectionProtectionParam", YES),
            "Oversize components are inspected as far as they go.",
        )
        .define(
            "SqlInjectionProtectionMatchActivated",
            eq("ActivateSqlInjectionProtectionParam", YES_MATCH),
            "",
        )
        .define(
            "SqlInjectionProtectionNoMatchActivated",
            eq("ActivateSqlInjectionProtectionParam", YES_NO_MATCH),
            "",
        )
        .define(
            "CrossSiteScriptingProtectionActivated",
            ne("ActivateCrossSiteScriptingProtectionParam", NO),
            "",
        )
        .define(
            "CrossSiteScriptingProtectionContinueActivated",
            eq("ActivateCrossSiteScriptingProtectionParam", YES),
            "",
        )
        .define(
            "CrossSiteScriptingProtectionMatchActivated",
            eq("ActivateCrossSiteScriptingProtectionParam", YES_MATCH),
            "",
        )
        .define(
            "CrossSiteScriptingProtectionNoMatchActivated",
            eq("ActivateCrossSiteScriptingProtectionParam", YES_NO_MATCH),
            "",
        )
        .define("IsDefaultIP", eq("WAFRuleKeysTypeParam", KEYS_IP), "")
        .define(
            "IsCustomHeaderSelected",
            eq("WAFRuleKeysTypeParam", KEYS_IP_CUSTOM_HEADER),
            "",
        )
        .define(
            "IsUriPathSelected",
            eq("WAFRuleKeysTypeParam", KEYS_IP_URI),
            "",
        )
        .define(
            "IsHttpMethodSelected",
            eq("WAFRuleKeysTypeParam", KEYS_IP_HTTP_METHOD),
            "",
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_acyclic_and_complete() {
        let c = catalog();
        c.validate().unwrap();
        for name in ROOT_FLAGS
            .iter()
            .chain(FIREHOSE_ATHENA_FLAGS.iter())
            .chain(webacl_flags().iter())
        {
            assert!(c.get(name).is_some(), "{name} missing from catalog");
        }
    }

    #[test]
    fn root_flags_keep_catalog_order() {
        let selected = catalog().select("root", &ROOT_FLAGS).unwrap();
        let names: Vec<&str> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ROOT_FLAGS.to_vec());
    }

    #[test]
    fn partition_arms_nest_four_deep() {
        let c = catalog();
        let arm = c.get("BadBotAthenaAccessLogActivated").unwrap();
        assert_eq!(arm.expr.depth(), 4);
    }
}
