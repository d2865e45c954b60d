//! The input catalog.
//!
//! Every fragment declares its inputs from this one table, so a child's
//! copy of a root input always carries the root's domain and default.

use crate::constants::{
    ATHENA_LOG_PARSER, BUCKET_NAME_PATTERN, COUNTRY_THRESHOLD_PATTERN, DEFAULT_APP_LOG_PREFIX,
    EMAIL_PATTERN, ENDPOINT_ALB, ENDPOINT_CLOUDFRONT, HEADER_NAME_PATTERN, KEYS_IP,
    KEYS_IP_CUSTOM_HEADER, KEYS_IP_HTTP_METHOD, KEYS_IP_URI, LAMBDA_LOG_PARSER, LOG_LEVEL,
    LOG_RETENTION_DAYS, MANAGED_RULE_GROUPS, NO, RATE_BASED_RULE, SCOPE_CLOUDFRONT,
    SCOPE_REGIONAL, TIME_WINDOWS, YES, YES_MATCH, YES_NO_MATCH,
};
use wafsynth_kernel::{ConditionEngine, ConfigInput, Result, SynthError, ValueDomain};

fn yes_no(name: &str, default: &str, description: &str) -> ConfigInput {
    ConfigInput::new(name, ValueDomain::enumeration([YES, NO]))
        .with_default(default)
        .describe(description)
}

fn match_mode(name: &str, description: &str) -> ConfigInput {
    ConfigInput::new(
        name,
        ValueDomain::enumeration([YES, YES_MATCH, YES_NO_MATCH, NO]),
    )
    .with_default(YES)
    .describe(description)
}

fn text(name: &str, description: &str) -> ConfigInput {
    ConfigInput::new(name, ValueDomain::text())
        .with_default("")
        .describe(description)
}

/// Inputs a user sets on the root fragment, in presentation order.
pub fn root_inputs() -> Vec<ConfigInput> {
    let mut inputs: Vec<ConfigInput> = MANAGED_RULE_GROUPS
        .iter()
        .map(|g| {
            yes_no(
                g.param,
                NO,
                &format!("Include the AWS managed rule group {}.", g.rule_name),
            )
        })
        .collect();

    let windows: Vec<i64> = TIME_WINDOWS.iter().map(|(minutes, _)| *minutes).collect();
    inputs.extend([
        match_mode(
            "ActivateSqlInjectionProtectionParam",
            "Block common SQL injection attacks. MATCH and NO_MATCH choose how oversize request components are handled.",
        ),
        ConfigInput::new(
            "SqlInjectionProtectionSensitivityLevelParam",
            ValueDomain::enumeration(["LOW", "HIGH"]),
        )
        .with_default("LOW")
        .describe("Sensitivity of the SQL injection match statements."),
        match_mode(
            "ActivateCrossSiteScriptingProtectionParam",
            "Block common cross-site scripting attacks.",
        ),
        ConfigInput::new(
            "ActivateHttpFloodProtectionParam",
            ValueDomain::enumeration([RATE_BASED_RULE, LAMBDA_LOG_PARSER, ATHENA_LOG_PARSER, NO]),
        )
        .with_default(RATE_BASED_RULE)
        .describe("How HTTP flood attacks are detected, if at all."),
        ConfigInput::new(
            "ActivateScannersProbesProtectionParam",
            ValueDomain::enumeration([LAMBDA_LOG_PARSER, ATHENA_LOG_PARSER, NO]),
        )
        .with_default(LAMBDA_LOG_PARSER)
        .describe("How scanners and probes are detected, if at all."),
        yes_no(
            "ActivateReputationListsProtectionParam",
            YES,
            "Block requests from IP addresses on third-party reputation lists.",
        ),
        yes_no(
            "ActivateBadBotProtectionParam",
            YES,
            "Block bad bots and content scrapers that probe the honeypot.",
        ),
        ConfigInput::new(
            "EndpointType",
            ValueDomain::enumeration([ENDPOINT_CLOUDFRONT, ENDPOINT_ALB]),
        )
        .with_default(ENDPOINT_CLOUDFRONT)
        .describe("Resource type the web ACL is associated with."),
        ConfigInput::new("AppAccessLogBucket", ValueDomain::pattern(BUCKET_NAME_PATTERN))
            .with_default("")
            .describe("Bucket holding the application access logs read by the scanners and probes parser."),
        ConfigInput::new("AppAccessLogBucketPrefixParam", ValueDomain::text())
            .with_default(DEFAULT_APP_LOG_PREFIX)
            .describe("Prefix of the application access logs in their bucket."),
        yes_no(
            "AppAccessLogBucketLoggingStatusParam",
            NO,
            "Whether server access logging is already on for the application log bucket.",
        ),
        ConfigInput::new("ErrorThreshold", ValueDomain::number_min(0))
            .with_default("50")
            .describe("Maximum acceptable bad requests per minute per IP."),
        ConfigInput::new("RequestThreshold", ValueDomain::number_min(0))
            .with_default("100")
            .describe("Maximum acceptable requests per window per IP."),
        ConfigInput::new(
            "RequestThresholdByCountryParam",
            ValueDomain::pattern(COUNTRY_THRESHOLD_PATTERN),
        )
        .with_default("")
        .describe(r#"Per-country request thresholds, e.g. {"TR":50,"ER":150}."#),
        ConfigInput::new(
            "HTTPFloodAthenaQueryGroupByParam",
            ValueDomain::enumeration(["Country", "URI", "Country and URI", "None"]),
        )
        .with_default("None")
        .describe("Extra grouping for the HTTP flood Athena query."),
        ConfigInput::new("WAFBlockPeriod", ValueDomain::number_min(0))
            .with_default("240")
            .describe("Minutes an IP stays blocked."),
        ConfigInput::new("AthenaQueryRunTimeScheduleParam", ValueDomain::number_min(1))
            .with_default("5")
            .describe("Minutes between Athena log parser runs."),
        ConfigInput::new(
            "KeepDataInOriginalS3Location",
            ValueDomain::enumeration(["Yes", "No"]),
        )
        .with_default("No")
        .describe("Keep application logs in place when partitioning them."),
        ConfigInput::new("IPRetentionPeriodAllowedParam", ValueDomain::number_min(-1))
            .with_default("-1")
            .describe("Minutes allowed IPs are retained. -1 keeps them forever."),
        ConfigInput::new("IPRetentionPeriodDeniedParam", ValueDomain::number_min(-1))
            .with_default("-1")
            .describe("Minutes denied IPs are retained. -1 keeps them forever."),
        ConfigInput::new("SNSEmailParam", ValueDomain::pattern(EMAIL_PATTERN))
            .with_default("")
            .describe("Address notified when retained IPs expire."),
        ConfigInput::new("LogGroupRetentionParam", ValueDomain::number_of(&LOG_RETENTION_DAYS))
            .with_default("365")
            .describe("Days log groups are kept. -1 keeps them forever."),
        ConfigInput::new(
            "WAFRuleKeysTypeParam",
            ValueDomain::enumeration([KEYS_IP, KEYS_IP_CUSTOM_HEADER, KEYS_IP_URI, KEYS_IP_HTTP_METHOD]),
        )
        .with_default(KEYS_IP)
        .describe("Aggregation keys of the rate-based rule."),
        ConfigInput::new("CustomHeaderNameParam", ValueDomain::pattern(HEADER_NAME_PATTERN))
            .with_default("")
            .describe("Header aggregated on when IP+Custom Header is chosen."),
        ConfigInput::new("TimeWindowThresholdParam", ValueDomain::number_of(&windows))
            .with_default("5")
            .describe("Minutes the rate-based rule evaluates over."),
    ]);
    inputs
}

/// Inputs that exist only on the child side of a boundary. They are filled
/// from resolved identifiers rather than set by a user.
pub fn bridge_inputs() -> Vec<ConfigInput> {
    vec![
        text("ParentStackName", "Name of the instantiating stack."),
        ConfigInput::new("RegionScope", ValueDomain::enumeration([SCOPE_REGIONAL, SCOPE_CLOUDFRONT]))
            .with_default(SCOPE_CLOUDFRONT)
            .describe("Scope of the web ACL and its IP sets."),
        ConfigInput::new("LogLevel", ValueDomain::enumeration(["DEBUG", "INFO", "WARNING", "ERROR"]))
            .with_default(LOG_LEVEL)
            .describe("Log level of the timer function."),
        text("GlueAccessLogsDatabase", "Glue database of the access log tables."),
        text("GlueAppAccessLogsTable", "Glue table of the application access logs."),
        text("GlueWafAccessLogsTable", "Glue table of the WAF logs."),
        text("UUID", "Identifier generated for this deployment."),
        text("WafLogBucket", "Bucket receiving WAF logs."),
        text("WafLogBucketArn", "Arn of the WAF log bucket."),
        text("GlueDatabaseName", "Name generated for the Glue database."),
        text("DeliveryStreamName", "Name generated for the WAF log delivery stream."),
    ]
}

pub fn lookup(name: &str) -> Option<ConfigInput> {
    root_inputs()
        .into_iter()
        .chain(bridge_inputs())
        .find(|i| i.name == name)
}

/// Declare `names` on `engine`, taking each definition from the catalog.
pub fn declare(engine: &mut ConditionEngine, names: &[&str]) -> Result<()> {
    for name in names {
        let input = lookup(name).ok_or_else(|| SynthError::UndeclaredReference {
            fragment: engine.fragment().to_string(),
            referrer: "input catalog".to_string(),
            name: name.to_string(),
        })?;
        engine.add_input(input)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<String> = root_inputs()
            .into_iter()
            .chain(bridge_inputs())
            .map(|i| i.name)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn every_default_is_admissible() {
        for input in root_inputs().into_iter().chain(bridge_inputs()) {
            let default = input.default.clone();
            assert!(
                input.resolve("catalog", default.as_deref()).is_ok(),
                "default of {} rejected",
                input.name
            );
        }
    }

    #[test]
    fn patterns_accept_and_reject() {
        let bucket = lookup("AppAccessLogBucket").unwrap();
        assert!(bucket.resolve("root", Some("my-app-logs")).is_ok());
        assert!(bucket.resolve("root", Some("My_Bucket")).is_err());

        let country = lookup("RequestThresholdByCountryParam").unwrap();
        assert!(country.resolve("root", Some(r#"{"TR":50,"ER":150}"#)).is_ok());
        assert!(country.resolve("root", Some("TR=50")).is_err());

        let email = lookup("SNSEmailParam").unwrap();
        assert!(email.resolve("root", Some("ops@example.com")).is_ok());
        assert!(email.resolve("root", Some("not-an-address")).is_err());

        let header = lookup("CustomHeaderNameParam").unwrap();
        assert!(header.resolve("root", Some("")).is_ok());
        assert!(header.resolve("root", Some("   ")).is_err());
    }

    #[test]
    fn declare_rejects_unknown_names() {
        let mut engine = ConditionEngine::new("root");
        declare(&mut engine, &["EndpointType"]).unwrap();
        let err = declare(&mut engine, &["NoSuchInput"]).unwrap_err();
        assert_eq!(err.class(), "undeclared_reference");
    }
}
