//! Names, option strings and rule-group tables shared by every fragment.

pub const STACK_NAME: &str = "waf-security-automations";

pub const ROOT: &str = "root";
pub const WEBACL: &str = "webacl";
pub const FIREHOSE_ATHENA: &str = "firehose-athena";

/// Units in the root that instantiate the two children.
pub const WEBACL_STACK: &str = "WebACLStack";
pub const FIREHOSE_ATHENA_STACK: &str = "FirehoseAthenaStack";

pub const SOLUTION_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

// Option strings.
pub const YES: &str = "yes";
pub const NO: &str = "no";
pub const YES_MATCH: &str = "yes - MATCH";
pub const YES_NO_MATCH: &str = "yes - NO_MATCH";
pub const RATE_BASED_RULE: &str = "yes - AWS WAF rate based rule";
pub const LAMBDA_LOG_PARSER: &str = "yes - AWS Lambda log parser";
pub const ATHENA_LOG_PARSER: &str = "yes - Amazon Athena log parser";

pub const ENDPOINT_CLOUDFRONT: &str = "CloudFront";
pub const ENDPOINT_ALB: &str = "ALB";
pub const SCOPE_REGIONAL: &str = "REGIONAL";
pub const SCOPE_CLOUDFRONT: &str = "CLOUDFRONT";

pub const KEYS_IP: &str = "IP";
pub const KEYS_IP_CUSTOM_HEADER: &str = "IP+Custom Header";
pub const KEYS_IP_URI: &str = "IP+URI";
pub const KEYS_IP_HTTP_METHOD: &str = "IP+HTTP METHOD";

pub const DEFAULT_APP_LOG_PREFIX: &str = "AWSLogs/";
pub const LOG_LEVEL: &str = "INFO";

pub const LOG_RETENTION_DAYS: [i64; 18] = [
    -1, 1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1827, 3653,
];

/// Rate-based rule evaluation window, minutes to seconds.
pub const TIME_WINDOWS: [(i64, i64); 4] = [(1, 60), (2, 120), (5, 300), (10, 600)];

/// Buffer interval of the WAF log delivery stream when Athena reads it.
pub const DEFAULT_BUFFER_SECONDS: i64 = 300;

/// Seconds each IP set timer waits before releasing its successor.
pub const TIMER_SECONDS: u64 = 2;

pub const BAD_BOT_PROD_STAGE: &str = "ProdStage";
pub const BAD_BOT_STAGE: &str = "CFDeploymentStage";
pub const BAD_BOT_LABEL: &str = "badbot";

// Input value patterns. The bucket pattern omits the IP-address exclusion,
// which needs look-ahead.
pub const BUCKET_NAME_PATTERN: &str = r"^$|^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$";
pub const COUNTRY_THRESHOLD_PATTERN: &str = r#"^$|^\{"\w+":\d+(,"\w+":\d+)*\}+$"#;
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$|^$";
pub const HEADER_NAME_PATTERN: &str = r"(^$)|.*\S.*";

/// One AWS managed rule group the Web ACL can include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedRuleGroup {
    /// Short key used for the flag and metric suffix.
    pub key: &'static str,
    pub param: &'static str,
    pub flag: &'static str,
    pub rule_name: &'static str,
    pub priority: i64,
}

impl ManagedRuleGroup {
    pub fn metric_suffix(&self) -> String {
        format!("AMR{}", self.key)
    }
}

pub const MANAGED_RULE_GROUPS: [ManagedRuleGroup; 11] = [
    ManagedRuleGroup {
        key: "CRS",
        param: "ActivateAWSManagedRulesParam",
        flag: "AWSManagedCRSActivated",
        rule_name: "AWSManagedRulesCommonRuleSet",
        priority: 6,
    },
    ManagedRuleGroup {
        key: "AP",
        param: "ActivateAWSManagedAPParam",
        flag: "AWSManagedAPActivated",
        rule_name: "AWSManagedRulesAdminProtectionRuleSet",
        priority: 7,
    },
    ManagedRuleGroup {
        key: "KBI",
        param: "ActivateAWSManagedKBIParam",
        flag: "AWSManagedKBIActivated",
        rule_name: "AWSManagedRulesKnownBadInputsRuleSet",
        priority: 8,
    },
    ManagedRuleGroup {
        key: "IPR",
        param: "ActivateAWSManagedIPRParam",
        flag: "AWSManagedIPRActivated",
        rule_name: "AWSManagedRulesAmazonIpReputationList",
        priority: 2,
    },
    ManagedRuleGroup {
        key: "AIP",
        param: "ActivateAWSManagedAIPParam",
        flag: "AWSManagedAIPActivated",
        rule_name: "AWSManagedRulesAnonymousIpList",
        priority: 4,
    },
    ManagedRuleGroup {
        key: "SQL",
        param: "ActivateAWSManagedSQLParam",
        flag: "AWSManagedSQLActivated",
        rule_name: "AWSManagedRulesSQLiRuleSet",
        priority: 14,
    },
    ManagedRuleGroup {
        key: "Linux",
        param: "ActivateAWSManagedLinuxParam",
        flag: "AWSManagedLinuxActivated",
        rule_name: "AWSManagedRulesLinuxRuleSet",
        priority: 11,
    },
    ManagedRuleGroup {
        key: "POSIX",
        param: "ActivateAWSManagedPOSIXParam",
        flag: "AWSManagedPOSIXActivated",
        rule_name: "AWSManagedRulesUnixRuleSet",
        priority: 10,
    },
    ManagedRuleGroup {
        key: "Windows",
        param: "ActivateAWSManagedWindowsParam",
        flag: "AWSManagedWindowsActivated",
        rule_name: "AWSManagedRulesWindowsRuleSet",
        priority: 9,
    },
    ManagedRuleGroup {
        key: "PHP",
        param: "ActivateAWSManagedPHPParam",
        flag: "AWSManagedPHPActivated",
        rule_name: "AWSManagedRulesPHPRuleSet",
        priority: 12,
    },
    ManagedRuleGroup {
        key: "WP",
        param: "ActivateAWSManagedWPParam",
        flag: "AWSManagedWPActivated",
        rule_name: "AWSManagedRulesWordPressRuleSet",
        priority: 13,
    },
];

/// One protection's pair of IP sets and the rule that reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpSetGroup {
    /// Prefix of the IP set unit ids, e.g. `WAFWhitelistSet`.
    pub unit: &'static str,
    /// Suffix of the IP set names, e.g. `WhitelistSetIP`.
    pub set_name: &'static str,
    /// Prefix of the timer unit ids, e.g. `TimerWhite`.
    pub timer: &'static str,
    /// Prefix of the `Name...` outputs.
    pub name_output: &'static str,
    /// Flag gating the sets and their outputs. `None` means always present.
    pub flag: Option<&'static str>,
}

impl IpSetGroup {
    pub fn set_id(&self, version: IpVersion) -> String {
        format!("{}{}", self.unit, version.suffix())
    }

    pub fn timer_id(&self, version: IpVersion) -> String {
        format!("{}{}", self.timer, version.suffix())
    }

    /// `${ParentStackName}<set_name>V4`, substituted per fragment.
    pub fn name_template(&self, version: IpVersion) -> String {
        format!("${{ParentStackName}}{}{}", self.set_name, version.suffix())
    }

    pub fn name_output(&self, version: IpVersion) -> String {
        format!("{}{}", self.name_output, version.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    pub fn suffix(self) -> &'static str {
        match self {
            IpVersion::V4 => "V4",
            IpVersion::V6 => "V6",
        }
    }

    pub fn address_version(self) -> &'static str {
        match self {
            IpVersion::V4 => "IPV4",
            IpVersion::V6 => "IPV6",
        }
    }
}

/// In creation order: the throttle chain runs V4 sets first, then V6.
pub static IP_SET_GROUPS: [IpSetGroup; 6] = [
    IpSetGroup {
        unit: "WAFWhitelistSet",
        set_name: "WhitelistSetIP",
        timer: "TimerWhite",
        name_output: "NameWAFWhitelistSet",
        flag: None,
    },
    IpSetGroup {
        unit: "WAFBlacklistSet",
        set_name: "BlacklistSetIP",
        timer: "TimerBlack",
        name_output: "NameWAFBlacklistSet",
        flag: None,
    },
    IpSetGroup {
        unit: "WAFHttpFloodSet",
        set_name: "HTTPFloodSetIP",
        timer: "TimerHttpFlood",
        name_output: "NameHttpFloodSet",
        flag: Some("HttpFloodProtectionActivated"),
    },
    IpSetGroup {
        unit: "WAFScannersProbesSet",
        set_name: "ScannersProbesSetIP",
        timer: "TimerScanners",
        name_output: "NameScannersProbesSet",
        flag: Some("ScannersProbesProtectionActivated"),
    },
    IpSetGroup {
        unit: "WAFReputationListsSet",
        set_name: "IPReputationListsSetIP",
        timer: "TimerReputation",
        name_output: "NameReputationListsSet",
        flag: Some("ReputationListsProtectionActivated"),
    },
    IpSetGroup {
        unit: "WAFBadBotSet",
        set_name: "IPBadBotSetIP",
        timer: "TimerBadBot",
        name_output: "NameBadBotSet",
        flag: Some("BadBotProtectionActivated"),
    },
];

pub fn ip_set_group(unit: &str) -> Option<&'static IpSetGroup> {
    IP_SET_GROUPS.iter().find(|g| g.unit == unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn managed_rule_priorities_are_distinct() {
        let priorities: BTreeSet<i64> = MANAGED_RULE_GROUPS.iter().map(|g| g.priority).collect();
        assert_eq!(priorities.len(), MANAGED_RULE_GROUPS.len());
        assert_eq!(MANAGED_RULE_GROUPS[7].rule_name, "AWSManagedRulesUnixRuleSet");
    }

    #[test]
    fn ip_set_names_follow_the_parent_stack() {
        let white = ip_set_group("WAFWhitelistSet").unwrap();
        assert_eq!(
            white.name_template(IpVersion::V4),
            "${ParentStackName}WhitelistSetIPV4"
        );
        assert_eq!(white.timer_id(IpVersion::V6), "TimerWhiteV6");
        assert_eq!(white.name_output(IpVersion::V6), "NameWAFWhitelistSetV6");
    }
}
