//! `wafsynth.toml`: the stack name, root input values and log level.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use wafsynth_automations::constants::STACK_NAME;
use wafsynth_kernel::InputValues;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stack: StackConfig,

    /// Root input values. Strings, integers and booleans are accepted and
    /// passed on as their text.
    #[serde(default)]
    pub inputs: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_stack_name")]
    pub name: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when neither a flag nor `RUST_LOG` sets one
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_stack_name() -> String {
    STACK_NAME.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stack.name.trim().is_empty() {
            bail!("stack.name cannot be empty");
        }
        if EnvFilter::try_new(&self.logging.level).is_err() {
            bail!("logging.level `{}` is not a valid filter", self.logging.level);
        }
        for (name, value) in &self.inputs {
            scalar_text(value).with_context(|| format!("inputs.{name}"))?;
        }
        Ok(())
    }

    /// Apply `NAME=VALUE` overrides on top of the file's inputs.
    pub fn apply_overrides(&mut self, sets: &[String]) -> anyhow::Result<()> {
        for set in sets {
            let Some((name, value)) = set.split_once('=') else {
                bail!("--set expects NAME=VALUE, got `{set}`");
            };
            let name = name.trim();
            if name.is_empty() {
                bail!("--set expects NAME=VALUE, got `{set}`");
            }
            self.inputs
                .insert(name.to_string(), toml::Value::String(value.to_string()));
        }
        Ok(())
    }

    pub fn input_values(&self) -> anyhow::Result<InputValues> {
        self.inputs
            .iter()
            .map(|(name, value)| {
                let text = scalar_text(value).with_context(|| format!("inputs.{name}"))?;
                Ok::<_, anyhow::Error>((name.clone(), text))
            })
            .collect()
    }
}

fn scalar_text(value: &toml::Value) -> anyhow::Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(n) => Ok(n.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "yes" } else { "no" }.to_string()),
        other => bail!("expected a string, integer or boolean, got {}", other.type_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_scalars() {
        let config: Config = toml::from_str(
            r#"
            [stack]
            name = "edge-waf"

            [inputs]
            ActivateHttpFloodProtectionParam = "yes - Amazon Athena log parser"
            RequestThreshold = 250
            ActivateBadBotProtectionParam = false

            [logging]
            level = "info"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.stack.name, "edge-waf");
        let values = config.input_values().unwrap();
        assert_eq!(values["RequestThreshold"], "250");
        assert_eq!(values["ActivateBadBotProtectionParam"], "no");
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.stack.name, STACK_NAME);
        assert_eq!(config.logging.level, "warn");
        assert!(config.inputs.is_empty());
    }

    #[test]
    fn empty_stack_name_is_rejected() {
        let config: Config = toml::from_str("[stack]\nname = \"\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn arrays_are_not_inputs() {
        let config: Config = toml::from_str("[inputs]\nEndpointType = [\"ALB\"]").unwrap();
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("inputs.EndpointType"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config: Config =
            toml::from_str("[inputs]\nEndpointType = \"CloudFront\"").unwrap();
        config
            .apply_overrides(&[
                "EndpointType=ALB".to_string(),
                "CustomHeaderNameParam=".to_string(),
            ])
            .unwrap();
        let values = config.input_values().unwrap();
        assert_eq!(values["EndpointType"], "ALB");
        assert_eq!(values["CustomHeaderNameParam"], "");
        assert!(config.apply_overrides(&["NoEquals".to_string()]).is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load(Path::new("/nonexistent/wafsynth.toml")).unwrap();
        assert_eq!(config.stack.name, STACK_NAME);
    }
}
