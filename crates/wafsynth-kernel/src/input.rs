//! ConfigInput registry: primitive inputs, their value domains and defaults.
//!
//! An input is owned by the fragment that declares it. A child fragment that
//! redeclares an input of the same name holds a distinct entity; the two are
//! related only by the value the bridge forwards.

use crate::error::{Result, SynthError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The set of values an input accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDomain {
    /// One of a fixed list of strings.
    Enum { allowed: Vec<String> },
    /// A signed integer, optionally bounded below or restricted to a list.
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allowed: Option<Vec<i64>>,
    },
    /// Free text, optionally constrained by a pattern and length.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
    },
}

impl ValueDomain {
    pub fn enumeration<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ValueDomain::Enum {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn number() -> Self {
        ValueDomain::Number {
            min: None,
            allowed: None,
        }
    }

    pub fn number_min(min: i64) -> Self {
        ValueDomain::Number {
            min: Some(min),
            allowed: None,
        }
    }

    pub fn number_of(allowed: &[i64]) -> Self {
        ValueDomain::Number {
            min: None,
            allowed: Some(allowed.to_vec()),
        }
    }

    pub fn text() -> Self {
        ValueDomain::Text {
            pattern: None,
            max_len: None,
        }
    }

    pub fn pattern(pattern: &str) -> Self {
        ValueDomain::Text {
            pattern: Some(pattern.to_string()),
            max_len: None,
        }
    }

    /// Check `raw` against the domain and return its canonical form.
    ///
    /// Numbers are canonicalised so that `"05"` and `"5"` compare equal.
    pub fn canonicalize(&self, raw: &str) -> std::result::Result<String, String> {
        match self {
            ValueDomain::Enum { allowed } => {
                if allowed.iter().any(|v| v == raw) {
                    Ok(raw.to_string())
                } else {
                    Err(format!("expected one of {allowed:?}"))
                }
            }
            ValueDomain::Number { min, allowed } => {
                let n: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| "expected an integer".to_string())?;
                if let Some(min) = min
                    && n < *min
                {
                    return Err(format!("must be >= {min}"));
                }
                if let Some(allowed) = allowed
                    && !allowed.contains(&n)
                {
                    return Err(format!("expected one of {allowed:?}"));
                }
                Ok(n.to_string())
            }
            ValueDomain::Text { pattern, max_len } => {
                if let Some(max) = max_len
                    && raw.chars().count() > *max
                {
                    return Err(format!("longer than {max} characters"));
                }
                if let Some(pattern) = pattern {
                    let re = Regex::new(pattern)
                        .map_err(|e| format!("invalid domain pattern {pattern:?}: {e}"))?;
                    if !re.is_match(raw) {
                        return Err(format!("does not match {pattern:?}"));
                    }
                }
                Ok(raw.to_string())
            }
        }
    }

    /// Representative values used by exhaustive enumeration.
    ///
    /// Enums yield every allowed value. Numbers and text yield the default,
    /// each literal the expressions compare against and a neighbour of each,
    /// filtered through the domain so every sample is admissible.
    pub fn samples(&self, default: Option<&str>, literals: &[String]) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        match self {
            ValueDomain::Enum { allowed } => return allowed.clone(),
            ValueDomain::Number { allowed: Some(allowed), .. } => {
                candidates.extend(allowed.iter().map(i64::to_string));
            }
            ValueDomain::Number { .. } => {
                candidates.extend(default.map(str::to_string));
                for literal in literals {
                    if let Ok(n) = literal.parse::<i64>() {
                        candidates.push(n.to_string());
                        candidates.push((n - 1).to_string());
                        candidates.push((n + 1).to_string());
                    }
                }
            }
            ValueDomain::Text { .. } => {
                candidates.extend(default.map(str::to_string));
                candidates.extend(literals.iter().cloned());
                candidates.push(String::new());
                candidates.push("sample".to_string());
            }
        }
        let mut out: Vec<String> = Vec::new();
        for candidate in candidates {
            if let Ok(canonical) = self.canonicalize(&candidate)
                && !out.contains(&canonical)
            {
                out.push(canonical);
            }
        }
        out
    }
}

/// A declared primitive input: `{name, valueDomain, default}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInput {
    pub name: String,
    pub domain: ValueDomain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ConfigInput {
    pub fn new(name: impl Into<String>, domain: ValueDomain) -> Self {
        Self {
            name: name.into(),
            domain,
            default: None,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Resolve the value this input takes in `fragment`.
    pub fn resolve(&self, fragment: &str, supplied: Option<&str>) -> Result<String> {
        let raw = match (supplied, self.default.as_deref()) {
            (Some(value), _) => value,
            (None, Some(default)) => default,
            (None, None) => {
                return Err(SynthError::InvalidInputValue {
                    fragment: fragment.to_string(),
                    input: self.name.clone(),
                    value: String::new(),
                    reason: "no value supplied and no default declared".to_string(),
                });
            }
        };
        self.domain
            .canonicalize(raw)
            .map_err(|reason| SynthError::InvalidInputValue {
                fragment: fragment.to_string(),
                input: self.name.clone(),
                value: raw.to_string(),
                reason,
            })
    }
}

/// User-supplied input values keyed by input name.
pub type InputValues = BTreeMap<String, String>;
