//! Condition Derivation Engine.
//!
//! One engine per fragment. Inputs and flags are declared in order; a flag
//! may only reference inputs and flags declared before it, so declaration
//! order is a topological order and `evaluate` is a single forward walk.

use crate::error::{Result, SynthError};
use crate::expr::Expr;
use crate::input::{ConfigInput, InputValues, ValueDomain};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A declared flag: `{name, expression, declaredFragment}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flag {
    pub name: String,
    pub expr: Expr,
    pub fragment: String,
}

/// Resolved inputs and flags of one fragment instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub fragment: String,
    pub inputs: BTreeMap<String, String>,
    pub flags: BTreeMap<String, bool>,
}

impl Resolution {
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).map(String::as_str)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConditionEngine {
    fragment: String,
    inputs: Vec<ConfigInput>,
    flags: Vec<Flag>,
}

impl ConditionEngine {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            inputs: Vec::new(),
            flags: Vec::new(),
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn inputs(&self) -> &[ConfigInput] {
        &self.inputs
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn input_decl(&self, name: &str) -> Option<&ConfigInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn flag_decl(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.name == name)
    }

    fn is_declared(&self, name: &str) -> bool {
        self.input_decl(name).is_some() || self.flag_decl(name).is_some()
    }

    /// `declareInput(name, domain, default)`.
    pub fn declare_input(
        &mut self,
        name: &str,
        domain: ValueDomain,
        default: Option<&str>,
    ) -> Result<()> {
        let mut input = ConfigInput::new(name, domain);
        if let Some(default) = default {
            input = input.with_default(default);
        }
        self.add_input(input)
    }

    /// Declare a fully built input, rejecting duplicates and bad defaults.
    pub fn add_input(&mut self, input: ConfigInput) -> Result<()> {
        if self.is_declared(&input.name) {
            return Err(SynthError::DuplicateDeclaration {
                fragment: self.fragment.clone(),
                name: input.name,
            });
        }
        if let Some(default) = input.default.as_deref() {
            input.resolve(&self.fragment, Some(default))?;
        }
        self.inputs.push(input);
        Ok(())
    }

    /// `declareFlag(name, expression)`.
    ///
    /// A self reference is cyclic; any other reference must already be
    /// declared in this fragment.
    pub fn declare_flag(&mut self, name: &str, expr: Expr) -> Result<()> {
        if self.is_declared(name) {
            return Err(SynthError::DuplicateDeclaration {
                fragment: self.fragment.clone(),
                name: name.to_string(),
            });
        }
        let flags = expr.flags();
        if flags.contains(name) {
            return Err(SynthError::CyclicDependency {
                fragment: self.fragment.clone(),
                flag: name.to_string(),
                via: name.to_string(),
            });
        }
        for referenced in &flags {
            if self.flag_decl(referenced).is_none() {
                return Err(self.undeclared(name, referenced));
            }
        }
        for referenced in expr.inputs() {
            if self.input_decl(&referenced).is_none() {
                return Err(self.undeclared(name, &referenced));
            }
        }
        self.flags.push(Flag {
            name: name.to_string(),
            expr,
            fragment: self.fragment.clone(),
        });
        Ok(())
    }

    /// Check that `expr`, used by `referrer`, only names declared entities.
    pub fn check_expr(&self, referrer: &str, expr: &Expr) -> Result<()> {
        for referenced in expr.flags() {
            if self.flag_decl(&referenced).is_none() {
                return Err(self.undeclared(referrer, &referenced));
            }
        }
        for referenced in expr.inputs() {
            if self.input_decl(&referenced).is_none() {
                return Err(self.undeclared(referrer, &referenced));
            }
        }
        Ok(())
    }

    fn undeclared(&self, referrer: &str, name: &str) -> SynthError {
        SynthError::UndeclaredReference {
            fragment: self.fragment.clone(),
            referrer: referrer.to_string(),
            name: name.to_string(),
        }
    }

    /// Resolve inputs only, without flags.
    pub fn resolve_inputs(&self, values: &InputValues) -> Result<BTreeMap<String, String>> {
        if let Some(unknown) = values.keys().find(|k| self.input_decl(k).is_none()) {
            return Err(self.undeclared("inputs", unknown));
        }
        self.inputs
            .iter()
            .map(|input| {
                let supplied = values.get(&input.name).map(String::as_str);
                let value = input.resolve(&self.fragment, supplied)?;
                Ok((input.name.clone(), value))
            })
            .collect()
    }

    /// `evaluate(inputValues) -> map<FlagName, bool>`.
    ///
    /// Pure: identical inputs always yield an identical resolution.
    pub fn evaluate(&self, values: &InputValues) -> Result<Resolution> {
        let mut res = Resolution {
            fragment: self.fragment.clone(),
            inputs: self.resolve_inputs(values)?,
            flags: BTreeMap::new(),
        };
        for flag in &self.flags {
            let value = flag.expr.eval(&res)?;
            debug!(fragment = %self.fragment, flag = %flag.name, value, "resolved flag");
            res.flags.insert(flag.name.clone(), value);
        }
        Ok(res)
    }

    /// The inputs a flag transitively depends on (its cone of influence).
    pub fn flag_support(&self, name: &str) -> BTreeSet<String> {
        match self.flag_decl(name) {
            Some(flag) => self.expr_support(&flag.expr),
            None => BTreeSet::new(),
        }
    }

    /// The inputs an expression transitively depends on through flags.
    pub fn expr_support(&self, expr: &Expr) -> BTreeSet<String> {
        let mut out = expr.inputs();
        let mut pending: Vec<String> = expr.flags().into_iter().collect();
        let mut seen = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(flag) = self.flag_decl(&name) {
                out.extend(flag.expr.inputs());
                pending.extend(flag.expr.flags());
            }
        }
        out
    }

    /// Every literal any flag in this fragment compares `input` against.
    pub fn literals_for(&self, input: &str) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|f| f.expr.literals_for(input))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{and, eq, flag, not, or};

    fn engine() -> ConditionEngine {
        let mut e = ConditionEngine::new("root");
        e.declare_input(
            "Mode",
            ValueDomain::enumeration(["lambda", "athena", "rate", "no"]),
            Some("rate"),
        )
        .unwrap();
        e.declare_flag("Lambda", eq("Mode", "lambda")).unwrap();
        e.declare_flag("Athena", eq("Mode", "athena")).unwrap();
        e.declare_flag("LogParser", or([flag("Lambda"), flag("Athena")]))
            .unwrap();
        e
    }

    #[test]
    fn evaluates_in_declaration_order() {
        let e = engine();
        let values = InputValues::from([("Mode".to_string(), "athena".to_string())]);
        let res = e.evaluate(&values).unwrap();
        assert_eq!(res.flag("Athena"), Some(true));
        assert_eq!(res.flag("Lambda"), Some(false));
        assert_eq!(res.flag("LogParser"), Some(true));
        assert_eq!(res.input("Mode"), Some("athena"));
    }

    #[test]
    fn defaults_fill_missing_inputs() {
        let res = engine().evaluate(&InputValues::new()).unwrap();
        assert_eq!(res.input("Mode"), Some("rate"));
        assert_eq!(res.flag("LogParser"), Some(false));
    }

    #[test]
    fn forward_reference_is_undeclared() {
        let mut e = engine();
        let err = e
            .declare_flag("Early", and([flag("Later"), not(flag("Lambda"))]))
            .unwrap_err();
        assert_eq!(
            err,
            SynthError::UndeclaredReference {
                fragment: "root".into(),
                referrer: "Early".into(),
                name: "Later".into(),
            }
        );
    }

    #[test]
    fn self_reference_is_cyclic() {
        let mut e = engine();
        let err = e.declare_flag("Loop", or([flag("Loop")])).unwrap_err();
        assert_eq!(err.class(), "cyclic_dependency");
    }

    #[test]
    fn duplicate_and_unknown_names_are_rejected() {
        let mut e = engine();
        assert_eq!(
            e.declare_flag("Mode", flag("Lambda")).unwrap_err().class(),
            "duplicate_declaration"
        );
        let values = InputValues::from([("Other".to_string(), "x".to_string())]);
        assert_eq!(e.evaluate(&values).unwrap_err().class(), "undeclared_reference");
    }

    #[test]
    fn bad_default_is_rejected_at_declaration() {
        let mut e = ConditionEngine::new("root");
        let err = e
            .declare_input("Mode", ValueDomain::enumeration(["yes", "no"]), Some("maybe"))
            .unwrap_err();
        assert_eq!(err.class(), "invalid_input_value");
    }

    #[test]
    fn support_follows_flags_to_inputs() {
        let e = engine();
        assert_eq!(e.flag_support("LogParser"), BTreeSet::from(["Mode".to_string()]));
        assert_eq!(e.literals_for("Mode"), vec!["lambda".to_string(), "athena".to_string()]);
    }
}
