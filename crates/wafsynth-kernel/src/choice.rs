//! Value Propagation Resolver.
//!
//! A `Choice` is an expression tree that renders to a JSON value or to
//! absence. Absence means "omit this field", which is distinct from an
//! empty string. Only the branch a `Select` picks is ever rendered.

use crate::engine::Resolution;
use crate::error::{Result, SynthError};
use crate::expr::Expr;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Prefix of pseudo targets supplied by the provisioning platform.
pub const PSEUDO_PREFIX: &str = "AWS::";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scalar {
    Literal { value: Value },
    Input { name: String },
    /// Reference to another unit, rendered as `${unit}` or `${unit.attribute}`.
    Ref {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    },
    /// Text with `${Input}` placeholders filled from the resolution.
    /// Placeholders naming pseudo targets or attributes pass through as-is.
    Sub { template: String },
}

impl Scalar {
    pub fn token(target: &str, attribute: Option<&str>) -> String {
        match attribute {
            Some(attr) => format!("${{{target}.{attr}}}"),
            None => format!("${{{target}}}"),
        }
    }
}

/// Input names a `Sub` template substitutes, in order of appearance.
pub fn template_inputs(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        if !name.is_empty() && !name.contains("::") && !name.contains('.') {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    names
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Choice {
    Absent,
    Leaf {
        scalar: Scalar,
    },
    Select {
        when: Expr,
        then: Box<Choice>,
        otherwise: Box<Choice>,
    },
    List {
        items: Vec<Choice>,
    },
    Map {
        entries: Vec<(String, Choice)>,
    },
}

/// What a choice renders against.
pub struct RenderContext<'a> {
    pub res: &'a Resolution,
    /// Element being rendered, for diagnostics.
    pub owner: &'a str,
    /// Units present in the fragment. `None` skips the dangling check.
    pub units: Option<&'a BTreeSet<String>>,
}

impl Choice {
    pub fn text(value: &str) -> Self {
        Self::literal(Value::String(value.to_string()))
    }

    pub fn number(value: i64) -> Self {
        Self::literal(Value::from(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Value::Bool(value))
    }

    pub fn literal(value: Value) -> Self {
        Choice::Leaf {
            scalar: Scalar::Literal { value },
        }
    }

    pub fn input(name: &str) -> Self {
        Choice::Leaf {
            scalar: Scalar::Input {
                name: name.to_string(),
            },
        }
    }

    pub fn reference(target: &str) -> Self {
        Choice::Leaf {
            scalar: Scalar::Ref {
                target: target.to_string(),
                attribute: None,
            },
        }
    }

    pub fn attr(target: &str, attribute: &str) -> Self {
        Choice::Leaf {
            scalar: Scalar::Ref {
                target: target.to_string(),
                attribute: Some(attribute.to_string()),
            },
        }
    }

    pub fn sub(template: &str) -> Self {
        Choice::Leaf {
            scalar: Scalar::Sub {
                template: template.to_string(),
            },
        }
    }

    /// `select(flag, ifTrue, ifFalse)`.
    pub fn select(when: Expr, then: Choice, otherwise: Choice) -> Self {
        Choice::Select {
            when,
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// `then` when `when` holds, otherwise absent.
    pub fn when(when: Expr, then: Choice) -> Self {
        Self::select(when, then, Choice::Absent)
    }

    pub fn list<I: IntoIterator<Item = Choice>>(items: I) -> Self {
        Choice::List {
            items: items.into_iter().collect(),
        }
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Choice)>,
        K: Into<String>,
    {
        Choice::Map {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Render to a value, or `None` when the outcome is absent.
    ///
    /// Absent list items and map entries are dropped. A list or map that
    /// loses every element is still emitted, empty.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<Option<Value>> {
        match self {
            Choice::Absent => Ok(None),
            Choice::Leaf { scalar } => render_scalar(scalar, ctx).map(Some),
            Choice::Select {
                when,
                then,
                otherwise,
            } => {
                if when.eval(ctx.res)? {
                    then.render(ctx)
                } else {
                    otherwise.render(ctx)
                }
            }
            Choice::List { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = item.render(ctx)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Choice::Map { entries } => {
                let mut out = Map::new();
                for (key, choice) in entries {
                    if let Some(value) = choice.render(ctx)? {
                        out.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
        }
    }

    /// Flags and inputs any branch may consult, including `Input` leaves.
    pub fn references(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut inputs = BTreeSet::new();
        let mut flags = BTreeSet::new();
        self.collect(&mut inputs, &mut flags);
        (inputs, flags)
    }

    fn collect(&self, inputs: &mut BTreeSet<String>, flags: &mut BTreeSet<String>) {
        match self {
            Choice::Absent => {}
            Choice::Leaf { scalar } => {
                match scalar {
                    Scalar::Input { name } => {
                        inputs.insert(name.clone());
                    }
                    Scalar::Sub { template } => {
                        inputs.extend(template_inputs(template).into_iter().map(String::from));
                    }
                    Scalar::Literal { .. } | Scalar::Ref { .. } => {}
                }
            }
            Choice::Select {
                when,
                then,
                otherwise,
            } => {
                inputs.extend(when.inputs());
                flags.extend(when.flags());
                then.collect(inputs, flags);
                otherwise.collect(inputs, flags);
            }
            Choice::List { items } => {
                for item in items {
                    item.collect(inputs, flags);
                }
            }
            Choice::Map { entries } => {
                for (_, choice) in entries {
                    choice.collect(inputs, flags);
                }
            }
        }
    }

    /// Every governing expression, for declaration checks.
    pub fn conditions(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.conditions_into(&mut out);
        out
    }

    fn conditions_into<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Choice::Select {
                when,
                then,
                otherwise,
            } => {
                out.push(when);
                then.conditions_into(out);
                otherwise.conditions_into(out);
            }
            Choice::List { items } => items.iter().for_each(|c| c.conditions_into(out)),
            Choice::Map { entries } => entries.iter().for_each(|(_, c)| c.conditions_into(out)),
            Choice::Absent | Choice::Leaf { .. } => {}
        }
    }

    /// Maximum depth of nested `Select`s.
    pub fn select_depth(&self) -> usize {
        match self {
            Choice::Select {
                then, otherwise, ..
            } => 1 + then.select_depth().max(otherwise.select_depth()),
            Choice::List { items } => items.iter().map(Choice::select_depth).max().unwrap_or(0),
            Choice::Map { entries } => entries
                .iter()
                .map(|(_, c)| c.select_depth())
                .max()
                .unwrap_or(0),
            Choice::Absent | Choice::Leaf { .. } => 0,
        }
    }
}

fn render_scalar(scalar: &Scalar, ctx: &RenderContext<'_>) -> Result<Value> {
    match scalar {
        Scalar::Literal { value } => Ok(value.clone()),
        Scalar::Input { name } => ctx
            .res
            .input(name)
            .map(|v| Value::String(v.to_string()))
            .ok_or_else(|| SynthError::UndeclaredReference {
                fragment: ctx.res.fragment.clone(),
                referrer: ctx.owner.to_string(),
                name: name.clone(),
            }),
        Scalar::Ref { target, attribute } => {
            if !target.starts_with(PSEUDO_PREFIX)
                && let Some(units) = ctx.units
                && !units.contains(target)
            {
                return Err(SynthError::DanglingReference {
                    fragment: ctx.res.fragment.clone(),
                    unit: ctx.owner.to_string(),
                    target: target.clone(),
                });
            }
            Ok(Value::String(Scalar::token(target, attribute.as_deref())))
        }
        Scalar::Sub { template } => {
            let mut text = template.clone();
            for name in template_inputs(template) {
                let value = ctx.res.input(name).ok_or_else(|| SynthError::UndeclaredReference {
                    fragment: ctx.res.fragment.clone(),
                    referrer: ctx.owner.to_string(),
                    name: name.to_string(),
                })?;
                text = text.replace(&format!("${{{name}}}"), value);
            }
            Ok(Value::String(text))
        }
    }
}

/// Render a choice as a scalar string, as a boundary parameter or
/// environment value would carry it.
pub fn as_scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
