//! Boolean expressions over inputs and flags.
//!
//! Expressions are plain data so that one table of them can be shared by
//! every fragment, displayed, and walked for references.

use crate::engine::Resolution;
use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    True,
    /// Input value equals a literal. Numeric values compare numerically.
    Equals { input: String, value: String },
    /// Input value parses as an integer `>= threshold`.
    AtLeast { input: String, threshold: i64 },
    Flag { name: String },
    Not { expr: Box<Expr> },
    /// True when every operand is true; `And([])` is true.
    And { all: Vec<Expr> },
    /// True when any operand is true; `Or([])` is false.
    Or { any: Vec<Expr> },
}

pub fn eq(input: &str, value: &str) -> Expr {
    Expr::Equals {
        input: input.to_string(),
        value: value.to_string(),
    }
}

pub fn ne(input: &str, value: &str) -> Expr {
    not(eq(input, value))
}

pub fn at_least(input: &str, threshold: i64) -> Expr {
    Expr::AtLeast {
        input: input.to_string(),
        threshold,
    }
}

pub fn flag(name: &str) -> Expr {
    Expr::Flag {
        name: name.to_string(),
    }
}

pub fn not(expr: Expr) -> Expr {
    Expr::Not {
        expr: Box::new(expr),
    }
}

pub fn and<I: IntoIterator<Item = Expr>>(all: I) -> Expr {
    Expr::And {
        all: all.into_iter().collect(),
    }
}

pub fn or<I: IntoIterator<Item = Expr>>(any: I) -> Expr {
    Expr::Or {
        any: any.into_iter().collect(),
    }
}

impl Expr {
    /// Evaluate against already-resolved inputs and flags.
    ///
    /// `And`/`Or` short-circuit, so an operand after the deciding one is
    /// never looked up.
    pub fn eval(&self, res: &Resolution) -> Result<bool> {
        match self {
            Expr::True => Ok(true),
            Expr::Equals { input, value } => {
                let actual = lookup_input(res, input)?;
                Ok(values_equal(actual, value))
            }
            Expr::AtLeast { input, threshold } => {
                let actual = lookup_input(res, input)?;
                Ok(actual
                    .trim()
                    .parse::<i64>()
                    .map(|n| n >= *threshold)
                    .unwrap_or(false))
            }
            Expr::Flag { name } => {
                res.flag(name)
                    .ok_or_else(|| SynthError::UndeclaredReference {
                        fragment: res.fragment.clone(),
                        referrer: "expression".to_string(),
                        name: name.clone(),
                    })
            }
            Expr::Not { expr } => Ok(!expr.eval(res)?),
            Expr::And { all } => {
                for e in all {
                    if !e.eval(res)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Or { any } => {
                for e in any {
                    if e.eval(res)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Input names referenced directly (not through flags).
    pub fn inputs(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk(&mut |e| match e {
            Expr::Equals { input, .. } | Expr::AtLeast { input, .. } => {
                out.insert(input.clone());
            }
            _ => {}
        });
        out
    }

    /// Flag names referenced directly.
    pub fn flags(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.walk(&mut |e| {
            if let Expr::Flag { name } = e {
                out.insert(name.clone());
            }
        });
        out
    }

    /// Literals this expression compares `input` against.
    pub fn literals_for(&self, input: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |e| match e {
            Expr::Equals { input: i, value } if i == input => out.push(value.clone()),
            Expr::AtLeast { input: i, threshold } if i == input => {
                out.push(threshold.to_string());
            }
            _ => {}
        });
        out
    }

    /// Nesting depth; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Expr::Not { expr } => 1 + expr.depth(),
            Expr::And { all: es } | Expr::Or { any: es } => {
                1 + es.iter().map(Expr::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    fn walk<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Expr::Not { expr } => expr.walk(f),
            Expr::And { all: es } | Expr::Or { any: es } => {
                for e in es {
                    e.walk(f);
                }
            }
            _ => {}
        }
    }
}

fn lookup_input<'a>(res: &'a Resolution, input: &str) -> Result<&'a str> {
    res.input(input).ok_or_else(|| SynthError::UndeclaredReference {
        fragment: res.fragment.clone(),
        referrer: "expression".to_string(),
        name: input.to_string(),
    })
}

fn values_equal(actual: &str, literal: &str) -> bool {
    if actual == literal {
        return true;
    }
    match (actual.trim().parse::<i64>(), literal.trim().parse::<i64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => write!(f, "true"),
            Expr::Equals { input, value } => write!(f, "{input} == {value:?}"),
            Expr::AtLeast { input, threshold } => write!(f, "{input} >= {threshold}"),
            Expr::Flag { name } => write!(f, "{name}"),
            Expr::Not { expr } => match expr.as_ref() {
                Expr::Equals { input, value } => write!(f, "{input} != {value:?}"),
                inner => write!(f, "!{inner}"),
            },
            Expr::And { all } => join(f, all, " && ", "true"),
            Expr::Or { any } => join(f, any, " || ", "false"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, es: &[Expr], sep: &str, empty: &str) -> fmt::Result {
    if es.is_empty() {
        return write!(f, "{empty}");
    }
    write!(f, "(")?;
    for (i, e) in es.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{e}")?;
    }
    write!(f, ")")
}
