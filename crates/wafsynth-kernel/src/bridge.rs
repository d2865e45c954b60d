//! Cross-Fragment Parameter Bridge and its drift checker.
//!
//! Only scalar strings cross a boundary. A child rebuilds the flags it needs
//! from the values it receives, so for every flag both sides declare the
//! parent's value must equal the child's value after bridging. The checker
//! enumerates every assignment of each such flag's input support.

use crate::choice::{Choice, RenderContext, as_scalar_string};
use crate::engine::{ConditionEngine, Resolution};
use crate::error::{Result, SynthError};
use crate::expr::Expr;
use crate::input::InputValues;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// The link between a parent fragment and one child.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentBoundary {
    pub parent: String,
    pub child: String,
    /// Id of the unit in the parent that instantiates the child.
    pub unit: String,
    /// The child exists only when this holds in the parent.
    pub include_when: Expr,
    pub depends_on: Vec<String>,
    /// Child parameter name and the parent-side choice that fills it.
    pub forwarded: Vec<(String, Choice)>,
}

impl FragmentBoundary {
    pub fn new(parent: &str, child: &str, unit: &str) -> Self {
        Self {
            parent: parent.to_string(),
            child: child.to_string(),
            unit: unit.to_string(),
            include_when: Expr::True,
            depends_on: Vec::new(),
            forwarded: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.include_when = condition;
        self
    }

    pub fn depends_on(mut self, unit: &str) -> Self {
        self.depends_on.push(unit.to_string());
        self
    }

    /// Forward a parent input verbatim under the same name.
    pub fn mirror(self, input: &str) -> Self {
        self.forward(input, Choice::input(input))
    }

    pub fn forward(mut self, param: &str, value: Choice) -> Self {
        self.forwarded.push((param.to_string(), value));
        self
    }

    pub fn forwarded_choice(&self, param: &str) -> Option<&Choice> {
        self.forwarded
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, choice)| choice)
    }
}

/// `forward(childFragmentId, scalarValues)`.
///
/// Renders each forwarded choice against the parent's resolution. An absent
/// outcome omits the parameter so the child falls back to its default.
pub fn forward(
    parent: &Resolution,
    boundary: &FragmentBoundary,
    units: Option<&BTreeSet<String>>,
) -> Result<InputValues> {
    let ctx = RenderContext {
        res: parent,
        owner: &boundary.unit,
        units,
    };
    let mut out = InputValues::new();
    for (param, choice) in &boundary.forwarded {
        if let Some(value) = choice.render(&ctx)? {
            out.insert(param.clone(), as_scalar_string(&value));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub parent: String,
    pub child: String,
    pub flags_checked: Vec<String>,
    pub assignments: usize,
}

/// Verify every flag declared on both sides of `boundary` agrees.
///
/// Assignments where the child is not instantiated are skipped: its flags
/// are never computed there.
pub fn check_boundary(
    parent: &ConditionEngine,
    child: &ConditionEngine,
    boundary: &FragmentBoundary,
) -> Result<DriftReport> {
    let shared: Vec<String> = child
        .flags()
        .iter()
        .filter(|f| parent.flag_decl(&f.name).is_some())
        .map(|f| f.name.clone())
        .collect();

    let mut assignments = 0;
    for name in &shared {
        let support = root_support(parent, child, boundary, name);
        let axes = sample_axes(parent, child, &support);
        for assignment in Assignments::new(&axes) {
            let values = assignment_values(parent, &assignment);
            let parent_res = parent.evaluate(&values)?;
            if !boundary.include_when.eval(&parent_res)? {
                continue;
            }
            assignments += 1;
            let forwarded = forward(&parent_res, boundary, None)?;
            let child_res = child.evaluate(&forwarded)?;
            let parent_value = parent_res.flag(name).unwrap_or(false);
            let child_value = child_res.flag(name).unwrap_or(false);
            if parent_value != child_value {
                let rendered = assignment
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(
                    parent = %boundary.parent,
                    child = %boundary.child,
                    flag = %name,
                    assignment = %rendered,
                    "boundary drift"
                );
                return Err(SynthError::BoundaryDrift {
                    parent: boundary.parent.clone(),
                    child: boundary.child.clone(),
                    flag: name.clone(),
                    assignment: rendered,
                    parent_value,
                    child_value,
                });
            }
        }
    }
    info!(
        parent = %boundary.parent,
        child = %boundary.child,
        flags = shared.len(),
        assignments,
        "boundary consistent"
    );
    Ok(DriftReport {
        parent: boundary.parent.clone(),
        child: boundary.child.clone(),
        flags_checked: shared,
        assignments,
    })
}

/// Parent inputs that can influence `flag` on either side of the boundary.
fn root_support(
    parent: &ConditionEngine,
    child: &ConditionEngine,
    boundary: &FragmentBoundary,
    flag: &str,
) -> BTreeSet<String> {
    let mut support = parent.flag_support(flag);
    support.extend(parent.expr_support(&boundary.include_when));
    for child_input in child.flag_support(flag) {
        if let Some(choice) = boundary.forwarded_choice(&child_input) {
            let (inputs, flags) = choice.references();
            support.extend(inputs);
            for f in flags {
                support.extend(parent.flag_support(&f));
            }
        }
    }
    support
}

fn sample_axes(
    parent: &ConditionEngine,
    child: &ConditionEngine,
    support: &BTreeSet<String>,
) -> Vec<(String, Vec<String>)> {
    support
        .iter()
        .filter_map(|name| {
            let decl = parent.input_decl(name)?;
            let mut literals = parent.literals_for(name);
            literals.extend(child.literals_for(name));
            let samples = decl.domain.samples(decl.default.as_deref(), &literals);
            Some((name.clone(), samples))
        })
        .collect()
}

fn assignment_values(parent: &ConditionEngine, assignment: &[(String, String)]) -> InputValues {
    let mut values: InputValues = assignment.iter().cloned().collect();
    for input in parent.inputs() {
        if values.contains_key(&input.name) || input.default.is_some() {
            continue;
        }
        if let Some(first) = input.domain.samples(None, &[]).into_iter().next() {
            values.insert(input.name.clone(), first);
        }
    }
    values
}

/// Cartesian product over named sample axes, in odometer order.
struct Assignments<'a> {
    axes: &'a [(String, Vec<String>)],
    cursor: Option<Vec<usize>>,
}

impl<'a> Assignments<'a> {
    fn new(axes: &'a [(String, Vec<String>)]) -> Self {
        let cursor = if axes.iter().any(|(_, samples)| samples.is_empty()) {
            None
        } else {
            Some(vec![0; axes.len()])
        };
        Self { axes, cursor }
    }
}

impl Iterator for Assignments<'_> {
    type Item = Vec<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        let item = self
            .axes
            .iter()
            .zip(cursor.iter())
            .map(|((name, samples), &i)| (name.clone(), samples[i].clone()))
            .collect();

        let mut advanced = false;
        for (slot, (_, samples)) in cursor.iter_mut().zip(self.axes).rev() {
            *slot += 1;
            if *slot < samples.len() {
                advanced = true;
                break;
            }
            *slot = 0;
        }
        if !advanced {
            self.cursor = None;
        }
        Some(item)
    }
}

/// Every assignment of `names` over their sample domains, with the other
/// inputs left to their defaults. Enumerates the way the checker does.
pub fn enumerate_inputs(engine: &ConditionEngine, names: &[&str]) -> Vec<InputValues> {
    let support: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();
    let axes = sample_axes(engine, engine, &support);
    Assignments::new(&axes)
        .map(|assignment| assignment_values(engine, &assignment))
        .collect::<Vec<_>>()
}

/// Collapse a resolution to the flags both sides share, for diagnostics.
pub fn shared_flags(parent: &Resolution, child: &Resolution) -> BTreeMap<String, (bool, bool)> {
    parent
        .flags
        .iter()
        .filter_map(|(name, &p)| child.flag(name).map(|c| (name.clone(), (p, c))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{and, eq, flag, not, or};
    use crate::input::ValueDomain;

    const MODES: [&str; 3] = ["lambda", "athena", "no"];

    fn parent() -> ConditionEngine {
        let mut e = ConditionEngine::new("root");
        e.declare_input("Mode", ValueDomain::enumeration(MODES), Some("no"))
            .unwrap();
        e.declare_input("BadBot", ValueDomain::enumeration(["yes", "no"]), Some("yes"))
            .unwrap();
        e.declare_input("Bucket", ValueDomain::text(), Some(""))
            .unwrap();
        e.declare_flag("Lambda", eq("Mode", "lambda")).unwrap();
        e.declare_flag("Athena", eq("Mode", "athena")).unwrap();
        e.declare_flag("BadBotOn", eq("BadBot", "yes")).unwrap();
        e.declare_flag("LogParser", or([flag("Lambda"), flag("Athena")]))
            .unwrap();
        e.declare_flag(
            "BadBotLambda",
            and([flag("BadBotOn"), not(flag("Lambda")), not(flag("Athena"))]),
        )
        .unwrap();
        e
    }

    fn child(bad_bot_expr: Expr) -> ConditionEngine {
        let mut e = ConditionEngine::new("child");
        e.declare_input("Mode", ValueDomain::enumeration(MODES), Some("no"))
            .unwrap();
        e.declare_input("BadBot", ValueDomain::enumeration(["yes", "no"]), Some("yes"))
            .unwrap();
        e.declare_input("Bucket", ValueDomain::text(), Some(""))
            .unwrap();
        e.declare_flag("Lambda", eq("Mode", "lambda")).unwrap();
        e.declare_flag("Athena", eq("Mode", "athena")).unwrap();
        e.declare_flag("BadBotLambda", bad_bot_expr).unwrap();
        e
    }

    fn boundary() -> FragmentBoundary {
        FragmentBoundary::new("root", "child", "ChildStack")
            .when(flag("LogParser"))
            .mirror("Mode")
            .mirror("BadBot")
            .forward(
                "Bucket",
                Choice::select(flag("Athena"), Choice::reference("Bucket"), Choice::text("")),
            )
    }

    #[test]
    fn forward_renders_scalars_and_omits_absent() {
        let p = parent();
        let values = InputValues::from([("Mode".to_string(), "athena".to_string())]);
        let res = p.evaluate(&values).unwrap();
        let b = boundary().forward("Skipped", Choice::when(flag("Lambda"), Choice::text("x")));
        let out = forward(&res, &b, None).unwrap();
        assert_eq!(out.get("Mode").map(String::as_str), Some("athena"));
        assert_eq!(out.get("Bucket").map(String::as_str), Some("${Bucket}"));
        assert!(!out.contains_key("Skipped"));
    }

    #[test]
    fn equivalent_rederivation_passes() {
        let c = child(and([
            eq("BadBot", "yes"),
            not(or([flag("Lambda"), flag("Athena")])),
        ]));
        let report = check_boundary(&parent(), &c, &boundary()).unwrap();
        assert_eq!(report.flags_checked, vec!["Lambda", "Athena", "BadBotLambda"]);
        assert!(report.assignments > 0);
    }

    #[test]
    fn drifted_rederivation_is_caught() {
        let p = parent();
        // Forgets to exclude the athena mode.
        let c = child(and([eq("BadBot", "yes"), not(flag("Lambda"))]));
        let b = FragmentBoundary::new("root", "child", "ChildStack")
            .mirror("Mode")
            .mirror("BadBot");
        let err = check_boundary(&p, &c, &b).unwrap_err();
        match err {
            SynthError::BoundaryDrift {
                flag,
                assignment,
                parent_value,
                child_value,
                ..
            } => {
                assert_eq!(flag, "BadBotLambda");
                assert!(assignment.contains("Mode=athena"));
                assert!(!parent_value);
                assert!(child_value);
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[test]
    fn unforwarded_input_falls_back_to_child_default() {
        let p = parent();
        let c = child(and([eq("BadBot", "yes"), not(flag("Lambda")), not(flag("Athena"))]));
        let b = FragmentBoundary::new("root", "child", "ChildStack").mirror("Mode");
        let err = check_boundary(&p, &c, &b).unwrap_err();
        assert_eq!(err.class(), "boundary_drift");
    }

    #[test]
    fn assignments_enumerate_the_full_product() {
        let p = parent();
        let all = enumerate_inputs(&p, &["Mode", "BadBot"]);
        assert_eq!(all.len(), 6);
        let mut seen = BTreeSet::new();
        for values in &all {
            seen.insert((values["Mode"].clone(), values["BadBot"].clone()));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn shared_flags_pairs_values() {
        let p = parent();
        let c = child(and([eq("BadBot", "yes"), not(flag("Lambda")), not(flag("Athena"))]));
        let pr = p.evaluate(&InputValues::new()).unwrap();
        let cr = c.evaluate(&InputValues::new()).unwrap();
        let pairs = shared_flags(&pr, &cr);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.values().all(|(a, b)| a == b));
    }
}
