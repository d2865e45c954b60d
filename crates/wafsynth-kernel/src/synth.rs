//! Fragment specifications and the synthesis pass.
//!
//! A stack is a tree of fragments. Synthesis resolves the root, emits its
//! gated units and outputs, forwards scalars to each included child and
//! recurses. Any error aborts the pass; no partial artifact is returned.

use crate::bridge::{DriftReport, FragmentBoundary, check_boundary, forward};
use crate::choice::{Choice, RenderContext};
use crate::engine::{ConditionEngine, Resolution};
use crate::error::{Result, SynthError};
use crate::expr::Expr;
use crate::gate::include;
use crate::input::InputValues;
use crate::schedule::ThrottleChain;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Kind recorded for the unit that instantiates a child fragment.
pub const FRAGMENT_UNIT_KIND: &str = "Fragment";

/// A unit of infrastructure, emitted only when `condition` holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSpec {
    pub id: String,
    pub kind: String,
    pub condition: Expr,
    pub depends_on: Vec<String>,
    pub properties: Choice,
}

impl UnitSpec {
    pub fn new(id: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            condition: Expr::True,
            depends_on: Vec::new(),
            properties: Choice::Absent,
        }
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.condition = condition;
        self
    }

    pub fn after(mut self, unit: &str) -> Self {
        self.depends_on.push(unit.to_string());
        self
    }

    pub fn props(mut self, properties: Choice) -> Self {
        self.properties = properties;
        self
    }
}

/// A named output, carrying its own inclusion condition.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSpec {
    pub name: String,
    pub condition: Expr,
    pub value: Choice,
}

impl OutputSpec {
    pub fn new(name: &str, value: Choice) -> Self {
        Self {
            name: name.to_string(),
            condition: Expr::True,
            value,
        }
    }

    pub fn when(mut self, condition: Expr) -> Self {
        self.condition = condition;
        self
    }
}

/// Cross-field validation: when `when` holds, `assert` must hold too.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionRule {
    pub name: String,
    pub when: Expr,
    pub assert: Expr,
    pub description: String,
}

impl AssertionRule {
    pub fn new(name: &str, when: Expr, assert: Expr, description: &str) -> Self {
        Self {
            name: name.to_string(),
            when,
            assert,
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FragmentSpec {
    pub engine: ConditionEngine,
    pub rules: Vec<AssertionRule>,
    pub units: Vec<UnitSpec>,
    pub outputs: Vec<OutputSpec>,
    pub children: Vec<FragmentBoundary>,
    pub chains: Vec<ThrottleChain>,
}

impl FragmentSpec {
    pub fn new(engine: ConditionEngine) -> Self {
        Self {
            engine,
            rules: Vec::new(),
            units: Vec::new(),
            outputs: Vec::new(),
            children: Vec::new(),
            chains: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.engine.fragment()
    }

    pub fn unit(&self, id: &str) -> Option<&UnitSpec> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Serialize `chain` by threading it through the units' dependencies.
    pub fn add_chain(&mut self, chain: ThrottleChain) -> Result<()> {
        chain.apply(self.engine.fragment(), &mut self.units)?;
        self.chains.push(chain);
        Ok(())
    }

    /// Static checks: unique ids, declared references, known dependencies.
    pub fn validate(&self) -> Result<()> {
        let fragment = self.id();
        let mut ids = BTreeSet::new();
        let unit_ids = self
            .units
            .iter()
            .map(|u| u.id.as_str())
            .chain(self.children.iter().map(|b| b.unit.as_str()));
        for id in unit_ids {
            if !ids.insert(id) {
                return Err(SynthError::DuplicateDeclaration {
                    fragment: fragment.to_string(),
                    name: id.to_string(),
                });
            }
        }
        let mut outputs = BTreeSet::new();
        for output in &self.outputs {
            if !outputs.insert(output.name.as_str()) {
                return Err(SynthError::DuplicateDeclaration {
                    fragment: fragment.to_string(),
                    name: output.name.clone(),
                });
            }
            self.check_choice(&output.name, &output.condition, &output.value)?;
        }
        for rule in &self.rules {
            self.engine.check_expr(&rule.name, &rule.when)?;
            self.engine.check_expr(&rule.name, &rule.assert)?;
        }
        for unit in &self.units {
            self.check_choice(&unit.id, &unit.condition, &unit.properties)?;
            self.check_depends(&unit.id, &unit.depends_on, &ids)?;
        }
        for boundary in &self.children {
            self.engine.check_expr(&boundary.unit, &boundary.include_when)?;
            for (_, choice) in &boundary.forwarded {
                self.check_choice(&boundary.unit, &Expr::True, choice)?;
            }
            self.check_depends(&boundary.unit, &boundary.depends_on, &ids)?;
        }
        Ok(())
    }

    fn check_choice(&self, owner: &str, condition: &Expr, choice: &Choice) -> Result<()> {
        self.engine.check_expr(owner, condition)?;
        for expr in choice.conditions() {
            self.engine.check_expr(owner, expr)?;
        }
        let (inputs, _) = choice.references();
        for input in inputs {
            if self.engine.input_decl(&input).is_none() {
                return Err(SynthError::UndeclaredReference {
                    fragment: self.id().to_string(),
                    referrer: owner.to_string(),
                    name: input,
                });
            }
        }
        Ok(())
    }

    fn check_depends(&self, owner: &str, deps: &[String], ids: &BTreeSet<&str>) -> Result<()> {
        match deps.iter().find(|d| !ids.contains(d.as_str())) {
            Some(missing) => Err(SynthError::UndeclaredReference {
                fragment: self.id().to_string(),
                referrer: owner.to_string(),
                name: missing.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Evaluate assertion rules against a resolution.
    pub fn check_rules(&self, res: &Resolution) -> Result<()> {
        for rule in &self.rules {
            if rule.when.eval(res)? && !rule.assert.eval(res)? {
                let mut names = self.engine.expr_support(&rule.when);
                names.extend(self.engine.expr_support(&rule.assert));
                let inputs = names
                    .iter()
                    .map(|n| format!("{n}={}", res.input(n).unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(SynthError::InvalidConfigCombination {
                    fragment: self.id().to_string(),
                    rule: rule.name.clone(),
                    description: rule.description.clone(),
                    inputs,
                });
            }
        }
        Ok(())
    }
}

/// A tree of fragments rooted at `root`.
#[derive(Debug, Clone)]
pub struct StackSpec {
    pub name: String,
    pub root: String,
    pub fragments: Vec<FragmentSpec>,
}

impl StackSpec {
    pub fn fragment(&self, id: &str) -> Option<&FragmentSpec> {
        self.fragments.iter().find(|f| f.id() == id)
    }

    fn require(&self, id: &str) -> Result<&FragmentSpec> {
        self.fragment(id).ok_or_else(|| SynthError::UndeclaredReference {
            fragment: self.name.clone(),
            referrer: "stack".to_string(),
            name: id.to_string(),
        })
    }

    /// Every fragment validates, every child exists and each fragment is
    /// instantiated at most once, so the links form a tree.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::from([self.root.as_str()]);
        self.require(&self.root)?;
        for spec in &self.fragments {
            spec.validate()?;
            for boundary in &spec.children {
                self.require(&boundary.child)?;
                if !seen.insert(boundary.child.as_str()) {
                    return Err(SynthError::DuplicateDeclaration {
                        fragment: self.name.clone(),
                        name: boundary.child.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn boundaries(&self) -> impl Iterator<Item = &FragmentBoundary> {
        self.fragments.iter().flat_map(|f| f.children.iter())
    }

    /// Run the drift checker over every boundary in the stack.
    pub fn check_drift(&self) -> Result<Vec<DriftReport>> {
        self.validate()?;
        self.boundaries()
            .map(|b| {
                let parent = self.require(&b.parent)?;
                let child = self.require(&b.child)?;
                check_boundary(&parent.engine, &child.engine, b)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitArtifact {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentArtifact {
    pub id: String,
    pub parameters: BTreeMap<String, String>,
    pub flags: BTreeMap<String, bool>,
    pub units: Vec<UnitArtifact>,
    pub outputs: BTreeMap<String, Value>,
}

impl FragmentArtifact {
    pub fn unit(&self, id: &str) -> Option<&UnitArtifact> {
        self.units.iter().find(|u| u.id == id)
    }
}

/// The full static artifact set of one synthesis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub stack: String,
    pub fragments: Vec<FragmentArtifact>,
}

impl Synthesis {
    pub fn fragment(&self, id: &str) -> Option<&FragmentArtifact> {
        self.fragments.iter().find(|f| f.id == id)
    }

    /// SHA-256 of the compact JSON form, hex encoded.
    pub fn digest(&self) -> std::result::Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        let hash = Sha256::digest(&bytes);
        Ok(hash.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Synthesize the whole stack from root input values.
pub fn synthesize(stack: &StackSpec, values: &InputValues) -> Result<Synthesis> {
    stack.validate()?;
    let mut fragments = Vec::new();
    synthesize_fragment(stack, &stack.root, values, &mut fragments)?;
    let synthesis = Synthesis {
        stack: stack.name.clone(),
        fragments,
    };
    check_child_outputs(&synthesis)?;
    Ok(synthesis)
}

/// Every `${Unit.Outputs.Name}` a parent emits must name an output the
/// child behind `Unit` actually produced.
fn check_child_outputs(synthesis: &Synthesis) -> Result<()> {
    for parent in &synthesis.fragments {
        let children: BTreeMap<&str, &str> = parent
            .units
            .iter()
            .filter(|u| u.kind == FRAGMENT_UNIT_KIND)
            .filter_map(|u| {
                let child = u.properties.as_ref()?.get("fragment")?.as_str()?;
                Some((u.id.as_str(), child))
            })
            .collect();
        if children.is_empty() {
            continue;
        }
        let mut strings = Vec::new();
        for unit in &parent.units {
            if let Some(props) = &unit.properties {
                collect_strings(&unit.id, props, &mut strings);
            }
        }
        for (name, value) in &parent.outputs {
            collect_strings(name, value, &mut strings);
        }
        for (owner, text) in strings {
            for (unit, output) in output_tokens(text) {
                let Some(child_id) = children.get(unit) else {
                    continue;
                };
                let produced = synthesis
                    .fragment(child_id)
                    .is_some_and(|c| c.outputs.contains_key(output));
                if !produced {
                    return Err(SynthError::DanglingReference {
                        fragment: parent.id.clone(),
                        unit: owner.to_string(),
                        target: format!("{unit}.Outputs.{output}"),
                    });
                }
            }
        }
    }
    Ok(())
}

fn collect_strings<'a>(owner: &'a str, value: &'a Value, out: &mut Vec<(&'a str, &'a str)>) {
    match value {
        Value::String(s) => out.push((owner, s)),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(owner, v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(owner, v, out)),
        _ => {}
    }
}

/// `(unit, output)` pairs of every `${unit.Outputs.output}` token.
fn output_tokens(text: &str) -> Vec<(&str, &str)> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        if let Some((unit, output)) = after[..end].split_once(".Outputs.") {
            found.push((unit, output));
        }
        rest = &after[end + 1..];
    }
    found
}

fn synthesize_fragment(
    stack: &StackSpec,
    id: &str,
    values: &InputValues,
    out: &mut Vec<FragmentArtifact>,
) -> Result<()> {
    let spec = stack.require(id)?;
    let res = spec.engine.evaluate(values)?;
    spec.check_rules(&res)?;

    let mut present = BTreeSet::new();
    let mut units = Vec::new();
    for unit in &spec.units {
        if include(&unit.id, &unit.condition, &res)? {
            present.insert(unit.id.clone());
            units.push(unit);
        }
    }
    let mut children = Vec::new();
    for boundary in &spec.children {
        if include(&boundary.unit, &boundary.include_when, &res)? {
            present.insert(boundary.unit.clone());
            children.push(boundary);
        }
    }

    let mut artifacts = Vec::with_capacity(units.len() + children.len());
    for unit in units {
        let ctx = RenderContext {
            res: &res,
            owner: &unit.id,
            units: Some(&present),
        };
        artifacts.push(UnitArtifact {
            id: unit.id.clone(),
            kind: unit.kind.clone(),
            depends_on: present_deps(&res, &unit.id, &unit.depends_on, &present)?,
            properties: unit.properties.render(&ctx)?,
        });
    }

    let mut pending = Vec::with_capacity(children.len());
    for boundary in children {
        let forwarded = forward(&res, boundary, Some(&present))?;
        artifacts.push(UnitArtifact {
            id: boundary.unit.clone(),
            kind: FRAGMENT_UNIT_KIND.to_string(),
            depends_on: present_deps(&res, &boundary.unit, &boundary.depends_on, &present)?,
            properties: Some(json!({
                "fragment": boundary.child,
                "parameters": forwarded,
            })),
        });
        pending.push((boundary.child.as_str(), forwarded));
    }

    let mut outputs = BTreeMap::new();
    for output in &spec.outputs {
        if !include(&output.name, &output.condition, &res)? {
            continue;
        }
        let ctx = RenderContext {
            res: &res,
            owner: &output.name,
            units: Some(&present),
        };
        if let Some(value) = output.value.render(&ctx)? {
            outputs.insert(output.name.clone(), value);
        }
    }

    info!(
        fragment = %id,
        units = artifacts.len(),
        outputs = outputs.len(),
        "fragment synthesized"
    );
    out.push(FragmentArtifact {
        id: id.to_string(),
        parameters: res.inputs,
        flags: res.flags,
        units: artifacts,
        outputs,
    });

    for (child, forwarded) in pending {
        synthesize_fragment(stack, child, &forwarded, out)?;
    }
    Ok(())
}

fn present_deps(
    res: &Resolution,
    owner: &str,
    deps: &[String],
    present: &BTreeSet<String>,
) -> Result<Vec<String>> {
    match deps.iter().find(|d| !present.contains(*d)) {
        Some(missing) => Err(SynthError::DanglingReference {
            fragment: res.fragment.clone(),
            unit: owner.to_string(),
            target: missing.clone(),
        }),
        None => Ok(deps.to_vec()),
    }
}
