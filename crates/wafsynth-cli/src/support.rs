use crate::config::Config;
use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use wafsynth_automations::security_automations;
use wafsynth_kernel::{
    FragmentSpec, InputValues, Resolution, StackSpec, SynthError, ValueDomain, forward,
};

/// The shipped stack, renamed per the configuration.
pub fn load_stack(config: &Config) -> anyhow::Result<StackSpec> {
    let mut stack = security_automations().context("failed to assemble the stack")?;
    stack.name = config.stack.name.clone();
    Ok(stack)
}

pub fn fragment<'a>(stack: &'a StackSpec, id: &str) -> anyhow::Result<&'a FragmentSpec> {
    stack.fragment(id).ok_or_else(|| {
        let known: Vec<&str> = stack.fragments.iter().map(|f| f.id()).collect();
        anyhow!("unknown fragment `{id}`; expected one of: {}", known.join(", "))
    })
}

/// Resolve `id` by walking down from the root, forwarding through each
/// boundary on the way. `None` when some boundary excludes the fragment.
pub fn resolve_fragment(
    stack: &StackSpec,
    id: &str,
    values: &InputValues,
) -> anyhow::Result<Option<Resolution>> {
    let spec = fragment(stack, id)?;
    if id == stack.root {
        return Ok(Some(spec.engine.evaluate(values)?));
    }
    let Some(boundary) = stack.boundaries().find(|b| b.child == id) else {
        bail!("fragment `{id}` is not reachable from `{}`", stack.root);
    };
    let Some(parent) = resolve_fragment(stack, &boundary.parent, values)? else {
        return Ok(None);
    };
    if !boundary.include_when.eval(&parent)? {
        return Ok(None);
    }
    let forwarded = forward(&parent, boundary, None)?;
    Ok(Some(spec.engine.evaluate(&forwarded)?))
}

pub fn describe_domain(domain: &ValueDomain) -> String {
    match domain {
        ValueDomain::Enum { allowed } => allowed
            .iter()
            .map(|v| format!("\"{v}\""))
            .collect::<Vec<_>>()
            .join(" | "),
        ValueDomain::Number {
            allowed: Some(allowed),
            ..
        } => allowed
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(" | "),
        ValueDomain::Number { min: Some(min), .. } => format!("number >= {min}"),
        ValueDomain::Number { .. } => "number".to_string(),
        ValueDomain::Text {
            pattern: Some(pattern),
            ..
        } => format!("text ~ {pattern}"),
        ValueDomain::Text { .. } => "text".to_string(),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The `{class, message}` shape every `--json` failure is reported in.
pub fn error_json(err: &SynthError) -> serde_json::Value {
    serde_json::json!({
        "class": err.class(),
        "message": err.to_string(),
    })
}

pub fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}
