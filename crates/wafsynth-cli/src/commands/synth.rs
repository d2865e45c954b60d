use crate::support::{error_json, print_json};
use anyhow::Context;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use wafsynth_kernel::{InputValues, StackSpec, synthesize};

pub fn run(
    stack: &StackSpec,
    values: &InputValues,
    out: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<()> {
    let synthesis = match synthesize(stack, values) {
        Ok(synthesis) => synthesis,
        Err(err) => {
            if json_output {
                print_json(&json!({ "ok": false, "error": error_json(&err) }))?;
            }
            return Err(err).context("synthesis aborted; no artifacts were produced");
        }
    };
    let digest = synthesis.digest()?;

    if let Some(path) = &out {
        let body = serde_json::to_string_pretty(&synthesis)?;
        fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), digest = %digest, "artifact written");
    }

    if json_output {
        return match &out {
            Some(path) => print_json(&json!({
                "ok": true,
                "stack": synthesis.stack,
                "digest": digest,
                "out": path.display().to_string(),
                "fragments": synthesis.fragments.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            })),
            None => print_json(&json!({
                "ok": true,
                "digest": digest,
                "synthesis": synthesis,
            })),
        };
    }

    println!("wafsynth synth ({})", synthesis.stack);
    for fragment in &synthesis.fragments {
        let on = fragment.flags.values().filter(|v| **v).count();
        println!(
            "  {:<16} units={:<3} outputs={:<3} flags={on}/{}",
            fragment.id,
            fragment.units.len(),
            fragment.outputs.len(),
            fragment.flags.len()
        );
    }
    println!("  digest: {digest}");
    if let Some(path) = out {
        println!("  wrote: {}", path.display());
    }
    Ok(())
}
