use crate::support::{error_json, print_json};
use anyhow::Context;
use serde_json::json;
use wafsynth_kernel::StackSpec;

pub fn run(stack: &StackSpec, json_output: bool) -> anyhow::Result<()> {
    let reports = match stack.check_drift() {
        Ok(reports) => reports,
        Err(err) => {
            if json_output {
                print_json(&json!({ "ok": false, "error": error_json(&err) }))?;
            }
            return Err(err).context("boundary drift check failed");
        }
    };

    if json_output {
        return print_json(&json!({ "ok": true, "boundaries": reports }));
    }

    println!("wafsynth drift-check ({} boundaries)", reports.len());
    for report in &reports {
        println!(
            "  {} -> {}: {} shared flags agree over {} assignments",
            report.parent,
            report.child,
            report.flags_checked.len(),
            report.assignments
        );
    }
    Ok(())
}
