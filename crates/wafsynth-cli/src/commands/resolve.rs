use crate::support::{on_off, print_json, resolve_fragment};
use anyhow::bail;
use serde_json::json;
use wafsynth_kernel::{InputValues, StackSpec};

pub fn run(
    stack: &StackSpec,
    values: &InputValues,
    fragment_id: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let Some(res) = resolve_fragment(stack, fragment_id, values)? else {
        if json_output {
            print_json(&json!({
                "fragment": fragment_id,
                "instantiated": false,
            }))?;
        }
        bail!("fragment `{fragment_id}` is not instantiated for these inputs");
    };

    // Declaration order reads better than the map's alphabetical one.
    let order: Vec<&str> = stack
        .fragment(fragment_id)
        .map(|f| f.engine.flags().iter().map(|f| f.name.as_str()).collect())
        .unwrap_or_default();

    if json_output {
        return print_json(&json!({
            "fragment": fragment_id,
            "instantiated": true,
            "inputs": res.inputs,
            "flags": res.flags,
        }));
    }

    let on = res.flags.values().filter(|v| **v).count();
    println!(
        "wafsynth resolve ({fragment_id}, {on}/{} flags on)",
        res.flags.len()
    );
    for name in order {
        let value = res.flag(name).unwrap_or(false);
        println!("  {:<3} {name}", on_off(value));
    }
    Ok(())
}
