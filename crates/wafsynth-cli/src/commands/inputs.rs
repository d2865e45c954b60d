use crate::support::{describe_domain, fragment, print_json};
use serde_json::json;
use wafsynth_kernel::StackSpec;

pub fn run(stack: &StackSpec, fragment_id: &str, json_output: bool) -> anyhow::Result<()> {
    let spec = fragment(stack, fragment_id)?;
    let inputs = spec.engine.inputs();

    if json_output {
        return print_json(&json!({
            "fragment": fragment_id,
            "inputs": inputs,
        }));
    }

    println!("wafsynth inputs ({fragment_id}, {} declared)", inputs.len());
    for input in inputs {
        println!("  {}", input.name);
        println!("    domain:  {}", describe_domain(&input.domain));
        if let Some(default) = &input.default {
            println!("    default: \"{default}\"");
        }
        if !input.description.is_empty() {
            println!("    {}", input.description);
        }
    }
    Ok(())
}
