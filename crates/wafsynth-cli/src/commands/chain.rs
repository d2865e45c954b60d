use crate::support::print_json;
use serde_json::json;
use wafsynth_kernel::StackSpec;

pub fn run(stack: &StackSpec, json_output: bool) -> anyhow::Result<()> {
    let chains: Vec<_> = stack
        .fragments
        .iter()
        .flat_map(|f| f.chains.iter().map(move |c| (f.id(), c)))
        .collect();

    if json_output {
        let payload: Vec<_> = chains
            .iter()
            .map(|(fragment, chain)| {
                json!({
                    "fragment": fragment,
                    "chain": chain,
                })
            })
            .collect();
        return print_json(&json!({ "chains": payload }));
    }

    for (fragment, chain) in chains {
        println!(
            "wafsynth chain {} ({fragment}, {}s between operations)",
            chain.name, chain.interval_secs
        );
        for (i, (op, prev)) in chain.links().enumerate() {
            match prev {
                Some(prev) => println!("  {:>2}. {op} (after {prev})", i + 1),
                None => println!("  {:>2}. {op}", i + 1),
            }
        }
    }
    Ok(())
}
