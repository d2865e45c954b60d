//! wafsynth CLI: the `wafsynth` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_overrides(&cli.sets)?;
    init_logging(&cli, &config);

    let stack = support::load_stack(&config)?;
    match cli.command {
        Commands::Inputs { fragment, json } => commands::inputs::run(&stack, &fragment, json),
        Commands::Resolve { fragment, json } => {
            commands::resolve::run(&stack, &config.input_values()?, &fragment, json)
        }
        Commands::Synth { out, json } => {
            commands::synth::run(&stack, &config.input_values()?, out, json)
        }
        Commands::DriftCheck { json } => commands::drift_check::run(&stack, json),
        Commands::Chain { json } => commands::chain::run(&stack, json),
    }
}

/// `--debug` and `--verbose` win, then `RUST_LOG`, then the config file.
fn init_logging(cli: &Cli, config: &Config) {
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr)
        .init();
}
