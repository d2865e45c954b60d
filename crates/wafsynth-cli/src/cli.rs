use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "wafsynth",
    about = "wafsynth: resolve WAF automation choices into activation flags and fragment artifacts",
    version
)]
pub struct Cli {
    /// Configuration file path (missing file means defaults)
    #[arg(short, long, global = true, default_value = "wafsynth.toml")]
    pub config: PathBuf,

    /// Override one input, NAME=VALUE (repeatable)
    #[arg(long = "set", global = true, value_name = "NAME=VALUE")]
    pub sets: Vec<String>,

    /// Enable info logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the inputs a fragment declares
    Inputs {
        /// Fragment id: root, webacl or firehose-athena
        #[arg(long, default_value = "root")]
        fragment: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the flag map of one fragment
    Resolve {
        /// Fragment id: root, webacl or firehose-athena
        #[arg(long, default_value = "root")]
        fragment: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize every fragment of the stack
    Synth {
        /// Write the artifact set to this file
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check every fragment boundary for flag drift
    DriftCheck {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the throttle chains in execution order
    Chain {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
