//! CLI argument parsing for bridges.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone)]
#[command(about = "SerialRelay bus bridge")]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5). Built-in defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments, naming the program in `--help` and `--version`.
    pub fn parse_for(name: &'static str, version: &'static str) -> Self {
        let matches = <Self as clap::CommandFactory>::command()
            .name(name)
            .version(version)
            .get_matches();

        match <Self as clap::FromArgMatches>::from_arg_matches(&matches) {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}
