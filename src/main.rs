//! apiprobe - conformance tests for HTTP services
//!
//! Runs declarative REST, RPC, tool, batch and pipeline test cases against a
//! live target and reports the results.

use std::path::PathBuf;

use apiprobe::cli::{self, GlobalArgs};
use apiprobe::commands::Commands;
use apiprobe::common::logging;
use clap::Parser;

#[derive(Parser)]
#[command(name = "apiprobe", about = "Protocol-agnostic API conformance tester")]
#[command(version, long_about = None)]
struct Cli {
    /// Show per-assertion diagnostics and debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let globals = GlobalArgs {
        verbose: cli.verbose,
        config: cli.config.as_deref(),
    };

    match cli::dispatch(cli.command, globals).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
