//! CLI command definitions
//!
//! Defines the clap commands for the apiprobe CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::report::ReportFormat;

/// Flags shared by commands that talk to a target
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Output format (defaults to the configured reporter)
    #[arg(long, alias = "reporter", value_enum)]
    pub format: Option<ReportFormat>,

    /// Per-request timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Base URL of the target; overrides the positional URL
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Write the report to a file instead of stdout
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Bearer token sent as the Authorization header
    #[arg(long, env = "APIPROBE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Extra header for every call, repeatable: --header 'X-Api-Key: abc'
    #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run tests against a target
    ///
    /// Tests are discovered from the target unless --spec is given.
    Run {
        /// Base URL of the target
        url: Option<String>,

        /// Run the tests from a spec document instead of discovering them
        #[arg(long, value_name = "FILE")]
        spec: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,

        /// Only run tests carrying one of these tags (comma separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Run tests concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum tests in flight with --parallel
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Retry failed tests up to N more times
        #[arg(long, value_name = "N")]
        retries: Option<u32>,

        /// Emit one JSON line per event (json format only)
        #[arg(long)]
        stream: bool,
    },

    /// List the tests a target exposes
    Discover {
        /// Base URL of the target
        url: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check a spec document without running it
    Validate {
        /// Path to a JSON or YAML spec document
        file: PathBuf,
    },
}
