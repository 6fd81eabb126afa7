//! CLI command handling
//!
//! Resolves configuration and flags, runs the engine and maps the outcome to
//! process success.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use tracing::debug;

use crate::commands::{Commands, TargetArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::context::{ContextOptions, RunContext};
use crate::discovery::{Discovery, DiscoveryClient};
use crate::protocol::{Executor, ExecutorOptions};
use crate::report::{self, ReportFormat, ReporterOptions};
use crate::testing::{RunOptions, Runner, SpecDocument, TestCase};

/// Flags that apply to every command
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs<'a> {
    pub verbose: bool,
    pub config: Option<&'a Path>,
}

/// Dispatch a CLI command; `Ok(false)` means the command ran but did not succeed
pub async fn dispatch(command: Commands, globals: GlobalArgs<'_>) -> Result<bool> {
    match command {
        Commands::Validate { file } => validate(&file),

        Commands::Discover { url, target } => {
            let config = load_config(globals.config)?;
            let base_url = resolve_base_url(target.base_url.as_deref(), url.as_deref(), None)?;
            let ctx = build_context(&base_url, &target)?;
            let timeout = Duration::from_millis(target.timeout.unwrap_or(config.defaults.timeout_ms));

            let client = DiscoveryClient::new(config.discovery.clone(), timeout)?;
            let discovery = client.discover(&ctx).await;

            let format = resolve_format(target.format, &config)?;
            let text = if format == ReportFormat::Json {
                serde_json::to_string_pretty(&discovery)?
            } else {
                render_discovery(&base_url, &discovery, globals.verbose)
            };
            emit(target.output.as_deref(), &text)?;
            Ok(!discovery.unreachable())
        }

        Commands::Run {
            url,
            spec,
            target,
            tags,
            parallel,
            concurrency,
            retries,
            stream,
        } => {
            let config = load_config(globals.config)?;

            // A bad document must fail before any network call
            let document = spec.as_deref().map(SpecDocument::load).transpose()?;
            let base_url = resolve_base_url(
                target.base_url.as_deref(),
                url.as_deref(),
                document.as_ref().and_then(|d| d.base_url.as_deref()),
            )?;
            let ctx = build_context(&base_url, &target)?;
            let timeout = Duration::from_millis(target.timeout.unwrap_or(config.defaults.timeout_ms));

            let cases: Vec<TestCase> = match &document {
                Some(document) => {
                    let (cases, problems) = document.cases_with_problems();
                    if !problems.is_empty() {
                        return Err(Error::SpecInvalid(problems));
                    }
                    cases
                }
                None => {
                    let client = DiscoveryClient::new(config.discovery.clone(), timeout)?;
                    let discovery = client.discover(&ctx).await;
                    if discovery.unreachable() {
                        return Err(Error::unexpected_response(
                            &base_url,
                            "no discovery source could be read",
                        ));
                    }
                    discovery.cases()
                }
            };
            debug!(count = cases.len(), "loaded test cases");

            let executor = Executor::new(ExecutorOptions {
                default_headers: config.headers.clone(),
                endpoints: config.endpoints.clone(),
            })?;
            let options = RunOptions {
                timeout,
                retries: retries.unwrap_or(config.defaults.retries),
                concurrency: parallel.then(|| concurrency.unwrap_or(config.defaults.concurrency)),
                tags: tags
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect::<BTreeSet<_>>(),
            };

            let format = resolve_format(target.format, &config)?;
            let live = target.output.is_none();
            let mut reporter = report::create(
                format,
                ReporterOptions {
                    verbose: globals.verbose,
                    stream,
                    color: live && report::color_enabled(),
                    live,
                },
            );

            let runner = Runner::new(executor, ctx, options);
            let run = runner.run(cases, reporter.as_mut()).await;

            if let Some(path) = &target.output {
                emit(Some(path.as_path()), &reporter.output())?;
            }
            Ok(run.success())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn resolve_format(flag: Option<ReportFormat>, config: &Config) -> Result<ReportFormat> {
    match flag {
        Some(format) => Ok(format),
        None => config.defaults.reporter.parse(),
    }
}

/// Pick the target: `--base-url`, then the positional URL, then the spec document's
pub fn resolve_base_url(
    flag: Option<&str>,
    positional: Option<&str>,
    document: Option<&str>,
) -> Result<String> {
    let url = flag
        .or(positional)
        .or(document)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            Error::Config(
                "no target URL: pass <url>, --base-url, or set baseUrl in the spec document"
                    .to_string(),
            )
        })?;

    let parsed = reqwest::Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::invalid_url(url, "scheme must be http or https"));
    }
    Ok(url.to_string())
}

/// Parse `NAME:VALUE` header flags
pub fn parse_headers(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|header| {
            let (name, value) = header.split_once(':').ok_or_else(|| {
                Error::Config(format!("invalid header '{header}', expected NAME:VALUE"))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::Config(format!("invalid header '{header}', empty name")));
            }
            Ok((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn build_context(base_url: &str, target: &TargetArgs) -> Result<RunContext> {
    Ok(RunContext::create(ContextOptions {
        base_url: base_url.to_string(),
        access_token: target.token.clone(),
        headers: parse_headers(&target.headers)?,
        ..Default::default()
    }))
}

fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!("{} Report written to {}", "✓".green(), path.display());
            Ok(())
        }
        None => {
            println!("{}", text.trim_end());
            Ok(())
        }
    }
}

fn validate(file: &Path) -> Result<bool> {
    let document = SpecDocument::load(file)?;
    match document.validate() {
        Ok(count) => {
            let noun = if count == 1 { "test" } else { "tests" };
            println!("{} {} is valid ({count} {noun})", "✓".green(), file.display());
            Ok(true)
        }
        Err(Error::SpecInvalid(problems)) => {
            println!("{} {} is invalid", "✗".red(), file.display());
            for problem in &problems {
                println!("  - {problem}");
            }
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn render_discovery(base_url: &str, discovery: &Discovery, verbose: bool) -> String {
    let summary = &discovery.summary;
    let mut lines = vec![format!(
        "{} {} tests from {}",
        "Discovered".blue().bold(),
        summary.total,
        base_url
    )];

    for (protocol, count) in &summary.by_type {
        lines.push(format!("  {:<10} {count}", protocol.to_string()));
    }
    if summary.tools > 0 {
        lines.push(format!("  {:<10} {}", "tools", summary.tools));
    }

    for issue in &summary.failed_sources {
        lines.push(format!("  {} {} unavailable: {}", "✗".red(), issue.source, issue.message));
    }
    for issue in &summary.invalid_tests {
        lines.push(format!("  {} invalid test from {}: {}", "!".yellow(), issue.source, issue.message));
    }

    if verbose {
        lines.push(String::new());
        for case in discovery.rest_tests.iter().chain(discovery.rpc_tests.iter()) {
            lines.push(format!("  {}  {}", case.id.dimmed(), case.name));
        }
    }
    lines.join("\n")
}
