//! Reporters
//!
//! A reporter receives run lifecycle events in order: one `on_run_start`, a
//! start/complete pair per executed test (skipped tests only complete), and one
//! `on_run_complete`. In concurrent runs the pairs of different tests may
//! interleave.

mod console;
mod json;
mod junit;
mod tap;

use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

pub use console::ConsoleReporter;
pub use json::JsonReporter;
pub use junit::JunitReporter;
pub use tap::TapReporter;

use crate::common::Error;
use crate::testing::{TestCase, TestResult, TestRun};

/// Receives run lifecycle events and renders them
pub trait Reporter: Send {
    /// Called once before any test; `planned` counts selected cases
    fn on_run_start(&mut self, run: &TestRun, planned: usize);

    /// Called before a case is dispatched
    fn on_test_start(&mut self, case: &TestCase);

    /// Called once per case with its final result
    fn on_test_complete(&mut self, result: &TestResult);

    /// Called once after every result has been delivered
    fn on_run_complete(&mut self, run: &TestRun);

    /// Everything rendered so far
    fn output(&self) -> String;
}

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Console,
    Json,
    Tap,
    Junit,
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "tap" => Ok(ReportFormat::Tap),
            "junit" | "xml" => Ok(ReportFormat::Junit),
            other => Err(Error::Config(format!(
                "unknown reporter '{other}' (expected console, json, tap or junit)"
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Console => write!(f, "console"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Tap => write!(f, "tap"),
            ReportFormat::Junit => write!(f, "junit"),
        }
    }
}

/// Rendering switches shared by every reporter
#[derive(Debug, Clone, Copy, Default)]
pub struct ReporterOptions {
    /// Per-assertion expected/actual diagnostics
    pub verbose: bool,
    /// One JSON line per event instead of a single document
    pub stream: bool,
    /// ANSI colors in console output
    pub color: bool,
    /// Print to stdout as events arrive, in addition to buffering
    pub live: bool,
}

/// Build the reporter for a format
pub fn create(format: ReportFormat, options: ReporterOptions) -> Box<dyn Reporter> {
    match format {
        ReportFormat::Console => Box::new(ConsoleReporter::new(options)),
        ReportFormat::Json => Box::new(JsonReporter::new(options)),
        ReportFormat::Tap => Box::new(TapReporter::new(options)),
        ReportFormat::Junit => Box::new(JunitReporter::new(options)),
    }
}

/// Whether stdout should receive ANSI colors
pub fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").map_or(true, |v| v.is_empty()) && std::io::stdout().is_terminal()
}

/// Buffered reporter text, optionally echoed to stdout
#[derive(Debug, Default)]
pub(crate) struct Output {
    text: String,
    live: bool,
}

impl Output {
    pub fn new(live: bool) -> Self {
        Self {
            text: String::new(),
            live,
        }
    }

    /// Append one line
    pub fn line(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if self.live {
            println!("{line}");
        }
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    use crate::assert::AssertionResult;
    use crate::common::Error;
    use crate::testing::{ResponseEcho, TestCase, TestResult, TestRun};

    fn case(value: Value) -> TestCase {
        TestCase::from_value(value).unwrap()
    }

    /// One pass, one assertion failure, one skip and one timeout
    pub fn sample_run() -> TestRun {
        let health = case(json!({"name": "health", "request": {"path": "/health"}, "tags": ["smoke"]}));
        let create = case(json!({
            "name": "create user",
            "request": {"method": "POST", "path": "/users"},
            "tags": ["users", "smoke"]
        }));
        let later = case(json!({"name": "later", "request": {"path": "/x"}, "skip": "not ready"}));
        let slow = case(json!({"name": "slow # path", "type": "rpc", "method": "slow.call"}));

        let mut run = TestRun::start();
        run.record(TestResult::evaluate(
            &health,
            json!({"method": "GET", "url": "http://localhost/health"}),
            None,
            vec![AssertionResult::pass("status", json!(200), json!(200))],
            12,
        ));
        run.record(TestResult::evaluate(
            &create,
            json!({"method": "POST", "url": "http://localhost/users"}),
            Some(ResponseEcho {
                status: 400,
                headers: Default::default(),
                body: json!({"error": "bad <input> & \"more\""}),
            }),
            vec![
                AssertionResult::fail("status", json!(201), json!(400), "expected status 201, got 400"),
                AssertionResult::pass("body.name", json!("A"), json!("A")),
            ],
            40,
        ));
        run.record(TestResult::skipped(&later));
        run.record(TestResult::transport_failure(
            &slow,
            json!({"method": "POST", "url": "http://localhost/slow/call"}),
            &Error::Timeout(10),
            10,
        ));
        run.seal();
        run
    }
}
