//! JUnit XML reporter
//!
//! Results are grouped into test suites by their first tag; untagged results
//! land in the `default` suite.

use std::collections::BTreeMap;

use super::{Output, Reporter, ReporterOptions};
use crate::testing::{TestCase, TestResult, TestRun, TestStatus};

const DEFAULT_SUITE: &str = "default";

pub struct JunitReporter {
    out: Output,
}

impl JunitReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            out: Output::new(options.live),
        }
    }
}

/// Escape text for XML attributes and content
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// CDATA sections cannot contain their own terminator
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Results are grouped under their first declared tag
fn suite_name(result: &TestResult) -> &str {
    result
        .tags
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_SUITE)
}

fn failure_body(result: &TestResult) -> String {
    let mut lines = Vec::new();
    if let Some(error) = &result.error {
        lines.push(error.message.clone());
        if let Some(stack) = &error.stack {
            lines.push(stack.clone());
        }
    }
    for assertion in result.failures() {
        lines.push(format!(
            "Path: {}, Expected: {}, Actual: {}, Message: {}",
            assertion.path,
            assertion.expected,
            assertion.actual,
            assertion.message.as_deref().unwrap_or("")
        ));
    }
    lines.join("\n")
}

fn failure_message(result: &TestResult) -> String {
    match &result.error {
        Some(error) => error.message.clone(),
        None => format!("{} assertion(s) failed", result.failures().count()),
    }
}

impl Reporter for JunitReporter {
    fn on_run_start(&mut self, _run: &TestRun, _planned: usize) {}

    fn on_test_start(&mut self, _case: &TestCase) {}

    fn on_test_complete(&mut self, _result: &TestResult) {}

    fn on_run_complete(&mut self, run: &TestRun) {
        let mut suites: BTreeMap<&str, Vec<&TestResult>> = BTreeMap::new();
        for result in &run.results {
            suites.entry(suite_name(result)).or_default().push(result);
        }

        let summary = &run.summary;
        self.out.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        self.out.line(format!(
            r#"<testsuites name="apiprobe" tests="{}" failures="{}" skipped="{}" time="{}" timestamp="{}">"#,
            summary.total,
            summary.failed,
            summary.skipped,
            seconds(summary.duration_ms),
            run.started_at.to_rfc3339()
        ));

        for (name, results) in &suites {
            let failures = results.iter().filter(|r| r.failed()).count();
            let skipped = results.iter().filter(|r| r.status == TestStatus::Skipped).count();
            let time: u64 = results.iter().map(|r| r.duration_ms).sum();
            self.out.line(format!(
                r#"  <testsuite name="{}" tests="{}" failures="{}" skipped="{}" time="{}">"#,
                escape_xml(name),
                results.len(),
                failures,
                skipped,
                seconds(time)
            ));

            for result in results {
                let open = format!(
                    r#"    <testcase name="{}" classname="{}" time="{}""#,
                    escape_xml(&result.name),
                    escape_xml(&format!("{name}.{}", result.protocol)),
                    seconds(result.duration_ms)
                );
                match result.status {
                    TestStatus::Passed => self.out.line(format!("{open}/>")),
                    TestStatus::Skipped => {
                        self.out.line(format!("{open}>"));
                        match &result.skip_reason {
                            Some(reason) => self
                                .out
                                .line(format!(r#"      <skipped message="{}"/>"#, escape_xml(reason))),
                            None => self.out.line("      <skipped/>"),
                        }
                        self.out.line("    </testcase>");
                    }
                    TestStatus::Failed => {
                        self.out.line(format!("{open}>"));
                        let kind = match &result.error {
                            Some(error) if error.timed_out => "TimeoutError",
                            Some(_) => "TransportError",
                            None => "AssertionError",
                        };
                        self.out.line(format!(
                            r#"      <failure message="{}" type="{kind}">{}</failure>"#,
                            escape_xml(&failure_message(result)),
                            cdata(&failure_body(result))
                        ));
                        self.out.line("    </testcase>");
                    }
                }
            }
            self.out.line("  </testsuite>");
        }
        self.out.line("</testsuites>");
    }

    fn output(&self) -> String {
        self.out.as_str().to_string()
    }
}
