//! TAP version 14 reporter

use serde_json::{json, Value};

use super::{Output, Reporter, ReporterOptions};
use crate::testing::{TestCase, TestResult, TestRun, TestStatus};

pub struct TapReporter {
    out: Output,
    count: usize,
}

impl TapReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            out: Output::new(options.live),
            count: 0,
        }
    }

    fn diagnostic(&mut self, result: &TestResult) {
        let message = match &result.error {
            Some(error) => error.message.clone(),
            None => {
                let failed = result.failures().count();
                let noun = if failed == 1 { "assertion" } else { "assertions" };
                format!("{failed} {noun} failed")
            }
        };

        let mut diag = json!({
            "message": message,
            "severity": "fail",
            "duration_ms": result.duration_ms,
        });
        if let Some(stack) = result.error.as_ref().and_then(|e| e.stack.as_ref()) {
            diag["stack"] = json!(stack);
        }
        let assertions: Vec<Value> = result
            .failures()
            .map(|a| {
                json!({
                    "path": a.path,
                    "expected": a.expected,
                    "actual": a.actual,
                    "message": a.message,
                })
            })
            .collect();
        if !assertions.is_empty() {
            diag["assertions"] = Value::Array(assertions);
        }

        let yaml = serde_yaml::to_string(&diag).unwrap_or_else(|e| format!("message: {e}\n"));
        self.out.line("  ---");
        for line in yaml.lines().filter(|l| *l != "---") {
            self.out.line(format!("  {line}"));
        }
        self.out.line("  ...");
    }
}

/// Escape a test description for a TAP test line
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('#', "\\#")
}

impl Reporter for TapReporter {
    fn on_run_start(&mut self, _run: &TestRun, _planned: usize) {
        self.out.line("TAP version 14");
    }

    fn on_test_start(&mut self, _case: &TestCase) {}

    fn on_test_complete(&mut self, result: &TestResult) {
        self.count += 1;
        let n = self.count;
        let name = escape(&result.name);
        match result.status {
            TestStatus::Passed => self.out.line(format!("ok {n} - {name}")),
            TestStatus::Skipped => {
                let directive = match &result.skip_reason {
                    Some(reason) => format!(" # SKIP {}", escape(reason)),
                    None => " # SKIP".to_string(),
                };
                self.out.line(format!("ok {n} - {name}{directive}"));
            }
            TestStatus::Failed => {
                self.out.line(format!("not ok {n} - {name}"));
                self.diagnostic(result);
            }
        }
    }

    fn on_run_complete(&mut self, run: &TestRun) {
        let summary = &run.summary;
        self.out.line(format!("1..{}", self.count));
        self.out.line(format!("# tests {}", summary.total));
        self.out.line(format!("# pass {}", summary.passed));
        self.out.line(format!("# fail {}", summary.failed));
        self.out.line(format!("# skip {}", summary.skipped));
        self.out.line(format!("# duration_ms {}", summary.duration_ms));
    }

    fn output(&self) -> String {
        self.out.as_str().to_string()
    }
}
