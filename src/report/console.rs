//! Human-readable console reporter

use colored::{ColoredString, Colorize};

use super::{Output, Reporter, ReporterOptions};
use crate::assert::AssertionResult;
use crate::testing::{TestCase, TestResult, TestRun, TestStatus};

pub struct ConsoleReporter {
    out: Output,
    verbose: bool,
    color: bool,
}

impl ConsoleReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            out: Output::new(options.live),
            verbose: options.verbose,
            color: options.color,
        }
    }

    fn paint(&self, text: ColoredString) -> String {
        if self.color {
            text.to_string()
        } else {
            text.clear().to_string()
        }
    }

    fn assertion_lines(&mut self, assertion: &AssertionResult) {
        let message = assertion.message.as_deref().unwrap_or("mismatch");
        let label = self.paint(format!("{}:", assertion.path).bold());
        self.out.line(format!("      {label} {message}"));
        if self.verbose {
            let expected = format!("        expected: {}", assertion.expected);
            let actual = format!("        actual:   {}", assertion.actual);
            let expected = self.paint(expected.green());
            let actual = self.paint(actual.red());
            self.out.line(expected);
            self.out.line(actual);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_run_start(&mut self, run: &TestRun, planned: usize) {
        let noun = if planned == 1 { "test" } else { "tests" };
        let header = self.paint(format!("Running {planned} {noun}").blue().bold());
        let id = self.paint(format!("(run {})", run.run_id).dimmed());
        self.out.line(format!("\n{header} {id}\n"));
    }

    fn on_test_start(&mut self, _case: &TestCase) {}

    fn on_test_complete(&mut self, result: &TestResult) {
        let duration = self.paint(format!("({}ms)", result.duration_ms).dimmed());
        match result.status {
            TestStatus::Passed => {
                let mark = self.paint("✓".green());
                self.out.line(format!("  {mark} {} {duration}", result.name));
            }
            TestStatus::Skipped => {
                let mark = self.paint("○".yellow());
                let reason = match &result.skip_reason {
                    Some(reason) => format!("(skipped: {reason})"),
                    None => "(skipped)".to_string(),
                };
                let reason = self.paint(reason.yellow());
                self.out.line(format!("  {mark} {} {reason}", result.name));
            }
            TestStatus::Failed => {
                let mark = self.paint("✗".red());
                let attempts = if result.attempts > 1 {
                    format!(" after {} attempts", result.attempts)
                } else {
                    String::new()
                };
                let name = self.paint(result.name.as_str().red());
                self.out.line(format!("  {mark} {name} {duration}{attempts}"));

                if self.verbose {
                    let method = result.request.get("method").and_then(|m| m.as_str());
                    let url = result.request.get("url").and_then(|u| u.as_str());
                    if let (Some(method), Some(url)) = (method, url) {
                        let line = self.paint(format!("      {method} {url}").dimmed());
                        self.out.line(line);
                    }
                    if let Some(response) = &result.response {
                        let line = self.paint(format!("      -> HTTP {}", response.status).dimmed());
                        self.out.line(line);
                    }
                }

                if let Some(error) = &result.error {
                    let label = self.paint("error:".red().bold());
                    self.out.line(format!("      {label} {}", error.message));
                    if self.verbose {
                        if let Some(stack) = &error.stack {
                            for line in stack.lines() {
                                let line = self.paint(format!("        {line}").dimmed());
                                self.out.line(line);
                            }
                        }
                    }
                }

                let failures: Vec<AssertionResult> = result.failures().cloned().collect();
                for assertion in &failures {
                    self.assertion_lines(assertion);
                }
            }
        }
    }

    fn on_run_complete(&mut self, run: &TestRun) {
        let summary = &run.summary;
        let passed = self.paint(format!("{} passed", summary.passed).green());
        let failed = if summary.failed > 0 {
            self.paint(format!("{} failed", summary.failed).red().bold())
        } else {
            format!("{} failed", summary.failed)
        };
        let skipped = self.paint(format!("{} skipped", summary.skipped).yellow());
        let timing = self.paint(format!("in {}ms", summary.duration_ms).dimmed());

        let label = self.paint("Summary:".bold());
        let total = summary.total;

        self.out.line("");
        self.out
            .line(format!("{label} {passed}, {failed}, {skipped} ({total} total) {timing}"));

        let verdict = if run.success() {
            let mark = self.paint("✓".green().bold());
            format!("{mark} {}", self.paint("All tests passed".green().bold()))
        } else {
            let mark = self.paint("✗".red().bold());
            format!("{mark} {}", self.paint("Some tests failed".red().bold()))
        };
        self.out.line(format!("{verdict}\n"));
    }

    fn output(&self) -> String {
        self.out.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures::sample_run;

    fn plain(verbose: bool) -> ConsoleReporter {
        ConsoleReporter::new(ReporterOptions {
            verbose,
            ..Default::default()
        })
    }

    fn render(mut reporter: ConsoleReporter) -> String {
        let run = sample_run();
        reporter.on_run_start(&run, run.results.len());
        for result in &run.results {
            reporter.on_test_complete(result);
        }
        reporter.on_run_complete(&run);
        reporter.output()
    }

    #[test]
    fn test_console_lines() {
        let output = render(plain(false));
        assert!(output.contains("Running 4 tests"));
        assert!(output.contains("✓ health (12ms)"));
        assert!(output.contains("✗ create user (40ms)"));
        assert!(output.contains("status: expected status 201, got 400"));
        assert!(output.contains("○ later (skipped: not ready)"));
        assert!(output.contains("error: Request timed out after 10ms"));
        assert!(output.contains("Summary: 1 passed, 2 failed, 1 skipped (4 total)"));
        assert!(output.contains("Some tests failed"));
        assert!(!output.contains("expected: 201"));
        assert!(!output.contains('\u{1b}'));
    }

    #[test]
    fn test_console_verbose_diagnostics() {
        let output = render(plain(true));
        assert!(output.contains("expected: 201"));
        assert!(output.contains("actual:   400"));
        assert!(output.contains("POST http://localhost/users"));
    }
}
