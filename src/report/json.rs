//! Structured JSON reporter
//!
//! Buffers a single document for the whole run, or with `stream` emits one JSON
//! object per line for each lifecycle event.

use serde_json::{json, Value};

use super::{Output, Reporter, ReporterOptions};
use crate::testing::{TestCase, TestResult, TestRun};

pub struct JsonReporter {
    out: Output,
    stream: bool,
}

impl JsonReporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            out: Output::new(options.live),
            stream: options.stream,
        }
    }

    fn event(&mut self, event: Value) {
        if self.stream {
            self.out.line(event.to_string());
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({"error": e.to_string()}))
}

impl Reporter for JsonReporter {
    fn on_run_start(&mut self, run: &TestRun, planned: usize) {
        self.event(json!({
            "event": "runStart",
            "runId": run.run_id,
            "startedAt": run.started_at,
            "planned": planned,
        }));
    }

    fn on_test_start(&mut self, case: &TestCase) {
        self.event(json!({
            "event": "testStart",
            "id": case.id,
            "name": case.name,
            "protocol": case.protocol(),
        }));
    }

    fn on_test_complete(&mut self, result: &TestResult) {
        self.event(json!({
            "event": "testComplete",
            "result": to_value(result),
        }));
    }

    fn on_run_complete(&mut self, run: &TestRun) {
        if self.stream {
            self.event(json!({
                "event": "runComplete",
                "runId": run.run_id,
                "summary": to_value(&run.summary),
            }));
        } else {
            let document = serde_json::to_string_pretty(run)
                .unwrap_or_else(|e| json!({"error": e.to_string()}).to_string());
            self.out.line(document);
        }
    }

    fn output(&self) -> String {
        self.out.as_str().to_string()
    }
}
