//! Test results and run bookkeeping

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::config::{Protocol, TestCase};
use crate::assert::AssertionResult;
use crate::common::Error;

/// Final status of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// Transport or execution error attached to a failed result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// The exchange hit its deadline
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl From<&Error> for TestError {
    fn from(e: &Error) -> Self {
        Self {
            message: e.to_string(),
            stack: e.source_chain(),
            timed_out: e.is_timeout(),
        }
    }
}

/// Echo of the response that was received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEcho {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Outcome of executing one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Echo of what was sent
    pub request: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseEcho>,
    pub assertions: Vec<AssertionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Number of attempts made, including retries
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl TestResult {
    /// Derive the status from assertions and error
    ///
    /// Passed iff no error occurred and every assertion passed.
    pub fn evaluate(
        case: &TestCase,
        request: Value,
        response: Option<ResponseEcho>,
        assertions: Vec<AssertionResult>,
        duration_ms: u64,
    ) -> Self {
        let status = if assertions.iter().all(|a| a.passed) {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        Self {
            id: case.id.clone(),
            name: case.name.clone(),
            protocol: case.protocol(),
            status,
            duration_ms,
            request,
            response,
            assertions,
            error: None,
            tags: case.tags.clone(),
            attempts: 1,
            skip_reason: None,
        }
    }

    /// A failed result caused by a transport/execution error; no assertions are evaluated
    pub fn transport_failure(case: &TestCase, request: Value, error: &Error, duration_ms: u64) -> Self {
        Self {
            id: case.id.clone(),
            name: case.name.clone(),
            protocol: case.protocol(),
            status: TestStatus::Failed,
            duration_ms,
            request,
            response: None,
            assertions: Vec::new(),
            error: Some(TestError::from(error)),
            tags: case.tags.clone(),
            attempts: 1,
            skip_reason: None,
        }
    }

    /// A result for a case that was skipped without dispatch
    pub fn skipped(case: &TestCase) -> Self {
        Self {
            id: case.id.clone(),
            name: case.name.clone(),
            protocol: case.protocol(),
            status: TestStatus::Skipped,
            duration_ms: 0,
            request: Value::Null,
            response: None,
            assertions: Vec::new(),
            error: None,
            tags: case.tags.clone(),
            attempts: 0,
            skip_reason: case.skip.reason().map(str::to_string),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub fn failed(&self) -> bool {
        self.status == TestStatus::Failed
    }

    /// Failed assertions only
    pub fn failures(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed)
    }
}

/// Aggregated counts for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub by_type: BTreeMap<Protocol, usize>,
}

impl RunSummary {
    /// Compute a summary over a set of results
    pub fn from_results(results: &[TestResult], duration_ms: u64) -> Self {
        let mut summary = Self {
            total: results.len(),
            duration_ms,
            ..Default::default()
        };
        for result in results {
            match result.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                TestStatus::Skipped => summary.skipped += 1,
            }
            *summary.by_type.entry(result.protocol).or_default() += 1;
        }
        summary
    }

    /// The basis for process success
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// One execution of a set of cases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            summary: RunSummary::default(),
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TestResult) {
        self.results.push(result);
    }

    /// Compute the summary; called once when the run ends
    pub fn seal(&mut self) {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;
        self.summary = RunSummary::from_results(&self.results, elapsed);
    }

    pub fn success(&self) -> bool {
        self.summary.success()
    }
}
