//! Test runner
//!
//! Drives a list of cases through the executor, either one at a time or with a
//! bounded number of tests in flight, and feeds lifecycle events to a reporter.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::config::TestCase;
use super::result::{TestResult, TestRun};
use crate::assert::path;
use crate::context::RunContext;
use crate::protocol::Executor;
use crate::report::Reporter;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Deadline for cases that do not declare `timeoutMs`
    pub timeout: Duration,
    /// Additional attempts for a failed case
    pub retries: u32,
    /// `Some(n)` runs up to `n` tests concurrently; `None` runs them in order
    pub concurrency: Option<usize>,
    /// Only run cases carrying at least one of these tags
    pub tags: BTreeSet<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 0,
            concurrency: None,
            tags: BTreeSet::new(),
        }
    }
}

/// Executes cases against one target
pub struct Runner {
    executor: Executor,
    context: RunContext,
    options: RunOptions,
}

impl Runner {
    pub fn new(executor: Executor, context: RunContext, options: RunOptions) -> Self {
        Self {
            executor,
            context,
            options,
        }
    }

    /// Run the cases and return the sealed run
    ///
    /// Never fails: transport and assertion problems are recorded as failed
    /// results and the run continues.
    pub async fn run(&self, cases: Vec<TestCase>, reporter: &mut dyn Reporter) -> TestRun {
        let mut cases = select_cases(cases, &self.options.tags);
        assign_unique_ids(&mut cases);

        let mut run = TestRun::start();
        info!(run_id = %run.run_id, planned = cases.len(), "run started");
        reporter.on_run_start(&run, cases.len());

        match self.options.concurrency {
            Some(limit) => self.run_concurrent(cases, limit.max(1), &mut run, reporter).await,
            None => self.run_sequential(cases, &mut run, reporter).await,
        }

        run.seal();
        info!(
            run_id = %run.run_id,
            passed = run.summary.passed,
            failed = run.summary.failed,
            skipped = run.summary.skipped,
            "run complete"
        );
        reporter.on_run_complete(&run);
        run
    }

    async fn run_sequential(
        &self,
        cases: Vec<TestCase>,
        run: &mut TestRun,
        reporter: &mut dyn Reporter,
    ) {
        let mut ctx = self.context.clone();
        for case in &cases {
            if case.skip.is_set() {
                let result = TestResult::skipped(case);
                reporter.on_test_complete(&result);
                run.record(result);
                continue;
            }

            reporter.on_test_start(case);
            let result = self.execute_with_retries(case, &ctx).await;
            if result.passed() && !case.capture.is_empty() {
                ctx = apply_captures(&ctx, case, &result);
            }
            reporter.on_test_complete(&result);
            run.record(result);
        }
    }

    async fn run_concurrent(
        &self,
        cases: Vec<TestCase>,
        limit: usize,
        run: &mut TestRun,
        reporter: &mut dyn Reporter,
    ) {
        if cases.iter().any(|c| !c.capture.is_empty()) {
            warn!("captures are ignored when tests run concurrently");
        }

        let reporter = Mutex::new(reporter);
        let ctx = &self.context;
        let reporter_ref = &reporter;

        let mut results = stream::iter(cases.iter())
            .map(|case| async move {
                if case.skip.is_set() {
                    return TestResult::skipped(case);
                }
                reporter_ref
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_test_start(case);
                self.execute_with_retries(case, ctx).await
            })
            .buffer_unordered(limit);

        while let Some(result) = results.next().await {
            reporter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_test_complete(&result);
            run.record(result);
        }
    }

    /// Execute a case, retrying failures up to the configured count
    ///
    /// Only the last attempt is kept; its duration covers every attempt.
    pub async fn execute_with_retries(&self, case: &TestCase, ctx: &RunContext) -> TestResult {
        let timeout = case
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.options.timeout);
        let max_attempts = self.options.retries.saturating_add(1);

        let mut elapsed = 0u64;
        let mut attempt = 1;
        loop {
            let mut result = self.executor.execute(case, ctx, timeout).await;
            elapsed = elapsed.saturating_add(result.duration_ms);
            if !result.failed() || attempt >= max_attempts {
                result.attempts = attempt;
                result.duration_ms = elapsed;
                return result;
            }
            debug!(id = %case.id, attempt, "retrying failed test");
            attempt += 1;
        }
    }
}

/// Apply the tag filter, then restrict to `only` cases if any are marked
pub fn select_cases(cases: Vec<TestCase>, tags: &BTreeSet<String>) -> Vec<TestCase> {
    let tagged: Vec<TestCase> = if tags.is_empty() {
        cases
    } else {
        cases
            .into_iter()
            .filter(|case| case.tags.iter().any(|tag| tags.contains(tag)))
            .collect()
    };

    if tagged.iter().any(|case| case.only) {
        tagged.into_iter().filter(|case| case.only).collect()
    } else {
        tagged
    }
}

/// Make ids unique by suffixing `-2`, `-3`, ... on collision, in input order
pub fn assign_unique_ids(cases: &mut [TestCase]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: BTreeSet<String> = cases.iter().map(|c| c.id.clone()).collect();

    for case in cases.iter_mut() {
        let count = seen.entry(case.id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            continue;
        }
        let mut n = *count;
        let mut candidate = format!("{}-{}", case.id, n);
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}-{}", case.id, n);
        }
        *count = n;
        taken.insert(candidate.clone());
        case.id = candidate;
    }
}

/// Bind the case's captures from the response body into a new context
pub fn apply_captures(ctx: &RunContext, case: &TestCase, result: &TestResult) -> RunContext {
    let Some(response) = &result.response else {
        return ctx.clone();
    };

    let mut next = ctx.clone();
    for (name, location) in &case.capture {
        match path::lookup(&response.body, location) {
            Some(Value::String(s)) => next = next.set_variable(name, s.as_str()),
            Some(value) => next = next.set_variable(name, value.to_string()),
            None => warn!(id = %case.id, variable = %name, path = %location, "capture path not found"),
        }
    }
    next
}
