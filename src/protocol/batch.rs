//! Batch executor
//!
//! Sends `{calls: [{path, args, id}]}` to the batch endpoint and expects a
//! `{results: [{id, result?, error?}]}` envelope back.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::{elapsed_ms, Executor, Outbound};
use crate::assert::{path, AssertionResult, MatchMode};
use crate::common::Error;
use crate::context::RunContext;
use crate::testing::{BatchCase, BatchExpect, TestCase, TestResult};

pub(super) async fn execute(
    exec: &Executor,
    case: &TestCase,
    batch: &BatchCase,
    ctx: &RunContext,
    timeout: Duration,
) -> TestResult {
    let started = Instant::now();

    let calls: Vec<Value> = batch
        .calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            json!({
                "path": ctx.interpolate(&call.path),
                "args": ctx.interpolate_deep(&call.args),
                "id": call.id.clone().unwrap_or_else(|| i.to_string()),
            })
        })
        .collect();
    let url = ctx.url_for(&exec.endpoints().batch);
    let headers = exec.build_headers(ctx, &Default::default(), true);
    let call = Outbound::post_json(url, headers, json!({ "calls": calls }));

    let response = match exec.send(&call, timeout).await {
        Ok(response) => response,
        Err(e) => return TestResult::transport_failure(case, call.echo(), &e, elapsed_ms(started)),
    };

    let Some(entries) = response.body.get("results").and_then(Value::as_array) else {
        let error = Error::unexpected_response(
            &call.url,
            format!(
                "batch response (HTTP {}) has no 'results' array",
                response.status
            ),
        );
        return TestResult::transport_failure(case, call.echo(), &error, elapsed_ms(started));
    };

    let assertions = assert_entries(exec, entries, &batch.expect, ctx);

    TestResult::evaluate(
        case,
        call.echo(),
        Some(response.echo()),
        assertions,
        elapsed_ms(started),
    )
}

fn entry_failed(entry: &Value) -> bool {
    entry.get("error").is_some_and(|e| !e.is_null())
}

fn assert_entries(
    exec: &Executor,
    entries: &[Value],
    expect: &BatchExpect,
    ctx: &RunContext,
) -> Vec<AssertionResult> {
    let mut assertions = Vec::new();

    if let Some(size) = expect.batch_size {
        let (expected, actual) = (json!(size), json!(entries.len()));
        assertions.push(if entries.len() == size {
            AssertionResult::pass("batchSize", expected, actual)
        } else {
            let message = format!("expected {size} results, got {}", entries.len());
            AssertionResult::fail("batchSize", expected, actual, message)
        });
    }

    if let Some(all_success) = expect.all_success {
        let failed: Vec<String> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry_failed(entry))
            .map(|(i, entry)| match entry.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(id) if !id.is_null() => id.to_string(),
                _ => i.to_string(),
            })
            .collect();
        let actual = failed.is_empty();
        assertions.push(if actual == all_success {
            AssertionResult::pass("allSuccess", json!(all_success), json!(actual))
        } else if all_success {
            let message = format!("calls failed: {}", failed.join(", "));
            AssertionResult::fail("allSuccess", json!(true), json!(false), message)
        } else {
            let message = "expected at least one call to fail, all succeeded";
            AssertionResult::fail("allSuccess", json!(false), json!(true), message)
        });
    }

    for (i, expected) in expect.results.iter().flatten().enumerate() {
        let prefix = path::child_index("results", i);
        let expected = ctx.interpolate_deep(expected);
        match entries.get(i) {
            Some(entry) => assertions.extend(
                exec.engine()
                    .assert_body(entry, &expected, MatchMode::Partial)
                    .assertions
                    .into_iter()
                    .map(|a| a.with_prefix(&prefix)),
            ),
            None => assertions.push(AssertionResult::fail(
                prefix,
                expected,
                Value::Null,
                format!("no result at index {i}"),
            )),
        }
    }

    assertions
}
