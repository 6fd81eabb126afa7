//! REST executor

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{elapsed_ms, query_value, Executor, Outbound};
use crate::assert::{match_value, path, AssertionResult};
use crate::context::RunContext;
use crate::testing::{RestCase, TestCase, TestResult};

pub(super) async fn execute(
    exec: &Executor,
    case: &TestCase,
    rest: &RestCase,
    ctx: &RunContext,
    timeout: Duration,
) -> TestResult {
    let started = Instant::now();
    let request = &rest.request;

    let url = ctx.url_for(&ctx.interpolate(&request.path));
    let body = request.body.as_ref().map(|b| ctx.interpolate_deep(b));
    let query = request
        .query
        .iter()
        .map(|(k, v)| (k.clone(), ctx.interpolate(&query_value(v))))
        .collect();
    let call = Outbound {
        method: request.method.to_uppercase(),
        url,
        headers: exec.build_headers(ctx, &request.headers, body.is_some()),
        query,
        body,
    };

    let response = match exec.send(&call, timeout).await {
        Ok(response) => response,
        Err(e) => return TestResult::transport_failure(case, call.echo(), &e, elapsed_ms(started)),
    };

    let expect = &rest.expect;
    let mut assertions = Vec::new();

    if let Some(status) = &expect.status {
        assertions.push(exec.engine().assert_status(response.status, status));
    }

    assertions.extend(assert_headers(&response.headers, &expect.headers, ctx));

    if let Some(expected) = &expect.body {
        let expected = ctx.interpolate_deep(expected);
        let outcome = exec
            .engine()
            .assert_body(&response.body, &expected, expect.match_mode);
        assertions.extend(outcome.assertions.into_iter().map(|a| a.with_prefix("body")));
    }

    TestResult::evaluate(
        case,
        call.echo(),
        Some(response.echo()),
        assertions,
        elapsed_ms(started),
    )
}

/// One generic-match assertion per declared header; a missing header compares as null
fn assert_headers(
    actual: &BTreeMap<String, String>,
    expected: &BTreeMap<String, Value>,
    ctx: &RunContext,
) -> Vec<AssertionResult> {
    expected
        .iter()
        .map(|(name, expected)| {
            let expected = ctx.interpolate_deep(expected);
            let actual = actual
                .get(&name.to_ascii_lowercase())
                .map(|v| Value::String(v.clone()))
                .unwrap_or(Value::Null);
            let outcome = match_value(&actual, &expected);
            AssertionResult::from_outcome(path::child_key("headers", name), expected, actual, outcome)
        })
        .collect()
}
