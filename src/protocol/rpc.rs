//! RPC and tool-call executor
//!
//! `users.create` is called as `POST <base>/users/create` with the input
//! wrapped in a single-element array.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::{elapsed_ms, Executor, Inbound, Outbound};
use crate::assert::{match_value, values_equal, AssertionEngine, AssertionResult, MatchMode};
use crate::context::RunContext;
use crate::testing::{RpcCase, RpcStatus, TestCase, TestResult};

pub(super) async fn execute(
    exec: &Executor,
    case: &TestCase,
    rpc: &RpcCase,
    ctx: &RunContext,
    timeout: Duration,
) -> TestResult {
    let started = Instant::now();

    let method = ctx.interpolate(&rpc.method);
    let url = ctx.url_for(&method_path(&method));
    let body = json!([ctx.interpolate_deep(&rpc.input)]);
    let headers = exec.build_headers(ctx, &Default::default(), true);
    let call = Outbound::post_json(url, headers, body);

    let response = match exec.send(&call, timeout).await {
        Ok(response) => response,
        Err(e) => return TestResult::transport_failure(case, call.echo(), &e, elapsed_ms(started)),
    };

    let expect = &rpc.expect;
    let mut assertions = vec![assert_outcome(&response, expect.status)];

    match expect.status {
        RpcStatus::Success if !response.is_error() => {
            if let Some(expected) = &expect.output {
                let expected = ctx.interpolate_deep(expected);
                assertions.extend(assert_output(
                    exec.engine(),
                    output_of(&response.body),
                    &expected,
                    expect.match_mode,
                ));
            }
        }
        RpcStatus::Error if response.is_error() => {
            if let Some(expected) = &expect.error {
                let error = response.error_value().cloned().unwrap_or(Value::Null);
                if let Some(code) = &expected.code {
                    let actual = error.get("code").cloned().unwrap_or(Value::Null);
                    assertions.push(if values_equal(&actual, code) {
                        AssertionResult::pass("error.code", code.clone(), actual)
                    } else {
                        let message = format!("expected error code {code}, got {actual}");
                        AssertionResult::fail("error.code", code.clone(), actual, message)
                    });
                }
                if let Some(message) = &expected.message {
                    let message = ctx.interpolate_deep(message);
                    let actual = error_message(&error);
                    let outcome = match_value(&actual, &message);
                    assertions.push(AssertionResult::from_outcome(
                        "error.message",
                        message,
                        actual,
                        outcome,
                    ));
                }
            }
        }
        _ => {}
    }

    TestResult::evaluate(
        case,
        call.echo(),
        Some(response.echo()),
        assertions,
        elapsed_ms(started),
    )
}

/// Endpoint path for a dotted method name
pub(super) fn method_path(method: &str) -> String {
    format!("/{}", method.trim_matches('.').replace('.', "/"))
}

/// The call's output: the envelope's `result` member when present, else the whole body
pub(super) fn output_of(body: &Value) -> &Value {
    match body {
        Value::Object(map) => map.get("result").unwrap_or(body),
        _ => body,
    }
}

/// Assert an output value under the `output` prefix
pub(super) fn assert_output(
    engine: &AssertionEngine,
    actual: &Value,
    expected: &Value,
    mode: MatchMode,
) -> Vec<AssertionResult> {
    engine
        .assert_body(actual, expected, mode)
        .assertions
        .into_iter()
        .map(|a| a.with_prefix("output"))
        .collect()
}

/// The success/error classification as an assertion at `status`
pub(super) fn assert_outcome(response: &Inbound, expected: RpcStatus) -> AssertionResult {
    let actual = if response.is_error() { "error" } else { "success" };
    let wanted = match expected {
        RpcStatus::Success => "success",
        RpcStatus::Error => "error",
    };
    if actual == wanted {
        return AssertionResult::pass("status", json!(wanted), json!(actual));
    }
    let detail = match response.error_value() {
        Some(error) => format!(" ({})", error_message(error)),
        None => format!(" (HTTP {})", response.status),
    };
    AssertionResult::fail(
        "status",
        json!(wanted),
        json!(actual),
        format!("expected {wanted}, got {actual}{detail}"),
    )
}

fn error_message(error: &Value) -> Value {
    match error {
        Value::String(_) => error.clone(),
        other => other.get("message").cloned().unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn inbound(status: u16, body: Value) -> Inbound {
        Inbound {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    #[test]
    fn test_method_path() {
        assert_eq!(method_path("users.create"), "/users/create");
        assert_eq!(method_path("ping"), "/ping");
    }

    #[test]
    fn test_output_of() {
        assert_eq!(output_of(&json!({"result": {"id": 1}})), &json!({"id": 1}));
        assert_eq!(output_of(&json!({"id": 1})), &json!({"id": 1}));
        assert_eq!(output_of(&json!([1])), &json!([1]));
    }

    #[test]
    fn test_outcome_tunnelled_error() {
        let response = inbound(200, json!({"error": {"code": "NOT_FOUND", "message": "gone"}}));
        let a = assert_outcome(&response, RpcStatus::Success);
        assert!(!a.passed);
        assert_eq!(a.message.as_deref(), Some("expected success, got error (\"gone\")"));
        assert!(assert_outcome(&response, RpcStatus::Error).passed);
    }

    #[test]
    fn test_outcome_http_error() {
        let response = inbound(503, json!("down"));
        let a = assert_outcome(&response, RpcStatus::Success);
        assert_eq!(a.message.as_deref(), Some("expected success, got error (HTTP 503)"));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(&json!("plain")), json!("plain"));
        assert_eq!(error_message(&json!({"message": "m"})), json!("m"));
        assert_eq!(error_message(&json!({"code": 1})), Value::Null);
    }
}
