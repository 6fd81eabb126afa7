//! Assertion engine
//!
//! Pure value comparison with no I/O. Three disciplines are supported:
//! exact structural equality, partial (subset) matching with matcher objects,
//! and JSON Schema validation. Expectation objects whose keys look like paths
//! (`"data.name": "Alice"`) are evaluated key by key against the actual value.

pub mod matcher;
pub mod path;
mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use matcher::{Matcher, RangeMatcher, StatusExpect, ValueKind};
pub use path::{is_path_expectation, looks_like_path};
pub use schema::SchemaCache;

use path::ROOT;

/// How an expected value is compared with the actual one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    #[default]
    Partial,
    Schema,
}

/// One pass/fail judgment about a location within a compared value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    /// Dotted/bracketed location, `.` for the root
    pub path: String,
    pub expected: Value,
    pub actual: Value,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AssertionResult {
    /// Create a passing assertion
    pub fn pass(path: impl Into<String>, expected: Value, actual: Value) -> Self {
        Self {
            path: path.into(),
            expected,
            actual,
            passed: true,
            message: None,
        }
    }

    /// Create a failing assertion with a diagnostic
    pub fn fail(
        path: impl Into<String>,
        expected: Value,
        actual: Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected,
            actual,
            passed: false,
            message: Some(message.into()),
        }
    }

    /// Build from a match outcome
    pub fn from_outcome(
        path: impl Into<String>,
        expected: Value,
        actual: Value,
        outcome: MatchOutcome,
    ) -> Self {
        Self {
            path: path.into(),
            expected,
            actual,
            passed: outcome.passed,
            message: outcome.message,
        }
    }

    /// Re-root this assertion under `prefix` (e.g. `results[2]`)
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.path = path::prefixed(prefix, &self.path);
        self
    }
}

/// Result of a single generic match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub passed: bool,
    pub message: Option<String>,
}

impl MatchOutcome {
    fn ok() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    fn mismatch(message: String) -> Self {
        Self {
            passed: false,
            message: Some(message),
        }
    }
}

/// Aggregate result of asserting one value
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub passed: bool,
    pub assertions: Vec<AssertionResult>,
}

impl Outcome {
    fn from_assertions(assertions: Vec<AssertionResult>) -> Self {
        Self {
            passed: assertions.iter().all(|a| a.passed),
            assertions,
        }
    }
}

/// Generic match: matcher objects compare kind/range, anything else compares by equality
pub fn match_value(actual: &Value, expected: &Value) -> MatchOutcome {
    if let Some(matcher) = Matcher::from_value(expected) {
        return match matcher.check(actual) {
            Ok(()) => MatchOutcome::ok(),
            Err(message) => MatchOutcome::mismatch(message),
        };
    }
    if values_equal(actual, expected) {
        MatchOutcome::ok()
    } else {
        MatchOutcome::mismatch(format!("expected {expected}, got {actual}"))
    }
}

/// Deep equality; numbers compare by value so `1` equals `1.0`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn diff_exact(actual: &Value, expected: &Value, at: &str, out: &mut Vec<AssertionResult>) {
    match (actual, expected) {
        (Value::Object(act), Value::Object(exp)) => {
            for (key, exp_value) in exp {
                let child = path::child_key(at, key);
                match act.get(key) {
                    Some(act_value) => diff_exact(act_value, exp_value, &child, out),
                    None => out.push(AssertionResult::fail(
                        child,
                        exp_value.clone(),
                        Value::Null,
                        format!("missing key '{key}'"),
                    )),
                }
            }
            for (key, act_value) in act {
                if !exp.contains_key(key) {
                    out.push(AssertionResult::fail(
                        path::child_key(at, key),
                        Value::Null,
                        act_value.clone(),
                        format!("unexpected key '{key}'"),
                    ));
                }
            }
        }
        (Value::Array(act), Value::Array(exp)) if act.len() == exp.len() => {
            for (i, (a, e)) in act.iter().zip(exp).enumerate() {
                diff_exact(a, e, &path::child_index(at, i), out);
            }
        }
        (Value::Array(act), Value::Array(exp)) => out.push(AssertionResult::fail(
            at,
            expected.clone(),
            actual.clone(),
            format!("expected {} elements, got {}", exp.len(), act.len()),
        )),
        _ if values_equal(actual, expected) => {}
        _ => out.push(AssertionResult::fail(
            at,
            expected.clone(),
            actual.clone(),
            format!("expected {expected}, got {actual}"),
        )),
    }
}

fn diff_partial(actual: &Value, expected: &Value, at: &str, out: &mut Vec<AssertionResult>) {
    if let Some(matcher) = Matcher::from_value(expected) {
        if let Err(message) = matcher.check(actual) {
            out.push(AssertionResult::fail(
                at,
                expected.clone(),
                actual.clone(),
                message,
            ));
        }
        return;
    }

    match (actual, expected) {
        (Value::Object(act), Value::Object(exp)) => {
            for (key, exp_value) in exp {
                let child = path::child_key(at, key);
                match act.get(key) {
                    Some(act_value) => diff_partial(act_value, exp_value, &child, out),
                    None => out.push(AssertionResult::fail(
                        child,
                        exp_value.clone(),
                        Value::Null,
                        format!("missing key '{key}'"),
                    )),
                }
            }
        }
        (Value::Array(act), Value::Array(exp)) => {
            if act.len() < exp.len() {
                out.push(AssertionResult::fail(
                    at,
                    expected.clone(),
                    actual.clone(),
                    format!("expected at least {} elements, got {}", exp.len(), act.len()),
                ));
                return;
            }
            for (i, e) in exp.iter().enumerate() {
                diff_partial(&act[i], e, &path::child_index(at, i), out);
            }
        }
        (_, Value::Object(_)) | (_, Value::Array(_)) => out.push(AssertionResult::fail(
            at,
            expected.clone(),
            actual.clone(),
            format!(
                "expected {}, got {}",
                ValueKind::of(expected),
                ValueKind::of(actual)
            ),
        )),
        _ if values_equal(actual, expected) => {}
        _ => out.push(AssertionResult::fail(
            at,
            expected.clone(),
            actual.clone(),
            format!("expected {expected}, got {actual}"),
        )),
    }
}

fn collapse(failures: Vec<AssertionResult>, actual: &Value, expected: &Value) -> Outcome {
    if failures.is_empty() {
        Outcome::from_assertions(vec![AssertionResult::pass(
            ROOT,
            expected.clone(),
            actual.clone(),
        )])
    } else {
        Outcome::from_assertions(failures)
    }
}

/// Evaluate a path-addressed expectation object
///
/// Each key is parsed as a path and resolved independently against `actual`;
/// the value is compared with [`match_value`]. Produces one assertion per key.
pub fn assert_paths(actual: &Value, expected: &serde_json::Map<String, Value>) -> Outcome {
    let assertions = expected
        .iter()
        .map(|(key, exp_value)| {
            let segments = match path::parse(key) {
                Ok(s) => s,
                Err(message) => {
                    return AssertionResult::fail(key.as_str(), exp_value.clone(), Value::Null, message)
                }
            };
            match path::resolve(actual, &segments) {
                Some(found) => AssertionResult::from_outcome(
                    key.as_str(),
                    exp_value.clone(),
                    found.clone(),
                    match_value(found, exp_value),
                ),
                None => AssertionResult::fail(
                    key.as_str(),
                    exp_value.clone(),
                    Value::Null,
                    format!("path '{key}' not found"),
                ),
            }
        })
        .collect();
    Outcome::from_assertions(assertions)
}

/// The assertion engine
///
/// Owns the schema cache; everything else is stateless.
#[derive(Default)]
pub struct AssertionEngine {
    schemas: SchemaCache,
}

impl AssertionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a whole value in the given mode
    pub fn assert(&self, actual: &Value, expected: &Value, mode: MatchMode) -> Outcome {
        match mode {
            MatchMode::Exact => {
                let mut failures = Vec::new();
                diff_exact(actual, expected, ROOT, &mut failures);
                collapse(failures, actual, expected)
            }
            MatchMode::Partial => {
                let mut failures = Vec::new();
                diff_partial(actual, expected, ROOT, &mut failures);
                collapse(failures, actual, expected)
            }
            MatchMode::Schema => Outcome::from_assertions(self.schemas.validate(actual, expected)),
        }
    }

    /// Assert a response body or RPC output
    ///
    /// Path-addressed when the expectation's keys look like paths (except in
    /// schema mode, where the expectation is always a schema), otherwise a
    /// whole-value comparison in `mode`.
    pub fn assert_body(&self, actual: &Value, expected: &Value, mode: MatchMode) -> Outcome {
        match expected {
            Value::Object(map) if mode != MatchMode::Schema && is_path_expectation(expected) => {
                assert_paths(actual, map)
            }
            _ => self.assert(actual, expected, mode),
        }
    }

    /// Assert an HTTP status code against a literal or range expectation
    pub fn assert_status(&self, status: u16, expected: &StatusExpect) -> AssertionResult {
        let actual = Value::from(status);
        if expected.matches(status) {
            AssertionResult::pass("status", expected.to_value(), actual)
        } else {
            let message = match expected {
                StatusExpect::Code(code) => format!("expected status {code}, got {status}"),
                StatusExpect::Range(range) => format!("expected status {range}, got {status}"),
            };
            AssertionResult::fail("status", expected.to_value(), actual, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> AssertionEngine {
        AssertionEngine::new()
    }

    #[test]
    fn test_exact_pass_is_single_root_assertion() {
        let v = json!({"a": 1, "b": [1, 2]});
        let out = engine().assert(&v, &v, MatchMode::Exact);
        assert!(out.passed);
        assert_eq!(out.assertions.len(), 1);
        assert_eq!(out.assertions[0].path, ".");
    }

    #[test]
    fn test_exact_reports_extra_and_missing_keys() {
        let out = engine().assert(
            &json!({"a": 1, "extra": true}),
            &json!({"a": 1, "b": 2}),
            MatchMode::Exact,
        );
        assert!(!out.passed);
        let paths: Vec<&str> = out.assertions.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["b", "extra"]);
    }

    #[test]
    fn test_exact_is_order_sensitive() {
        let out = engine().assert(&json!([1, 2]), &json!([2, 1]), MatchMode::Exact);
        assert!(!out.passed);
        assert_eq!(out.assertions[0].path, "[0]");
    }

    #[test]
    fn test_partial_ignores_extra_keys() {
        let out = engine().assert(
            &json!({"id": 7, "name": "Alice", "meta": {"created": "now", "v": 2}}),
            &json!({"name": "Alice", "meta": {"v": 2}}),
            MatchMode::Partial,
        );
        assert!(out.passed, "{:?}", out.assertions);
    }

    #[test]
    fn test_partial_matchers_nested() {
        let actual = json!({"id": 7, "name": "Alice", "tags": ["a", "b"]});
        let out = engine().assert(
            &actual,
            &json!({"id": {"type": "number", "gt": 0}, "name": {"minLength": 1}, "tags": {"type": "array"}}),
            MatchMode::Partial,
        );
        assert!(out.passed, "{:?}", out.assertions);

        let out = engine().assert(&actual, &json!({"id": {"lt": 5}}), MatchMode::Partial);
        assert!(!out.passed);
        assert_eq!(out.assertions[0].path, "id");
    }

    #[test]
    fn test_partial_is_reflexive() {
        let samples = [
            json!(null),
            json!(3.5),
            json!("x"),
            json!([1, {"a": [true, null]}]),
            json!({"k": {"nested": [1, 2, 3]}, "s": "v"}),
        ];
        for sample in samples {
            assert!(engine().assert(&sample, &sample, MatchMode::Partial).passed, "{sample}");
        }
    }

    #[test]
    fn test_exact_and_partial_agree_on_equal_key_sets() {
        let expected = json!({"a": 1, "b": "two"});
        for actual in [json!({"a": 1, "b": "two"}), json!({"a": 2, "b": "two"})] {
            let exact = engine().assert(&actual, &expected, MatchMode::Exact).passed;
            let partial = engine().assert(&actual, &expected, MatchMode::Partial).passed;
            assert_eq!(exact, partial);
        }
    }

    #[test]
    fn test_partial_type_mismatch() {
        let out = engine().assert(&json!("str"), &json!({"a": 1}), MatchMode::Partial);
        assert!(!out.passed);
        assert_eq!(out.assertions[0].message.as_deref(), Some("expected object, got string"));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn test_path_addressed_body() {
        let body = json!({"data": {"status": "ok", "timestamp": "2024-01-01"}});
        let out = engine().assert_body(&body, &json!({"data.status": "ok"}), MatchMode::Partial);
        assert!(out.passed);
        assert_eq!(out.assertions.len(), 1);
        assert_eq!(out.assertions[0].path, "data.status");
    }

    #[test]
    fn test_path_addressed_missing_and_matcher() {
        let body = json!({"items": [{"id": 3}]});
        let out = engine().assert_body(
            &body,
            &json!({"items[0].id": {"gte": 1}, "items[1].id": 4}),
            MatchMode::Partial,
        );
        assert!(!out.passed);
        assert_eq!(out.assertions.len(), 2);
        assert!(out.assertions[0].passed);
        assert_eq!(out.assertions[1].message.as_deref(), Some("path 'items[1].id' not found"));
    }

    #[test]
    fn test_schema_body_not_path_addressed() {
        let out = engine().assert_body(
            &json!({"a": 1}),
            &json!({"type": "object", "properties": {"a": {"type": "integer"}}}),
            MatchMode::Schema,
        );
        assert!(out.passed);
    }

    #[test]
    fn test_match_value_generic() {
        assert!(match_value(&json!("boom"), &json!("boom")).passed);
        assert!(match_value(&json!("boom"), &json!({"type": "string"})).passed);
        let miss = match_value(&json!("boom"), &json!("bang"));
        assert!(!miss.passed);
        assert_eq!(miss.message.as_deref(), Some("expected \"bang\", got \"boom\""));
    }

    #[test]
    fn test_assert_status() {
        let range = StatusExpect::Range(RangeMatcher {
            gte: Some(200.0),
            lt: Some(300.0),
            ..Default::default()
        });
        assert!(engine().assert_status(204, &range).passed);
        let fail = engine().assert_status(300, &range);
        assert!(!fail.passed);
        assert_eq!(fail.path, "status");
        assert!(!engine().assert_status(404, &StatusExpect::Code(200)).passed);
    }

    #[test]
    fn test_with_prefix() {
        let a = AssertionResult::pass("result.id", json!(1), json!(1)).with_prefix("results[0]");
        assert_eq!(a.path, "results[0].result.id");
    }
}
