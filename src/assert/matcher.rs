//! Matcher objects
//!
//! A matcher object stands in for a literal expected value and constrains the
//! kind or range of the actual value instead: `{"type": "string"}`,
//! `{"gte": 200, "lt": 300}`, `{"minLength": 1}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const MATCHER_KEYS: &[&str] = &["type", "gte", "gt", "lte", "lt", "minLength"];

/// JSON value kinds accepted by `{"type": ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ValueKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    /// Kind of a concrete value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        };
        write!(f, "{name}")
    }
}

/// Numeric bounds, all optional and all inclusive/exclusive as named
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
}

impl RangeMatcher {
    /// Whether any bound is set
    pub fn is_empty(&self) -> bool {
        self.gte.is_none() && self.gt.is_none() && self.lte.is_none() && self.lt.is_none()
    }

    /// Check a number against every bound that is set
    pub fn contains(&self, n: f64) -> bool {
        self.gte.map_or(true, |b| n >= b)
            && self.gt.map_or(true, |b| n > b)
            && self.lte.map_or(true, |b| n <= b)
            && self.lt.map_or(true, |b| n < b)
    }
}

impl fmt::Display for RangeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounds: Vec<String> = [
            (">=", self.gte),
            (">", self.gt),
            ("<=", self.lte),
            ("<", self.lt),
        ]
        .iter()
        .filter_map(|(op, bound)| bound.map(|b| format!("{op} {b}")))
        .collect();
        if bounds.is_empty() {
            write!(f, "any number")
        } else {
            write!(f, "{}", bounds.join(" and "))
        }
    }
}

/// Expected HTTP status: a literal code or a range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusExpect {
    Code(u16),
    Range(RangeMatcher),
}

impl StatusExpect {
    /// Check an actual status code
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpect::Code(code) => *code == status,
            StatusExpect::Range(range) => range.contains(f64::from(status)),
        }
    }

    /// Expected value as JSON, for assertion reporting
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A parsed matcher object
#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub kind: Option<ValueKind>,
    pub range: RangeMatcher,
    pub min_length: Option<usize>,
}

impl Matcher {
    /// Recognize a matcher object
    ///
    /// Only objects whose keys are all matcher keys qualify, and a `type` key
    /// must name a known kind. `{"type": "user"}` is therefore a literal
    /// expectation, not a malformed matcher.
    pub fn from_value(value: &Value) -> Option<Matcher> {
        let map = value.as_object()?;
        if map.is_empty() || !map.keys().all(|k| MATCHER_KEYS.contains(&k.as_str())) {
            return None;
        }

        let kind = match map.get("type") {
            Some(Value::String(name)) => Some(ValueKind::parse(name)?),
            Some(_) => return None,
            None => None,
        };
        let bound = |key: &str| -> Result<Option<f64>, ()> {
            match map.get(key) {
                None => Ok(None),
                Some(v) => v.as_f64().map(Some).ok_or(()),
            }
        };
        let range = RangeMatcher {
            gte: bound("gte").ok()?,
            gt: bound("gt").ok()?,
            lte: bound("lte").ok()?,
            lt: bound("lt").ok()?,
        };
        let min_length = match map.get("minLength") {
            None => None,
            Some(v) => Some(usize::try_from(v.as_u64()?).ok()?),
        };

        Some(Matcher {
            kind,
            range,
            min_length,
        })
    }

    /// Check an actual value, returning a diagnostic on mismatch
    pub fn check(&self, actual: &Value) -> Result<(), String> {
        if let Some(kind) = self.kind {
            let actual_kind = ValueKind::of(actual);
            if actual_kind != kind {
                return Err(format!("expected type {kind}, got {actual_kind}"));
            }
        }

        if !self.range.is_empty() {
            let n = actual
                .as_f64()
                .ok_or_else(|| format!("expected a number {}, got {}", self.range, actual))?;
            if !self.range.contains(n) {
                return Err(format!("expected a number {}, got {n}", self.range));
            }
        }

        if let Some(min) = self.min_length {
            let len = match actual {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                other => {
                    return Err(format!(
                        "expected a string or array with length >= {min}, got {}",
                        ValueKind::of(other)
                    ))
                }
            };
            if len < min {
                return Err(format!("expected length >= {min}, got {len}"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recognizes_matchers() {
        assert!(Matcher::from_value(&json!({"type": "string"})).is_some());
        assert!(Matcher::from_value(&json!({"gte": 1, "lt": 5})).is_some());
        assert!(Matcher::from_value(&json!({"minLength": 2})).is_some());
        assert!(Matcher::from_value(&json!({"type": "user"})).is_none());
        assert!(Matcher::from_value(&json!({"type": "string", "name": "x"})).is_none());
        assert!(Matcher::from_value(&json!({})).is_none());
        assert!(Matcher::from_value(&json!("string")).is_none());
    }

    #[test]
    fn test_type_matcher() {
        let m = Matcher::from_value(&json!({"type": "array"})).unwrap();
        assert!(m.check(&json!([1, 2])).is_ok());
        let err = m.check(&json!({"a": 1})).unwrap_err();
        assert_eq!(err, "expected type array, got object");
    }

    #[test]
    fn test_range_matcher() {
        let m = Matcher::from_value(&json!({"gt": 0, "lte": 10})).unwrap();
        assert!(m.check(&json!(10)).is_ok());
        assert!(m.check(&json!(0)).is_err());
        assert!(m.check(&json!("5")).is_err());
    }

    #[test]
    fn test_min_length() {
        let m = Matcher::from_value(&json!({"minLength": 2})).unwrap();
        assert!(m.check(&json!("ab")).is_ok());
        assert!(m.check(&json!([1])).is_err());
        assert!(m.check(&json!(5)).is_err());
    }

    #[test]
    fn test_status_range() {
        let ok: StatusExpect = serde_json::from_value(json!({"gte": 200, "lt": 300})).unwrap();
        for code in [200, 204, 299] {
            assert!(ok.matches(code), "{code} should pass");
        }
        for code in [199, 300] {
            assert!(!ok.matches(code), "{code} should fail");
        }

        let exact: StatusExpect = serde_json::from_value(json!(201)).unwrap();
        assert!(exact.matches(201));
        assert!(!exact.matches(200));
    }
}
