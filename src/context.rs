//! Run-scoped context and string interpolation
//!
//! A `RunContext` is an immutable value. Every "mutation" returns a new context,
//! so a variable bound while running one test never leaks into a sibling test
//! that shares the same parent.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Options for creating a context
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub base_url: String,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub variables: BTreeMap<String, String>,
}

/// Fields to replace when deriving a child context
///
/// `variables` is merged over the parent's bag; every other field replaces the
/// parent's value only when set.
#[derive(Debug, Clone, Default)]
pub struct ContextOverrides {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub variables: BTreeMap<String, String>,
}

/// Run-scoped state shared by every test in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunContext {
    base_url: String,
    #[serde(skip_serializing)]
    access_token: Option<String>,
    client_id: Option<String>,
    headers: BTreeMap<String, String>,
    variables: BTreeMap<String, String>,
}

impl RunContext {
    /// Create a context from options
    pub fn create(options: ContextOptions) -> Self {
        Self {
            base_url: normalize_base_url(&options.base_url),
            access_token: options.access_token.filter(|t| !t.is_empty()),
            client_id: options.client_id,
            headers: options.headers,
            variables: options.variables,
        }
    }

    /// Shorthand for a context with only a base URL
    pub fn new(base_url: &str) -> Self {
        Self::create(ContextOptions {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Derive a child context
    pub fn clone_with(&self, overrides: ContextOverrides) -> Self {
        let mut variables = self.variables.clone();
        variables.extend(overrides.variables);
        Self {
            base_url: overrides
                .base_url
                .map(|u| normalize_base_url(&u))
                .unwrap_or_else(|| self.base_url.clone()),
            access_token: overrides.access_token.or_else(|| self.access_token.clone()),
            client_id: overrides.client_id.or_else(|| self.client_id.clone()),
            headers: overrides.headers.unwrap_or_else(|| self.headers.clone()),
            variables,
        }
    }

    /// Return a new context with `name` bound to `value`
    pub fn set_variable(&self, name: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.variables.insert(name.to_string(), value.into());
        next
    }

    pub fn get_variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    /// Join a path onto the base URL
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Substitute `${name}` and `{{name}}` references from the variable bag
    ///
    /// Unresolved references are left verbatim.
    pub fn interpolate(&self, template: &str) -> String {
        interpolate(template, &self.variables)
    }

    /// Apply [`RunContext::interpolate`] to every string inside a JSON value
    ///
    /// Object keys and non-string leaves are left untouched.
    pub fn interpolate_deep(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.interpolate(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.interpolate_deep(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.interpolate_deep(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Substitute `${name}` / `{{name}}` references in `template`
pub fn interpolate(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let dollar = rest.find("${").map(|i| (i, "${", "}"));
        let braces = rest.find("{{").map(|i| (i, "{{", "}}"));
        let next = match (dollar, braces) {
            (Some(d), Some(b)) => Some(if d.0 <= b.0 { d } else { b }),
            (d, b) => d.or(b),
        };

        let Some((start, open, close)) = next else {
            out.push_str(rest);
            break;
        };

        out.push_str(&rest[..start]);
        let after = &rest[start + open.len()..];
        match after.find(close) {
            Some(end) => {
                let name = after[..end].trim();
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + open.len() + end + close.len()]),
                }
                rest = &after[end + close.len()..];
            }
            None => {
                out.push_str(&rest[start..]);
                break;
            }
        }
    }

    out
}
