//! Test case and spec document types
//!
//! Test cases deserialize from JSON or YAML. The protocol is taken from an
//! explicit `type` field, or inferred from the shape of the case when absent.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::assert::{MatchMode, StatusExpect};
use crate::common::{slugify, Error, Result};

/// Wire protocol a case is executed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Rest,
    Rpc,
    Tool,
    Batch,
    Pipeline,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Rest => "rest",
            Protocol::Rpc => "rpc",
            Protocol::Tool => "tool",
            Protocol::Batch => "batch",
            Protocol::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `skip: true` or `skip: "reason"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Skip {
    Flag(bool),
    Reason(String),
}

impl Default for Skip {
    fn default() -> Self {
        Skip::Flag(false)
    }
}

impl Skip {
    /// Whether the case should be skipped (a non-empty reason counts)
    pub fn is_set(&self) -> bool {
        match self {
            Skip::Flag(flag) => *flag,
            Skip::Reason(reason) => !reason.trim().is_empty(),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Skip::Reason(reason) if !reason.trim().is_empty() => Some(reason),
            _ => None,
        }
    }
}

// === REST ===

/// A synchronous HTTP request/response case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestCase {
    pub request: RestRequest,
    #[serde(default)]
    pub expect: RestExpect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestRequest {
    #[serde(default = "default_http_method")]
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, Value>,
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestExpect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusExpect>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, alias = "match", alias = "match_mode")]
    pub match_mode: MatchMode,
}

// === RPC / tool ===

/// A dotted-method remote procedure call or tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCase {
    pub method: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expect: RpcExpect,
}

/// Whether the call is expected to succeed or fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcStatus {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcExpect {
    #[serde(default)]
    pub status: RpcStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorExpect>,
    #[serde(default, alias = "match", alias = "match_mode")]
    pub match_mode: MatchMode,
}

/// Expected error details; `code` matches exactly, `message` by generic match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorExpect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

// === Batch ===

/// Several calls sent in one request to the batch endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCase {
    pub calls: Vec<BatchCall>,
    #[serde(default)]
    pub expect: BatchExpect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCall {
    pub path: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExpect {
    #[serde(default, alias = "batch_size", skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, alias = "all_success", skip_serializing_if = "Option::is_none")]
    pub all_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
}

// === Pipeline ===

/// An ordered list of steps executed server-side in one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCase {
    pub pipeline: Vec<Value>,
    #[serde(default)]
    pub expect: PipelineExpect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExpect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, alias = "match", alias = "match_mode")]
    pub match_mode: MatchMode,
}

/// Protocol-specific part of a case, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CaseKind {
    Rest(RestCase),
    Rpc(RpcCase),
    Tool(RpcCase),
    Batch(BatchCase),
    Pipeline(PipelineCase),
}

impl CaseKind {
    pub fn protocol(&self) -> Protocol {
        match self {
            CaseKind::Rest(_) => Protocol::Rest,
            CaseKind::Rpc(_) => Protocol::Rpc,
            CaseKind::Tool(_) => Protocol::Tool,
            CaseKind::Batch(_) => Protocol::Batch,
            CaseKind::Pipeline(_) => Protocol::Pipeline,
        }
    }
}

/// Infer the protocol tag for a case object that has no explicit `type`
pub fn infer_protocol(case: &Map<String, Value>) -> Option<Protocol> {
    if let Some(tag) = case.get("type").and_then(Value::as_str) {
        return serde_json::from_value(Value::String(tag.to_string())).ok();
    }
    if case.contains_key("request") {
        Some(Protocol::Rest)
    } else if case.contains_key("calls") {
        Some(Protocol::Batch)
    } else if case.contains_key("pipeline") {
        Some(Protocol::Pipeline)
    } else if case.contains_key("method") {
        Some(Protocol::Tool)
    } else {
        None
    }
}

/// Fields shared by every case, parsed separately from the protocol part
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseHeader {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, alias = "timeout_ms")]
    timeout_ms: Option<u64>,
    #[serde(default)]
    skip: Skip,
    #[serde(default)]
    only: bool,
    #[serde(default)]
    capture: BTreeMap<String, String>,
}

/// A declarative description of one exchange and its expected outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    /// Stable identifier; defaulted from protocol, method and name
    pub id: String,
    /// Whether `id` was declared rather than generated
    #[serde(skip)]
    pub explicit_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags in declared order, without repeats
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub skip: Skip,
    pub only: bool,
    /// Variables to bind from the response body after the case passes
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub capture: BTreeMap<String, String>,
    #[serde(flatten)]
    pub kind: CaseKind,
}

impl TestCase {
    /// Parse a case from a JSON value, inferring the protocol if needed
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::invalid_case("<unnamed>", "test case must be an object"));
        };
        let name = map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        if !map.contains_key("type") {
            let protocol = infer_protocol(&map).ok_or_else(|| {
                Error::invalid_case(
                    &name,
                    "cannot infer protocol: expected one of 'type', 'request', 'method', 'calls', 'pipeline'",
                )
            })?;
            map.insert("type".into(), Value::String(protocol.as_str().into()));
        }

        let value = Value::Object(map);
        let header: CaseHeader =
            serde_json::from_value(value.clone()).map_err(|e| Error::invalid_case(&name, e))?;
        let kind: CaseKind =
            serde_json::from_value(value).map_err(|e| Error::invalid_case(&name, e))?;

        let declared = header.id.filter(|id| !id.trim().is_empty());
        let explicit_id = declared.is_some();
        let id = declared.unwrap_or_else(|| default_id(&kind, &header.name));

        let mut tags: Vec<String> = Vec::with_capacity(header.tags.len());
        for tag in header.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Ok(TestCase {
            name: header.name,
            id,
            explicit_id,
            description: header.description,
            tags,
            timeout_ms: header.timeout_ms,
            skip: header.skip,
            only: header.only,
            capture: header.capture,
            kind,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.kind.protocol()
    }

    /// Structural problems that would make the case meaningless to execute
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push(format!("test '{}': name must not be empty", self.id));
        }
        match &self.kind {
            CaseKind::Rest(rest) => {
                if rest.request.path.trim().is_empty() {
                    problems.push(format!("test '{}': request.path must not be empty", self.id));
                }
                if reqwest::Method::from_bytes(rest.request.method.to_uppercase().as_bytes()).is_err() {
                    problems.push(format!(
                        "test '{}': invalid HTTP method '{}'",
                        self.id, rest.request.method
                    ));
                }
            }
            CaseKind::Rpc(rpc) | CaseKind::Tool(rpc) => {
                if rpc.method.trim().is_empty() {
                    problems.push(format!("test '{}': method must not be empty", self.id));
                }
            }
            CaseKind::Batch(batch) => {
                if batch.calls.is_empty() {
                    problems.push(format!("test '{}': calls must not be empty", self.id));
                }
            }
            CaseKind::Pipeline(pipeline) => {
                if pipeline.pipeline.is_empty() {
                    problems.push(format!("test '{}': pipeline must not be empty", self.id));
                }
            }
        }
        problems
    }
}

impl<'de> Deserialize<'de> for TestCase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        TestCase::from_value(value).map_err(D::Error::custom)
    }
}

/// Deterministic default id: `<protocol>.<method>.<slug(name)>`
pub fn default_id(kind: &CaseKind, name: &str) -> String {
    let slug = slugify(name);
    match kind {
        CaseKind::Rest(rest) => format!("rest.{}.{}", rest.request.method.to_lowercase(), slug),
        CaseKind::Rpc(rpc) => format!("rpc.{}.{}", rpc.method, slug),
        CaseKind::Tool(rpc) => format!("tool.{}.{}", rpc.method, slug),
        CaseKind::Batch(_) => format!("batch.{slug}"),
        CaseKind::Pipeline(_) => format!("pipeline.{slug}"),
    }
}

/// Build a case from a test embedded in a tool or RPC method definition
///
/// The owning method name and protocol are filled in unless the embedded test
/// declares its own.
pub fn embedded_case(protocol: Protocol, method: &str, test: Value) -> Result<TestCase> {
    let Value::Object(mut map) = test else {
        return Err(Error::invalid_case(method, "embedded test must be an object"));
    };
    map.entry("type")
        .or_insert_with(|| Value::String(protocol.as_str().into()));
    map.entry("method")
        .or_insert_with(|| Value::String(method.to_string()));
    TestCase::from_value(Value::Object(map))
}

/// A tool definition that may carry embedded tests
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<Value>,
}

/// A spec document: standalone tests plus tools with embedded tests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocument {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "base_url")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub tests: Vec<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
}

impl SpecDocument {
    /// Load a spec document from a JSON or YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            _ => Self::parse(&content),
        }
    }

    /// Parse from text, trying JSON first and then YAML
    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str(content) {
            Ok(doc) => Ok(doc),
            Err(_) => Ok(serde_yaml::from_str(content)?),
        }
    }

    /// Expand the document into cases, collecting every problem found
    pub fn cases_with_problems(&self) -> (Vec<TestCase>, Vec<String>) {
        let mut cases = Vec::new();
        let mut problems = Vec::new();

        for (i, raw) in self.tests.iter().enumerate() {
            match TestCase::from_value(raw.clone()) {
                Ok(case) => cases.push(case),
                Err(e) => problems.push(format!("tests[{i}]: {e}")),
            }
        }

        for (i, raw) in self.tools.iter().enumerate() {
            let tool: ToolDefinition = match serde_json::from_value(raw.clone()) {
                Ok(tool) => tool,
                Err(e) => {
                    problems.push(format!("tools[{i}]: {e}"));
                    continue;
                }
            };
            if tool.name.trim().is_empty() {
                problems.push(format!("tools[{i}]: name must not be empty"));
                continue;
            }
            for (j, test) in tool.tests.iter().enumerate() {
                match embedded_case(Protocol::Tool, &tool.name, test.clone()) {
                    Ok(case) => cases.push(case),
                    Err(e) => problems.push(format!("tools[{i}].tests[{j}]: {e}")),
                }
            }
        }

        // Generated ids are made unique by the runner; only declared ones may clash
        let mut seen = HashSet::new();
        for case in &cases {
            problems.extend(case.problems());
            if case.explicit_id && !seen.insert(case.id.as_str()) {
                problems.push(format!("duplicate test id '{}'", case.id));
            }
        }

        (cases, problems)
    }

    /// Structural validation; `Ok` carries the number of cases found
    pub fn validate(&self) -> Result<usize> {
        let (cases, problems) = self.cases_with_problems();
        if problems.is_empty() {
            Ok(cases.len())
        } else {
            Err(Error::SpecInvalid(problems))
        }
    }
}
