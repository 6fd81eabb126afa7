//! Discovery client
//!
//! Harvests test cases embedded in a live service from three self-describing
//! sources: the test listing endpoint, the tool-invocation `tools/list` call,
//! and the RPC schema endpoint. A source that fails contributes zero tests and
//! is recorded in the summary; the others are unaffected.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::common::config::DiscoveryPaths;
use crate::common::{Error, Result};
use crate::context::RunContext;
use crate::protocol::outbound_headers;
use crate::testing::{embedded_case, Protocol, TestCase, ToolDefinition};

/// The three discovery sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Listing,
    Tools,
    Schema,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Listing => write!(f, "test listing"),
            Source::Tools => write!(f, "tool list"),
            Source::Schema => write!(f, "rpc schema"),
        }
    }
}

/// A source that could not be read, or an embedded test that could not be parsed
#[derive(Debug, Clone, Serialize)]
pub struct SourceIssue {
    pub source: Source,
    pub message: String,
}

/// Counts of discovered tests
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySummary {
    pub total: usize,
    pub tools: usize,
    pub by_type: BTreeMap<Protocol, usize>,
    /// Sources that could not be queried
    pub failed_sources: Vec<SourceIssue>,
    /// Embedded tests that were skipped because they did not parse
    pub invalid_tests: Vec<SourceIssue>,
}

/// Everything harvested from a target
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub tools: Vec<ToolDefinition>,
    pub rest_tests: Vec<TestCase>,
    pub rpc_tests: Vec<TestCase>,
    pub summary: DiscoverySummary,
}

impl Discovery {
    /// All discovered cases, REST first
    pub fn cases(&self) -> Vec<TestCase> {
        self.rest_tests
            .iter()
            .chain(self.rpc_tests.iter())
            .cloned()
            .collect()
    }

    /// Whether every source failed
    pub fn unreachable(&self) -> bool {
        self.summary.failed_sources.len() == 3
    }

    fn add_case(&mut self, case: TestCase) {
        if case.protocol() == Protocol::Rest {
            self.rest_tests.push(case);
        } else {
            self.rpc_tests.push(case);
        }
    }

    fn add_parsed(&mut self, source: Source, parsed: Vec<Result<TestCase>>) {
        for item in parsed {
            match item {
                Ok(case) => self.add_case(case),
                Err(e) => {
                    warn!(%source, error = %e, "skipping invalid embedded test");
                    self.summary.invalid_tests.push(SourceIssue {
                        source,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn fail_source(&mut self, source: Source, error: Error) {
        warn!(%source, error = %error, "discovery source unavailable");
        self.summary.failed_sources.push(SourceIssue {
            source,
            message: error.to_string(),
        });
    }

    fn summarize(&mut self) {
        let mut by_type = BTreeMap::new();
        for case in self.rest_tests.iter().chain(self.rpc_tests.iter()) {
            *by_type.entry(case.protocol()).or_insert(0) += 1;
        }
        self.summary.total = self.rest_tests.len() + self.rpc_tests.len();
        self.summary.tools = self.tools.len();
        self.summary.by_type = by_type;
    }
}

/// Queries a target's self-describing endpoints
pub struct DiscoveryClient {
    client: reqwest::Client,
    paths: DiscoveryPaths,
    timeout: Duration,
}

impl DiscoveryClient {
    pub fn new(paths: DiscoveryPaths, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("apiprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            paths,
            timeout,
        })
    }

    /// Query every source and aggregate the embedded tests
    pub async fn discover(&self, ctx: &RunContext) -> Discovery {
        let (listing, tools, schema) = tokio::join!(
            self.fetch_listing(ctx),
            self.fetch_tools(ctx),
            self.fetch_schema(ctx)
        );

        let mut discovery = Discovery::default();

        match listing {
            Ok(parsed) => discovery.add_parsed(Source::Listing, parsed),
            Err(e) => discovery.fail_source(Source::Listing, e),
        }

        match tools {
            Ok(tools) => {
                for tool in &tools {
                    let parsed = tool
                        .tests
                        .iter()
                        .map(|test| embedded_case(Protocol::Tool, &tool.name, test.clone()))
                        .collect();
                    discovery.add_parsed(Source::Tools, parsed);
                }
                discovery.tools = tools;
            }
            Err(e) => discovery.fail_source(Source::Tools, e),
        }

        match schema {
            Ok(parsed) => discovery.add_parsed(Source::Schema, parsed),
            Err(e) => discovery.fail_source(Source::Schema, e),
        }

        discovery.summarize();
        debug!(total = discovery.summary.total, "discovery complete");
        discovery
    }

    async fn fetch_listing(&self, ctx: &RunContext) -> Result<Vec<Result<TestCase>>> {
        let body = self.get_json(ctx, &self.paths.tests).await?;
        parse_listing(body).map_err(|message| {
            Error::unexpected_response(&ctx.url_for(&self.paths.tests), message)
        })
    }

    async fn fetch_tools(&self, ctx: &RunContext) -> Result<Vec<ToolDefinition>> {
        let url = ctx.url_for(&self.paths.tools);
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}});
        let body = self.send_json(ctx, reqwest::Method::POST, &url, Some(request)).await?;
        parse_tool_list(body).map_err(|message| Error::unexpected_response(&url, message))
    }

    async fn fetch_schema(&self, ctx: &RunContext) -> Result<Vec<Result<TestCase>>> {
        let body = self.get_json(ctx, &self.paths.schema).await?;
        parse_schema(body).map_err(|message| {
            Error::unexpected_response(&ctx.url_for(&self.paths.schema), message)
        })
    }

    async fn get_json(&self, ctx: &RunContext, path: &str) -> Result<Value> {
        self.send_json(ctx, reqwest::Method::GET, &ctx.url_for(path), None)
            .await
    }

    async fn send_json(
        &self,
        ctx: &RunContext,
        method: reqwest::Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let headers = outbound_headers(&BTreeMap::new(), ctx, &BTreeMap::new(), body.is_some());
        let mut request = self.client.request(method, url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let send = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::unexpected_response(url, format!("HTTP {status}")));
            }
            let text = response.text().await?;
            serde_json::from_str::<Value>(&text)
                .map_err(|e| Error::unexpected_response(url, format!("malformed JSON: {e}")))
        };

        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_millis() as u64))?
    }
}

/// Parse the test listing: `{rest: [...], rpc: [...]}`, `{tests: [...]}` or a bare array
///
/// Entries are either complete cases or route descriptors
/// `{method?, path, tests: [...]}` whose tests inherit the route's request.
pub fn parse_listing(body: Value) -> std::result::Result<Vec<Result<TestCase>>, String> {
    let entries: Vec<Value> = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let mut entries = Vec::new();
            let mut recognized = false;
            for key in ["rest", "rpc", "tests", "routes"] {
                match map.remove(key) {
                    Some(Value::Array(items)) => {
                        recognized = true;
                        entries.extend(items);
                    }
                    Some(_) => return Err(format!("'{key}' must be an array")),
                    None => {}
                }
            }
            if !recognized {
                return Err("expected 'rest', 'rpc', 'tests' or 'routes' arrays".to_string());
            }
            entries
        }
        _ => return Err("expected an object or array of tests".to_string()),
    };

    let mut parsed = Vec::new();
    for entry in entries {
        match route_tests(&entry) {
            Some(cases) => parsed.extend(cases),
            None => parsed.push(TestCase::from_value(entry)),
        }
    }
    Ok(parsed)
}

fn route_tests(entry: &Value) -> Option<Vec<Result<TestCase>>> {
    let route = entry.as_object()?;
    if route.contains_key("name") || route.contains_key("request") {
        return None;
    }
    let tests = route.get("tests")?.as_array()?;
    let path = route.get("path").and_then(Value::as_str).unwrap_or_default();
    let method = route.get("method").and_then(Value::as_str).unwrap_or("GET");

    Some(
        tests
            .iter()
            .map(|test| {
                let Value::Object(mut test) = test.clone() else {
                    return TestCase::from_value(test.clone());
                };
                let has_shape = ["type", "method", "calls", "pipeline"]
                    .iter()
                    .any(|k| test.contains_key(*k));
                if !has_shape || test.contains_key("request") {
                    let request = test
                        .entry("request")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(request) = request {
                        request
                            .entry("path")
                            .or_insert_with(|| Value::String(path.to_string()));
                        request
                            .entry("method")
                            .or_insert_with(|| Value::String(method.to_string()));
                    }
                }
                TestCase::from_value(Value::Object(test))
            })
            .collect(),
    )
}

/// Parse a JSON-RPC `tools/list` response
pub fn parse_tool_list(body: Value) -> std::result::Result<Vec<ToolDefinition>, String> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(format!("tools/list returned an error: {error}"));
    }
    let tools = body
        .get("result")
        .and_then(|r| r.get("tools"))
        .or_else(|| body.get("tools"))
        .cloned()
        .ok_or_else(|| "response has no 'result.tools' array".to_string())?;
    serde_json::from_value(tools).map_err(|e| format!("invalid tool list: {e}"))
}

/// Parse the RPC schema: `{methods: [{name, tests?}]}` (or `procedures`)
pub fn parse_schema(body: Value) -> std::result::Result<Vec<Result<TestCase>>, String> {
    let methods = body
        .get("methods")
        .or_else(|| body.get("procedures"))
        .and_then(Value::as_array)
        .ok_or_else(|| "expected a 'methods' array".to_string())?;

    let mut parsed = Vec::new();
    for method in methods {
        let Some(name) = method.get("name").and_then(Value::as_str) else {
            parsed.push(Err(Error::invalid_case("<schema>", "method without a name")));
            continue;
        };
        let tests = method
            .get("tests")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        parsed.extend(
            tests
                .iter()
                .map(|test| embedded_case(Protocol::Rpc, name, test.clone())),
        );
    }
    Ok(parsed)
}
