//! Protocol executors
//!
//! Each executor turns one test case plus a context into exactly one outbound
//! HTTP call and a `TestResult`. Errors never escape an executor: transport
//! failures, timeouts and malformed responses become a failed result with an
//! `error` and no assertions.

mod batch;
mod pipeline;
mod rest;
mod rpc;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::assert::AssertionEngine;
use crate::common::config::Endpoints;
use crate::common::{Error, Result};
use crate::context::RunContext;
use crate::testing::{CaseKind, ResponseEcho, TestCase, TestResult};

/// Header carrying the context's client id
pub const CLIENT_ID_HEADER: &str = "x-client-id";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Settings shared by every executor in a run
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Headers sent with every call, lowest precedence
    pub default_headers: BTreeMap<String, String>,
    /// Batch and pipeline endpoint paths
    pub endpoints: Endpoints,
}

/// Dispatches cases to the executor for their protocol
pub struct Executor {
    client: reqwest::Client,
    engine: Arc<AssertionEngine>,
    options: ExecutorOptions,
}

impl Executor {
    /// Create an executor with its own HTTP client and assertion engine
    pub fn new(options: ExecutorOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("apiprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_parts(client, Arc::new(AssertionEngine::new()), options))
    }

    /// Create an executor from an existing client and engine
    pub fn with_parts(
        client: reqwest::Client,
        engine: Arc<AssertionEngine>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            client,
            engine,
            options,
        }
    }

    pub fn engine(&self) -> &AssertionEngine {
        &self.engine
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.options.endpoints
    }

    /// Execute one case; the selected executor is a pure function of the case's tag
    pub async fn execute(&self, case: &TestCase, ctx: &RunContext, timeout: Duration) -> TestResult {
        match &case.kind {
            CaseKind::Rest(rest) => rest::execute(self, case, rest, ctx, timeout).await,
            CaseKind::Rpc(call) | CaseKind::Tool(call) => {
                rpc::execute(self, case, call, ctx, timeout).await
            }
            CaseKind::Batch(batch) => batch::execute(self, case, batch, ctx, timeout).await,
            CaseKind::Pipeline(pipeline) => {
                pipeline::execute(self, case, pipeline, ctx, timeout).await
            }
        }
    }

    pub(crate) fn build_headers(
        &self,
        ctx: &RunContext,
        case_headers: &BTreeMap<String, String>,
        has_body: bool,
    ) -> BTreeMap<String, String> {
        outbound_headers(&self.options.default_headers, ctx, case_headers, has_body)
    }

    /// Send a call, bounded by `timeout`
    pub(crate) async fn send(&self, call: &Outbound, timeout: Duration) -> Result<Inbound> {
        debug!(method = %call.method, url = %call.url, "sending request");
        match tokio::time::timeout(timeout, self.send_inner(call)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn send_inner(&self, call: &Outbound) -> Result<Inbound> {
        let method = Method::from_bytes(call.method.as_bytes())
            .map_err(|_| Error::Config(format!("invalid HTTP method '{}'", call.method)))?;
        let mut request = self.client.request(method, &call.url);
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        for (name, value) in &call.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &call.body {
            request = request.body(encode_body(body, call.headers.get("content-type"))?);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let text = response.text().await?;
        let body = parse_body(&call.url, headers.get("content-type"), &text)?;
        debug!(status, url = %call.url, "received response");

        Ok(Inbound {
            status,
            headers,
            body,
        })
    }
}

/// Merge default, context and per-call headers
///
/// Later sources win and names compare case-insensitively. A bearer token from
/// the context is added unless an `authorization` header is already present,
/// and a JSON content type is added for calls with a body unless one is set.
pub fn outbound_headers(
    defaults: &BTreeMap<String, String>,
    ctx: &RunContext,
    call_headers: &BTreeMap<String, String>,
    has_body: bool,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for source in [defaults, ctx.headers(), call_headers] {
        for (name, value) in source {
            headers.insert(name.to_ascii_lowercase(), ctx.interpolate(value));
        }
    }
    if let Some(token) = ctx.access_token() {
        headers
            .entry("authorization".to_string())
            .or_insert_with(|| format!("Bearer {token}"));
    }
    if let Some(client_id) = ctx.client_id() {
        headers
            .entry(CLIENT_ID_HEADER.to_string())
            .or_insert_with(|| client_id.to_string());
    }
    if has_body {
        headers
            .entry("content-type".to_string())
            .or_insert_with(|| JSON_CONTENT_TYPE.to_string());
    }
    headers
}

/// One outbound HTTP call
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Outbound {
    /// JSON POST with the given body
    pub fn post_json(url: String, headers: BTreeMap<String, String>, body: Value) -> Self {
        Self {
            method: "POST".to_string(),
            url,
            headers,
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Echo of the call for the result, with credentials redacted
    pub fn echo(&self) -> Value {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name == "authorization" {
                    (name.as_str(), "[redacted]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        let mut echo = json!({
            "method": self.method,
            "url": self.url,
            "headers": headers,
        });
        if !self.query.is_empty() {
            echo["query"] = json!(self.query);
        }
        if let Some(body) = &self.body {
            echo["body"] = body.clone();
        }
        echo
    }
}

/// A received response with its body parsed by content type
#[derive(Debug, Clone)]
pub(crate) struct Inbound {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl Inbound {
    /// RPC-style error classification: HTTP status >= 400 or a non-null `error` member
    ///
    /// A body carrying `"error": null` alongside its result counts as success.
    pub fn is_error(&self) -> bool {
        self.status >= 400 || self.error_value().is_some()
    }

    /// The body's `error` member, when present and non-null
    pub fn error_value(&self) -> Option<&Value> {
        self.body.get("error").filter(|e| !e.is_null())
    }

    pub fn echo(&self) -> ResponseEcho {
        ResponseEcho {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case(JSON_CONTENT_TYPE) || mime.ends_with("+json")
}

fn encode_body(body: &Value, content_type: Option<&String>) -> Result<Vec<u8>> {
    match (body, content_type) {
        (Value::String(raw), Some(ct)) if !is_json_content_type(ct) => Ok(raw.clone().into_bytes()),
        _ => Ok(serde_json::to_vec(body)?),
    }
}

fn parse_body(url: &str, content_type: Option<&String>, text: &str) -> Result<Value> {
    match content_type {
        Some(ct) if is_json_content_type(ct) => {
            if text.trim().is_empty() {
                Ok(Value::Null)
            } else {
                serde_json::from_str(text).map_err(|e| {
                    Error::unexpected_response(url, format!("malformed JSON body: {e}"))
                })
            }
        }
        _ => Ok(Value::String(text.to_string())),
    }
}

/// Milliseconds elapsed since `started`
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Render a query parameter value; strings are used verbatim
pub(crate) fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
