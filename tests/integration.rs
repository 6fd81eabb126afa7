//! End-to-end integration tests for apiprobe
//!
//! These tests start an in-process target service on a random local port and
//! drive the real executors, runner, discovery client and reporters against it.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use apiprobe::cli::{self, GlobalArgs};
use apiprobe::commands::{Commands, TargetArgs};
use apiprobe::discovery::{DiscoveryClient, Source};
use apiprobe::protocol::{Executor, ExecutorOptions};
use apiprobe::report::{ReportFormat, Reporter, ReporterOptions, TapReporter};
use apiprobe::testing::{
    Protocol, RunOptions, Runner, SpecDocument, TestCase, TestResult, TestRun, TestStatus,
};
use apiprobe::{Error, RunContext};
use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

// ============== Target service ==============

async fn create_user(Json(args): Json<Value>) -> (StatusCode, Json<Value>) {
    let input = args.get(0).cloned().unwrap_or(Value::Null);
    let name = input.get("name").and_then(Value::as_str).unwrap_or("");
    if name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "VALIDATION_ERROR", "message": "name is required"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"result": {"id": 1, "name": name, "email": input["email"]}})),
    )
}

async fn batch(Json(body): Json<Value>) -> Json<Value> {
    let results: Vec<Value> = body["calls"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            if call["path"] == "users.fail" {
                json!({"id": call["id"], "error": {"code": "BOOM"}})
            } else {
                json!({"id": call["id"], "result": call["args"]})
            }
        })
        .collect();
    Json(json!({ "results": results }))
}

async fn pipeline(Json(body): Json<Value>) -> Json<Value> {
    let total: i64 = body["pipeline"]
        .as_array()
        .map(|steps| steps.iter().filter_map(|s| s["args"]["n"].as_i64()).sum())
        .unwrap_or(0);
    Json(json!({"output": {"total": total}}))
}

async fn listing() -> Json<Value> {
    Json(json!({
        "rest": [
            {"name": "health", "request": {"path": "/health"}, "expect": {"status": 200}},
            {"path": "/users/7", "tests": [{"name": "fetch user", "expect": {"body": {"data.id": 7}}}]}
        ],
        "rpc": [
            {"name": "ping", "type": "rpc", "method": "users.create", "input": {"name": "P"}}
        ]
    }))
}

async fn tools() -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"tools": [
            {
                "name": "users.create",
                "description": "Create a user",
                "inputSchema": {"type": "object"},
                "tests": [
                    {"name": "Creates Alice", "input": {"name": "Alice"}},
                    {"name": "Rejects empty", "input": {"name": ""}, "expect": {"status": "error"}}
                ]
            },
            {"name": "users.list"}
        ]}
    }))
}

/// Start the target and return its base URL
async fn spawn_target() -> String {
    let app = Router::new()
        .route(
            "/health",
            get(|| async {
                Json(json!({"data": {"status": "ok", "timestamp": "2024-01-01T00:00:00Z"}}))
            }),
        )
        .route(
            "/users/:id",
            get(|UrlPath(id): UrlPath<u64>| async move { Json(json!({"data": {"id": id}})) }),
        )
        .route(
            "/login",
            post(|| async { Json(json!({"data": {"token": "t-123", "user": {"id": 42}}})) }),
        )
        .route("/users/create", post(create_user))
        .route("/__batch", post(batch))
        .route("/__pipeline", post(pipeline))
        .route(
            "/slow/call",
            post(|| async { std::future::pending::<&'static str>().await }),
        )
        .route(
            "/slow/delay",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Json(json!({"data": {"status": "late"}}))
            }),
        )
        .route("/__tests", get(listing))
        .route("/mcp", post(tools));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn executor() -> Executor {
    Executor::new(ExecutorOptions::default()).unwrap()
}

fn case(value: Value) -> TestCase {
    TestCase::from_value(value).unwrap()
}

async fn execute(base: &str, value: Value) -> TestResult {
    executor()
        .execute(&case(value), &RunContext::new(base), Duration::from_secs(5))
        .await
}

/// Records lifecycle events in order
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Reporter for Recorder {
    fn on_run_start(&mut self, _run: &TestRun, planned: usize) {
        self.events.push(format!("runStart:{planned}"));
    }

    fn on_test_start(&mut self, case: &TestCase) {
        self.events.push(format!("testStart:{}", case.id));
    }

    fn on_test_complete(&mut self, result: &TestResult) {
        self.events.push(format!("testComplete:{}", result.id));
    }

    fn on_run_complete(&mut self, run: &TestRun) {
        self.events.push(format!("runComplete:{}", run.summary.total));
    }

    fn output(&self) -> String {
        self.events.join("\n")
    }
}

// ============== Executors ==============

#[tokio::test]
async fn test_rest_health_passes() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "health",
            "request": {"method": "GET", "path": "/health"},
            "expect": {"status": 200, "body": {"data.status": "ok"}}
        }),
    )
    .await;

    assert_eq!(result.status, TestStatus::Passed, "{result:#?}");
    assert!(result.error.is_none());
    assert_eq!(result.response.as_ref().unwrap().status, 200);
    assert!(result.assertions.iter().any(|a| a.path == "body.data.status"));
}

#[tokio::test]
async fn test_rest_status_mismatch_fails() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "health created",
            "request": {"path": "/health"},
            "expect": {"status": {"gte": 201, "lt": 300}}
        }),
    )
    .await;

    assert_eq!(result.status, TestStatus::Failed);
    let failed: Vec<_> = result.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, "status");
}

#[tokio::test]
async fn test_rpc_validation_error_passes() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "rejects empty name",
            "type": "rpc",
            "method": "users.create",
            "input": {"name": "", "email": "a@b.com"},
            "expect": {"status": "error", "error": {"code": "VALIDATION_ERROR"}}
        }),
    )
    .await;

    assert_eq!(result.status, TestStatus::Passed, "{result:#?}");
    assert_eq!(result.request["url"], json!(format!("{base}/users/create")));
    assert_eq!(result.request["body"], json!([{"name": "", "email": "a@b.com"}]));
}

#[tokio::test]
async fn test_tool_output_partial_match() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "creates",
            "method": "users.create",
            "input": {"name": "Alice", "email": "a@b.com"},
            "expect": {"output": {"name": "Alice", "id": {"type": "number"}}}
        }),
    )
    .await;

    assert_eq!(result.protocol, Protocol::Tool);
    assert_eq!(result.status, TestStatus::Passed, "{result:#?}");
}

#[tokio::test]
async fn test_batch_all_success_fails_on_one_error() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "three calls",
            "calls": [
                {"path": "users.get", "args": {"id": 1}},
                {"path": "users.fail", "args": {}},
                {"path": "users.get", "args": {"id": 2}}
            ],
            "expect": {"batchSize": 3, "allSuccess": true}
        }),
    )
    .await;

    assert_eq!(result.status, TestStatus::Failed);
    let failed: Vec<_> = result.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, "allSuccess");
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_pipeline_output() {
    let base = spawn_target().await;
    let result = execute(
        &base,
        json!({
            "name": "sums",
            "pipeline": [{"path": "math.n", "args": {"n": 2}}, {"path": "math.n", "args": {"n": 3}}],
            "expect": {"output": {"total": 5}}
        }),
    )
    .await;

    assert_eq!(result.status, TestStatus::Passed, "{result:#?}");
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let base = spawn_target().await;
    let started = Instant::now();
    let result = executor()
        .execute(
            &case(json!({
                "name": "never answers",
                "type": "rpc",
                "method": "slow.call",
                "timeoutMs": 10
            })),
            &RunContext::new(&base),
            Duration::from_millis(10),
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.assertions.is_empty());
    let error = result.error.expect("timeout error");
    assert!(error.message.contains("timed out"), "{}", error.message);
}

#[tokio::test]
async fn test_unreachable_target_is_transport_failure() {
    let result = execute(
        "http://127.0.0.1:1",
        json!({"name": "nobody home", "request": {"path": "/health"}}),
    )
    .await;

    assert_eq!(result.status, TestStatus::Failed);
    assert!(result.error.is_some());
    assert!(result.response.is_none());
}

// ============== Runner ==============

#[tokio::test]
async fn test_runner_tap_example() {
    let base = spawn_target().await;
    let cases = vec![
        case(json!({"name": "health", "request": {"path": "/health"}, "expect": {"status": 200}})),
        case(json!({"name": "user", "request": {"path": "/users/3"}, "expect": {"body": {"data.id": 3}}})),
        case(json!({"name": "wrong", "request": {"path": "/health"}, "expect": {"status": 500}})),
    ];

    let runner = Runner::new(executor(), RunContext::new(&base), RunOptions::default());
    let mut reporter = TapReporter::new(ReporterOptions::default());
    let run = runner.run(cases, &mut reporter).await;

    assert_eq!(run.summary.passed, 2);
    assert_eq!(run.summary.failed, 1);
    assert!(!run.success());

    let tap = reporter.output();
    assert!(tap.starts_with("TAP version 14\n"));
    assert!(tap.contains("\n1..3\n"));
    assert_eq!(tap.matches("not ok").count(), 1);
    assert!(tap.contains("# pass 2\n"));
    assert!(tap.contains("# fail 1\n"));
}

#[tokio::test]
async fn test_runner_captures_flow_between_cases() {
    let base = spawn_target().await;
    let cases = vec![
        case(json!({
            "name": "login",
            "request": {"method": "POST", "path": "/login"},
            "capture": {"uid": "data.user.id"}
        })),
        case(json!({
            "name": "profile",
            "request": {"path": "/users/${uid}"},
            "expect": {"body": {"data.id": 42}}
        })),
    ];

    let runner = Runner::new(executor(), RunContext::new(&base), RunOptions::default());
    let run = runner.run(cases, &mut Recorder::default()).await;

    assert!(run.success(), "{:#?}", run.results);
    assert_eq!(run.results[1].request["url"], json!(format!("{base}/users/42")));
}

#[tokio::test]
async fn test_runner_skip_retry_and_events() {
    let base = spawn_target().await;
    let cases = vec![
        case(json!({"name": "skipped", "request": {"path": "/health"}, "skip": true})),
        case(json!({"name": "flaky", "request": {"path": "/health"}, "expect": {"status": 418}})),
    ];

    let runner = Runner::new(
        executor(),
        RunContext::new(&base),
        RunOptions {
            retries: 2,
            ..Default::default()
        },
    );
    let mut recorder = Recorder::default();
    let run = runner.run(cases, &mut recorder).await;

    assert_eq!(run.summary.skipped, 1);
    assert_eq!(run.summary.failed, 1);
    assert_eq!(run.results[0].attempts, 0);
    assert_eq!(run.results[1].attempts, 3);
    assert_eq!(
        recorder.events,
        vec![
            "runStart:2",
            "testComplete:rest.get.skipped",
            "testStart:rest.get.flaky",
            "testComplete:rest.get.flaky",
            "runComplete:2",
        ]
    );
}

#[tokio::test]
async fn test_runner_case_timeout_overrides_default() {
    let base = spawn_target().await;
    let cases = vec![case(json!({
        "name": "never answers",
        "type": "rpc",
        "method": "slow.call",
        "timeoutMs": 10
    }))];

    let runner = Runner::new(
        executor(),
        RunContext::new(&base),
        RunOptions {
            timeout: Duration::from_secs(30),
            ..Default::default()
        },
    );
    let started = Instant::now();
    let run = runner.run(cases, &mut Recorder::default()).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(run.summary.failed, 1);
    let error = run.results[0].error.as_ref().expect("timeout error");
    assert!(error.message.contains("timed out"), "{}", error.message);
    assert!(error.timed_out);
}

#[tokio::test]
async fn test_runner_retry_duration_covers_every_attempt() {
    let base = spawn_target().await;
    let cases = vec![case(json!({
        "name": "late teapot",
        "request": {"path": "/slow/delay"},
        "expect": {"status": 418}
    }))];

    let runner = Runner::new(
        executor(),
        RunContext::new(&base),
        RunOptions {
            retries: 2,
            ..Default::default()
        },
    );
    let run = runner.run(cases, &mut Recorder::default()).await;

    let result = &run.results[0];
    assert_eq!(result.status, TestStatus::Failed);
    assert_eq!(result.attempts, 3);
    assert!(result.duration_ms >= 150, "duration {}ms", result.duration_ms);
}

#[tokio::test]
async fn test_runner_concurrent() {
    let base = spawn_target().await;
    let cases: Vec<TestCase> = (1..=6)
        .map(|i| {
            let tag = if i % 2 == 0 { "even" } else { "odd" };
            let name = format!("user {i}");
            let path = format!("/users/{i}");
            case(json!({
                "name": name,
                "request": {"path": path},
                "expect": {"body": {"data.id": i}},
                "tags": [tag]
            }))
        })
        .collect();

    let runner = Runner::new(
        executor(),
        RunContext::new(&base),
        RunOptions {
            concurrency: Some(3),
            tags: ["even".to_string()].into_iter().collect(),
            ..Default::default()
        },
    );
    let mut recorder = Recorder::default();
    let run = runner.run(cases, &mut recorder).await;

    assert_eq!(run.summary.total, 3);
    assert!(run.success(), "{:#?}", run.results);
    assert_eq!(recorder.events.first().map(String::as_str), Some("runStart:3"));
    assert_eq!(recorder.events.last().map(String::as_str), Some("runComplete:3"));
    assert_eq!(recorder.events.iter().filter(|e| e.starts_with("testStart")).count(), 3);
    assert_eq!(recorder.events.iter().filter(|e| e.starts_with("testComplete")).count(), 3);
}

// ============== Discovery ==============

#[tokio::test]
async fn test_discovery_degrades_per_source() {
    let base = spawn_target().await;
    let client = DiscoveryClient::new(Default::default(), Duration::from_secs(5)).unwrap();
    let discovery = client.discover(&RunContext::new(&base)).await;

    // /__schema is not served by the target
    assert_eq!(discovery.summary.failed_sources.len(), 1);
    assert_eq!(discovery.summary.failed_sources[0].source, Source::Schema);
    assert!(!discovery.unreachable());

    assert_eq!(discovery.tools.len(), 2);
    assert_eq!(discovery.rest_tests.len(), 2);
    assert_eq!(discovery.rpc_tests.len(), 3);
    assert_eq!(discovery.summary.total, 5);
    assert_eq!(discovery.summary.by_type.get(&Protocol::Tool), Some(&2));

    let ids: Vec<&str> = discovery.rpc_tests.iter().map(|c| c.id.as_str()).collect();
    assert!(ids.contains(&"tool.users.create.creates-alice"));
    assert!(ids.contains(&"tool.users.create.rejects-empty"));
}

#[tokio::test]
async fn test_discovered_cases_run_green() {
    let base = spawn_target().await;
    let client = DiscoveryClient::new(Default::default(), Duration::from_secs(5)).unwrap();
    let discovery = client.discover(&RunContext::new(&base)).await;

    let runner = Runner::new(executor(), RunContext::new(&base), RunOptions::default());
    let run = runner.run(discovery.cases(), &mut Recorder::default()).await;
    assert!(run.success(), "{:#?}", run.results);
    assert_eq!(run.summary.total, 5);
}

#[tokio::test]
async fn test_discovery_unreachable() {
    let client = DiscoveryClient::new(Default::default(), Duration::from_secs(2)).unwrap();
    let discovery = client.discover(&RunContext::new("http://127.0.0.1:1")).await;
    assert!(discovery.unreachable());
    assert_eq!(discovery.summary.total, 0);
}

// ============== Commands ==============

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_validate_command() {
    let dir = tempfile::tempdir().unwrap();
    let valid = write_file(
        &dir,
        "spec.yaml",
        r#"
name: users
baseUrl: http://localhost:3000
tests:
  - name: health
    request:
      path: /health
    expect:
      status: 200
tools:
  - name: users.create
    tests:
      - name: creates
        input: {name: A}
"#,
    );
    let invalid = write_file(
        &dir,
        "bad.json",
        r#"{"tests": [{"name": "x"}, {"name": "", "request": {"path": ""}}], "tools": [{"name": ""}]}"#,
    );

    let doc = SpecDocument::load(&valid).unwrap();
    assert_eq!(doc.validate().unwrap(), 2);

    let repeated = write_file(
        &dir,
        "repeated.json",
        r#"{"tests": [
            {"name": "lists items", "request": {"path": "/a"}},
            {"name": "lists items", "request": {"path": "/b"}}
        ]}"#,
    );
    let ok = cli::dispatch(Commands::Validate { file: repeated }, GlobalArgs::default())
        .await
        .unwrap();
    assert!(ok);

    let ok = cli::dispatch(Commands::Validate { file: valid }, GlobalArgs::default())
        .await
        .unwrap();
    assert!(ok);

    let ok = cli::dispatch(Commands::Validate { file: invalid.clone() }, GlobalArgs::default())
        .await
        .unwrap();
    assert!(!ok);

    match SpecDocument::load(&invalid).unwrap().validate() {
        Err(Error::SpecInvalid(problems)) => assert!(problems.len() >= 3, "{problems:?}"),
        other => panic!("expected SpecInvalid, got {other:?}"),
    }

    let missing = dir.path().join("missing.json");
    assert!(cli::dispatch(Commands::Validate { file: missing }, GlobalArgs::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_run_command_with_spec_writes_report() {
    let base = spawn_target().await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(&dir, "config.toml", "");
    let spec = write_file(
        &dir,
        "spec.json",
        &json!({
            "baseUrl": base,
            "tests": [
                {"name": "health", "request": {"path": "/health"}, "expect": {"status": 200}}
            ],
            "tools": [
                {"name": "users.create", "tests": [{"name": "creates", "input": {"name": "A"}}]}
            ]
        })
        .to_string(),
    );
    let report = dir.path().join("report.json");

    let ok = cli::dispatch(
        Commands::Run {
            url: None,
            spec: Some(spec),
            target: TargetArgs {
                format: Some(ReportFormat::Json),
                output: Some(report.clone()),
                ..Default::default()
            },
            tags: Vec::new(),
            parallel: false,
            concurrency: None,
            retries: None,
            stream: false,
        },
        GlobalArgs {
            verbose: false,
            config: Some(config.as_path()),
        },
    )
    .await
    .unwrap();
    assert!(ok);

    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(doc["summary"]["total"], json!(2));
    assert_eq!(doc["summary"]["passed"], json!(2));
    assert_eq!(doc["results"][1]["id"], json!("tool.users.create.creates"));
}

#[tokio::test]
async fn test_run_command_without_target_fails_before_network() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(&dir, "config.toml", "");
    let spec = write_file(&dir, "spec.json", r#"{"tests": []}"#);

    let result = cli::dispatch(
        Commands::Run {
            url: None,
            spec: Some(spec),
            target: TargetArgs::default(),
            tags: Vec::new(),
            parallel: false,
            concurrency: None,
            retries: None,
            stream: false,
        },
        GlobalArgs {
            verbose: false,
            config: Some(config.as_path()),
        },
    )
    .await;
    assert!(matches!(result, Err(Error::Config(_))));
}
