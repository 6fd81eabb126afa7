//! Pipeline executor
//!
//! Sends `{pipeline: [step, ...]}` to the pipeline endpoint and asserts the
//! single returned `output`.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use super::rpc::{assert_outcome, assert_output};
use super::{elapsed_ms, Executor, Outbound};
use crate::context::RunContext;
use crate::testing::{PipelineCase, RpcStatus, TestCase, TestResult};

pub(super) async fn execute(
    exec: &Executor,
    case: &TestCase,
    pipeline: &PipelineCase,
    ctx: &RunContext,
    timeout: Duration,
) -> TestResult {
    let started = Instant::now();

    let steps: Vec<Value> = pipeline
        .pipeline
        .iter()
        .map(|step| ctx.interpolate_deep(step))
        .collect();
    let url = ctx.url_for(&exec.endpoints().pipeline);
    let headers = exec.build_headers(ctx, &Default::default(), true);
    let call = Outbound::post_json(url, headers, json!({ "pipeline": steps }));

    let response = match exec.send(&call, timeout).await {
        Ok(response) => response,
        Err(e) => return TestResult::transport_failure(case, call.echo(), &e, elapsed_ms(started)),
    };

    let outcome = assert_outcome(&response, RpcStatus::Success);
    let succeeded = outcome.passed;
    let mut assertions = vec![outcome];

    if let (true, Some(expected)) = (succeeded, &pipeline.expect.output) {
        let expected = ctx.interpolate_deep(expected);
        assertions.extend(assert_output(
            exec.engine(),
            output_of(&response.body),
            &expected,
            pipeline.expect.match_mode,
        ));
    }

    TestResult::evaluate(
        case,
        call.echo(),
        Some(response.echo()),
        assertions,
        elapsed_ms(started),
    )
}

/// The envelope's `output` member when present, else the whole body
fn output_of(body: &Value) -> &Value {
    match body {
        Value::Object(map) => map.get("output").unwrap_or(body),
        _ => body,
    }
}
