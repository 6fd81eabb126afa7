//! Test cases, results and the runner

pub mod config;
pub mod result;
pub mod runner;

pub use config::{
    default_id, embedded_case, infer_protocol, BatchCall, BatchCase, BatchExpect, CaseKind,
    ErrorExpect, PipelineCase, PipelineExpect, Protocol, RestCase, RestExpect, RestRequest,
    RpcCase, RpcExpect, RpcStatus, Skip, SpecDocument, TestCase, ToolDefinition,
};
pub use result::{ResponseEcho, RunSummary, TestError, TestResult, TestRun, TestStatus};
pub use runner::{RunOptions, Runner};
