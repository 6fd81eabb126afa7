//! apiprobe - a protocol-agnostic conformance test engine
//!
//! Test cases describe one request/response exchange each. The engine
//! executes them over REST, RPC, tool-invocation, batch or pipeline calls,
//! checks the responses with the assertion engine and hands the results to a
//! reporter.

pub mod assert;
pub mod cli;
pub mod commands;
pub mod common;
pub mod context;
pub mod discovery;
pub mod protocol;
pub mod report;
pub mod testing;

// Re-export commonly used types for tests
pub use assert::{AssertionEngine, AssertionResult, MatchMode};
pub use common::{Error, Result};
pub use context::RunContext;
pub use testing::{TestCase, TestResult, TestRun};
