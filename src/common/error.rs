//! Error types for apiprobe
//!
//! Errors here are the ones that can stop a command before or around a run.
//! Anything that goes wrong while executing a single test case is folded into
//! that case's `TestResult` instead of being returned as an `Error`.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for apiprobe
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    // === Test Definition Errors ===
    #[error("Invalid test case '{name}': {reason}")]
    InvalidCase { name: String, reason: String },

    #[error("Spec document is invalid:\n  - {}", .0.join("\n  - "))]
    SpecInvalid(Vec<String>),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an invalid URL error
    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid test case error
    pub fn invalid_case(name: &str, reason: impl ToString) -> Self {
        Self::InvalidCase {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an unexpected response error
    pub fn unexpected_response(url: &str, message: impl ToString) -> Self {
        Self::UnexpectedResponse {
            url: url.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error is a deadline expiry rather than a hard failure
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Render the chain of underlying causes, innermost last
    ///
    /// Returns `None` when the error has no source.
    pub fn source_chain(&self) -> Option<String> {
        let mut lines = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            lines.push(format!("caused by: {cause}"));
            current = cause.source();
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}
