//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default run settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Extra headers sent with every outbound call
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Fixed endpoints on the target for batch and pipeline calls
    #[serde(default)]
    pub endpoints: Endpoints,

    /// Discovery endpoint paths
    #[serde(default)]
    pub discovery: DiscoveryPaths,
}

/// Default run settings
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Reporter used when `--format` is not given
    #[serde(default = "default_reporter")]
    pub reporter: String,

    /// Per-test timeout when a case does not declare one
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional attempts for a failed case
    #[serde(default)]
    pub retries: u32,

    /// Maximum in-flight tests in parallel mode
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            reporter: default_reporter(),
            timeout_ms: default_timeout_ms(),
            retries: 0,
            concurrency: default_concurrency(),
        }
    }
}

fn default_reporter() -> String {
    "console".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_concurrency() -> usize {
    4
}

/// Batch and pipeline endpoint paths
#[derive(Debug, Deserialize, Clone)]
pub struct Endpoints {
    #[serde(default = "default_batch_path")]
    pub batch: String,

    #[serde(default = "default_pipeline_path")]
    pub pipeline: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            batch: default_batch_path(),
            pipeline: default_pipeline_path(),
        }
    }
}

fn default_batch_path() -> String {
    "/__batch".to_string()
}
fn default_pipeline_path() -> String {
    "/__pipeline".to_string()
}

/// Paths of the self-describing endpoints queried by `discover`
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryPaths {
    /// Embedded test listing
    #[serde(default = "default_tests_path")]
    pub tests: String,

    /// RPC schema introspection
    #[serde(default = "default_schema_path")]
    pub schema: String,

    /// Tool-invocation (JSON-RPC) endpoint
    #[serde(default = "default_tools_path")]
    pub tools: String,
}

impl Default for DiscoveryPaths {
    fn default() -> Self {
        Self {
            tests: default_tests_path(),
            schema: default_schema_path(),
            tools: default_tools_path(),
        }
    }
}

fn default_tests_path() -> String {
    "/__tests".to_string()
}
fn default_schema_path() -> String {
    "/__schema".to_string()
}
fn default_tools_path() -> String {
    "/mcp".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.defaults.reporter, "console");
        assert_eq!(config.defaults.timeout_ms, 30_000);
        assert_eq!(config.defaults.concurrency, 4);
        assert_eq!(config.endpoints.batch, "/__batch");
        assert_eq!(config.discovery.tools, "/mcp");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [defaults]
            retries = 2

            [headers]
            x-tenant = "acme"

            [endpoints]
            pipeline = "/rpc/pipeline"
            "#,
        )
        .unwrap();
        assert_eq!(config.defaults.retries, 2);
        assert_eq!(config.defaults.timeout_ms, 30_000);
        assert_eq!(config.headers.get("x-tenant").map(String::as_str), Some("acme"));
        assert_eq!(config.endpoints.pipeline, "/rpc/pipeline");
        assert_eq!(config.endpoints.batch, "/__batch");
    }

    #[test]
    fn test_bad_toml_is_config_parse_error() {
        let err = Config::parse("[defaults\n").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse(_)));
    }
}
