//! Compiled JSON Schema cache for schema-mode assertions
//!
//! Validators are compiled once per distinct schema document and reused for
//! the whole run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use super::path::{from_json_pointer, ROOT};
use super::AssertionResult;

/// Process-scoped cache of compiled validators, keyed by the schema's JSON text
#[derive(Default)]
pub struct SchemaCache {
    validators: Mutex<HashMap<String, Arc<Validator>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled schemas held
    pub fn len(&self) -> usize {
        self.validators.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compile(&self, schema: &Value) -> Result<Arc<Validator>, String> {
        let key = schema.to_string();
        if let Ok(cache) = self.validators.lock() {
            if let Some(validator) = cache.get(&key) {
                return Ok(Arc::clone(validator));
            }
        }

        debug!("compiling response schema");
        let validator = Arc::new(jsonschema::validator_for(schema).map_err(|e| e.to_string())?);
        if let Ok(mut cache) = self.validators.lock() {
            cache.insert(key, Arc::clone(&validator));
        }
        Ok(validator)
    }

    /// Validate `instance` against `schema`
    ///
    /// Every violation becomes one failed assertion located at the offending
    /// instance path. A valid document yields a single passing assertion at the
    /// root. A schema that does not compile yields a single failed assertion.
    pub fn validate(&self, instance: &Value, schema: &Value) -> Vec<AssertionResult> {
        let validator = match self.compile(schema) {
            Ok(v) => v,
            Err(message) => {
                return vec![AssertionResult::fail(
                    ROOT,
                    schema.clone(),
                    instance.clone(),
                    format!("invalid schema: {message}"),
                )]
            }
        };

        let failures: Vec<AssertionResult> = validator
            .iter_errors(instance)
            .map(|error| {
                AssertionResult::fail(
                    from_json_pointer(&error.instance_path.to_string()),
                    Value::String(error.schema_path.to_string()),
                    error.instance.clone().into_owned(),
                    error.to_string(),
                )
            })
            .collect();

        if failures.is_empty() {
            vec![AssertionResult::pass(ROOT, schema.clone(), instance.clone())]
        } else {
            failures
        }
    }
}
