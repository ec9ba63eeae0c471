//! MCP (Model Context Protocol) tool interface
//!
//! Schema the language model sees, argument validation against it, and the
//! errors tool calls report.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Tool errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("Tool unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl ToolError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        ToolError::InvalidParams(message.into())
    }

    pub fn timeout(tool: &str, timeout_ms: u64) -> Self {
        ToolError::Timeout {
            tool: tool.to_string(),
            timeout_ms,
        }
    }

    /// Worth retrying against the same upstream
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Timeout { .. } | ToolError::Upstream(_))
    }
}

/// Tool schema (JSON Schema format)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// Object input schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }
}

/// Property schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
}

impl PropertySchema {
    fn typed(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: Some(description.into()),
            enum_values: None,
            pattern: None,
            minimum: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    pub fn enum_type(description: impl Into<String>, values: &[&str]) -> Self {
        let mut schema = Self::typed("string", description);
        schema.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        schema
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }
}

/// Tool callable by the language model
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// Execute with raw JSON arguments
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;

    /// Check argument types, enum values and patterns against the schema
    ///
    /// Required fields are not enforced here; the orchestrator fills them
    /// from context before calling.
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        let (_, mut rejected) = self.partition_arguments(input)?;
        let result = match rejected.drain(..).next() {
            Some((_, err)) => Err(err),
            None => Ok(()),
        };
        result
    }

    /// Split arguments into the properties that pass validation and the
    /// rejected ones with their errors
    ///
    /// Properties the schema does not know are kept as is.
    fn partition_arguments(
        &self,
        input: &Value,
    ) -> Result<(Map<String, Value>, Vec<(String, ToolError)>), ToolError> {
        let schema = self.schema();
        let Value::Object(obj) = input else {
            return Err(ToolError::invalid_params("Input must be an object"));
        };

        let mut valid = Map::new();
        let mut rejected = Vec::new();
        for (name, value) in obj {
            let checked = match schema.input_schema.properties.get(name) {
                Some(prop) => validate_property(name, value, prop),
                None => Ok(()),
            };
            match checked {
                Ok(()) => {
                    valid.insert(name.clone(), value.clone());
                }
                Err(e) => rejected.push((name.clone(), e)),
            }
        }
        Ok((valid, rejected))
    }
}

fn validate_property(name: &str, value: &Value, schema: &PropertySchema) -> Result<(), ToolError> {
    if value.is_null() {
        return Ok(());
    }

    let type_valid = match schema.prop_type.as_str() {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        _ => true,
    };
    if !type_valid {
        return Err(ToolError::invalid_params(format!(
            "Field '{}' must be of type '{}'",
            name, schema.prop_type
        )));
    }

    if let (Some(allowed), Some(s)) = (&schema.enum_values, value.as_str()) {
        if !allowed.iter().any(|v| v == s) {
            return Err(ToolError::invalid_params(format!(
                "Field '{}' must be one of: [{}], got '{}'",
                name,
                allowed.join(", "),
                s
            )));
        }
    }

    if let (Some(pattern), Some(s)) = (&schema.pattern, value.as_str()) {
        let re = Regex::new(pattern).map_err(|e| {
            ToolError::invalid_params(format!("Field '{}' has a bad pattern: {}", name, e))
        })?;
        if !re.is_match(s) {
            return Err(ToolError::invalid_params(format!(
                "Field '{}' must match {}, got '{}'",
                name, pattern, s
            )));
        }
    }

    if let (Some(min), Some(num)) = (schema.minimum, value.as_f64()) {
        if num < min {
            return Err(ToolError::invalid_params(format!(
                "Field '{}' must be >= {}, got {}",
                name, min, num
            )));
        }
    }

    Ok(())
}
