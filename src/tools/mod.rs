//! Tool session boundary: descriptors, arguments, and the session trait.
//!
//! A tool session exposes a fixed set of named operations, each described by a
//! [`ToolDescriptor`]. The agent loop only talks to tools through
//! [`ToolSession`]; the in-process weather tools live in [`weather`].

pub mod weather;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub use weather::{OpenWeatherClient, WeatherToolSession};

/// Errors raised by a tool session.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid tool descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Weather API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Primitive parameter type understood by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
}

impl ParamType {
    /// Map a declared JSON-schema type. Anything outside the four primitives
    /// (or a missing type) degrades to `String`.
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared {
            Some("number") => ParamType::Number,
            Some("boolean") => ParamType::Boolean,
            Some("object") => ParamType::Object,
            _ => ParamType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
}

/// Schema metadata for one invocable tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ToolParameter>,
    /// Required parameter names, in the order they were declared.
    pub required: Vec<String>,
}

impl ToolDescriptor {
    /// Build a descriptor, checking that every required name is a declared
    /// parameter and that parameter names are unique.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        required: Vec<String>,
    ) -> Result<Self, ToolError> {
        let name = name.into();

        let mut seen = HashSet::new();
        for param in &parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(ToolError::InvalidDescriptor(format!(
                    "tool '{}' declares parameter '{}' twice",
                    name, param.name
                )));
            }
        }
        if let Some(missing) = required.iter().find(|r| !seen.contains(r.as_str())) {
            return Err(ToolError::InvalidDescriptor(format!(
                "tool '{}' requires undeclared parameter '{}'",
                name, missing
            )));
        }

        Ok(Self {
            name,
            description: description.into(),
            parameters,
            required,
        })
    }

    /// Build a descriptor from a JSON-schema object of the form
    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    pub fn from_input_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &Value,
    ) -> Result<Self, ToolError> {
        let parameters = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(param_name, def)| ToolParameter {
                        name: param_name.clone(),
                        param_type: ParamType::from_declared(
                            def.get("type").and_then(Value::as_str),
                        ),
                        description: def
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self::new(name, description, parameters, required)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// A tool argument value. Closed over the shapes tools accept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Object(Arguments),
}

/// Tool arguments keyed by parameter name.
pub type Arguments = BTreeMap<String, ArgValue>;

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value; numeric strings are accepted too since some models
    /// quote coordinates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Number(n) => Some(*n),
            ArgValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Whole numbers go back out as JSON integers so a replayed `{"days": 5}`
/// does not turn into `{"days": 5.0}`.
impl Serialize for ArgValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ArgValue::String(s) => serializer.serialize_str(s),
            ArgValue::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            ArgValue::Number(n) => serializer.serialize_f64(*n),
            ArgValue::Boolean(b) => serializer.serialize_bool(*b),
            ArgValue::Object(map) => map.serialize(serializer),
        }
    }
}

/// Largest magnitude below which every integer is exact in an `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::String(value.to_string())
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Number(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Boolean(value)
    }
}

/// Convert backend-supplied JSON into [`Arguments`].
///
/// `null` and the empty string mean "no arguments". A string is parsed as a
/// JSON document first (OpenAI-style encoded arguments). Keys whose value is
/// `null` are treated as omitted.
pub fn arguments_from_json(value: Value) -> Result<Arguments, serde_json::Error> {
    match value {
        Value::Null => Ok(Arguments::new()),
        Value::String(s) if s.trim().is_empty() => Ok(Arguments::new()),
        Value::String(s) => arguments_from_json(serde_json::from_str(&s)?),
        other => serde_json::from_value(drop_nulls(other)),
    }
}

fn drop_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, drop_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Render [`Arguments`] as a JSON object.
pub fn arguments_to_json(arguments: &Arguments) -> Value {
    serde_json::to_value(arguments).unwrap_or_else(|_| Value::Object(Default::default()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A session exposing named, schema-described tools.
///
/// Authentication failures are reported as ordinary result text, not as
/// errors, so the model can relay them to the user.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Tools available in this session, in a stable order.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool and return its text content.
    async fn call_tool(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError>;
}

/// List the session's tools and check that names are unique.
pub async fn bootstrap(session: &dyn ToolSession) -> Result<Vec<ToolDescriptor>, ToolError> {
    let tools = session.list_tools().await?;

    let mut names = HashSet::new();
    for tool in &tools {
        if !names.insert(tool.name.as_str()) {
            return Err(ToolError::InvalidDescriptor(format!(
                "duplicate tool name '{}'",
                tool.name
            )));
        }
    }

    tracing::info!(
        tool_count = tools.len(),
        tools = %tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
        "tool session ready"
    );

    Ok(tools)
}
