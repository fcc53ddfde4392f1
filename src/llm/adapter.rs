//! Tool descriptor adapter.
//!
//! Converts [`ToolDescriptor`]s into the function/tool declaration shape each
//! backend expects. The mapping is flat: one level of
//! properties, primitive types only, `required` copied verbatim.

use serde_json::{json, Map, Value};

use super::ToolFormat;
use crate::tools::{ParamType, ToolDescriptor};

/// Tool declarations prepared for one backend format.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderToolSpec {
    format: ToolFormat,
    declarations: Vec<Value>,
}

impl ProviderToolSpec {
    pub fn format(&self) -> ToolFormat {
        self.format
    }

    /// One declaration per tool, in descriptor order.
    pub fn declarations(&self) -> &[Value] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Convert descriptors into `format`'s declaration shape.
pub fn to_provider_format(format: ToolFormat, descriptors: &[ToolDescriptor]) -> ProviderToolSpec {
    let declarations = descriptors
        .iter()
        .map(|tool| match format {
            ToolFormat::Anthropic => json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": object_schema(tool, "object", json_schema_type),
            }),
            ToolFormat::Gemini => json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": object_schema(tool, "OBJECT", gemini_type),
            }),
            ToolFormat::OpenAi => json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": object_schema(tool, "object", json_schema_type),
                }
            }),
        })
        .collect();

    ProviderToolSpec {
        format,
        declarations,
    }
}

fn object_schema(
    tool: &ToolDescriptor,
    object_type: &str,
    type_name: fn(ParamType) -> &'static str,
) -> Value {
    let properties: Map<String, Value> = tool
        .parameters
        .iter()
        .map(|param| {
            (
                param.name.clone(),
                json!({
                    "type": type_name(param.param_type),
                    "description": param.description,
                }),
            )
        })
        .collect();

    json!({
        "type": object_type,
        "properties": properties,
        "required": tool.required,
    })
}

fn json_schema_type(param_type: ParamType) -> &'static str {
    param_type.as_str()
}

fn gemini_type(param_type: ParamType) -> &'static str {
    match param_type {
        ParamType::String => "STRING",
        ParamType::Number => "NUMBER",
        ParamType::Boolean => "BOOLEAN",
        ParamType::Object => "OBJECT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::from_input_schema(
                "get_current_weather",
                "Get current weather conditions for a city",
                &json!({
                    "type": "object",
                    "properties": {"city": {"type": "string", "description": "City name"}},
                    "required": ["city"]
                }),
            )
            .unwrap(),
            ToolDescriptor::from_input_schema(
                "get_weather_by_coordinates",
                "Get current weather by geographic coordinates",
                &json!({
                    "type": "object",
                    "properties": {
                        "latitude": {"type": "number"},
                        "longitude": {"type": "number"},
                        "detailed": {"type": "boolean"},
                        "options": {"type": "object"},
                        "days": {"type": "integer"},
                        "tags": {"type": "array"},
                        "note": {}
                    },
                    "required": ["longitude", "latitude"]
                }),
            )
            .unwrap(),
        ]
    }

    #[test]
    fn gemini_maps_types_to_uppercase_primitives() {
        let spec = to_provider_format(ToolFormat::Gemini, &descriptors());
        assert_eq!(spec.format(), ToolFormat::Gemini);

        let params = &spec.declarations()[1]["parameters"];
        assert_eq!(params["type"], "OBJECT");
        assert_eq!(params["properties"]["latitude"]["type"], "NUMBER");
        assert_eq!(params["properties"]["detailed"]["type"], "BOOLEAN");
        assert_eq!(params["properties"]["options"]["type"], "OBJECT");
        assert_eq!(params["properties"]["days"]["type"], "STRING");
        assert_eq!(params["properties"]["tags"]["type"], "STRING");
        assert_eq!(params["properties"]["note"]["type"], "STRING");
        assert_eq!(params["required"], json!(["longitude", "latitude"]));
    }

    #[test]
    fn anthropic_uses_input_schema() {
        let spec = to_provider_format(ToolFormat::Anthropic, &descriptors());
        let first = &spec.declarations()[0];
        assert_eq!(first["name"], "get_current_weather");
        assert_eq!(first["description"], "Get current weather conditions for a city");
        assert_eq!(first["input_schema"]["type"], "object");
        assert_eq!(first["input_schema"]["properties"]["city"]["type"], "string");
        assert_eq!(
            first["input_schema"]["properties"]["city"]["description"],
            "City name"
        );
        assert_eq!(first["input_schema"]["required"], json!(["city"]));

        let second = &spec.declarations()[1];
        assert_eq!(second["input_schema"]["properties"]["longitude"]["type"], "number");
        assert_eq!(second["input_schema"]["properties"]["days"]["type"], "string");
    }

    #[test]
    fn openai_wraps_functions() {
        let spec = to_provider_format(ToolFormat::OpenAi, &descriptors());
        let decl = &spec.declarations()[1];
        assert_eq!(decl["type"], "function");
        assert_eq!(decl["function"]["name"], "get_weather_by_coordinates");
        assert_eq!(
            decl["function"]["parameters"]["properties"]["latitude"]["type"],
            "number"
        );
        assert_eq!(
            decl["function"]["parameters"]["required"],
            json!(["longitude", "latitude"])
        );
    }

    #[test]
    fn parameter_names_and_order_are_preserved() {
        let spec = to_provider_format(ToolFormat::Gemini, &descriptors());
        let names: Vec<_> = spec.declarations()[1]["parameters"]["properties"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            names,
            vec!["latitude", "longitude", "detailed", "options", "days", "tags", "note"]
        );
    }

    #[test]
    fn conversion_is_deterministic() {
        let tools = descriptors();
        for format in [ToolFormat::Anthropic, ToolFormat::Gemini, ToolFormat::OpenAi] {
            assert_eq!(
                to_provider_format(format, &tools),
                to_provider_format(format, &tools)
            );
        }
        assert!(to_provider_format(ToolFormat::Gemini, &[]).is_empty());
    }
}
