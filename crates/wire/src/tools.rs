//! Tool declaration schema and the structured tool result payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A callable tool as declared to the remote model in `session.update`.
#[derive(Serialize, Debug, Clone)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self {
            kind: "function".into(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A JSON-schema object describing a tool's parameters.
#[derive(Serialize, Debug, Clone)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn object(
        properties: impl IntoIterator<Item = (&'static str, PropertySchema)>,
        required: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            kind: "object".into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            required: required.into_iter().map(str::to_string).collect(),
        }
    }
}

/// One named property inside a [`ParameterSchema`].
#[derive(Serialize, Debug, Clone)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element schema for `array` properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested fields for `object` properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl PropertySchema {
    fn leaf(kind: &str, description: &str) -> Self {
        Self {
            kind: kind.into(),
            description: Some(description.into()),
            items: None,
            properties: None,
            required: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::leaf("string", description)
    }

    pub fn number(description: &str) -> Self {
        Self::leaf("number", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::leaf("boolean", description)
    }

    pub fn array(description: &str, items: PropertySchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::leaf("array", description)
        }
    }

    pub fn object(
        description: &str,
        properties: impl IntoIterator<Item = (&'static str, PropertySchema)>,
        required: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            properties: Some(
                properties
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            ),
            required: Some(required.into_iter().map(str::to_string).collect()),
            ..Self::leaf("object", description)
        }
    }
}

/// The structured success/failure payload a tool handler produces, serialized
/// into the `function_call_output` event's `output` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_follows_json_schema_convention() {
        let declaration = ToolDefinition::function(
            "show_route",
            "Display a driving route on the map.",
            ParameterSchema::object(
                [
                    (
                        "origin",
                        PropertySchema::object(
                            "Starting point",
                            [
                                ("lat", PropertySchema::number("Latitude")),
                                ("lng", PropertySchema::number("Longitude")),
                            ],
                            ["lat", "lng"],
                        ),
                    ),
                    ("label", PropertySchema::string("Display label")),
                ],
                ["origin"],
            ),
        );
        let json = serde_json::to_value(&declaration).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "show_route");
        assert_eq!(json["parameters"]["type"], "object");
        assert_eq!(json["parameters"]["required"][0], "origin");
        assert_eq!(
            json["parameters"]["properties"]["origin"]["properties"]["lat"]["type"],
            "number"
        );
    }

    #[test]
    fn tool_result_round_trips_through_output_field() {
        let result = ToolResult::ok("Route displayed");
        let output = serde_json::to_string(&result).unwrap();
        let parsed: ToolResult = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, result);
    }
}
