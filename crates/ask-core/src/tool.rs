use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::result::Results;

type ToolFn = dyn Fn(&str) -> String + Send + Sync;

/// A caller-supplied function the model may invoke.
///
/// The function receives the model's JSON-encoded arguments verbatim and
/// returns the text handed back to the model. Failures are reported in that
/// text; there is no error channel.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Option<ToolParameters>,
    function: Arc<ToolFn>,
}

impl Tool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, function: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
            function: Arc::new(function),
        }
    }

    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn call(&self, arguments: &str) -> String {
        (self.function)(arguments)
    }

    /// Shared handle to the function, for running it off the async runtime.
    pub(crate) fn function(&self) -> Arc<ToolFn> {
        Arc::clone(&self.function)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Build from a JSON Schema object such as `{"type": "object", ...}`.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested fields when `schema_type` is `object`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, PropertySchema>>,
}

impl PropertySchema {
    fn typed(schema_type: &str, description: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
            properties: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::typed("number", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array", description)
        }
    }

    pub fn object(
        description: impl Into<String>,
        properties: HashMap<String, PropertySchema>,
    ) -> Self {
        Self {
            properties: Some(properties),
            ..Self::typed("object", description)
        }
    }

    pub fn enum_string(description: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::typed("string", description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallEntry {
    pub call_id: String,
    pub function_name: String,
    pub arguments: String,
}

/// Function calls requested in one round, in the order the model made them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionCallInput(pub Vec<FunctionCallEntry>);

impl FunctionCallInput {
    pub fn from_results(results: &Results) -> Self {
        Self(
            results
                .function_calls()
                .map(|call| FunctionCallEntry {
                    call_id: call.call_id.clone(),
                    function_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FunctionCallEntry> {
        self.0.iter()
    }
}

/// What a tool returned for one function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub call_id: String,
    pub name: String,
    pub output: String,
}

impl ToolOutput {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{AgentResult, FunctionCall};

    #[test]
    fn test_tool_call() {
        let tool = Tool::new("echo", "Echo the arguments", |args: &str| format!("got {}", args))
            .with_parameters(
                ToolParameters::new()
                    .add_property("text", PropertySchema::string("Text to echo"), true),
            );

        assert_eq!(tool.call(r#"{"text":"hi"}"#), r#"got {"text":"hi"}"#);
        let params = tool.parameters.as_ref().unwrap();
        assert!(params.required.contains(&"text".to_string()));

        let copy = tool.clone();
        assert_eq!(copy.call("x"), "got x");
    }

    #[test]
    fn test_property_schema() {
        let schema = PropertySchema::string("A test string");
        assert_eq!(schema.schema_type, "string");

        let enum_schema = PropertySchema::enum_string(
            "Temperature unit",
            vec!["celsius".to_string(), "fahrenheit".to_string()],
        );
        assert_eq!(enum_schema.enum_values.as_ref().unwrap().len(), 2);

        let list = PropertySchema::array("Cities", PropertySchema::string("City"));
        assert_eq!(list.items.unwrap().schema_type, "string");
    }

    #[test]
    fn test_parameters_from_value() {
        let params = ToolParameters::from_value(serde_json::json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City name"},
                "days": {"type": "integer", "default": 3}
            },
            "required": ["location"]
        }))
        .unwrap();

        assert_eq!(params.schema_type, "object");
        assert_eq!(params.required, vec!["location"]);
        assert_eq!(params.properties["days"].default, Some(serde_json::json!(3)));

        assert!(ToolParameters::from_value(serde_json::json!({"properties": 5})).is_err());
    }

    #[test]
    fn test_function_call_input_preserves_order() {
        let results = Results::from(vec![
            AgentResult::FunctionCall(FunctionCall::new("c1", "getWeather", r#"{"city":"Tokyo"}"#)),
            AgentResult::Message("between".into()),
            AgentResult::FunctionCall(FunctionCall::new("c2", "currentTime", "{}")),
        ]);

        let input = FunctionCallInput::from_results(&results);
        assert_eq!(input.len(), 2);
        assert_eq!(input.0[0].function_name, "getWeather");
        assert_eq!(input.0[0].arguments, r#"{"city":"Tokyo"}"#);
        assert_eq!(input.0[1].call_id, "c2");
    }
}
