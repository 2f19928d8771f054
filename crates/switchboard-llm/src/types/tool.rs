use std::fmt;

use serde::{Deserialize, Serialize};

/// A tool/function call requested by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call (empty when the vendor assigns none)
    pub id: String,
    /// Function name and arguments
    pub function: Function,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            function: Function {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Function name and structured arguments within a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Parsed arguments
    ///
    /// Normally a JSON object. When a vendor returns arguments that are not
    /// valid JSON the raw text is kept as a JSON string and a diagnostic is
    /// recorded on the response.
    pub arguments: serde_json::Value,
}

/// Tool call as seen mid-stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialToolCall {
    /// Tool call ID, absent on vendors that never assign one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    pub function: PartialFunction,
}

/// Function data within a streamed tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFunction {
    /// Function name
    pub name: String,
    /// Argument fragment or complete argument object
    pub arguments: PartialArguments,
}

/// Arguments of a streamed tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartialArguments {
    /// Incremental JSON text; concatenate fragments sharing a tool call ID
    Fragment(String),
    /// Complete argument object
    Object(serde_json::Map<String, serde_json::Value>),
}

impl PartialArguments {
    /// Text form of the arguments, serializing complete objects
    pub fn to_fragment(&self) -> String {
        match self {
            Self::Fragment(text) => text.clone(),
            Self::Object(map) => serde_json::Value::Object(map.clone()).to_string(),
        }
    }
}

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (currently always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function specification
    pub function: FunctionDefinition,
}

fn function_type() -> String {
    "function".to_owned()
}

impl ToolDefinition {
    /// Define a function tool
    pub fn function(name: impl Into<String>, description: Option<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description,
                parameters: Some(parameters),
                strict: None,
            },
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Specification of a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the function parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Strict schema adherence (`OpenAI` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// How the model should select tools
///
/// Serialized as a plain string: `"auto"`, `"none"`, `"required"` (`"any"` is
/// accepted as an alias), or the name of a function to force.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model will not call any tools
    None,
    /// Model must call at least one tool
    Required,
    /// Model must call the named function
    Function(String),
}

impl From<&str> for ToolChoice {
    fn from(value: &str) -> Self {
        match value {
            "auto" => Self::Auto,
            "none" => Self::None,
            "required" | "any" => Self::Required,
            name => Self::Function(name.to_owned()),
        }
    }
}

impl From<String> for ToolChoice {
    fn from(value: String) -> Self {
        match value.as_str() {
            "auto" | "none" | "required" | "any" => Self::from(value.as_str()),
            _ => Self::Function(value),
        }
    }
}

impl From<ToolChoice> for String {
    fn from(choice: ToolChoice) -> Self {
        choice.to_string()
    }
}

impl fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::None => f.write_str("none"),
            Self::Required => f.write_str("required"),
            Self::Function(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_strings() {
        assert_eq!(ToolChoice::from("auto"), ToolChoice::Auto);
        assert_eq!(ToolChoice::from("any"), ToolChoice::Required);
        assert_eq!(
            ToolChoice::from("get_current_weather"),
            ToolChoice::Function("get_current_weather".to_owned())
        );

        let parsed: ToolChoice = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, ToolChoice::None);
        assert_eq!(serde_json::to_string(&ToolChoice::Required).unwrap(), "\"required\"");
    }

    #[test]
    fn partial_arguments_accept_fragments_and_objects() {
        let fragment: PartialArguments = serde_json::from_str("\"{\\\"loc\"").unwrap();
        assert_eq!(fragment.to_fragment(), "{\"loc");

        let object: PartialArguments = serde_json::from_str("{\"loc\": \"Boston\"}").unwrap();
        assert_eq!(object.to_fragment(), "{\"loc\":\"Boston\"}");
    }
}
