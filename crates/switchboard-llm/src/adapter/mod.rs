//! Vendor adapters
//!
//! An adapter translates a canonical request into its vendor's wire format
//! and parses the vendor reply back. Adapters are pure: they never perform
//! I/O and never mutate the caller's request.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::client::{Protocol, VendorEvent, VendorRequest, VendorResponse};
use crate::diagnostics::Diagnostic;
use crate::dispatch::Provider;
use crate::error::LlmError;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, FinishReason, Message, StreamEvent, ToolCall};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

/// Vendor request together with the issues found while building it
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub request: VendorRequest,
    pub diagnostics: Vec<Diagnostic>,
}

/// Translation between the canonical schema and one vendor's wire format
pub trait Adapter: Send + Sync {
    /// Provider served by this adapter
    fn provider(&self) -> Provider;

    /// Build the vendor request for `request`
    ///
    /// Validates the request first; conflicting fields fail here, before any
    /// client call.
    fn translate(&self, request: &ChatCompletionRequest) -> Result<Translation, LlmError>;

    /// Normalize a complete vendor reply
    fn parse(
        &self,
        request: &ChatCompletionRequest,
        response: VendorResponse,
    ) -> Result<ChatCompletionResponse, LlmError>;

    /// Create the per-stream normalizer for vendor events
    fn stream_normalizer(&self) -> Box<dyn EventNormalizer>;
}

/// Converts vendor stream events into vendor-neutral [`StreamEvent`]s
///
/// One normalizer serves exactly one stream; implementations may keep state
/// between events.
pub trait EventNormalizer: Send {
    fn normalize(&mut self, event: VendorEvent) -> Result<Vec<StreamEvent>, LlmError>;
}

/// Error for a client payload that belongs to another vendor
pub(crate) fn unexpected(expected: Protocol, found: Protocol) -> LlmError {
    LlmError::UnexpectedPayload {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Deserialize parameters placed by a mapping table into a typed wire struct
pub(crate) fn decode_parameters<T: DeserializeOwned>(
    provider: Provider,
    values: Map<String, Value>,
) -> Result<T, LlmError> {
    let decoded = serde_json::from_value(Value::Object(values))
        .with_context(|| format!("mapping table for {provider} produced an invalid parameter set"))?;
    Ok(decoded)
}

/// System and developer messages joined into one preamble
pub(crate) fn system_preamble(messages: &[Message]) -> Option<String> {
    let parts: Vec<String> = messages
        .iter()
        .filter(|m| matches!(m, Message::System(_) | Message::Developer(_)))
        .map(Message::text)
        .collect();

    if parts.is_empty() { None } else { Some(parts.join("\n")) }
}

/// Schema inside an `OpenAI`-style `{name, schema}` wrapper, or the value itself
pub(crate) fn unwrap_schema(structured_outputs: &Value) -> Value {
    structured_outputs
        .get("schema")
        .cloned()
        .unwrap_or_else(|| structured_outputs.clone())
}

/// Decode raw tool arguments, keeping the text when it is not JSON
pub(crate) fn parse_arguments(choice: usize, name: &str, raw: &str, diagnostics: &mut Vec<Diagnostic>) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|e| {
        diagnostics.push(Diagnostic::InvalidToolArguments {
            choice,
            name: name.to_owned(),
            error: e.to_string(),
        });
        Value::String(raw.to_owned())
    })
}

/// Record tool calls that name functions the request did not offer
pub(crate) fn check_tool_names(
    request: &ChatCompletionRequest,
    choice: usize,
    calls: &[ToolCall],
    diagnostics: &mut Vec<Diagnostic>,
) {
    for call in calls {
        if !request.offers_tool(&call.function.name) {
            diagnostics.push(Diagnostic::UnknownTool {
                choice,
                name: call.function.name.clone(),
            });
        }
    }
}

/// Parse message text as JSON when the request asked for JSON output
///
/// Blank text, as in a reply carrying only tool calls, is not parsed.
pub(crate) fn parse_json_message(
    request: &ChatCompletionRequest,
    choice: usize,
    text: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Value> {
    if !request.expects_json() || text.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            diagnostics.push(Diagnostic::InvalidJson {
                choice,
                error: e.to_string(),
            });
            None
        }
    }
}

/// Finish reason for vendors that report a plain stop when they call tools
pub(crate) fn finish_with_tools(reason: FinishReason, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls && reason == FinishReason::Stop {
        FinishReason::ToolCalls
    } else {
        reason
    }
}

/// Identifier for a tool call the vendor did not name
pub(crate) fn synthesize_call_id(n: usize) -> String {
    format!("call_{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDefinition;

    #[test]
    fn preamble_joins_system_and_developer() {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::developer("answer in French"),
        ];
        assert_eq!(system_preamble(&messages).as_deref(), Some("be brief\nanswer in French"));
        assert_eq!(system_preamble(&[Message::user("hi")]), None);
    }

    #[test]
    fn invalid_arguments_keep_raw_text() {
        let mut diagnostics = Vec::new();
        let value = parse_arguments(0, "lookup", "{\"q\": ", &mut diagnostics);

        assert_eq!(value, Value::String("{\"q\": ".to_owned()));
        assert!(matches!(diagnostics[0], Diagnostic::InvalidToolArguments { .. }));
    }

    #[test]
    fn empty_arguments_are_empty_object() {
        let mut diagnostics = Vec::new();
        assert_eq!(parse_arguments(0, "f", "", &mut diagnostics), serde_json::json!({}));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unknown_tool_names_are_reported() {
        let mut request = ChatCompletionRequest::new("m", vec![Message::user("hi")]);
        request.tools = Some(vec![ToolDefinition::function(
            "get_current_weather",
            None,
            serde_json::json!({"type": "object"}),
        )]);

        let calls = vec![
            ToolCall::new("a", "get_current_weather", serde_json::json!({})),
            ToolCall::new("b", "launch_rocket", serde_json::json!({})),
        ];
        let mut diagnostics = Vec::new();
        check_tool_names(&request, 2, &calls, &mut diagnostics);

        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnknownTool {
                choice: 2,
                name: "launch_rocket".to_owned()
            }]
        );
    }

    #[test]
    fn json_message_failure_is_diagnostic() {
        let mut request = ChatCompletionRequest::new("m", vec![Message::user("hi")]);
        request.json_mode = Some(true);
        let mut diagnostics = Vec::new();

        assert_eq!(
            parse_json_message(&request, 0, "{\"a\": 1}", &mut diagnostics),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(parse_json_message(&request, 0, "Sure! {\"a\": 1}", &mut diagnostics), None);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn blank_json_message_is_skipped() {
        let mut request = ChatCompletionRequest::new("m", vec![Message::user("hi")]);
        request.json_mode = Some(true);
        let mut diagnostics = Vec::new();

        assert_eq!(parse_json_message(&request, 0, "", &mut diagnostics), None);
        assert_eq!(parse_json_message(&request, 0, " \n", &mut diagnostics), None);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn schema_wrapper_is_unwrapped() {
        let wrapped = serde_json::json!({"name": "city", "schema": {"type": "object"}});
        assert_eq!(unwrap_schema(&wrapped), serde_json::json!({"type": "object"}));

        let bare = serde_json::json!({"type": "object"});
        assert_eq!(unwrap_schema(&bare), bare);
    }
}
