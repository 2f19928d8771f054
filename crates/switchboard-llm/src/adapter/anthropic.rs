//! Anthropic Messages adapter

use serde_json::{Value, json};

use super::{
    Adapter, EventNormalizer, Translation, check_tool_names, decode_parameters, parse_json_message, system_preamble,
    unexpected,
};
use crate::client::{Protocol, VendorEvent, VendorRequest, VendorResponse};
use crate::diagnostics::Diagnostic;
use crate::dispatch::Provider;
use crate::error::LlmError;
use crate::mapping::ANTHROPIC;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicSampling, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice,
};
use crate::types::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Content, ContentPart,
    FinishReason, Message, Role, StreamDelta, StreamEvent, ToolCall, ToolChoice, ToolDefinition,
};

/// `max_tokens` sent when the request leaves it unset; Anthropic requires the field
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic Messages protocol
#[derive(Debug, Clone, Copy)]
pub struct AnthropicAdapter {
    default_max_tokens: u32,
}

impl AnthropicAdapter {
    pub const fn new(default_max_tokens: u32) -> Self {
        Self { default_max_tokens }
    }
}

impl Default for AnthropicAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl Adapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn translate(&self, request: &ChatCompletionRequest) -> Result<Translation, LlmError> {
        request.validate()?;

        let (mut mapped, mut diagnostics) = ANTHROPIC.map_parameters(request);
        let max_tokens = mapped
            .fields
            .remove("max_tokens")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.default_max_tokens);
        let sampling: AnthropicSampling = decode_parameters(Provider::Anthropic, mapped.fields)?;

        if let Some(format) = requested_format(request) {
            diagnostics.push(Diagnostic::ResponseFormatUnsupported {
                provider: ANTHROPIC.name.to_owned(),
                format: format.to_owned(),
            });
        }

        let wire = AnthropicRequest {
            model: request.model.clone(),
            max_tokens,
            system: system_preamble(&request.messages),
            messages: to_anthropic_messages(&request.messages)?,
            sampling,
            stream: request.stream.then_some(true),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(to_anthropic_tool).collect()),
            tool_choice: tool_choice(request.tool_choice.as_ref(), request.parallel_tool_calls),
        };

        Ok(Translation {
            request: VendorRequest::Anthropic(wire),
            diagnostics,
        })
    }

    fn parse(
        &self,
        request: &ChatCompletionRequest,
        response: VendorResponse,
    ) -> Result<ChatCompletionResponse, LlmError> {
        match response {
            VendorResponse::Anthropic(response) => Ok(normalize_response(request, response)),
            other => Err(unexpected(Protocol::Anthropic, other.protocol())),
        }
    }

    fn stream_normalizer(&self) -> Box<dyn EventNormalizer> {
        Box::new(AnthropicStreamNormalizer::default())
    }
}

fn requested_format(request: &ChatCompletionRequest) -> Option<&'static str> {
    if request.json_mode == Some(true) {
        Some("json_object")
    } else if request.structured_outputs.is_some() {
        Some("json_schema")
    } else {
        None
    }
}

/// Non-system messages in Anthropic's alternating shape
///
/// Consecutive tool results are merged into one user turn.
fn to_anthropic_messages(messages: &[Message]) -> Result<Vec<AnthropicMessage>, LlmError> {
    let mut wire: Vec<AnthropicMessage> = Vec::new();

    for message in messages {
        match message {
            Message::System(_) | Message::Developer(_) => {}
            Message::User(m) => wire.push(AnthropicMessage {
                role: "user".to_owned(),
                content: to_anthropic_content(&m.content),
            }),
            Message::Assistant(m) => wire.push(assistant_message(m)),
            Message::Tool(m) => {
                let tool_use_id = m.name.clone().ok_or_else(|| {
                    LlmError::Configuration("tool messages need `name` set to the tool_use id".to_owned())
                })?;
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id,
                    content: Some(m.content.clone()),
                    is_error: None,
                };

                match wire.last_mut() {
                    Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(blocks),
                    }) if role == "user"
                        && blocks
                            .iter()
                            .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        blocks.push(block);
                    }
                    _ => wire.push(AnthropicMessage {
                        role: "user".to_owned(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
        }
    }

    Ok(wire)
}

fn assistant_message(message: &AssistantMessage) -> AnthropicMessage {
    let Some(calls) = message.tool_calls.as_ref().filter(|calls| !calls.is_empty()) else {
        return AnthropicMessage {
            role: Role::Assistant.to_string(),
            content: to_anthropic_content(&message.content),
        };
    };

    let mut blocks = Vec::with_capacity(calls.len() + 1);
    let text = message.content.as_text();
    if !text.is_empty() {
        blocks.push(AnthropicContentBlock::Text { text });
    }
    blocks.extend(calls.iter().map(|call| AnthropicContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input: tool_input(&call.function.arguments),
    }));

    AnthropicMessage {
        role: Role::Assistant.to_string(),
        content: AnthropicContent::Blocks(blocks),
    }
}

/// Tool input object; raw argument text kept from an unparseable reply is re-read or replaced by `{}`
fn tool_input(arguments: &Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| json!({})),
        other => other.clone(),
    }
}

fn to_anthropic_content(content: &Content) -> AnthropicContent {
    match content {
        Content::Text(text) => AnthropicContent::Text(text.clone()),
        Content::Parts(parts) => AnthropicContent::Blocks(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
                    ContentPart::ImageUrl { image_url } => {
                        let source = match image_url.as_data_uri() {
                            Some((media_type, data)) => AnthropicImageSource::Base64 {
                                media_type: media_type.to_owned(),
                                data: data.to_owned(),
                            },
                            None => AnthropicImageSource::Url {
                                url: image_url.url.clone(),
                            },
                        };
                        AnthropicContentBlock::Image { source }
                    }
                })
                .collect(),
        ),
    }
}

fn to_anthropic_tool(tool: &ToolDefinition) -> AnthropicTool {
    AnthropicTool {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema: tool
            .function
            .parameters
            .clone()
            .unwrap_or_else(|| json!({"type": "object"})),
    }
}

/// Anthropic tool choice, folding `parallel_tool_calls` into `disable_parallel_tool_use`
fn tool_choice(choice: Option<&ToolChoice>, parallel_tool_calls: Option<bool>) -> Option<AnthropicToolChoice> {
    let disable_parallel_tool_use = (parallel_tool_calls == Some(false)).then_some(true);

    match choice {
        None => disable_parallel_tool_use.map(|_| AnthropicToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        Some(ToolChoice::Auto) => Some(AnthropicToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        Some(ToolChoice::Required) => Some(AnthropicToolChoice::Any {
            disable_parallel_tool_use,
        }),
        Some(ToolChoice::None) => Some(AnthropicToolChoice::None),
        Some(ToolChoice::Function(name)) => Some(AnthropicToolChoice::Tool {
            name: name.clone(),
            disable_parallel_tool_use,
        }),
    }
}

fn normalize_response(request: &ChatCompletionRequest, response: AnthropicResponse) -> ChatCompletionResponse {
    let mut diagnostics = Vec::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicResponseBlock::Text { text: fragment } => text.push_str(&fragment),
            AnthropicResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall::new(id, name, input)),
            AnthropicResponseBlock::Other => {}
        }
    }

    check_tool_names(request, 0, &tool_calls, &mut diagnostics);
    let json_message = parse_json_message(request, 0, &text, &mut diagnostics);

    let choice = ChatCompletionChoice {
        message: AssistantMessage {
            content: Content::Text(text),
            name: None,
            refusal: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        },
        finish_reason: response
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Stop, |reason| ANTHROPIC.finish_reason(reason)),
        json_message,
        logprobs: None,
        extras: response
            .stop_sequence
            .map(|sequence| json!({ "stop_sequence": sequence })),
    };

    ChatCompletionResponse {
        choices: vec![choice],
        diagnostics,
        completion_tokens: response.usage.output_tokens,
        prompt_tokens: response.usage.input_tokens,
        cache_read_input_tokens: response.usage.cache_read_input_tokens,
        cache_creation_input_tokens: response.usage.cache_creation_input_tokens,
        ..ChatCompletionResponse::default()
    }
}

/// Tracks token counters across Anthropic's typed stream events
#[derive(Debug, Default)]
struct AnthropicStreamNormalizer {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl EventNormalizer for AnthropicStreamNormalizer {
    fn normalize(&mut self, event: VendorEvent) -> Result<Vec<StreamEvent>, LlmError> {
        match event {
            VendorEvent::Anthropic(event) => self.convert_event(event),
            other => Err(unexpected(Protocol::Anthropic, other.protocol())),
        }
    }
}

impl AnthropicStreamNormalizer {
    fn convert_event(&mut self, event: AnthropicStreamEvent) -> Result<Vec<StreamEvent>, LlmError> {
        let events = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.prompt_tokens = usage.input_tokens.or(self.prompt_tokens);
                    self.completion_tokens = usage.output_tokens.or(self.completion_tokens);
                }
                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::Text { text } => vec![StreamEvent::delta(StreamDelta {
                    role: Some(Role::Assistant),
                    content: Some(text),
                    ..StreamDelta::default()
                })],
                AnthropicStreamContentBlock::ToolUse { id, name, input } => {
                    vec![StreamEvent::delta(StreamDelta::tool_call(
                        Some(id),
                        Some(name),
                        initial_arguments(&input),
                    ))]
                }
                AnthropicStreamContentBlock::Other => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![StreamEvent::delta(StreamDelta::text(text))],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    vec![StreamEvent::delta(StreamDelta::tool_call(None, None, partial_json))]
                }
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.prompt_tokens = usage.input_tokens.or(self.prompt_tokens);
                    self.completion_tokens = usage.output_tokens.or(self.completion_tokens);
                }
                delta
                    .stop_reason
                    .as_deref()
                    .map(|reason| StreamEvent::delta(StreamDelta::finish(ANTHROPIC.finish_reason(reason))))
                    .into_iter()
                    .collect()
            }

            AnthropicStreamEvent::MessageStop => {
                vec![StreamEvent::usage(self.prompt_tokens, self.completion_tokens)]
            }

            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Error { error } => {
                return Err(LlmError::Vendor(anyhow::anyhow!(
                    "anthropic stream error ({}): {}",
                    error.error_type,
                    error.message
                )));
            }
        };

        Ok(events)
    }
}

/// Arguments carried on `content_block_start`; the usual `{}` placeholder is left to the deltas
fn initial_arguments(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}
