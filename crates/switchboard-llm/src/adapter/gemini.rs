//! Gemini `generateContent` adapter

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::{
    Adapter, EventNormalizer, Translation, check_tool_names, decode_parameters, finish_with_tools, parse_json_message,
    synthesize_call_id, system_preamble, unexpected, unwrap_schema,
};
use crate::client::{Protocol, VendorEvent, VendorRequest, VendorResponse};
use crate::diagnostics::Diagnostic;
use crate::dispatch::Provider;
use crate::error::LlmError;
use crate::mapping::GEMINI;
use crate::protocol::gemini::{
    GeminiAutomaticFunctionCalling, GeminiCandidate, GeminiContent, GeminiFunctionCall, GeminiFunctionCallingConfig,
    GeminiFunctionDeclaration, GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiLogprobsResult,
    GeminiPart, GeminiRequest, GeminiResponse, GeminiStreamChunk, GeminiTool, GeminiToolConfig, GeminiUsageMetadata,
};
use crate::types::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Content, ContentPart,
    FinishReason, LogprobEntry, Message, Role, StreamDelta, StreamEvent, StreamToolCall, TokenLogprob, ToolCall,
    ToolChoice,
};

const JSON_MIME_TYPE: &str = "application/json";

/// Adapter for the Gemini `generateContent` protocol
#[derive(Debug, Clone, Copy)]
pub struct GeminiAdapter {
    disable_automatic_function_calling: bool,
}

impl GeminiAdapter {
    pub const fn new(disable_automatic_function_calling: bool) -> Self {
        Self {
            disable_automatic_function_calling,
        }
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Adapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn translate(&self, request: &ChatCompletionRequest) -> Result<Translation, LlmError> {
        request.validate()?;

        let (mapped, mut diagnostics) = GEMINI.map_parameters(request);
        let mut generation_config: GeminiGenerationConfig = decode_parameters(Provider::Gemini, mapped.grouped)?;

        if request.json_mode == Some(true) {
            generation_config.response_mime_type = Some(JSON_MIME_TYPE.to_owned());
        } else if let Some(schema) = &request.structured_outputs {
            generation_config.response_mime_type = Some(JSON_MIME_TYPE.to_owned());
            generation_config.response_schema = Some(unwrap_schema(schema));
        }

        let wire = GeminiRequest {
            model: request.model.clone(),
            stream: request.stream,
            contents: to_gemini_contents(&request.messages, &mut diagnostics)?,
            system_instruction: system_preamble(&request.messages).map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(text)],
            }),
            generation_config: (generation_config != GeminiGenerationConfig::default()).then_some(generation_config),
            tools: request.tools.as_ref().map(|tools| {
                vec![GeminiTool {
                    function_declarations: tools
                        .iter()
                        .map(|tool| GeminiFunctionDeclaration {
                            name: tool.function.name.clone(),
                            description: tool.function.description.clone(),
                            parameters: tool.function.parameters.clone(),
                        })
                        .collect(),
                }]
            }),
            tool_config: request.tool_choice.as_ref().map(tool_config),
            automatic_function_calling: self
                .disable_automatic_function_calling
                .then_some(GeminiAutomaticFunctionCalling { disable: true }),
        };

        Ok(Translation {
            request: VendorRequest::Gemini(wire),
            diagnostics,
        })
    }

    fn parse(
        &self,
        request: &ChatCompletionRequest,
        response: VendorResponse,
    ) -> Result<ChatCompletionResponse, LlmError> {
        match response {
            VendorResponse::Gemini(response) => Ok(normalize_response(request, response)),
            other => Err(unexpected(Protocol::Gemini, other.protocol())),
        }
    }

    fn stream_normalizer(&self) -> Box<dyn EventNormalizer> {
        Box::new(GeminiStreamNormalizer::default())
    }
}

/// Conversation turns with `user`/`model` roles
///
/// Function responses following each other are merged into one turn, the
/// shape Gemini expects after parallel function calls.
fn to_gemini_contents(messages: &[Message], diagnostics: &mut Vec<Diagnostic>) -> Result<Vec<GeminiContent>, LlmError> {
    let mut contents: Vec<GeminiContent> = Vec::new();

    for (position, message) in messages.iter().enumerate() {
        match message {
            Message::System(_) | Message::Developer(_) => {}
            Message::User(m) => contents.push(GeminiContent {
                role: Some("user".to_owned()),
                parts: non_empty(to_gemini_parts(&m.content, position, diagnostics)),
            }),
            Message::Assistant(m) => {
                let mut parts = to_gemini_parts(&m.content, position, diagnostics);
                parts.extend(m.tool_calls.iter().flatten().map(|call| GeminiPart {
                    function_call: Some(GeminiFunctionCall {
                        id: None,
                        name: call.function.name.clone(),
                        args: call.function.arguments.clone(),
                    }),
                    ..GeminiPart::default()
                }));
                contents.push(GeminiContent {
                    role: Some("model".to_owned()),
                    parts: non_empty(parts),
                });
            }
            Message::Tool(m) => {
                let key = m.name.as_deref().ok_or_else(|| {
                    LlmError::Configuration("tool messages need `name` set to the call id or function name".to_owned())
                })?;
                let part = GeminiPart {
                    function_response: Some(GeminiFunctionResponse {
                        name: function_name(&messages[..position], key).to_owned(),
                        response: json!({ "result": m.content }),
                    }),
                    ..GeminiPart::default()
                };

                match contents.last_mut() {
                    Some(last)
                        if last.role.as_deref() == Some("user")
                            && last.parts.iter().all(|p| p.function_response.is_some()) =>
                    {
                        last.parts.push(part);
                    }
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_owned()),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    Ok(contents)
}

/// Function name for a tool result keyed by `key`
///
/// Gemini keys function responses by name. A key matching an earlier
/// assistant tool-call id resolves to that call's function; any other key is
/// taken to be the function name itself.
fn function_name<'a>(history: &'a [Message], key: &'a str) -> &'a str {
    history
        .iter()
        .rev()
        .filter_map(|message| match message {
            Message::Assistant(m) => m.tool_calls.as_ref(),
            _ => None,
        })
        .flatten()
        .find(|call| call.id == key)
        .map_or(key, |call| call.function.name.as_str())
}

fn to_gemini_parts(content: &Content, position: usize, diagnostics: &mut Vec<Diagnostic>) -> Vec<GeminiPart> {
    match content {
        Content::Text(text) if text.is_empty() => Vec::new(),
        Content::Text(text) => vec![GeminiPart::text(text.clone())],
        Content::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(GeminiPart::text(text.clone())),
                ContentPart::ImageUrl { image_url } => {
                    if let Some((mime_type, data)) = image_url.as_data_uri() {
                        Some(GeminiPart {
                            inline_data: Some(GeminiInlineData {
                                mime_type: mime_type.to_owned(),
                                data: data.to_owned(),
                            }),
                            ..GeminiPart::default()
                        })
                    } else {
                        diagnostics.push(Diagnostic::ImageSkipped {
                            provider: GEMINI.name.to_owned(),
                            message: position,
                            reason: "only base64 data URLs can be sent inline".to_owned(),
                        });
                        None
                    }
                }
            })
            .collect(),
    }
}

/// Gemini rejects turns without parts
fn non_empty(parts: Vec<GeminiPart>) -> Vec<GeminiPart> {
    if parts.is_empty() { vec![GeminiPart::text("")] } else { parts }
}

fn tool_config(choice: &ToolChoice) -> GeminiToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Function(name) => ("ANY", Some(vec![name.clone()])),
    };

    GeminiToolConfig {
        function_calling_config: GeminiFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names,
        },
    }
}

fn normalize_response(request: &ChatCompletionRequest, response: GeminiResponse) -> ChatCompletionResponse {
    let mut diagnostics = Vec::new();
    let mut calls_seen = 0;
    let want_logprobs = request.logprobs == Some(true);

    let choices = response
        .candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let GeminiCandidate {
                content,
                finish_reason,
                logprobs_result,
                safety_ratings,
                ..
            } = candidate;
            let (text, tool_calls) = split_parts(content.parts, &mut calls_seen);

            check_tool_names(request, i, &tool_calls, &mut diagnostics);
            let json_message = parse_json_message(request, i, &text, &mut diagnostics);
            let finish_reason = finish_reason
                .as_deref()
                .map_or(FinishReason::Other, |reason| GEMINI.finish_reason(reason));
            let has_tool_calls = !tool_calls.is_empty();

            ChatCompletionChoice {
                message: AssistantMessage {
                    content: Content::Text(text),
                    name: None,
                    refusal: None,
                    tool_calls: has_tool_calls.then_some(tool_calls),
                },
                finish_reason: finish_with_tools(finish_reason, has_tool_calls),
                json_message,
                logprobs: logprobs_result.filter(|_| want_logprobs).map(logprob_entries),
                extras: safety_ratings.map(|ratings| json!({ "safety_ratings": ratings })),
            }
        })
        .collect();

    let usage = response.usage_metadata.unwrap_or_default();
    let mut extras = Map::new();
    if let Some(feedback) = response.prompt_feedback {
        extras.insert("prompt_feedback".to_owned(), feedback);
    }
    if let Some(version) = response.model_version {
        extras.insert("model_version".to_owned(), Value::String(version));
    }

    ChatCompletionResponse {
        choices,
        diagnostics,
        completion_tokens: completion_tokens(&usage),
        prompt_tokens: usage.prompt_token_count,
        completion_detailed_tokens: usage
            .thoughts_token_count
            .map(|n| BTreeMap::from([("reasoning_tokens".to_owned(), u64::from(n))])),
        prompt_detailed_tokens: usage
            .cached_content_token_count
            .map(|n| BTreeMap::from([("cached_tokens".to_owned(), u64::from(n))])),
        extras: (!extras.is_empty()).then_some(Value::Object(extras)),
        ..ChatCompletionResponse::default()
    }
}

/// Visible text and function calls of a candidate; thought parts are left out
fn split_parts(parts: Vec<GeminiPart>, calls_seen: &mut usize) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall::new(call_id(call.id, calls_seen), call.name, call.args));
        }
    }

    (text, tool_calls)
}

fn call_id(vendor_id: Option<String>, calls_seen: &mut usize) -> String {
    let id = vendor_id.unwrap_or_else(|| synthesize_call_id(*calls_seen));
    *calls_seen += 1;
    id
}

/// Generated tokens including reasoning tokens
fn completion_tokens(usage: &GeminiUsageMetadata) -> Option<u32> {
    match (usage.candidates_token_count, usage.thoughts_token_count) {
        (None, None) => None,
        (candidates, thoughts) => Some(candidates.unwrap_or(0) + thoughts.unwrap_or(0)),
    }
}

fn logprob_entries(result: GeminiLogprobsResult) -> Vec<LogprobEntry> {
    if result.top_candidates.is_empty() {
        return result
            .chosen_candidates
            .into_iter()
            .map(|c| {
                LogprobEntry::Token(TokenLogprob {
                    token: c.token,
                    logprob: c.log_probability,
                    bytes: None,
                })
            })
            .collect();
    }

    result
        .top_candidates
        .into_iter()
        .map(|position| {
            LogprobEntry::Alternatives(
                position
                    .candidates
                    .into_iter()
                    .map(|c| TokenLogprob {
                        token: c.token,
                        logprob: c.log_probability,
                        bytes: None,
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Gemini streams complete parts; each function call becomes a start event
#[derive(Debug, Default)]
struct GeminiStreamNormalizer {
    calls_seen: usize,
    called_tools: bool,
}

impl EventNormalizer for GeminiStreamNormalizer {
    fn normalize(&mut self, event: VendorEvent) -> Result<Vec<StreamEvent>, LlmError> {
        match event {
            VendorEvent::Gemini(chunk) => Ok(self.convert_chunk(chunk)),
            other => Err(unexpected(Protocol::Gemini, other.protocol())),
        }
    }
}

impl GeminiStreamNormalizer {
    fn convert_chunk(&mut self, chunk: GeminiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut finished = false;

        for (position, candidate) in chunk.candidates.into_iter().enumerate() {
            let index = candidate
                .index
                .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
            let logprobs = candidate.logprobs_result.map(logprob_entries);
            let (text, tool_calls) = split_parts(candidate.content.parts, &mut self.calls_seen);

            if !text.is_empty() || logprobs.is_some() {
                events.push(StreamEvent::delta(StreamDelta {
                    index,
                    role: Some(Role::Assistant),
                    content: Some(text),
                    logprobs,
                    ..StreamDelta::default()
                }));
            }

            for call in tool_calls {
                self.called_tools = true;
                events.push(StreamEvent::delta(StreamDelta {
                    index,
                    tool_call: Some(StreamToolCall {
                        id: Some(call.id),
                        name: Some(call.function.name),
                        arguments: call.function.arguments.to_string(),
                    }),
                    ..StreamDelta::default()
                }));
            }

            if let Some(reason) = candidate.finish_reason.as_deref() {
                finished = true;
                events.push(StreamEvent::delta(StreamDelta {
                    index,
                    finish_reason: Some(finish_with_tools(GEMINI.finish_reason(reason), self.called_tools)),
                    ..StreamDelta::default()
                }));
            }
        }

        if finished && let Some(usage) = chunk.usage_metadata {
            events.push(StreamEvent::usage(usage.prompt_token_count, completion_tokens(&usage)));
        }

        events
    }
}
