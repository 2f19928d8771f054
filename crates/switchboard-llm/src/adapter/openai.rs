//! `OpenAI` and Azure `OpenAI` adapter

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::{
    Adapter, EventNormalizer, Translation, check_tool_names, decode_parameters, parse_arguments, parse_json_message,
    unexpected,
};
use crate::client::{Protocol, VendorEvent, VendorRequest, VendorResponse};
use crate::dispatch::Provider;
use crate::error::LlmError;
use crate::mapping::MappingTable;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiLogprobs,
    OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiResponseFormat, OpenAiSampling, OpenAiStreamChunk,
    OpenAiStreamFunctionCall, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Content, ContentPart,
    FinishReason, ImageDetail, LogprobEntry, Message, Role, StreamDelta, StreamEvent, StreamToolCall, StreamUsage,
    TokenLogprob, ToolCall, ToolChoice, ToolDefinition,
};

/// Adapter for the `OpenAI` chat completions protocol
#[derive(Debug, Clone, Copy)]
pub struct OpenAiAdapter {
    provider: Provider,
}

impl OpenAiAdapter {
    /// Adapter for api.openai.com and compatible servers
    pub const fn openai() -> Self {
        Self {
            provider: Provider::OpenAi,
        }
    }

    /// Adapter for Azure `OpenAI` deployments
    pub const fn azure() -> Self {
        Self {
            provider: Provider::AzureOpenAi,
        }
    }
}

impl Adapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn translate(&self, request: &ChatCompletionRequest) -> Result<Translation, LlmError> {
        request.validate()?;

        let (mapped, diagnostics) = self.provider.table().map_parameters(request);
        let sampling: OpenAiSampling = decode_parameters(self.provider, mapped.fields)?;

        let wire = OpenAiRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(to_openai_message)
                .collect::<Result<_, _>>()?,
            sampling,
            stream: request.stream.then_some(true),
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(to_openai_tool).collect()),
            tool_choice: request.tool_choice.as_ref().map(tool_choice_value),
            response_format: response_format(request),
            stream_options: request.stream.then_some(OpenAiStreamOptions { include_usage: true }),
        };

        Ok(Translation {
            request: VendorRequest::OpenAi(wire),
            diagnostics,
        })
    }

    fn parse(
        &self,
        request: &ChatCompletionRequest,
        response: VendorResponse,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let response = match response {
            VendorResponse::OpenAi(response) => response,
            other => return Err(unexpected(Protocol::OpenAi, other.protocol())),
        };

        Ok(self.normalize_response(request, response))
    }

    fn stream_normalizer(&self) -> Box<dyn EventNormalizer> {
        Box::new(OpenAiStreamNormalizer {
            table: self.provider.table(),
        })
    }
}

impl OpenAiAdapter {
    fn normalize_response(&self, request: &ChatCompletionRequest, response: OpenAiResponse) -> ChatCompletionResponse {
        let table = self.provider.table();
        let mut diagnostics = Vec::new();
        let want_logprobs = request.logprobs == Some(true);

        let choices = response
            .choices
            .into_iter()
            .enumerate()
            .map(|(i, choice)| {
                let tool_calls = choice.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|call| {
                            let arguments =
                                parse_arguments(i, &call.function.name, &call.function.arguments, &mut diagnostics);
                            ToolCall::new(call.id, call.function.name, arguments)
                        })
                        .collect::<Vec<_>>()
                });
                if let Some(calls) = &tool_calls {
                    check_tool_names(request, i, calls, &mut diagnostics);
                }

                let text = choice.message.content.unwrap_or_default();
                let json_message = parse_json_message(request, i, &text, &mut diagnostics);

                ChatCompletionChoice {
                    message: AssistantMessage {
                        content: Content::Text(text),
                        name: None,
                        refusal: choice.message.refusal,
                        tool_calls,
                    },
                    finish_reason: choice
                        .finish_reason
                        .as_deref()
                        .map_or(FinishReason::Other, |reason| table.finish_reason(reason)),
                    json_message,
                    logprobs: choice.logprobs.filter(|_| want_logprobs).and_then(logprob_entries),
                    extras: choice
                        .content_filter_results
                        .map(|results| json!({ "content_filter_results": results })),
                }
            })
            .collect();

        let usage = response.usage.as_ref();

        ChatCompletionResponse {
            choices,
            diagnostics,
            completion_tokens: usage.and_then(|u| u.completion_tokens),
            prompt_tokens: usage.and_then(|u| u.prompt_tokens),
            completion_detailed_tokens: usage.and_then(|u| detail_map(u.completion_tokens_details.as_ref())),
            prompt_detailed_tokens: usage.and_then(|u| detail_map(u.prompt_tokens_details.as_ref())),
            cache_read_input_tokens: None,
            cache_creation_input_tokens: None,
            response_duration: 0.0,
            system_fingerprint: response.system_fingerprint,
            extras: response
                .prompt_filter_results
                .map(|results| json!({ "prompt_filter_results": results })),
        }
    }
}

fn to_openai_message(message: &Message) -> Result<OpenAiMessage, LlmError> {
    let mut wire = OpenAiMessage {
        role: message.role().to_string(),
        content: None,
        name: None,
        refusal: None,
        tool_calls: None,
        tool_call_id: None,
    };

    match message {
        Message::System(m) | Message::Developer(m) => {
            wire.content = Some(OpenAiContent::Text(m.content.clone()));
            wire.name.clone_from(&m.name);
        }
        Message::User(m) => {
            wire.content = Some(to_openai_content(&m.content));
            wire.name.clone_from(&m.name);
        }
        Message::Assistant(m) => {
            let has_tool_calls = m.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty());
            if !(m.content.is_empty() && has_tool_calls) {
                wire.content = Some(to_openai_content(&m.content));
            }
            wire.name.clone_from(&m.name);
            wire.refusal.clone_from(&m.refusal);
            wire.tool_calls = m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| OpenAiToolCall {
                        id: call.id.clone(),
                        tool_type: "function".to_owned(),
                        function: OpenAiFunctionCall {
                            name: call.function.name.clone(),
                            arguments: arguments_text(&call.function.arguments),
                        },
                    })
                    .collect()
            });
        }
        Message::Tool(m) => {
            let tool_call_id = m.name.clone().ok_or_else(|| {
                LlmError::Configuration("tool messages need `name` set to the tool_call_id".to_owned())
            })?;
            wire.content = Some(OpenAiContent::Text(m.content.clone()));
            wire.tool_call_id = Some(tool_call_id);
        }
    }

    Ok(wire)
}

fn to_openai_content(content: &Content) -> OpenAiContent {
    match content {
        Content::Text(text) => OpenAiContent::Text(text.clone()),
        Content::Parts(parts) => OpenAiContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => OpenAiContentPart::Text { text: text.clone() },
                    ContentPart::ImageUrl { image_url } => OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl {
                            url: image_url.url.clone(),
                            detail: match image_url.detail {
                                ImageDetail::Auto => None,
                                ImageDetail::Low => Some("low".to_owned()),
                                ImageDetail::High => Some("high".to_owned()),
                            },
                        },
                    },
                })
                .collect(),
        ),
    }
}

/// JSON text of tool arguments; raw strings kept from unparseable replies pass through
fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn to_openai_tool(tool: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        tool_type: tool.tool_type.clone(),
        function: OpenAiFunction {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            parameters: tool.function.parameters.clone(),
            strict: tool.function.strict,
        },
    }
}

fn tool_choice_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Function(name) => json!({
            "type": "function",
            "function": { "name": name }
        }),
        mode => Value::String(mode.to_string()),
    }
}

fn response_format(request: &ChatCompletionRequest) -> Option<OpenAiResponseFormat> {
    if request.json_mode == Some(true) {
        Some(OpenAiResponseFormat::JsonObject)
    } else {
        request
            .structured_outputs
            .as_ref()
            .map(|schema| OpenAiResponseFormat::JsonSchema {
                json_schema: schema.clone(),
            })
    }
}

fn logprob_entries(logprobs: OpenAiLogprobs) -> Option<Vec<LogprobEntry>> {
    logprobs.content.map(|tokens| {
        tokens
            .into_iter()
            .map(|token| {
                if token.top_logprobs.is_empty() {
                    LogprobEntry::Token(TokenLogprob {
                        token: token.token,
                        logprob: token.logprob,
                        bytes: token.bytes,
                    })
                } else {
                    LogprobEntry::Alternatives(
                        token
                            .top_logprobs
                            .into_iter()
                            .map(|alt| TokenLogprob {
                                token: alt.token,
                                logprob: alt.logprob,
                                bytes: alt.bytes,
                            })
                            .collect(),
                    )
                }
            })
            .collect()
    })
}

fn detail_map(details: Option<&BTreeMap<String, Option<u64>>>) -> Option<BTreeMap<String, u64>> {
    details.map(|details| {
        details
            .iter()
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect()
    })
}

fn stream_usage(usage: &OpenAiUsage) -> StreamUsage {
    StreamUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    }
}

/// Splits `OpenAI` chunks so that each event carries at most one tool call
struct OpenAiStreamNormalizer {
    table: &'static MappingTable,
}

impl EventNormalizer for OpenAiStreamNormalizer {
    fn normalize(&mut self, event: VendorEvent) -> Result<Vec<StreamEvent>, LlmError> {
        match event {
            VendorEvent::OpenAi(chunk) => Ok(openai_chunk_to_events(self.table, chunk)),
            other => Err(unexpected(Protocol::OpenAi, other.protocol())),
        }
    }
}

/// Convert an `OpenAI` stream chunk into vendor-neutral stream events
fn openai_chunk_to_events(table: &MappingTable, chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let mut plain = StreamEvent {
        system_fingerprint: chunk.system_fingerprint,
        ..StreamEvent::default()
    };

    for choice in chunk.choices {
        let role = choice.delta.role.as_deref().and_then(|r| r.parse::<Role>().ok());
        let finish_reason = choice
            .finish_reason
            .as_deref()
            .map(|reason| table.finish_reason(reason));
        let logprobs = choice.logprobs.and_then(logprob_entries);

        let tool_calls = choice.delta.tool_calls.unwrap_or_default();
        if tool_calls.is_empty() {
            plain.choices.push(StreamDelta {
                index: choice.index,
                role,
                content: choice.delta.content,
                tool_call: None,
                refusal: choice.delta.refusal,
                finish_reason,
                logprobs,
            });
            continue;
        }

        let last = tool_calls.len() - 1;
        for (k, call) in tool_calls.into_iter().enumerate() {
            let function = call.function.unwrap_or(OpenAiStreamFunctionCall {
                name: None,
                arguments: None,
            });
            events.push(StreamEvent::delta(StreamDelta {
                index: choice.index,
                role: if k == 0 { role } else { None },
                content: None,
                tool_call: Some(StreamToolCall {
                    id: call.id,
                    name: function.name,
                    arguments: function.arguments.unwrap_or_default(),
                }),
                refusal: None,
                finish_reason: if k == last { finish_reason } else { None },
                logprobs: None,
            }));
        }
    }

    plain.usage = chunk.usage.as_ref().map(stream_usage);
    if !plain.choices.is_empty() || plain.usage.is_some() {
        events.push(plain);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use crate::mapping::OPENAI;
    use crate::types::{Stop, ToolMessage};

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            "gpt-4o-mini",
            vec![
                Message::system("Hello, world!"),
                Message::user("What is the capital of France?"),
            ],
        )
    }

    fn wire(translation: Translation) -> OpenAiRequest {
        match translation.request {
            VendorRequest::OpenAi(wire) => wire,
            other => panic!("unexpected request {other:?}"),
        }
    }

    fn weather_tool() -> ToolDefinition {
        ToolDefinition::function(
            "get_current_weather",
            Some("Current weather".to_owned()),
            json!({"type": "object", "properties": {"location": {"type": "string"}}}),
        )
    }

    #[test]
    fn translate_renders_wire_body() {
        let mut req = request();
        req.max_completion_tokens = Some(100);
        req.stop = Some(Stop::One("END".to_owned()));
        req.json_mode = Some(true);

        let body = wire(OpenAiAdapter::openai().translate(&req).unwrap());

        insta::assert_json_snapshot!(body, @r#"
        {
          "model": "gpt-4o-mini",
          "messages": [
            {
              "role": "system",
              "content": "Hello, world!"
            },
            {
              "role": "user",
              "content": "What is the capital of France?"
            }
          ],
          "max_completion_tokens": 100,
          "stop": [
            "END"
          ],
          "response_format": {
            "type": "json_object"
          }
        }
        "#);
    }

    #[test]
    fn translate_forces_named_tool() {
        let mut req = request();
        req.tools = Some(vec![weather_tool()]);
        req.tool_choice = Some(ToolChoice::from("get_current_weather"));

        let wire = wire(OpenAiAdapter::openai().translate(&req).unwrap());

        assert_eq!(
            wire.tool_choice,
            Some(json!({"type": "function", "function": {"name": "get_current_weather"}}))
        );
    }

    #[test]
    fn translate_keys_tool_results_by_call_id() {
        let req = ChatCompletionRequest::new("gpt-4o", vec![Message::user("hi"), Message::tool("call_abc", "20C")]);

        let wire = wire(OpenAiAdapter::azure().translate(&req).unwrap());

        assert_eq!(wire.messages[1].role, "tool");
        assert_eq!(wire.messages[1].tool_call_id.as_deref(), Some("call_abc"));
        assert_eq!(wire.messages[1].name, None);
    }

    #[test]
    fn translate_rejects_tool_result_without_call_id() {
        let req = ChatCompletionRequest::new(
            "gpt-4o",
            vec![
                Message::user("hi"),
                Message::Tool(ToolMessage {
                    content: "20C".to_owned(),
                    name: None,
                }),
            ],
        );

        for adapter in [OpenAiAdapter::openai(), OpenAiAdapter::azure()] {
            let err = adapter.translate(&req).unwrap_err();
            assert!(matches!(err, LlmError::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn translate_structured_outputs_uses_json_schema() {
        let mut req = request();
        req.structured_outputs = Some(json!({"name": "capital", "schema": {"type": "object"}}));

        let wire = wire(OpenAiAdapter::openai().translate(&req).unwrap());

        assert_eq!(
            wire.response_format,
            Some(OpenAiResponseFormat::JsonSchema {
                json_schema: json!({"name": "capital", "schema": {"type": "object"}})
            })
        );
    }

    #[test]
    fn translate_drops_provider_only_knobs() {
        let mut req = request();
        req.top_k = Some(20);
        req.temperature = Some(0.2);

        let translation = OpenAiAdapter::openai().translate(&req).unwrap();

        assert_eq!(
            translation.diagnostics,
            vec![Diagnostic::ParameterDropped {
                provider: "openai".to_owned(),
                parameter: "top_k".to_owned()
            }]
        );
        assert_eq!(wire(translation).sampling.temperature, Some(0.2));
    }

    #[test]
    fn parse_normalizes_choices_and_usage() {
        let mut req = request();
        req.tools = Some(vec![weather_tool()]);

        let body = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "system_fingerprint": "fp_1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "get_current_weather", "arguments": "{\"location\": \"Paris\"}"}},
                        {"id": "call_2", "type": "function", "function": {"name": "book_flight", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls",
                "content_filter_results": {"hate": {"filtered": false}}
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 7,
                "total_tokens": 19,
                "completion_tokens_details": {"reasoning_tokens": 0, "audio_tokens": null}
            }
        });
        let vendor = VendorResponse::from_json(Protocol::OpenAi, body).unwrap();

        let resp = OpenAiAdapter::openai().parse(&req, vendor).unwrap();

        let choice = &resp.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, json!({"location": "Paris"}));
        assert_eq!(
            resp.diagnostics,
            vec![Diagnostic::UnknownTool {
                choice: 0,
                name: "book_flight".to_owned()
            }]
        );
        assert_eq!(resp.completion_tokens, Some(7));
        assert_eq!(resp.prompt_tokens, Some(12));
        assert_eq!(
            resp.completion_detailed_tokens,
            Some(BTreeMap::from([("reasoning_tokens".to_owned(), 0)]))
        );
        assert_eq!(resp.system_fingerprint.as_deref(), Some("fp_1"));
        assert_eq!(
            choice.extras,
            Some(json!({"content_filter_results": {"hate": {"filtered": false}}}))
        );
    }

    #[test]
    fn parse_unknown_finish_reason_is_other() {
        let body = json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "eos_token"}]
        });
        let vendor = VendorResponse::from_json(Protocol::OpenAi, body).unwrap();

        let resp = OpenAiAdapter::openai().parse(&request(), vendor).unwrap();

        assert_eq!(resp.choices[0].finish_reason, FinishReason::Other);
        assert_eq!(resp.completion_tokens, None);
    }

    #[test]
    fn parse_logprobs_with_alternatives() {
        let mut req = request();
        req.logprobs = Some(true);
        req.top_logprobs = Some(2);

        let body = json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Paris"},
                "finish_reason": "stop",
                "logprobs": {"content": [{
                    "token": "Paris", "logprob": -0.01, "bytes": [80, 97, 114, 105, 115],
                    "top_logprobs": [
                        {"token": "Paris", "logprob": -0.01, "bytes": null},
                        {"token": "Lyon", "logprob": -4.6, "bytes": null}
                    ]
                }]}
            }]
        });
        let vendor = VendorResponse::from_json(Protocol::OpenAi, body).unwrap();

        let resp = OpenAiAdapter::openai().parse(&req, vendor).unwrap();

        let logprobs = resp.choices[0].logprobs.as_ref().unwrap();
        match &logprobs[0] {
            LogprobEntry::Alternatives(alternatives) => assert_eq!(alternatives[1].token, "Lyon"),
            other => panic!("expected alternatives, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_foreign_payload() {
        let vendor = VendorResponse::from_json(
            Protocol::Ollama,
            json!({"message": {"role": "assistant", "content": "hi"}, "done": true}),
        )
        .unwrap();

        let err = OpenAiAdapter::openai().parse(&request(), vendor).unwrap_err();
        assert!(matches!(err, LlmError::UnexpectedPayload { .. }));
    }

    #[test]
    fn stream_splits_parallel_tool_calls() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [
                    {"index": 0, "id": "call_a", "type": "function", "function": {"name": "f", "arguments": ""}},
                    {"index": 1, "id": "call_b", "type": "function", "function": {"name": "g", "arguments": ""}}
                ]}
            }]
        }))
        .unwrap();

        let events = openai_chunk_to_events(&OPENAI, chunk);

        assert_eq!(events.len(), 2);
        let ids: Vec<_> = events
            .iter()
            .map(|e| e.choices[0].tool_call.as_ref().and_then(|tc| tc.id.clone()))
            .collect();
        assert_eq!(ids, vec![Some("call_a".to_owned()), Some("call_b".to_owned())]);
    }

    #[test]
    fn stream_usage_only_chunk() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "choices": [],
            "usage": {"prompt_tokens": 5, "completion_tokens": 9, "total_tokens": 14}
        }))
        .unwrap();

        let events = openai_chunk_to_events(&OPENAI, chunk);

        assert_eq!(events, vec![StreamEvent::usage(Some(5), Some(9))]);
    }
}
