//! Ollama `/api/chat` adapter

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use super::{
    Adapter, EventNormalizer, Translation, check_tool_names, decode_parameters, finish_with_tools, parse_arguments,
    parse_json_message, synthesize_call_id, unexpected, unwrap_schema,
};
use crate::client::{Protocol, VendorEvent, VendorRequest, VendorResponse};
use crate::diagnostics::Diagnostic;
use crate::dispatch::Provider;
use crate::error::LlmError;
use crate::mapping::OLLAMA;
use crate::protocol::ollama::{
    OllamaFunction, OllamaFunctionCall, OllamaMessage, OllamaOptions, OllamaRequest, OllamaResponse,
    OllamaStreamChunk, OllamaTool, OllamaToolCall,
};
use crate::types::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Content, ContentPart,
    FinishReason, Message, Role, StreamDelta, StreamEvent, ToolCall, ToolChoice, ToolDefinition,
};

/// Adapter for the Ollama chat protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaAdapter;

impl Adapter for OllamaAdapter {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn translate(&self, request: &ChatCompletionRequest) -> Result<Translation, LlmError> {
        request.validate()?;

        let (mapped, mut diagnostics) = OLLAMA.map_parameters(request);
        let options: OllamaOptions = decode_parameters(Provider::Ollama, mapped.grouped)?;

        let messages = request
            .messages
            .iter()
            .enumerate()
            .map(|(position, message)| to_ollama_message(position, message, &mut diagnostics))
            .collect();

        let wire = OllamaRequest {
            model: request.model.clone(),
            messages,
            tools: offered_tools(request, &mut diagnostics),
            // Ollama streams unless told otherwise
            stream: Some(request.stream),
            format: if request.json_mode == Some(true) {
                Some(Value::String("json".to_owned()))
            } else {
                request.structured_outputs.as_ref().map(unwrap_schema)
            },
            options: (options != OllamaOptions::default()).then_some(options),
        };

        Ok(Translation {
            request: VendorRequest::Ollama(wire),
            diagnostics,
        })
    }

    fn parse(
        &self,
        request: &ChatCompletionRequest,
        response: VendorResponse,
    ) -> Result<ChatCompletionResponse, LlmError> {
        match response {
            VendorResponse::Ollama(response) => Ok(normalize_response(request, response)),
            other => Err(unexpected(Protocol::Ollama, other.protocol())),
        }
    }

    fn stream_normalizer(&self) -> Box<dyn EventNormalizer> {
        Box::new(OllamaStreamNormalizer::default())
    }
}

fn to_ollama_message(position: usize, message: &Message, diagnostics: &mut Vec<Diagnostic>) -> OllamaMessage {
    let mut wire = OllamaMessage {
        role: match message.role() {
            // Ollama has no developer role
            Role::System | Role::Developer => "system".to_owned(),
            role => role.to_string(),
        },
        content: message.text(),
        images: None,
        tool_calls: None,
        thinking: None,
    };

    match message {
        Message::User(m) => wire.images = images(position, &m.content, diagnostics),
        Message::Assistant(m) => {
            wire.images = images(position, &m.content, diagnostics);
            wire.tool_calls = m.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|call| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: call.function.name.clone(),
                            arguments: call.function.arguments.clone(),
                        },
                    })
                    .collect()
            });
        }
        Message::System(_) | Message::Developer(_) | Message::Tool(_) => {}
    }

    wire
}

/// Base64 payloads of the message's data-URL images, limited to what Ollama accepts
fn images(position: usize, content: &Content, diagnostics: &mut Vec<Diagnostic>) -> Option<Vec<String>> {
    let Content::Parts(parts) = content else {
        return None;
    };

    let mut payloads = Vec::new();
    for part in parts {
        let ContentPart::ImageUrl { image_url } = part else {
            continue;
        };

        let Some((_, data)) = image_url.as_data_uri() else {
            diagnostics.push(image_skipped(position, "only base64 data URLs are supported"));
            continue;
        };
        if STANDARD.decode(data).is_err() {
            diagnostics.push(image_skipped(position, "data URL payload is not valid base64"));
            continue;
        }
        payloads.push(data.to_owned());
    }

    if let Some(limit) = OLLAMA.max_images_per_message
        && payloads.len() > limit
    {
        diagnostics.push(Diagnostic::ImagesTruncated {
            provider: OLLAMA.name.to_owned(),
            message: position,
            kept: limit,
            dropped: payloads.len() - limit,
        });
        payloads.truncate(limit);
    }

    (!payloads.is_empty()).then_some(payloads)
}

fn image_skipped(position: usize, reason: &str) -> Diagnostic {
    Diagnostic::ImageSkipped {
        provider: OLLAMA.name.to_owned(),
        message: position,
        reason: reason.to_owned(),
    }
}

/// Tools sent to Ollama, narrowed to emulate `tool_choice`
///
/// Ollama has no tool choice control, so a forced function is emulated by
/// offering only that tool and `none` by offering none.
fn offered_tools(request: &ChatCompletionRequest, diagnostics: &mut Vec<Diagnostic>) -> Option<Vec<OllamaTool>> {
    let emulated = |choice: &ToolChoice, detail: String| Diagnostic::ToolChoiceEmulated {
        provider: OLLAMA.name.to_owned(),
        choice: choice.to_string(),
        detail,
    };

    let Some(tools) = request.tools.as_ref().filter(|tools| !tools.is_empty()) else {
        if let Some(choice @ (ToolChoice::Required | ToolChoice::Function(_))) = &request.tool_choice {
            diagnostics.push(emulated(choice, "the request has no tools; the choice was ignored".to_owned()));
        }
        return None;
    };

    let offered: Vec<&ToolDefinition> = match &request.tool_choice {
        None | Some(ToolChoice::Auto) => tools.iter().collect(),
        Some(choice @ ToolChoice::None) => {
            diagnostics.push(emulated(choice, "tools were left out of the request".to_owned()));
            return None;
        }
        Some(choice @ ToolChoice::Required) => {
            diagnostics.push(emulated(
                choice,
                "the model may still answer without calling a tool".to_owned(),
            ));
            tools.iter().collect()
        }
        Some(choice @ ToolChoice::Function(name)) => {
            let Some(tool) = tools.iter().find(|tool| tool.name() == name) else {
                diagnostics.push(emulated(
                    choice,
                    format!("`{name}` is not among the request's tools; no tools were offered"),
                ));
                return None;
            };
            diagnostics.push(emulated(choice, format!("only `{name}` was offered to the model")));
            vec![tool]
        }
    };

    Some(
        offered
            .into_iter()
            .map(|tool| OllamaTool {
                tool_type: tool.tool_type.clone(),
                function: OllamaFunction {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool.function.parameters.clone(),
                },
            })
            .collect(),
    )
}

fn finish_reason(response: &OllamaResponse) -> FinishReason {
    match response.done_reason.as_deref() {
        Some(reason) => OLLAMA.finish_reason(reason),
        None if response.done => FinishReason::Stop,
        None => FinishReason::Other,
    }
}

/// Ollama sends arguments as an object; older servers send a JSON string
fn call_arguments(choice: usize, call: &OllamaFunctionCall, diagnostics: &mut Vec<Diagnostic>) -> Value {
    match &call.arguments {
        Value::String(raw) => parse_arguments(choice, &call.name, raw, diagnostics),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

fn normalize_response(request: &ChatCompletionRequest, response: OllamaResponse) -> ChatCompletionResponse {
    let mut diagnostics = Vec::new();
    let finish = finish_reason(&response);
    let message = response.message.unwrap_or(OllamaMessage {
        role: Role::Assistant.to_string(),
        content: String::new(),
        images: None,
        tool_calls: None,
        thinking: None,
    });

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .iter()
        .flatten()
        .enumerate()
        .map(|(n, call)| {
            let arguments = call_arguments(0, &call.function, &mut diagnostics);
            ToolCall::new(synthesize_call_id(n), call.function.name.clone(), arguments)
        })
        .collect();
    check_tool_names(request, 0, &tool_calls, &mut diagnostics);
    let json_message = parse_json_message(request, 0, &message.content, &mut diagnostics);
    let has_tool_calls = !tool_calls.is_empty();

    let choice = ChatCompletionChoice {
        message: AssistantMessage {
            content: Content::Text(message.content),
            name: None,
            refusal: None,
            tool_calls: has_tool_calls.then_some(tool_calls),
        },
        finish_reason: finish_with_tools(finish, has_tool_calls),
        json_message,
        logprobs: None,
        extras: None,
    };

    ChatCompletionResponse {
        choices: vec![choice],
        diagnostics,
        completion_tokens: response.eval_count,
        prompt_tokens: response.prompt_eval_count,
        extras: response
            .total_duration
            .map(|nanos| json!({ "total_duration": nanos })),
        ..ChatCompletionResponse::default()
    }
}

/// Ollama streams complete tool calls; each becomes a start event with a synthesized id
#[derive(Debug, Default)]
struct OllamaStreamNormalizer {
    calls_seen: usize,
}

impl EventNormalizer for OllamaStreamNormalizer {
    fn normalize(&mut self, event: VendorEvent) -> Result<Vec<StreamEvent>, LlmError> {
        match event {
            VendorEvent::Ollama(chunk) => Ok(self.convert_chunk(chunk)),
            other => Err(unexpected(Protocol::Ollama, other.protocol())),
        }
    }
}

impl OllamaStreamNormalizer {
    fn convert_chunk(&mut self, chunk: OllamaStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(message) = &chunk.message {
            if !message.content.is_empty() {
                events.push(StreamEvent::delta(StreamDelta {
                    role: Some(Role::Assistant),
                    content: Some(message.content.clone()),
                    ..StreamDelta::default()
                }));
            }

            for call in message.tool_calls.iter().flatten() {
                let arguments = match &call.function.arguments {
                    Value::String(raw) => raw.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                events.push(StreamEvent::delta(StreamDelta::tool_call(
                    Some(synthesize_call_id(self.calls_seen)),
                    Some(call.function.name.clone()),
                    arguments,
                )));
                self.calls_seen += 1;
            }
        }

        if chunk.done {
            events.push(StreamEvent::delta(StreamDelta::finish(finish_with_tools(
                finish_reason(&chunk),
                self.calls_seen > 0,
            ))));
            events.push(StreamEvent::usage(chunk.prompt_eval_count, chunk.eval_count));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageDetail, ImageUrl, Stop};

    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            "llama3.2",
            vec![
                Message::system("Hello, world!"),
                Message::user("What is the capital of France?"),
            ],
        )
    }

    fn wire(translation: Translation) -> OllamaRequest {
        match translation.request {
            VendorRequest::Ollama(wire) => wire,
            other => panic!("unexpected request {other:?}"),
        }
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition::function(name, None, json!({"type": "object"}))
    }

    #[test]
    fn translate_groups_options() {
        let mut req = request();
        req.max_completion_tokens = Some(100);
        req.context_window = Some(8192);
        req.mirostat = Some(2);
        req.stop = Some(Stop::One("END".to_owned()));
        req.json_mode = Some(true);

        let body = wire(OllamaAdapter.translate(&req).unwrap());

        insta::assert_json_snapshot!(body, @r#"
        {
          "model": "llama3.2",
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
          "stream": false,
          "format": "json",
          "options": {
            "mirostat": 2,
            "num_ctx": 8192,
            "stop": [
              "END"
            ],
            "num_predict": 100
          }
        }
        "#);
    }

    #[test]
    fn translate_keeps_one_image_per_message() {
        let image = |url: &str| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.to_owned(),
                detail: ImageDetail::Low,
            },
        };
        let data_url = format!("data:image/png;base64,{PIXEL}");
        let req = ChatCompletionRequest::new(
            "llava",
            vec![Message::user(vec![
                ContentPart::text("compare these"),
                image(&data_url),
                image(&data_url),
                image("data:image/png;base64,%%%"),
                image("https://example.com/cat.jpg"),
            ])],
        );

        let translation = OllamaAdapter.translate(&req).unwrap();

        assert_eq!(translation.diagnostics.len(), 3);
        assert!(matches!(
            translation.diagnostics[2],
            Diagnostic::ImagesTruncated {
                message: 0,
                kept: 1,
                dropped: 1,
                ..
            }
        ));
        let body = wire(translation);
        assert_eq!(body.messages[0].content, "compare these");
        assert_eq!(body.messages[0].images, Some(vec![PIXEL.to_owned()]));
    }

    #[test]
    fn translate_emulates_forced_tool() {
        let mut req = request();
        req.tools = Some(vec![tool("get_current_weather"), tool("get_time")]);
        req.tool_choice = Some(ToolChoice::from("get_current_weather"));

        let translation = OllamaAdapter.translate(&req).unwrap();

        assert!(matches!(
            translation.diagnostics.as_slice(),
            [Diagnostic::ToolChoiceEmulated { choice, .. }] if choice == "get_current_weather"
        ));
        let tools = wire(translation).tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "get_current_weather");
    }

    #[test]
    fn translate_forced_tool_missing_from_tools_offers_none() {
        let mut req = request();
        req.tools = Some(vec![tool("get_time")]);
        req.tool_choice = Some(ToolChoice::from("get_current_weather"));

        let translation = OllamaAdapter.translate(&req).unwrap();

        assert!(matches!(
            translation.diagnostics.as_slice(),
            [Diagnostic::ToolChoiceEmulated { detail, .. }] if detail.contains("not among the request's tools")
        ));
        assert_eq!(wire(translation).tools, None);
    }

    #[test]
    fn translate_tool_choice_without_tools_is_reported() {
        let mut req = request();
        req.tool_choice = Some(ToolChoice::Required);

        let translation = OllamaAdapter.translate(&req).unwrap();

        assert!(matches!(
            translation.diagnostics.as_slice(),
            [Diagnostic::ToolChoiceEmulated { choice, detail, .. }]
                if choice == "required" && detail.contains("no tools")
        ));
        assert_eq!(wire(translation).tools, None);
    }

    #[test]
    fn translate_tool_choice_none_omits_tools() {
        let mut req = request();
        req.tools = Some(vec![tool("get_time")]);
        req.tool_choice = Some(ToolChoice::None);

        assert_eq!(wire(OllamaAdapter.translate(&req).unwrap()).tools, None);
    }

    #[test]
    fn translate_omits_tool_result_key() {
        let req = ChatCompletionRequest::new("llama3.2", vec![Message::user("hi"), Message::tool("call_0", "20C")]);

        let body = wire(OllamaAdapter.translate(&req).unwrap());

        assert_eq!(body.messages[1].role, "tool");
        assert_eq!(body.messages[1].content, "20C");
    }

    #[test]
    fn parse_tool_calls_get_synthesized_ids() {
        let mut req = request();
        req.tools = Some(vec![tool("get_current_weather")]);

        let body = json!({
            "model": "llama3.2",
            "created_at": "2024-07-22T20:33:28.123648Z",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_current_weather", "arguments": {"location": "Paris"}}}]
            },
            "done_reason": "stop",
            "done": true,
            "prompt_eval_count": 22,
            "eval_count": 11
        });
        let vendor = VendorResponse::from_json(Protocol::Ollama, body).unwrap();

        let resp = OllamaAdapter.parse(&req, vendor).unwrap();

        let choice = &resp.choices[0];
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].function.arguments, json!({"location": "Paris"}));
        assert_eq!(resp.prompt_tokens, Some(22));
        assert_eq!(resp.completion_tokens, Some(11));
    }

    #[test]
    fn parse_unknown_done_reason_is_other() {
        let body = json!({"message": {"role": "assistant", "content": "hi"}, "done": true, "done_reason": "unload"});
        let vendor = VendorResponse::from_json(Protocol::Ollama, body).unwrap();

        let resp = OllamaAdapter.parse(&request(), vendor).unwrap();

        assert_eq!(resp.choices[0].finish_reason, FinishReason::Other);
    }

    #[test]
    fn stream_done_line_finishes_and_reports_usage() {
        let mut normalizer = OllamaAdapter.stream_normalizer();
        let line = |value: Value| VendorEvent::from_json(Protocol::Ollama, &value.to_string()).unwrap();

        let first = normalizer
            .normalize(line(json!({"message": {"role": "assistant", "content": "Par"}, "done": false})))
            .unwrap();
        let last = normalizer
            .normalize(line(json!({
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "length",
                "prompt_eval_count": 12,
                "eval_count": 40
            })))
            .unwrap();

        assert_eq!(first[0].choices[0].content.as_deref(), Some("Par"));
        assert_eq!(
            last,
            vec![
                StreamEvent::delta(StreamDelta::finish(FinishReason::Length)),
                StreamEvent::usage(Some(12), Some(40)),
            ]
        );
    }
}
