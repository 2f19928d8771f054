//! Canonical requests and vendor-native payloads shared by the tests

use serde_json::{Value, json};
use switchboard_llm::types::ToolDefinition;
use switchboard_llm::{ChatCompletionRequest, Message};

/// Every supported provider name
pub const PROVIDERS: [&str; 5] = ["openai", "azure_openai", "ollama", "anthropic", "gemini"];

pub const MODEL: &str = "test-model";

/// "What is the capital of France?" with a system prompt
pub fn france() -> ChatCompletionRequest {
    ChatCompletionRequest::new(
        MODEL,
        vec![
            Message::system("You are a geography assistant."),
            Message::user("What is the capital of France?"),
        ],
    )
}

pub fn weather_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_current_weather",
        Some("Get the current weather in a location".to_owned()),
        json!({
            "type": "object",
            "properties": {"location": {"type": "string"}},
            "required": ["location"]
        }),
    )
}

pub fn time_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_local_time",
        None,
        json!({"type": "object", "properties": {"timezone": {"type": "string"}}}),
    )
}

/// Vendor spelling of a normal stop
pub fn stop_reason(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "end_turn",
        "gemini" => "STOP",
        _ => "stop",
    }
}

/// Complete text reply with the vendor-native finish reason `finish`
pub fn text_reply(provider: &str, text: &str, finish: &str) -> Value {
    match provider {
        "openai" | "azure_openai" => json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": MODEL,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": finish
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
        }),
        "anthropic" => json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": MODEL,
            "content": [{"type": "text", "text": text}],
            "stop_reason": finish,
            "usage": {"input_tokens": 12, "output_tokens": 2}
        }),
        "gemini" => json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": text}]},
                "finishReason": finish,
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 2, "totalTokenCount": 14}
        }),
        "ollama" => json!({
            "model": MODEL,
            "message": {"role": "assistant", "content": text},
            "done": true,
            "done_reason": finish,
            "prompt_eval_count": 12,
            "eval_count": 2
        }),
        other => panic!("no fixture for {other}"),
    }
}

/// Complete reply calling each `(id, name, arguments)` in order
///
/// Gemini and Ollama replies carry no ids; the adapters number them `call_0`, `call_1`, ...
pub fn tool_reply(provider: &str, calls: &[(&str, &str, Value)]) -> Value {
    match provider {
        "openai" | "azure_openai" => json!({
            "id": "chatcmpl-2",
            "model": MODEL,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": calls.iter().map(|(id, name, args)| json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": args.to_string()}
                    })).collect::<Vec<_>>()
                },
                "finish_reason": "tool_calls"
            }]
        }),
        "anthropic" => json!({
            "id": "msg_2",
            "type": "message",
            "role": "assistant",
            "model": MODEL,
            "content": calls.iter().map(|(id, name, args)| json!({
                "type": "tool_use", "id": id, "name": name, "input": args
            })).collect::<Vec<_>>(),
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 9}
        }),
        "gemini" => json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": calls.iter().map(|(_, name, args)| json!({
                        "functionCall": {"name": name, "args": args}
                    })).collect::<Vec<_>>()
                },
                "finishReason": "STOP",
                "index": 0
            }]
        }),
        "ollama" => json!({
            "model": MODEL,
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": calls.iter().map(|(_, name, args)| json!({
                    "function": {"name": name, "arguments": args}
                })).collect::<Vec<_>>()
            },
            "done": true,
            "done_reason": "stop"
        }),
        other => panic!("no fixture for {other}"),
    }
}

/// Streamed text reply split into `pieces`, ending with a normal stop and usage
pub fn text_stream(provider: &str, pieces: &[&str]) -> Vec<Value> {
    let mut events = Vec::new();

    match provider {
        "openai" | "azure_openai" => {
            events.push(json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]}));
            for piece in pieces {
                events.push(json!({"choices": [{"index": 0, "delta": {"content": piece}}]}));
            }
            events.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}));
            events.push(json!({"choices": [], "usage": {"prompt_tokens": 12, "completion_tokens": 2}}));
        }
        "anthropic" => {
            events.push(json!({
                "type": "message_start",
                "message": {"id": "msg_1", "role": "assistant", "model": MODEL, "usage": {"input_tokens": 12}}
            }));
            events.push(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}));
            for piece in pieces {
                events.push(json!({
                    "type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": piece}
                }));
            }
            events.push(json!({"type": "content_block_stop", "index": 0}));
            events.push(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}));
            events.push(json!({"type": "message_stop"}));
        }
        "gemini" => {
            for piece in pieces {
                events.push(json!({
                    "candidates": [{"content": {"role": "model", "parts": [{"text": piece}]}, "index": 0}]
                }));
            }
            events.push(json!({
                "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP", "index": 0}],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 2}
            }));
        }
        "ollama" => {
            for piece in pieces {
                events.push(json!({"model": MODEL, "message": {"role": "assistant", "content": piece}, "done": false}));
            }
            events.push(json!({
                "model": MODEL,
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 12,
                "eval_count": 2
            }));
        }
        other => panic!("no fixture for {other}"),
    }

    events
}

/// Streamed tool calls; each `(id, name, fragments)` is sent in order
///
/// `OpenAI` and Anthropic receive the argument text in the given fragments.
/// Gemini and Ollama only stream complete calls, so the fragments are joined.
pub fn tool_stream(provider: &str, calls: &[(&str, &str, &[&str])]) -> Vec<Value> {
    let mut events = Vec::new();
    let joined = |fragments: &[&str]| -> Value { serde_json::from_str(&fragments.concat()).unwrap() };

    match provider {
        "openai" | "azure_openai" => {
            for (k, (id, name, fragments)) in calls.iter().enumerate() {
                events.push(json!({"choices": [{"index": 0, "delta": {
                    "role": "assistant",
                    "tool_calls": [{"index": k, "id": id, "type": "function", "function": {"name": name, "arguments": ""}}]
                }}]}));
                for fragment in *fragments {
                    events.push(json!({"choices": [{"index": 0, "delta": {
                        "tool_calls": [{"index": k, "function": {"arguments": fragment}}]
                    }}]}));
                }
            }
            events.push(json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}));
        }
        "anthropic" => {
            events.push(json!({
                "type": "message_start",
                "message": {"id": "msg_2", "role": "assistant", "model": MODEL, "usage": {"input_tokens": 20}}
            }));
            for (k, (id, name, fragments)) in calls.iter().enumerate() {
                events.push(json!({
                    "type": "content_block_start",
                    "index": k,
                    "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}
                }));
                for fragment in *fragments {
                    events.push(json!({
                        "type": "content_block_delta",
                        "index": k,
                        "delta": {"type": "input_json_delta", "partial_json": fragment}
                    }));
                }
                events.push(json!({"type": "content_block_stop", "index": k}));
            }
            events.push(json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 9}}));
            events.push(json!({"type": "message_stop"}));
        }
        "gemini" => {
            for (_, name, fragments) in calls {
                events.push(json!({"candidates": [{
                    "content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": joined(fragments)}}]},
                    "index": 0
                }]}));
            }
            events.push(json!({
                "candidates": [{"content": {"role": "model", "parts": []}, "finishReason": "STOP", "index": 0}],
                "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 9}
            }));
        }
        "ollama" => {
            for (_, name, fragments) in calls {
                events.push(json!({
                    "model": MODEL,
                    "message": {
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{"function": {"name": name, "arguments": joined(fragments)}}]
                    },
                    "done": false
                }));
            }
            events.push(json!({
                "model": MODEL,
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 20,
                "eval_count": 9
            }));
        }
        other => panic!("no fixture for {other}"),
    }

    events
}
