mod harness;

use futures_util::StreamExt;
use harness::fixtures::{self, PROVIDERS};
use harness::mock_client::MockClient;
use serde_json::json;
use switchboard_llm::types::{DeltaRole, FinishReason};
use switchboard_llm::{ChatCompletionChunk, ChatCompletionRequest, Diagnostic, ToolCallAssembler, route, route_stream};

async fn collect(request: &ChatCompletionRequest, provider: &str, client: &MockClient) -> Vec<ChatCompletionChunk> {
    route_stream(request, provider, client)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await
}

fn text(chunks: &[ChatCompletionChunk]) -> String {
    chunks
        .iter()
        .flat_map(|chunk| &chunk.choices)
        .filter(|choice| choice.delta.role == DeltaRole::Assistant)
        .map(|choice| choice.delta.content.as_str())
        .collect()
}

fn finish_reason(chunks: &[ChatCompletionChunk]) -> Option<FinishReason> {
    chunks
        .iter()
        .flat_map(|chunk| &chunk.choices)
        .filter_map(|choice| choice.finish_reason)
        .last()
}

#[tokio::test]
async fn streamed_text_matches_complete_reply() {
    for provider in PROVIDERS {
        let client = MockClient::replying(fixtures::text_reply(provider, "Paris", fixtures::stop_reason(provider)));
        let complete = route(&fixtures::france(), provider, &client).await.unwrap();

        let client = MockClient::streaming(fixtures::text_stream(provider, &["Pa", "r", "is"]));
        let chunks = collect(&fixtures::france(), provider, &client).await;

        assert_eq!(text(&chunks), complete.choices[0].message.content.as_text(), "{provider}");
        assert_eq!(finish_reason(&chunks), Some(complete.choices[0].finish_reason), "{provider}");
    }
}

#[tokio::test]
async fn streamed_tool_calls_match_complete_reply() {
    let streamed: &[(&str, &str, &[&str])] = &[
        ("call_0", "get_current_weather", &["{\"loca", "tion\": \"Pa", "ris\"}"]),
        ("call_1", "get_local_time", &["{\"timezone\":", " \"Europe/Paris\"}"]),
    ];
    let complete: Vec<_> = streamed
        .iter()
        .map(|(id, name, fragments)| (*id, *name, serde_json::from_str(&fragments.concat()).unwrap()))
        .collect();

    for provider in PROVIDERS {
        let mut request = fixtures::france();
        request.tools = Some(vec![fixtures::weather_tool(), fixtures::time_tool()]);

        let client = MockClient::replying(fixtures::tool_reply(provider, &complete));
        let response = route(&request, provider, &client).await.unwrap();
        let expected = response.choices[0].message.tool_calls.clone().unwrap();

        let client = MockClient::streaming(fixtures::tool_stream(provider, streamed));
        let chunks = collect(&request, provider, &client).await;
        let mut assembler = ToolCallAssembler::new();
        for chunk in &chunks {
            assembler.push(chunk);
        }

        assert_eq!(assembler.finish(), expected, "{provider}");
        assert_eq!(finish_reason(&chunks), Some(FinishReason::ToolCalls), "{provider}");
    }
}

#[tokio::test]
async fn tool_fragments_never_cross_calls() {
    let streamed: &[(&str, &str, &[&str])] = &[
        ("call_a", "get_current_weather", &["{\"location\":", " \"Paris\"}"]),
        ("call_b", "get_local_time", &["{\"timezone\":", " \"UTC\"}"]),
    ];

    for provider in ["openai", "anthropic"] {
        let client = MockClient::streaming(fixtures::tool_stream(provider, streamed));
        let chunks = collect(&fixtures::france(), provider, &client).await;

        let fragments: Vec<(&str, &str, &str)> = chunks
            .iter()
            .flat_map(|chunk| &chunk.choices)
            .filter(|choice| choice.delta.role == DeltaRole::Tool && !choice.delta.content.is_empty())
            .map(|choice| {
                (
                    choice.delta.tool_call_id().unwrap(),
                    choice.delta.tool_name().unwrap(),
                    choice.delta.content.as_str(),
                )
            })
            .collect();

        assert_eq!(
            fragments,
            [
                ("call_a", "get_current_weather", "{\"location\":"),
                ("call_a", "get_current_weather", " \"Paris\"}"),
                ("call_b", "get_local_time", "{\"timezone\":"),
                ("call_b", "get_local_time", " \"UTC\"}"),
            ],
            "{provider}"
        );
    }
}

#[tokio::test]
async fn stream_flag_is_forced_on_a_copy() {
    for provider in PROVIDERS {
        let request = fixtures::france();
        let client = MockClient::streaming(fixtures::text_stream(provider, &["Paris"]));

        collect(&request, provider, &client).await;

        assert!(client.last_request().is_stream(), "{provider}");
        assert!(!request.stream, "{provider}");
    }
}

#[tokio::test]
async fn usage_arrives_on_terminal_chunk() {
    for provider in PROVIDERS {
        let client = MockClient::streaming(fixtures::text_stream(provider, &["Paris"]));

        let chunks = collect(&fixtures::france(), provider, &client).await;

        let last = chunks.last().unwrap();
        assert!(last.is_usage(), "{provider}");
        assert_eq!(last.choices[0].delta.role, DeltaRole::Usage, "{provider}");
        assert_eq!(last.prompt_tokens, Some(12), "{provider}");
        assert_eq!(last.completion_tokens, Some(2), "{provider}");
        assert_eq!(chunks.iter().filter(|chunk| chunk.is_usage()).count(), 1, "{provider}");
    }
}

#[tokio::test]
async fn translation_diagnostics_ride_on_first_chunk() {
    let mut request = fixtures::france();
    request.logit_bias = Some([("50256".to_owned(), -100.0)].into_iter().collect());

    let client = MockClient::streaming(fixtures::text_stream("anthropic", &["Pa", "ris"]));
    let chunks = collect(&request, "anthropic", &client).await;

    assert!(matches!(
        chunks[0].diagnostics.as_slice(),
        [Diagnostic::ParameterDropped { parameter, .. }] if parameter == "logit_bias"
    ));
    assert!(chunks[1..].iter().all(|chunk| chunk.diagnostics.is_empty()));
    assert!(chunks.iter().all(|chunk| chunk.response_duration.is_some()));
}

#[tokio::test]
async fn mid_stream_vendor_error_is_yielded() {
    let client = MockClient::streaming(vec![
        json!({"type": "message_start", "message": {"id": "msg_1", "role": "assistant", "model": "m"}}),
        json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
    ]);

    let results: Vec<_> = route_stream(&fixtures::france(), "anthropic", &client).await.unwrap().collect().await;

    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(err.to_string().contains("Overloaded"));
}

#[tokio::test]
async fn open_failure_surfaces_before_any_chunk() {
    let client = MockClient::failing("model 'test-model' not found");

    let result = route_stream(&fixtures::france(), "ollama", &client).await;

    assert!(matches!(result, Err(switchboard_llm::LlmError::ModelNotFound { .. })));
}
