use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::AssistantMessage;
use crate::diagnostics::{Diagnostic, render};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation or a stop sequence
    Stop,
    /// Hit the length cap
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
    /// Anything the vendor reported that has no canonical counterpart
    Other,
}

/// Log probability of one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLogprob {
    /// Token text
    pub token: String,
    /// Log probability
    pub logprob: f64,
    /// UTF-8 bytes of the token, when the vendor reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
}

/// Log probability record for one generated position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogprobEntry {
    /// The sampled token only
    Token(TokenLogprob),
    /// Top-k alternatives, when `top_logprobs` was requested
    Alternatives(Vec<TokenLogprob>),
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    /// Generated message
    pub message: AssistantMessage,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Parsed message text, when JSON output was requested and parsing succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_message: Option<serde_json::Value>,
    /// Per-token log probabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<LogprobEntry>>,
    /// Vendor-specific data without a canonical field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

/// Canonical chat completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Generated choices in vendor order
    pub choices: Vec<ChatCompletionChoice>,
    /// Non-fatal issues found while translating the request or parsing the reply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,

    /// Tokens generated (reasoning tokens included where the vendor splits them out)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Tokens in the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Vendor breakdown of completion tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_detailed_tokens: Option<BTreeMap<String, u64>>,
    /// Vendor breakdown of prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_detailed_tokens: Option<BTreeMap<String, u64>>,
    /// Prompt tokens served from the vendor cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,
    /// Prompt tokens written to the vendor cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u32>,
    /// Seconds spent inside the client call
    pub response_duration: f64,

    /// Backend configuration fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// Vendor-specific data without a canonical field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<serde_json::Value>,
}

impl ChatCompletionResponse {
    /// Diagnostics rendered one per line
    pub fn errors(&self) -> String {
        render(&self.diagnostics)
    }
}
