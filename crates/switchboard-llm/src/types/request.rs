use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};
use crate::error::LlmError;

/// Stop sequences, accepted as a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
    /// One stop sequence
    One(String),
    /// Several stop sequences
    Many(Vec<String>),
}

impl Stop {
    /// All stop sequences as a list
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Reasoning effort for reasoning models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Canonical chat completion request
///
/// Every optional field is vendor-neutral. Each adapter's mapping table
/// decides whether a field is forwarded, renamed, regrouped or dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Conversation messages, oldest first
    pub messages: Vec<Message>,
    /// Model identifier
    pub model: String,
    /// Whether the response should be streamed
    #[serde(default)]
    pub stream: bool,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Context window size (Ollama `num_ctx`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Return token log probabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    /// Number of choices to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Allow several tool calls in one turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Ask for a JSON object response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_mode: Option<bool>,
    /// Ask for a response matching this JSON schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_outputs: Option<serde_json::Value>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Reasoning effort for reasoning models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Token ID to bias mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<BTreeMap<String, f64>>,
    /// Number of alternatives to report per token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u32>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Stop>,
    /// Random seed for best-effort determinism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Mirostat sampling mode (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat: Option<u32>,
    /// Mirostat learning rate (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat_eta: Option<f64>,
    /// Mirostat target entropy (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirostat_tau: Option<f64>,
    /// Look-back window for repetition penalty (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<i32>,
    /// Tail free sampling (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Minimum probability threshold (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,

    /// Legacy length cap for vendors that do not understand `max_completion_tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    /// Create a request with no optional fields set
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: model.into(),
            ..Self::default()
        }
    }

    /// Check the request for conflicting fields
    ///
    /// Runs before any translation or client call.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.messages.is_empty() {
            return Err(LlmError::Configuration("`messages` must not be empty".to_owned()));
        }

        if self.json_mode == Some(true) && self.structured_outputs.is_some() {
            return Err(LlmError::Configuration(
                "`json_mode` and `structured_outputs` cannot be used together".to_owned(),
            ));
        }

        if self.max_tokens.is_some() && self.max_completion_tokens.is_some() {
            return Err(LlmError::Configuration(
                "`max_tokens` and `max_completion_tokens` cannot both be provided".to_owned(),
            ));
        }

        Ok(())
    }

    /// Whether the caller asked for JSON output in either form
    pub fn expects_json(&self) -> bool {
        self.json_mode == Some(true) || self.structured_outputs.is_some()
    }

    /// Whether `name` is one of the tools offered in this request
    ///
    /// Requests without tools accept any name.
    pub fn offers_tool(&self, name: &str) -> bool {
        self.tools
            .as_ref()
            .is_none_or(|tools| tools.iter().any(|t| t.name() == name))
    }
}
