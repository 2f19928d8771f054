use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, LogprobEntry};
use super::tool::{PartialArguments, PartialFunction, PartialToolCall};
use crate::diagnostics::{Diagnostic, render};

// -- Canonical chunks handed to the caller --

/// Role attached to a streamed delta
///
/// Besides the message roles, a stream ends with a `usage` chunk carrying
/// the token counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeltaRole {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Usage,
}

impl From<Role> for DeltaRole {
    fn from(role: Role) -> Self {
        match role {
            Role::System => Self::System,
            Role::Developer => Self::Developer,
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Tool => Self::Tool,
        }
    }
}

/// Incremental message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionDelta {
    /// Text fragment; for tool deltas, a fragment of the argument JSON
    pub content: String,
    /// Role the fragment belongs to
    pub role: DeltaRole,
    /// Tool call the fragment belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<PartialToolCall>>,
    /// Refusal text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl ChatCompletionDelta {
    /// Name of the tool whose arguments this delta continues
    pub fn tool_name(&self) -> Option<&str> {
        self.first_tool_call().map(|tc| tc.function.name.as_str())
    }

    /// ID of the tool call whose arguments this delta continues
    pub fn tool_call_id(&self) -> Option<&str> {
        self.first_tool_call().and_then(|tc| tc.id.as_deref())
    }

    fn first_tool_call(&self) -> Option<&PartialToolCall> {
        self.tool_calls.as_ref().and_then(|calls| calls.first())
    }

    pub(crate) fn tool_fragment(name: &str, id: Option<&str>, fragment: String) -> Self {
        Self {
            content: fragment.clone(),
            role: DeltaRole::Tool,
            tool_calls: Some(vec![PartialToolCall {
                id: id.map(str::to_owned),
                function: PartialFunction {
                    name: name.to_owned(),
                    arguments: PartialArguments::Fragment(fragment),
                },
            }]),
            refusal: None,
        }
    }
}

/// One choice within a streamed chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChoiceStream {
    /// Incremental content
    pub delta: ChatCompletionDelta,
    /// Choice index
    pub index: u32,
    /// Why generation stopped, on the final delta of a choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Log probabilities of the tokens in this delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<LogprobEntry>>,
}

/// Canonical streamed chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Choice deltas
    pub choices: Vec<ChatCompletionChoiceStream>,
    /// Non-fatal issues attached to this chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// Tokens generated, on the terminal usage chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    /// Tokens in the prompt, on the terminal usage chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Seconds since the client call started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_duration: Option<f64>,
    /// Backend configuration fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

impl ChatCompletionChunk {
    /// Diagnostics rendered one per line
    pub fn errors(&self) -> String {
        render(&self.diagnostics)
    }

    /// Whether this is the terminal usage chunk
    pub fn is_usage(&self) -> bool {
        self.choices.iter().any(|c| c.delta.role == DeltaRole::Usage)
    }
}

// -- Vendor-neutral stream events produced by adapters --

/// One vendor stream event after adapter normalization
///
/// Adapters split vendor events so that each normalized event carries at
/// most one tool-call delta per choice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    /// Per-choice deltas
    pub choices: Vec<StreamDelta>,
    /// Token counters, when the vendor reports them on this event
    pub usage: Option<StreamUsage>,
    /// Backend configuration fingerprint
    pub system_fingerprint: Option<String>,
}

impl StreamEvent {
    /// Event with a single choice delta
    pub fn delta(delta: StreamDelta) -> Self {
        Self {
            choices: vec![delta],
            ..Self::default()
        }
    }

    /// Usage-only event
    pub fn usage(prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Self {
        Self {
            usage: Some(StreamUsage {
                prompt_tokens,
                completion_tokens,
            }),
            ..Self::default()
        }
    }
}

/// Incremental update for one choice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Choice index
    pub index: u32,
    /// Role announced by this event
    pub role: Option<Role>,
    /// Incremental text content
    pub content: Option<String>,
    /// Incremental tool call data
    pub tool_call: Option<StreamToolCall>,
    /// Incremental refusal text
    pub refusal: Option<String>,
    /// Reason generation finished (present on final delta)
    pub finish_reason: Option<FinishReason>,
    /// Log probabilities of the tokens in this delta
    pub logprobs: Option<Vec<LogprobEntry>>,
}

impl StreamDelta {
    /// Text-only delta for choice 0
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Finish-only delta for choice 0
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }

    /// Tool-call delta for choice 0
    pub fn tool_call(id: Option<String>, name: Option<String>, arguments: impl Into<String>) -> Self {
        Self {
            tool_call: Some(StreamToolCall {
                id,
                name,
                arguments: arguments.into(),
            }),
            ..Self::default()
        }
    }
}

/// Partial tool call data within a stream delta
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamToolCall {
    /// Tool call ID (present on the first fragment only)
    pub id: Option<String>,
    /// Function name (present on the first fragment only)
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    pub arguments: String,
}

/// Token counters reported mid-stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}
