//! Caller-supplied client seam
//!
//! Adapters never perform I/O. They hand a [`VendorRequest`] to a
//! [`ChatClient`] and receive the vendor's reply, which a real client
//! obtains by posting the request body verbatim to the vendor endpoint.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::protocol::gemini::{GeminiRequest, GeminiResponse, GeminiStreamChunk};
use crate::protocol::ollama::{OllamaRequest, OllamaResponse, OllamaStreamChunk};
use crate::protocol::openai::{OpenAiRequest, OpenAiResponse, OpenAiStreamChunk};

/// Wire protocol spoken by a vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    /// `OpenAI` chat completions (also Azure `OpenAI`)
    #[strum(serialize = "openai")]
    OpenAi,
    /// Anthropic Messages
    Anthropic,
    /// Gemini `generateContent`
    Gemini,
    /// Ollama `/api/chat`
    Ollama,
}

/// Translated request ready to send to a vendor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VendorRequest {
    OpenAi(OpenAiRequest),
    Anthropic(AnthropicRequest),
    Gemini(GeminiRequest),
    Ollama(OllamaRequest),
}

impl VendorRequest {
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::OpenAi(_) => Protocol::OpenAi,
            Self::Anthropic(_) => Protocol::Anthropic,
            Self::Gemini(_) => Protocol::Gemini,
            Self::Ollama(_) => Protocol::Ollama,
        }
    }

    /// Model the request targets
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(r) => &r.model,
            Self::Anthropic(r) => &r.model,
            Self::Gemini(r) => &r.model,
            Self::Ollama(r) => &r.model,
        }
    }

    /// Whether the request asks the vendor to stream
    pub fn is_stream(&self) -> bool {
        match self {
            Self::OpenAi(r) => r.stream == Some(true),
            Self::Anthropic(r) => r.stream == Some(true),
            Self::Gemini(r) => r.stream,
            Self::Ollama(r) => r.stream == Some(true),
        }
    }
}

/// Complete vendor reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VendorResponse {
    OpenAi(OpenAiResponse),
    Anthropic(AnthropicResponse),
    Gemini(GeminiResponse),
    Ollama(OllamaResponse),
}

impl VendorResponse {
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::OpenAi(_) => Protocol::OpenAi,
            Self::Anthropic(_) => Protocol::Anthropic,
            Self::Gemini(_) => Protocol::Gemini,
            Self::Ollama(_) => Protocol::Ollama,
        }
    }

    /// Decode a JSON body returned by a vendor speaking `protocol`
    pub fn from_json(protocol: Protocol, body: Value) -> anyhow::Result<Self> {
        Ok(match protocol {
            Protocol::OpenAi => Self::OpenAi(serde_json::from_value(body)?),
            Protocol::Anthropic => Self::Anthropic(serde_json::from_value(body)?),
            Protocol::Gemini => Self::Gemini(serde_json::from_value(body)?),
            Protocol::Ollama => Self::Ollama(serde_json::from_value(body)?),
        })
    }
}

/// One streamed vendor event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VendorEvent {
    OpenAi(OpenAiStreamChunk),
    Anthropic(AnthropicStreamEvent),
    Gemini(GeminiStreamChunk),
    Ollama(OllamaStreamChunk),
}

impl VendorEvent {
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::OpenAi(_) => Protocol::OpenAi,
            Self::Anthropic(_) => Protocol::Anthropic,
            Self::Gemini(_) => Protocol::Gemini,
            Self::Ollama(_) => Protocol::Ollama,
        }
    }

    /// Decode one event payload (an SSE `data` field or an NDJSON line)
    pub fn from_json(protocol: Protocol, data: &str) -> anyhow::Result<Self> {
        Ok(match protocol {
            Protocol::OpenAi => Self::OpenAi(serde_json::from_str(data)?),
            Protocol::Anthropic => Self::Anthropic(serde_json::from_str(data)?),
            Protocol::Gemini => Self::Gemini(serde_json::from_str(data)?),
            Protocol::Ollama => Self::Ollama(serde_json::from_str(data)?),
        })
    }
}

/// Stream of vendor events as produced by a client
pub type VendorEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<VendorEvent>> + Send>>;

/// Performs vendor I/O on behalf of the adapters
///
/// Errors are returned as `anyhow::Error` and propagated to the caller
/// unchanged, except for recognizable "model not found" messages.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a request and return the complete reply
    async fn complete(&self, request: VendorRequest) -> anyhow::Result<VendorResponse>;

    /// Send a request and return the vendor's event stream
    async fn stream(&self, request: VendorRequest) -> anyhow::Result<VendorEventStream> {
        anyhow::bail!("{} client does not support streaming", request.protocol())
    }
}
