//! Vendor-neutral chat completions
//!
//! Callers describe a chat completion once, as a [`ChatCompletionRequest`],
//! and route it to `OpenAI`, Azure `OpenAI`, Anthropic, Gemini or Ollama.
//! Each vendor's [`Adapter`] translates the request into the vendor's wire
//! format and normalizes the reply back into a [`ChatCompletionResponse`] or
//! a stream of [`ChatCompletionChunk`]s. Vendor I/O is delegated to a
//! caller-supplied [`ChatClient`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod adapter;
pub mod client;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod mapping;
pub mod protocol;
pub mod stream;
pub mod types;

pub use adapter::{Adapter, EventNormalizer, Translation};
pub use client::{ChatClient, Protocol, VendorEvent, VendorEventStream, VendorRequest, VendorResponse};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use dispatch::{ChatCompletionStream, Dispatcher, Provider, route, route_stream};
pub use error::LlmError;
pub use stream::{StreamReconstructor, ToolCallAssembler};
pub use types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Message};
