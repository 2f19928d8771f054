//! Canonical, vendor-neutral chat completion types
//!
//! Callers build a [`ChatCompletionRequest`] once and receive either a
//! [`ChatCompletionResponse`] or a sequence of [`ChatCompletionChunk`]s,
//! whichever vendor serves the call.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{
    AssistantMessage, Content, ContentPart, ImageDetail, ImageUrl, Message, Role, TextMessage, ToolMessage,
    UserMessage,
};
pub use request::{ChatCompletionRequest, ReasoningEffort, Stop};
pub use response::{ChatCompletionChoice, ChatCompletionResponse, FinishReason, LogprobEntry, TokenLogprob};
pub use stream::{
    ChatCompletionChoiceStream, ChatCompletionChunk, ChatCompletionDelta, DeltaRole, StreamDelta, StreamEvent,
    StreamToolCall, StreamUsage,
};
pub use tool::{
    Function, FunctionDefinition, PartialArguments, PartialFunction, PartialToolCall, ToolCall, ToolChoice,
    ToolDefinition,
};
