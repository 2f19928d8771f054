//! Non-fatal issues recorded while translating requests and parsing replies
//!
//! Diagnostics travel with the response (or the first stream chunk) as a
//! structured list. The free-text `errors()` view on responses is a
//! projection of that list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad category of a [`Diagnostic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiagnosticKind {
    /// The request could not be expressed exactly in the vendor's shape
    Translation,
    /// The model called a tool that was not offered
    ToolValidation,
    /// Output that should have been JSON did not parse
    JsonParse,
}

/// A non-fatal issue attached to a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A request field the vendor has no counterpart for
    #[error("{provider} does not support `{parameter}`; the value was dropped")]
    ParameterDropped { provider: String, parameter: String },

    /// Extra images removed from a message
    #[error("message {message}: {provider} accepts {kept} image(s) per message; {dropped} dropped")]
    ImagesTruncated {
        provider: String,
        message: usize,
        kept: usize,
        dropped: usize,
    },

    /// An image the vendor cannot receive
    #[error("message {message}: image skipped for {provider}: {reason}")]
    ImageSkipped {
        provider: String,
        message: usize,
        reason: String,
    },

    /// Requested output format the vendor cannot enforce
    #[error("{provider} has no {format} response mode; the output is parsed as JSON on a best-effort basis")]
    ResponseFormatUnsupported { provider: String, format: String },

    /// `tool_choice` approximated because the vendor lacks a native control
    #[error("{provider} cannot enforce tool_choice `{choice}`: {detail}")]
    ToolChoiceEmulated {
        provider: String,
        choice: String,
        detail: String,
    },

    /// Tool call naming a function absent from `request.tools`
    #[error("Choice {choice}: tool call with invalid tool name `{name}`")]
    UnknownTool { choice: usize, name: String },

    /// Tool call whose arguments are not a JSON document
    #[error("Choice {choice}: arguments of tool call `{name}` are not valid JSON: {error}")]
    InvalidToolArguments { choice: usize, name: String, error: String },

    /// Message text that should have been JSON
    #[error("Choice {choice}: failed to parse message as JSON: {error}")]
    InvalidJson { choice: usize, error: String },
}

impl Diagnostic {
    pub const fn kind(&self) -> DiagnosticKind {
        match self {
            Self::ParameterDropped { .. }
            | Self::ImagesTruncated { .. }
            | Self::ImageSkipped { .. }
            | Self::ResponseFormatUnsupported { .. }
            | Self::ToolChoiceEmulated { .. } => DiagnosticKind::Translation,
            Self::UnknownTool { .. } | Self::InvalidToolArguments { .. } => DiagnosticKind::ToolValidation,
            Self::InvalidJson { .. } => DiagnosticKind::JsonParse,
        }
    }
}

/// Render diagnostics one per line
pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
