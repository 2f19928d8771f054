use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// Developer instruction (newer `OpenAI` models treat it like `system`)
    Developer,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

/// Message in a conversation
///
/// The role tag selects which content shapes are allowed: system, developer
/// and tool messages carry plain text only, user and assistant messages may
/// interleave text with images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System instruction
    System(TextMessage),
    /// Developer instruction
    Developer(TextMessage),
    /// User message
    User(UserMessage),
    /// Assistant turn, possibly requesting tool calls
    Assistant(AssistantMessage),
    /// Result of a tool invocation
    Tool(ToolMessage),
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(TextMessage::new(content))
    }

    /// Create a developer message
    pub fn developer(content: impl Into<String>) -> Self {
        Self::Developer(TextMessage::new(content))
    }

    /// Create a plain-text user message
    pub fn user(content: impl Into<Content>) -> Self {
        Self::User(UserMessage {
            content: content.into(),
            name: None,
        })
    }

    /// Create a plain-text assistant message
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::Assistant(AssistantMessage {
            content: content.into(),
            ..AssistantMessage::default()
        })
    }

    /// Create a tool result message answering the tool call `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool(ToolMessage {
            content: content.into(),
            name: Some(tool_call_id.into()),
        })
    }

    /// Role of this message
    pub const fn role(&self) -> Role {
        match self {
            Self::System(_) => Role::System,
            Self::Developer(_) => Role::Developer,
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::Tool(_) => Role::Tool,
        }
    }

    /// Optional participant name
    ///
    /// For tool messages this is the identifier of the tool call being answered.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::System(m) | Self::Developer(m) => m.name.as_deref(),
            Self::User(m) => m.name.as_deref(),
            Self::Assistant(m) => m.name.as_deref(),
            Self::Tool(m) => m.name.as_deref(),
        }
    }

    /// Text content of the message, with image parts removed
    pub fn text(&self) -> String {
        match self {
            Self::System(m) | Self::Developer(m) => m.content.clone(),
            Self::User(m) => m.content.as_text(),
            Self::Assistant(m) => m.content.as_text(),
            Self::Tool(m) => m.content.clone(),
        }
    }
}

/// Text-only message used for the system and developer roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    /// Message text
    pub content: String,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl TextMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }
}

/// User message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// Text or multi-part content
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Text or multi-part content
    #[serde(default)]
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Refusal text when the model declined to answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Tool result message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// Output of the tool
    pub content: String,
    /// Identifier of the tool call this message answers
    ///
    /// Each vendor keys tool results differently; the mapping tables decide
    /// which vendor field receives this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered text and image parts
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

impl Content {
    /// Extract text content, joining parts if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether the content holds no text and no images
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference
    ImageUrl {
        /// Image location and detail hint
        image_url: ImageUrl,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: ImageDetail::Auto,
            },
        }
    }
}

/// Image location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL or base64 data URI for the image
    pub url: String,
    /// Detail level hint
    #[serde(default)]
    pub detail: ImageDetail,
}

impl ImageUrl {
    /// Split a `data:<mime>;base64,<payload>` URI into its media type and payload
    pub fn as_data_uri(&self) -> Option<(&str, &str)> {
        let rest = self.url.strip_prefix("data:")?;
        let (mime_and_encoding, data) = rest.split_once(',')?;
        let mime = mime_and_encoding.strip_suffix(";base64").unwrap_or(mime_and_encoding);
        Some((mime, data))
    }
}

/// Image detail level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}
