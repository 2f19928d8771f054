use thiserror::Error;

/// Errors that end a chat completion call
///
/// Non-fatal issues are not errors; they are recorded as
/// [`Diagnostic`](crate::diagnostics::Diagnostic)s on the response.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request is invalid; raised before any client call
    #[error("invalid request: {0}")]
    Configuration(String),

    /// Provider name outside the supported set
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    /// Vendor reported that the model does not exist
    #[error("model `{model}` is not available from {provider}; check the model name or pull it first")]
    ModelNotFound {
        model: String,
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// Client returned a payload for a different vendor
    #[error("expected a {expected} payload from the client, got {found}")]
    UnexpectedPayload { expected: String, found: String },

    /// Error raised by the client, propagated unchanged
    #[error(transparent)]
    Vendor(anyhow::Error),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the error was raised before the client was called
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnsupportedProvider { .. })
    }
}
