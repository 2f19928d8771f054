//! Provider selection and the end-to-end call path

use std::pin::Pin;
use std::str::FromStr;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use switchboard_config::LlmConfig;

use crate::adapter::{Adapter, AnthropicAdapter, GeminiAdapter, OllamaAdapter, OpenAiAdapter};
use crate::client::ChatClient;
use crate::error::LlmError;
use crate::stream::StreamReconstructor;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};

/// Stream of canonical chunks returned by [`Dispatcher::route_stream`]
pub type ChatCompletionStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, LlmError>> + Send>>;

/// Supported vendors
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    #[strum(serialize = "azure_openai")]
    AzureOpenAi,
    Ollama,
    Anthropic,
    Gemini,
}

impl Provider {
    /// Resolve a provider name, rejecting anything outside the supported set
    pub fn from_name(name: &str) -> Result<Self, LlmError> {
        Self::from_str(name).map_err(|_| LlmError::UnsupportedProvider {
            provider: name.to_owned(),
        })
    }
}

/// Routes canonical requests to the adapter of the selected provider
#[derive(Debug, Clone)]
pub struct Dispatcher {
    openai: OpenAiAdapter,
    azure_openai: OpenAiAdapter,
    ollama: OllamaAdapter,
    anthropic: AnthropicAdapter,
    gemini: GeminiAdapter,
    default_provider: Option<Provider>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            openai: OpenAiAdapter::openai(),
            azure_openai: OpenAiAdapter::azure(),
            ollama: OllamaAdapter,
            anthropic: AnthropicAdapter::default(),
            gemini: GeminiAdapter::default(),
            default_provider: None,
        }
    }
}

impl Dispatcher {
    /// Build the adapters from configuration
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnsupportedProvider`] when `default_provider` names
    /// an unknown vendor.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let default_provider = config.default_provider.as_deref().map(Provider::from_name).transpose()?;

        Ok(Self {
            anthropic: AnthropicAdapter::new(config.anthropic.default_max_tokens),
            gemini: GeminiAdapter::new(config.gemini.disable_automatic_function_calling),
            default_provider,
            ..Self::default()
        })
    }

    /// Provider used when the caller does not name one
    pub const fn default_provider(&self) -> Option<Provider> {
        self.default_provider
    }

    /// Adapter serving `provider`
    pub fn adapter(&self, provider: Provider) -> &dyn Adapter {
        match provider {
            Provider::OpenAi => &self.openai,
            Provider::AzureOpenAi => &self.azure_openai,
            Provider::Ollama => &self.ollama,
            Provider::Anthropic => &self.anthropic,
            Provider::Gemini => &self.gemini,
        }
    }

    /// Translate, call the client once and normalize the reply
    ///
    /// The caller's request is never modified. Translation diagnostics come
    /// first in the response's diagnostics, followed by those found while
    /// parsing.
    pub async fn route(
        &self,
        request: &ChatCompletionRequest,
        provider: &str,
        client: &dyn ChatClient,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let provider = Provider::from_name(provider)?;
        let adapter = self.adapter(provider);
        let translation = adapter.translate(request)?;

        tracing::debug!(
            %provider,
            model = %request.model,
            diagnostics = translation.diagnostics.len(),
            "sending chat completion"
        );

        let started = Instant::now();
        let reply = client
            .complete(translation.request)
            .await
            .map_err(|e| vendor_error(provider, &request.model, e))?;
        let elapsed = started.elapsed().as_secs_f64();

        let mut response = adapter.parse(request, reply)?;
        let mut diagnostics = translation.diagnostics;
        diagnostics.append(&mut response.diagnostics);
        response.diagnostics = diagnostics;
        response.response_duration = elapsed;

        tracing::debug!(
            %provider,
            choices = response.choices.len(),
            duration = elapsed,
            "chat completion normalized"
        );

        Ok(response)
    }

    /// Translate with `stream` forced on and reconstruct the vendor's events
    ///
    /// Translation diagnostics ride on the first chunk. Chunks carry the
    /// seconds elapsed since the client call started.
    pub async fn route_stream(
        &self,
        request: &ChatCompletionRequest,
        provider: &str,
        client: &dyn ChatClient,
    ) -> Result<ChatCompletionStream, LlmError> {
        let provider = Provider::from_name(provider)?;
        let adapter = self.adapter(provider);

        let mut request = request.clone();
        request.stream = true;
        let translation = adapter.translate(&request)?;

        tracing::debug!(
            %provider,
            model = %request.model,
            diagnostics = translation.diagnostics.len(),
            "opening chat completion stream"
        );

        let started = Instant::now();
        let events = client
            .stream(translation.request)
            .await
            .map_err(|e| vendor_error(provider, &request.model, e))?;

        let mut normalizer = adapter.stream_normalizer();
        let mut reconstructor = StreamReconstructor::new();
        let mut diagnostics = Some(translation.diagnostics);
        let model = request.model;

        let chunks = events
            .map(move |event| {
                let normalized = match event {
                    Ok(event) => normalizer.normalize(event),
                    Err(e) => Err(vendor_error(provider, &model, e)),
                };

                match normalized {
                    Ok(events) => events
                        .into_iter()
                        .filter_map(|event| reconstructor.push(event))
                        .map(|mut chunk| {
                            if let Some(diagnostics) = diagnostics.take() {
                                chunk.diagnostics = diagnostics;
                            }
                            chunk.response_duration = Some(started.elapsed().as_secs_f64());
                            Ok(chunk)
                        })
                        .collect(),
                    Err(e) => vec![Err(e)],
                }
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(chunks))
    }
}

/// Route with default settings; see [`Dispatcher::route`]
pub async fn route(
    request: &ChatCompletionRequest,
    provider: &str,
    client: &dyn ChatClient,
) -> Result<ChatCompletionResponse, LlmError> {
    Dispatcher::default().route(request, provider, client).await
}

/// Stream with default settings; see [`Dispatcher::route_stream`]
pub async fn route_stream(
    request: &ChatCompletionRequest,
    provider: &str,
    client: &dyn ChatClient,
) -> Result<ChatCompletionStream, LlmError> {
    Dispatcher::default().route_stream(request, provider, client).await
}

/// Classify a client failure
fn vendor_error(provider: Provider, model: &str, error: anyhow::Error) -> LlmError {
    if provider.table().is_model_not_found(model, &error) {
        tracing::warn!(%provider, model, "model not found");
        return LlmError::ModelNotFound {
            model: model.to_owned(),
            provider: provider.to_string(),
            source: error,
        };
    }

    tracing::warn!(%provider, model, error = %error, "chat completion call failed");
    LlmError::Vendor(error)
}
