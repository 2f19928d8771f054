//! Static per-provider mapping tables
//!
//! Each vendor gets one [`MappingTable`] describing where every optional
//! request parameter lands in its wire format, how its finish reasons map
//! to canonical ones, how tool results are keyed, and which error messages
//! mean "model not found". Adapters consult the table instead of carrying
//! their own rename logic.

use regex::Regex;
use serde_json::{Map, Value};

use crate::diagnostics::Diagnostic;
use crate::dispatch::Provider;
use crate::types::{ChatCompletionRequest, FinishReason};

/// Optional request parameter subject to per-provider mapping
///
/// `tools`, `tool_choice`, `json_mode` and `structured_outputs` change the
/// shape of the vendor request and are translated by each adapter directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Param {
    MaxCompletionTokens,
    MaxTokens,
    ContextWindow,
    Logprobs,
    N,
    ParallelToolCalls,
    Temperature,
    ReasoningEffort,
    TopP,
    LogitBias,
    TopLogprobs,
    FrequencyPenalty,
    PresencePenalty,
    Stop,
    Seed,
    Mirostat,
    MirostatEta,
    MirostatTau,
    RepeatLastN,
    TfsZ,
    TopK,
    MinP,
}

impl Param {
    /// JSON value of this parameter on `request`, if set
    ///
    /// Stop sequences are always rendered as a list.
    pub fn value(self, request: &ChatCompletionRequest) -> Option<Value> {
        match self {
            Self::MaxCompletionTokens => request.max_completion_tokens.map(Value::from),
            Self::MaxTokens => request.max_tokens.map(Value::from),
            Self::ContextWindow => request.context_window.map(Value::from),
            Self::Logprobs => request.logprobs.map(Value::from),
            Self::N => request.n.map(Value::from),
            Self::ParallelToolCalls => request.parallel_tool_calls.map(Value::from),
            Self::Temperature => request.temperature.map(Value::from),
            Self::ReasoningEffort => request
                .reasoning_effort
                .and_then(|effort| serde_json::to_value(effort).ok()),
            Self::TopP => request.top_p.map(Value::from),
            Self::LogitBias => request
                .logit_bias
                .as_ref()
                .map(|bias| Value::Object(bias.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect())),
            Self::TopLogprobs => request.top_logprobs.map(Value::from),
            Self::FrequencyPenalty => request.frequency_penalty.map(Value::from),
            Self::PresencePenalty => request.presence_penalty.map(Value::from),
            Self::Stop => request.stop.as_ref().map(|stop| Value::from(stop.to_vec())),
            Self::Seed => request.seed.map(Value::from),
            Self::Mirostat => request.mirostat.map(Value::from),
            Self::MirostatEta => request.mirostat_eta.map(Value::from),
            Self::MirostatTau => request.mirostat_tau.map(Value::from),
            Self::RepeatLastN => request.repeat_last_n.map(Value::from),
            Self::TfsZ => request.tfs_z.map(Value::from),
            Self::TopK => request.top_k.map(Value::from),
            Self::MinP => request.min_p.map(Value::from),
        }
    }
}

/// Where a parameter goes in the vendor request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Top-level request field with this name
    Field(&'static str),
    /// Field inside the vendor's option group (Ollama `options`, Gemini `generationConfig`)
    Grouped(&'static str),
    /// Not supported; the value is dropped with a diagnostic
    Drop,
    /// Folded into another structure by the adapter itself
    Handled,
}

/// How the adapter keys a tool result message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResultKey {
    /// `tool_call_id` on a `tool` role message
    ToolCallId,
    /// `tool_use_id` on a `tool_result` content block
    ToolUseId,
    /// Function name on a function response part
    FunctionName,
    /// The vendor does not key tool results
    Omit,
}

/// Where system and developer messages go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPlacement {
    /// Kept inline as role messages
    Inline,
    /// Joined with newlines into a top-level preamble field
    Preamble,
}

/// Static translation rules for one provider
#[derive(Debug)]
pub struct MappingTable {
    /// Provider name used in diagnostics
    pub name: &'static str,
    /// Destination of every [`Param`]
    pub parameters: &'static [(Param, Target)],
    /// Vendor finish reason strings and their canonical counterparts
    pub finish_reasons: &'static [(&'static str, FinishReason)],
    pub tool_result_key: ToolResultKey,
    pub system: SystemPlacement,
    /// Images accepted per message, when the vendor limits them
    pub max_images_per_message: Option<usize>,
    /// Error message templates meaning the model does not exist; `{model}` is substituted
    pub model_not_found: &'static [&'static str],
}

/// Parameter values placed according to a [`MappingTable`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MappedParameters {
    /// Top-level request fields
    pub fields: Map<String, Value>,
    /// Fields for the vendor's option group
    pub grouped: Map<String, Value>,
}

impl MappingTable {
    /// Destination of `param`; parameters missing from the table are dropped
    pub fn target(&self, param: Param) -> Target {
        self.parameters
            .iter()
            .find(|(p, _)| *p == param)
            .map_or(Target::Drop, |(_, target)| *target)
    }

    /// Canonical finish reason for a vendor string, `other` when unknown
    pub fn finish_reason(&self, vendor: &str) -> FinishReason {
        self.finish_reasons
            .iter()
            .find(|(name, _)| *name == vendor)
            .map_or(FinishReason::Other, |(_, reason)| *reason)
    }

    /// Place every parameter set on `request`, recording drops
    pub fn map_parameters(&self, request: &ChatCompletionRequest) -> (MappedParameters, Vec<Diagnostic>) {
        let mut mapped = MappedParameters::default();
        let mut diagnostics = Vec::new();

        for &(param, target) in self.parameters {
            let Some(value) = param.value(request) else {
                continue;
            };

            match target {
                Target::Field(name) => {
                    mapped.fields.insert(name.to_owned(), value);
                }
                Target::Grouped(name) => {
                    mapped.grouped.insert(name.to_owned(), value);
                }
                Target::Drop => diagnostics.push(Diagnostic::ParameterDropped {
                    provider: self.name.to_owned(),
                    parameter: param.to_string(),
                }),
                Target::Handled => {}
            }
        }

        (mapped, diagnostics)
    }

    /// Whether `error` is the vendor saying `model` does not exist
    pub fn is_model_not_found(&self, model: &str, error: &anyhow::Error) -> bool {
        let message = format!("{error:#}");
        let escaped = regex::escape(model);

        self.model_not_found.iter().any(|template| {
            let pattern = regex::escape(template).replace(r"\{model\}", &escaped);
            Regex::new(&pattern).is_ok_and(|re| re.is_match(&message))
        })
    }
}

const OPENAI_PARAMETERS: &[(Param, Target)] = &[
    (Param::MaxCompletionTokens, Target::Field("max_completion_tokens")),
    (Param::MaxTokens, Target::Field("max_tokens")),
    (Param::ContextWindow, Target::Drop),
    (Param::Logprobs, Target::Field("logprobs")),
    (Param::N, Target::Field("n")),
    (Param::ParallelToolCalls, Target::Field("parallel_tool_calls")),
    (Param::Temperature, Target::Field("temperature")),
    (Param::ReasoningEffort, Target::Field("reasoning_effort")),
    (Param::TopP, Target::Field("top_p")),
    (Param::LogitBias, Target::Field("logit_bias")),
    (Param::TopLogprobs, Target::Field("top_logprobs")),
    (Param::FrequencyPenalty, Target::Field("frequency_penalty")),
    (Param::PresencePenalty, Target::Field("presence_penalty")),
    (Param::Stop, Target::Field("stop")),
    (Param::Seed, Target::Field("seed")),
    (Param::Mirostat, Target::Drop),
    (Param::MirostatEta, Target::Drop),
    (Param::MirostatTau, Target::Drop),
    (Param::RepeatLastN, Target::Drop),
    (Param::TfsZ, Target::Drop),
    (Param::TopK, Target::Drop),
    (Param::MinP, Target::Drop),
];

const OPENAI_FINISH_REASONS: &[(&str, FinishReason)] = &[
    ("stop", FinishReason::Stop),
    ("length", FinishReason::Length),
    ("tool_calls", FinishReason::ToolCalls),
    ("function_call", FinishReason::ToolCalls),
    ("content_filter", FinishReason::ContentFilter),
];

pub static OPENAI: MappingTable = MappingTable {
    name: "openai",
    parameters: OPENAI_PARAMETERS,
    finish_reasons: OPENAI_FINISH_REASONS,
    tool_result_key: ToolResultKey::ToolCallId,
    system: SystemPlacement::Inline,
    max_images_per_message: None,
    model_not_found: &["The model `{model}` does not exist"],
};

pub static AZURE_OPENAI: MappingTable = MappingTable {
    name: "azure_openai",
    parameters: OPENAI_PARAMETERS,
    finish_reasons: OPENAI_FINISH_REASONS,
    tool_result_key: ToolResultKey::ToolCallId,
    system: SystemPlacement::Inline,
    max_images_per_message: None,
    model_not_found: &[
        "The API deployment for this resource does not exist",
        "DeploymentNotFound",
    ],
};

pub static ANTHROPIC: MappingTable = MappingTable {
    name: "anthropic",
    parameters: &[
        (Param::MaxCompletionTokens, Target::Field("max_tokens")),
        (Param::MaxTokens, Target::Field("max_tokens")),
        (Param::ContextWindow, Target::Drop),
        (Param::Logprobs, Target::Drop),
        (Param::N, Target::Drop),
        (Param::ParallelToolCalls, Target::Handled),
        (Param::Temperature, Target::Field("temperature")),
        (Param::ReasoningEffort, Target::Drop),
        (Param::TopP, Target::Field("top_p")),
        (Param::LogitBias, Target::Drop),
        (Param::TopLogprobs, Target::Drop),
        (Param::FrequencyPenalty, Target::Drop),
        (Param::PresencePenalty, Target::Drop),
        (Param::Stop, Target::Field("stop_sequences")),
        (Param::Seed, Target::Drop),
        (Param::Mirostat, Target::Drop),
        (Param::MirostatEta, Target::Drop),
        (Param::MirostatTau, Target::Drop),
        (Param::RepeatLastN, Target::Drop),
        (Param::TfsZ, Target::Drop),
        (Param::TopK, Target::Field("top_k")),
        (Param::MinP, Target::Drop),
    ],
    finish_reasons: &[
        ("end_turn", FinishReason::Stop),
        ("stop_sequence", FinishReason::Stop),
        ("max_tokens", FinishReason::Length),
        ("tool_use", FinishReason::ToolCalls),
        ("refusal", FinishReason::ContentFilter),
    ],
    tool_result_key: ToolResultKey::ToolUseId,
    system: SystemPlacement::Preamble,
    max_images_per_message: None,
    model_not_found: &["model: {model}"],
};

pub static GEMINI: MappingTable = MappingTable {
    name: "gemini",
    parameters: &[
        (Param::MaxCompletionTokens, Target::Grouped("maxOutputTokens")),
        (Param::MaxTokens, Target::Grouped("maxOutputTokens")),
        (Param::ContextWindow, Target::Drop),
        (Param::Logprobs, Target::Grouped("responseLogprobs")),
        (Param::N, Target::Grouped("candidateCount")),
        (Param::ParallelToolCalls, Target::Drop),
        (Param::Temperature, Target::Grouped("temperature")),
        (Param::ReasoningEffort, Target::Drop),
        (Param::TopP, Target::Grouped("topP")),
        (Param::LogitBias, Target::Drop),
        (Param::TopLogprobs, Target::Grouped("logprobs")),
        (Param::FrequencyPenalty, Target::Grouped("frequencyPenalty")),
        (Param::PresencePenalty, Target::Grouped("presencePenalty")),
        (Param::Stop, Target::Grouped("stopSequences")),
        (Param::Seed, Target::Grouped("seed")),
        (Param::Mirostat, Target::Drop),
        (Param::MirostatEta, Target::Drop),
        (Param::MirostatTau, Target::Drop),
        (Param::RepeatLastN, Target::Drop),
        (Param::TfsZ, Target::Drop),
        (Param::TopK, Target::Grouped("topK")),
        (Param::MinP, Target::Drop),
    ],
    finish_reasons: &[
        ("STOP", FinishReason::Stop),
        ("MAX_TOKENS", FinishReason::Length),
        ("SAFETY", FinishReason::ContentFilter),
        ("RECITATION", FinishReason::ContentFilter),
        ("BLOCKLIST", FinishReason::ContentFilter),
        ("PROHIBITED_CONTENT", FinishReason::ContentFilter),
        ("SPII", FinishReason::ContentFilter),
        ("IMAGE_SAFETY", FinishReason::ContentFilter),
    ],
    tool_result_key: ToolResultKey::FunctionName,
    system: SystemPlacement::Preamble,
    max_images_per_message: None,
    model_not_found: &["models/{model} is not found"],
};

pub static OLLAMA: MappingTable = MappingTable {
    name: "ollama",
    parameters: &[
        (Param::MaxCompletionTokens, Target::Grouped("num_predict")),
        (Param::MaxTokens, Target::Grouped("num_predict")),
        (Param::ContextWindow, Target::Grouped("num_ctx")),
        (Param::Logprobs, Target::Drop),
        (Param::N, Target::Drop),
        (Param::ParallelToolCalls, Target::Drop),
        (Param::Temperature, Target::Grouped("temperature")),
        (Param::ReasoningEffort, Target::Drop),
        (Param::TopP, Target::Grouped("top_p")),
        (Param::LogitBias, Target::Drop),
        (Param::TopLogprobs, Target::Drop),
        (Param::FrequencyPenalty, Target::Grouped("repeat_penalty")),
        (Param::PresencePenalty, Target::Drop),
        (Param::Stop, Target::Grouped("stop")),
        (Param::Seed, Target::Grouped("seed")),
        (Param::Mirostat, Target::Grouped("mirostat")),
        (Param::MirostatEta, Target::Grouped("mirostat_eta")),
        (Param::MirostatTau, Target::Grouped("mirostat_tau")),
        (Param::RepeatLastN, Target::Grouped("repeat_last_n")),
        (Param::TfsZ, Target::Grouped("tfs_z")),
        (Param::TopK, Target::Grouped("top_k")),
        (Param::MinP, Target::Grouped("min_p")),
    ],
    finish_reasons: &[("stop", FinishReason::Stop), ("length", FinishReason::Length)],
    tool_result_key: ToolResultKey::Omit,
    system: SystemPlacement::Inline,
    max_images_per_message: Some(1),
    model_not_found: &["model '{model}' not found", "model \"{model}\" not found"],
};

impl Provider {
    /// Mapping table for this provider
    pub const fn table(self) -> &'static MappingTable {
        match self {
            Self::OpenAi => &OPENAI,
            Self::AzureOpenAi => &AZURE_OPENAI,
            Self::Anthropic => &ANTHROPIC,
            Self::Gemini => &GEMINI,
            Self::Ollama => &OLLAMA,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::types::{Message, Stop};

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("m", vec![Message::user("hi")])
    }

    #[test]
    fn every_table_lists_every_parameter_once() {
        for provider in Provider::iter() {
            let table = provider.table();
            for param in Param::iter() {
                let count = table.parameters.iter().filter(|(p, _)| *p == param).count();
                assert_eq!(count, 1, "{} lists `{param}` {count} times", table.name);
            }
        }
    }

    #[test]
    fn provider_only_knobs_are_dropped_with_diagnostics() {
        let mut req = request();
        req.mirostat = Some(1);
        req.top_k = Some(40);
        req.min_p = Some(0.05);
        req.context_window = Some(8192);

        let (mapped, diagnostics) = OPENAI.map_parameters(&req);

        assert!(mapped.fields.is_empty());
        let dropped: Vec<_> = diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::ParameterDropped { parameter, .. } => parameter.as_str(),
                other => panic!("unexpected diagnostic {other:?}"),
            })
            .collect();
        assert_eq!(dropped, vec!["context_window", "mirostat", "top_k", "min_p"]);
    }

    #[test]
    fn ollama_groups_options_and_renames() {
        let mut req = request();
        req.frequency_penalty = Some(1.1);
        req.max_completion_tokens = Some(64);
        req.context_window = Some(4096);
        req.stop = Some(Stop::One("END".to_owned()));
        req.presence_penalty = Some(0.5);

        let (mapped, diagnostics) = OLLAMA.map_parameters(&req);

        assert!(mapped.fields.is_empty());
        assert_eq!(mapped.grouped["repeat_penalty"], 1.1);
        assert_eq!(mapped.grouped["num_predict"], 64);
        assert_eq!(mapped.grouped["num_ctx"], 4096);
        assert_eq!(mapped.grouped["stop"], serde_json::json!(["END"]));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn anthropic_renames_length_cap() {
        let mut req = request();
        req.max_completion_tokens = Some(100);
        req.parallel_tool_calls = Some(false);

        let (mapped, diagnostics) = ANTHROPIC.map_parameters(&req);

        assert_eq!(mapped.fields["max_tokens"], 100);
        assert!(!mapped.fields.contains_key("parallel_tool_calls"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unknown_finish_reason_is_other() {
        for provider in Provider::iter() {
            assert_eq!(provider.table().finish_reason("SOMETHING_NEW"), FinishReason::Other);
        }
        assert_eq!(GEMINI.finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(ANTHROPIC.finish_reason("tool_use"), FinishReason::ToolCalls);
    }

    #[test]
    fn model_not_found_matches_template() {
        let err = anyhow::anyhow!("model 'llama3.2' not found, try pulling it first");

        assert!(OLLAMA.is_model_not_found("llama3.2", &err));
        assert!(!OLLAMA.is_model_not_found("llama3", &err));
        assert!(!OPENAI.is_model_not_found("llama3.2", &err));
    }

    #[test]
    fn model_not_found_sees_error_context() {
        let err = anyhow::anyhow!("models/gemini-9 is not found for API version v1beta").context("request failed");
        assert!(GEMINI.is_model_not_found("gemini-9", &err));
    }
}
