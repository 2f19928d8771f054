use serde::Deserialize;

/// Provider names accepted by `default_provider`
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "azure_openai", "ollama", "anthropic", "gemini"];

/// LLM configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider used when a call does not name one
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Anthropic Messages settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
    /// Gemini `generateContent` settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Anthropic settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// `max_tokens` sent when the request sets no token limit
    ///
    /// Anthropic rejects requests without one.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
        }
    }
}

/// Gemini settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiConfig {
    /// Ask Gemini not to execute tool calls on its own
    #[serde(default = "default_true")]
    pub disable_automatic_function_calling: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            disable_automatic_function_calling: true,
        }
    }
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_uses_defaults() {
        let config: LlmConfig = toml::from_str("").unwrap();
        assert_eq!(config.default_provider, None);
        assert_eq!(config.anthropic.default_max_tokens, 4096);
        assert!(config.gemini.disable_automatic_function_calling);
    }

    #[test]
    fn default_impl_matches_serde_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.anthropic.default_max_tokens, 4096);
        assert!(config.gemini.disable_automatic_function_calling);
    }

    #[test]
    fn deserialize_full_section() {
        let toml = r#"
            default_provider = "anthropic"

            [anthropic]
            default_max_tokens = 1024

            [gemini]
            disable_automatic_function_calling = false
        "#;

        let config: LlmConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_provider.as_deref(), Some("anthropic"));
        assert_eq!(config.anthropic.default_max_tokens, 1024);
        assert!(!config.gemini.disable_automatic_function_calling);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<LlmConfig>("[anthropic]\nmax_token = 10").unwrap_err();
        assert!(err.to_string().contains("max_token"));
    }
}
