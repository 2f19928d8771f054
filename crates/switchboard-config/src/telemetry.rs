use serde::Deserialize;

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `tracing` filter directives, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Output format of log lines
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: TelemetryConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn json_format() {
        let config: TelemetryConfig = toml::from_str("log_filter = \"switchboard=debug\"\nformat = \"json\"").unwrap();
        assert_eq!(config.log_filter, "switchboard=debug");
        assert_eq!(config.format, LogFormat::Json);
    }
}
