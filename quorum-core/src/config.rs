use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct QuorumConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub oracle: OracleSettings,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Summarization-oracle section of quorum.toml. The API key itself comes
/// from the environment, not the config file.
#[derive(Debug, Deserialize, Clone)]
pub struct OracleSettings {
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_output_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Segments shorter than this many characters are never analyzed.
    pub min_text_chars: usize,
    /// Oracle confidence below this never becomes a suggestion.
    pub min_confidence: f64,
    /// Suggestion previews are truncated to this many characters.
    pub preview_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            min_confidence: 0.7,
            preview_chars: 100,
        }
    }
}

impl QuorumConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
