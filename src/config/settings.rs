//! Configuration settings for Tubeminer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub youtube: YoutubeSettings,
    pub concurrency: ConcurrencySettings,
    pub models: ModelSettings,
    pub pipeline: PipelineSettings,
    pub usage: UsageSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// SQLite database path. Defaults to `<data_dir>/tubeminer.db`.
    pub database_path: Option<String>,
    /// Also write logs to this file.
    pub log_file: Option<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.tubeminer".to_string(),
            database_path: None,
            log_file: None,
        }
    }
}

/// YouTube access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// YouTube Data API key, used for comments. Falls back to `YOUTUBE_API_KEY`.
    pub api_key: Option<String>,
    /// Channels processed by `tubeminer run`.
    pub channel_ids: Vec<String>,
    /// Pause between comment API requests.
    pub comment_request_delay_ms: u64,
    /// Comment threads per API page (max 100).
    pub comment_page_size: u32,
    /// Preferred transcript languages, in order.
    pub transcript_languages: Vec<String>,
    /// Only list the most recent N uploads per channel.
    pub max_videos_per_channel: Option<usize>,
    /// Timeout for individual HTTP requests.
    pub request_timeout_secs: u64,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            channel_ids: Vec::new(),
            comment_request_delay_ms: 1000,
            comment_page_size: 100,
            transcript_languages: vec!["en".to_string()],
            max_videos_per_channel: None,
            request_timeout_secs: 30,
        }
    }
}

impl YoutubeSettings {
    /// API key from config, else from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("YOUTUBE_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Concurrency caps. Comment fetching is always sequential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    pub transcript_fetch: usize,
    pub stage1: usize,
    pub stage2: usize,
    pub embedding: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            transcript_fetch: 100,
            stage1: 100,
            stage2: 50,
            embedding: 100,
        }
    }
}

/// AI model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// OpenAI API key. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Alternative OpenAI-compatible endpoint.
    pub api_base: Option<String>,
    /// Cheaper model for topic extraction.
    pub stage1_model: String,
    /// Stronger model for atomization.
    pub stage2_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: u32,
    /// Timeout for a single model request.
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            stage1_model: "gpt-4.1-mini".to_string(),
            stage2_model: "gpt-4.1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 768,
            request_timeout_secs: 300,
        }
    }
}

impl ModelSettings {
    /// API key from config, else from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Last phase a full run executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StopAfter {
    /// Discovery plus transcript and comment downloads.
    Downloads,
    Stage1,
    Stage2,
    Embedding,
}

impl std::str::FromStr for StopAfter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "downloads" | "download" => Ok(StopAfter::Downloads),
            "stage1" | "stage_1" => Ok(StopAfter::Stage1),
            "stage2" | "stage_2" => Ok(StopAfter::Stage2),
            "embedding" | "stage3" | "stage_3" => Ok(StopAfter::Embedding),
            _ => Err(format!("Unknown stop point: {}", s)),
        }
    }
}

impl std::fmt::Display for StopAfter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopAfter::Downloads => write!(f, "downloads"),
            StopAfter::Stage1 => write!(f, "stage1"),
            StopAfter::Stage2 => write!(f, "stage2"),
            StopAfter::Embedding => write!(f, "embedding"),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Stop a full run after this phase. Unset runs everything.
    pub stop_after: Option<StopAfter>,
    /// Videos pulled from the status store per batch.
    pub batch_size: usize,
    /// Seconds between heartbeat log lines during a full run. 0 disables.
    pub heartbeat_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stop_after: None,
            batch_size: 500,
            heartbeat_secs: 30,
        }
    }
}

/// Published limits and prices of one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelLimits {
    /// Requests per minute.
    pub rpm: u64,
    /// Tokens per minute.
    pub tpm: u64,
    /// USD per 1M input tokens.
    pub input_price: f64,
    /// USD per 1M output tokens.
    pub output_price: f64,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            rpm: 500,
            tpm: 200_000,
            input_price: 0.0,
            output_price: 0.0,
        }
    }
}

/// Usage monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSettings {
    /// Warn when the per-minute rate crosses these percentages of a limit.
    pub warning_thresholds: Vec<u8>,
    /// Log a usage summary every N requests.
    pub log_every_requests: u64,
    /// Log a usage summary every X tokens.
    pub log_every_tokens: u64,
    /// Limits and prices keyed by model name.
    pub models: HashMap<String, ModelLimits>,
}

impl Default for UsageSettings {
    fn default() -> Self {
        let models = [
            ("gpt-4.1-mini", 5_000, 4_000_000, 0.40, 1.60),
            ("gpt-4.1", 5_000, 2_000_000, 2.00, 8.00),
            ("gpt-4o-mini", 5_000, 4_000_000, 0.15, 0.60),
            ("text-embedding-3-small", 5_000, 5_000_000, 0.02, 0.0),
            ("text-embedding-3-large", 5_000, 5_000_000, 0.13, 0.0),
        ]
        .into_iter()
        .map(|(name, rpm, tpm, input_price, output_price)| {
            (
                name.to_string(),
                ModelLimits {
                    rpm,
                    tpm,
                    input_price,
                    output_price,
                },
            )
        })
        .collect();

        Self {
            warning_thresholds: vec![50, 75, 90],
            log_every_requests: 100,
            log_every_tokens: 1_000_000,
            models,
        }
    }
}

impl UsageSettings {
    /// Limits for `model`, or conservative defaults for unknown models.
    pub fn limits_for(&self, model: &str) -> ModelLimits {
        self.models.get(model).cloned().unwrap_or_default()
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubeminer")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.general.database_path {
            Some(path) => Self::expand_path(path),
            None => self.data_dir().join("tubeminer.db"),
        }
    }

    /// Get the expanded log file path, if file logging is enabled.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.general.log_file.as_deref().map(Self::expand_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency.transcript_fetch, 100);
        assert_eq!(settings.concurrency.stage2, 50);
        assert_eq!(settings.models.embedding_dimensions, 768);
        assert_eq!(settings.usage.warning_thresholds, vec![50, 75, 90]);
        assert!(settings.pipeline.stop_after.is_none());
        assert!(settings.database_path().ends_with("tubeminer.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [youtube]
            channel_ids = ["UC1", "@handle"]

            [pipeline]
            stop_after = "stage1"

            [usage.models."my-model"]
            rpm = 10
            "#,
        )
        .unwrap();

        assert_eq!(settings.youtube.channel_ids, vec!["UC1", "@handle"]);
        assert_eq!(settings.youtube.comment_request_delay_ms, 1000);
        assert_eq!(settings.pipeline.stop_after, Some(StopAfter::Stage1));
        assert_eq!(settings.pipeline.batch_size, 500);
        assert_eq!(settings.usage.limits_for("my-model").rpm, 10);
        assert_eq!(settings.usage.limits_for("my-model").tpm, 200_000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[general]\ndatabase_path = \"/tmp/x.db\"\n\n[pipeline]\nstop_after = \"downloads\"\n",
        )
        .unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.database_path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(loaded.pipeline.stop_after, Some(StopAfter::Downloads));

        let missing = Settings::load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(missing.pipeline.batch_size, 500);
    }

    #[test]
    fn test_stop_after_parse_and_order() {
        assert_eq!("stage_3".parse::<StopAfter>().unwrap(), StopAfter::Embedding);
        assert!(StopAfter::Downloads < StopAfter::Stage1);
        assert!("later".parse::<StopAfter>().is_err());
    }
}
