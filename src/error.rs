//! Error types for Tubeminer.

use thiserror::Error;

/// Library-level error type for Tubeminer operations.
#[derive(Error, Debug)]
pub enum TubeminerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Video source error: {0}")]
    Source(String),

    #[error("AI processing failed: {0}")]
    Processing(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Tubeminer operations.
pub type Result<T> = std::result::Result<T, TubeminerError>;

/// Result type alias for calls into external collaborators.
pub type StageResult<T> = std::result::Result<T, StageFailure>;

/// Classified failure reported by an external collaborator (fetcher, AI model, embedder).
///
/// The pipeline schedules purely on this classification and never inspects
/// the reason text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// The source reports the feature as unavailable. Never retried.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Timeout, rate limit, transport error. Retried on the next pass.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Output did not satisfy the expected schema. Retried like a transient failure.
    #[error("validation failure: {0}")]
    Validation(String),
}

impl StageFailure {
    /// Whether the failure is terminal for the stage.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StageFailure::Permanent(_))
    }

    /// The reason text, without classification prefix.
    pub fn reason(&self) -> &str {
        match self {
            StageFailure::Permanent(r) | StageFailure::Transient(r) | StageFailure::Validation(r) => r,
        }
    }
}

impl From<StageFailure> for TubeminerError {
    fn from(failure: StageFailure) -> Self {
        TubeminerError::Source(failure.to_string())
    }
}
