//! OpenAI client construction.

use crate::config::ModelSettings;
use crate::error::Result;
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;
use tracing::warn;

/// Create an OpenAI client from model settings.
///
/// Without a key in the config or `OPENAI_API_KEY` the client is still built;
/// its requests fail with an authentication error, which the AI stages treat
/// as retryable.
pub fn create_client(settings: &ModelSettings) -> Result<Client<OpenAIConfig>> {
    let mut config = OpenAIConfig::new();
    match settings.resolved_api_key() {
        Some(key) => config = config.with_api_key(key),
        None => warn!("OpenAI API key not set. Set OPENAI_API_KEY or models.api_key"),
    }
    if let Some(base) = &settings.api_base {
        config = config.with_api_base(base);
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;

    Ok(Client::with_config(config).with_http_client(http_client))
}
