//! OpenAI embeddings implementation.

use super::Embedder;
use crate::error::{StageFailure, StageResult};
use crate::usage::UsageTracker;
use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// OpenAI limit on inputs per request.
const BATCH_SIZE: usize = 100;

/// OpenAI-based embedder.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: usize,
    usage: Arc<UsageTracker>,
}

impl OpenAiEmbedder {
    pub fn new(
        client: Client<OpenAIConfig>,
        model: &str,
        dimensions: usize,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            dimensions,
            usage,
        }
    }
}

/// Every vector must have the configured length.
fn check_dimensions(embeddings: &[Vec<f32>], expected: usize) -> StageResult<()> {
    match embeddings.iter().find(|e| e.len() != expected) {
        Some(bad) => Err(StageFailure::Validation(format!(
            "Embedding has {} dimensions, expected {}",
            bad.len(),
            expected
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> StageResult<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| StageFailure::Validation("Empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> StageResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(EmbeddingInput::StringArray(chunk.to_vec()))
                .dimensions(self.dimensions as u32)
                .build()
                .map_err(|e| StageFailure::Transient(format!("Failed to build request: {}", e)))?;

            let response = self
                .client
                .embeddings()
                .create(request)
                .await
                .map_err(|e| StageFailure::Transient(format!("Embedding API error: {}", e)))?;

            self.usage.record(response.usage.prompt_tokens as u64, 0);

            if response.data.len() != chunk.len() {
                return Err(StageFailure::Validation(format!(
                    "Asked for {} embeddings, got {}",
                    chunk.len(),
                    response.data.len()
                )));
            }

            let mut embeddings: Vec<_> = response.data.into_iter().collect();
            embeddings.sort_by_key(|e| e.index);
            all_embeddings.extend(embeddings.into_iter().map(|e| e.embedding));
        }

        check_dimensions(&all_embeddings, self.dimensions)?;
        debug!("Generated {} embeddings", all_embeddings.len());
        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&[vec![0.0; 4], vec![1.0; 4]], 4).is_ok());
        let err = check_dimensions(&[vec![0.0; 4], vec![1.0; 3]], 4).unwrap_err();
        assert!(matches!(err, StageFailure::Validation(_)));
    }
}
