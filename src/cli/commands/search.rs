//! Search command implementation.

use super::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAiEmbedder;
use crate::openai::create_client;
use crate::search::{SearchMode, Searcher};
use crate::usage::UsageTracker;
use anyhow::Result;
use std::sync::Arc;

/// Run the search command.
pub async fn run_search(
    query: &str,
    mode: SearchMode,
    limit: usize,
    min_score: f32,
    settings: Settings,
) -> Result<()> {
    let operation = match mode {
        SearchMode::Text => Operation::TextSearch,
        SearchMode::Semantic | SearchMode::Hybrid => Operation::SemanticSearch,
    };
    preflight::check(operation, &settings)?;

    let store = open_store(&settings)?;
    let mut searcher = Searcher::new(store).with_min_similarity(min_score);
    if mode != SearchMode::Text {
        let models = &settings.models;
        let usage = Arc::new(UsageTracker::new("search", &models.embedding_model, &settings.usage));
        let embedder = OpenAiEmbedder::new(
            create_client(models)?,
            &models.embedding_model,
            models.embedding_dimensions as usize,
            usage,
        );
        searcher = searcher.with_embedder(Arc::new(embedder));
    }

    let spinner = Output::spinner("Searching...");
    let results = searcher.search(query, mode, limit).await;
    spinner.finish_and_clear();

    match results {
        Ok(hits) => {
            if hits.is_empty() {
                Output::warning("No insights found matching your query.");
            } else {
                Output::success(&format!("Found {} insights", hits.len()));
                for hit in &hits {
                    Output::search_hit(hit);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
