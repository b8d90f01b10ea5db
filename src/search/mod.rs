//! Search over atomic insights.
//!
//! Text search uses the FTS5 index, semantic search compares the query
//! embedding against stored insight vectors, hybrid fuses both rankings.

mod fusion;

pub use fusion::{reciprocal_rank_fusion, RRF_K};

use crate::embedding::Embedder;
use crate::error::{Result, TubeminerError};
use crate::store::{InsightType, Store};
use crate::timestamps::youtube_link;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default minimum cosine similarity for semantic hits.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.25;

/// Hybrid search ranks this many candidates per method for each requested hit.
const HYBRID_POOL_FACTOR: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchMode {
    Text,
    Semantic,
    Hybrid,
}

/// One insight hit with enough context to cite it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub insight_id: i64,
    pub score: f64,
    pub text: String,
    pub insight_type: InsightType,
    pub confidence: u8,
    pub topic_title: String,
    pub video_id: String,
    pub video_title: String,
    pub timestamp: Option<String>,
    pub link: String,
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Turn free text into an FTS5 query: every word quoted, any word may match.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

pub struct Searcher {
    store: Arc<Store>,
    embedder: Option<Arc<dyn Embedder>>,
    min_similarity: f32,
}

impl Searcher {
    /// A searcher that can only do text search until an embedder is set.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            embedder: None,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub async fn search(&self, query: &str, mode: SearchMode, limit: usize) -> Result<Vec<SearchHit>> {
        match mode {
            SearchMode::Text => self.search_text(query, limit),
            SearchMode::Semantic => self.search_semantic(query, limit).await,
            SearchMode::Hybrid => self.search_hybrid(query, limit).await,
        }
    }

    /// bm25 keyword search.
    #[instrument(skip(self))]
    pub fn search_text(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let ranked = self.rank_text(query, limit)?;
        self.hydrate(ranked)
    }

    /// Cosine similarity against stored insight vectors.
    #[instrument(skip(self))]
    pub async fn search_semantic(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let ranked = self.rank_semantic(query, limit).await?;
        self.hydrate(ranked)
    }

    /// Both rankings fused with reciprocal rank fusion.
    #[instrument(skip(self))]
    pub async fn search_hybrid(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let pool = limit.saturating_mul(HYBRID_POOL_FACTOR).max(limit);
        let text = self.rank_text(query, pool)?;
        let semantic = self.rank_semantic(query, pool).await?;
        debug!(text = text.len(), semantic = semantic.len(), "Fusing rankings");

        let rankings = [
            text.into_iter().map(|(id, _)| id).collect(),
            semantic.into_iter().map(|(id, _)| id).collect(),
        ];
        let mut fused = reciprocal_rank_fusion(&rankings, RRF_K);
        fused.truncate(limit);
        self.hydrate(fused)
    }

    fn rank_text(&self, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        match fts_query(query) {
            Some(fts) => self.store.search_insights_fts(&fts, limit),
            None => Ok(Vec::new()),
        }
    }

    async fn rank_semantic(&self, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            TubeminerError::Config("Semantic search needs an embedding model".to_string())
        })?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = embedder.embed(query).await?;

        let mut scored: Vec<(i64, f64)> = self
            .store
            .insight_embeddings()?
            .into_iter()
            .map(|(id, embedding)| (id, cosine_similarity(&query_embedding, &embedding)))
            .filter(|(_, score)| *score >= self.min_similarity)
            .map(|(id, score)| (id, score as f64))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);
        Ok(scored)
    }

    fn hydrate(&self, ranked: Vec<(i64, f64)>) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::with_capacity(ranked.len());
        for (insight_id, score) in ranked {
            let Some(context) = self.store.insight_context(insight_id)? else {
                continue;
            };
            let timestamp = context.first_timestamp().map(str::to_string);
            hits.push(SearchHit {
                insight_id,
                score,
                link: youtube_link(&context.video_id, timestamp.as_deref()),
                timestamp,
                text: context.insight.text,
                insight_type: context.insight.insight_type,
                confidence: context.insight.confidence,
                topic_title: context.topic_title,
                video_id: context.video_id,
                video_title: context.video_title,
            });
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageResult;
    use crate::source::VideoListing;
    use crate::store::{insert_insight, insert_topic, set_insight_embedding, NewInsight, NewTopic, TopicSource};
    use async_trait::async_trait;

    /// Maps "revenue" to the x axis, everything else to y.
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, text: &str) -> StageResult<Vec<f32>> {
            Ok(if text.contains("revenue") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> StageResult<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn store_with_insights() -> Arc<Store> {
        let store = Arc::new(Store::in_memory().unwrap());
        store.upsert_channel("UC1", "Channel").unwrap();
        store
            .insert_video(
                "UC1",
                &VideoListing {
                    video_id: "dQw4w9WgXcQ".to_string(),
                    title: "Growth stories".to_string(),
                    published_at: None,
                    duration_seconds: None,
                    view_count: 0,
                    like_count: 0,
                },
            )
            .unwrap();

        store
            .transaction(|tx| {
                let summary_id = insert_topic(
                    tx,
                    "dQw4w9WgXcQ",
                    &NewTopic {
                        title: "Pricing".to_string(),
                        summary: "Price changes".to_string(),
                        timestamps: vec!["00:02:00".to_string()],
                        source: TopicSource::Transcript,
                        comment_id: None,
                        popularity_weight: None,
                        confidence: 80,
                    },
                )?;
                let rows = [
                    ("Annual plans doubled revenue", vec!["00:01:30".to_string()], Some(vec![1.0f32, 0.0])),
                    ("Customers dislike seat pricing", vec![], Some(vec![0.0f32, 1.0])),
                    ("Revenue per user fell after the trial", vec![], None),
                ];
                for (text, timestamps, embedding) in rows {
                    let id = insert_insight(
                        tx,
                        summary_id,
                        &NewInsight {
                            insight_type: InsightType::Qualitative,
                            confidence: 70,
                            text: text.to_string(),
                            timestamps,
                        },
                    )?;
                    if let Some(embedding) = embedding {
                        set_insight_embedding(tx, id, &embedding)?;
                    }
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("annual \"plans"), Some("\"annual\" OR \"\"\"plans\"".to_string()));
        assert_eq!(fts_query("   "), None);
    }

    #[test]
    fn test_text_search_links_first_timestamp() {
        let searcher = Searcher::new(store_with_insights());
        let hits = searcher.search_text("annual", 10).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Annual plans doubled revenue");
        assert_eq!(hits[0].topic_title, "Pricing");
        assert_eq!(hits[0].timestamp.as_deref(), Some("00:01:30"));
        assert_eq!(hits[0].link, youtube_link("dQw4w9WgXcQ", Some("00:01:30")));
    }

    #[test]
    fn test_text_search_falls_back_to_topic_timestamp() {
        let searcher = Searcher::new(store_with_insights());
        let hits = searcher.search_text("seat", 10).unwrap();
        assert_eq!(hits[0].timestamp.as_deref(), Some("00:02:00"));
    }

    #[tokio::test]
    async fn test_semantic_search_skips_unembedded_insights() {
        let searcher = Searcher::new(store_with_insights()).with_embedder(Arc::new(AxisEmbedder));
        let hits = searcher.search_semantic("revenue", 10).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Annual plans doubled revenue");
    }

    #[tokio::test]
    async fn test_semantic_search_needs_embedder() {
        let searcher = Searcher::new(store_with_insights());
        assert!(searcher.search_semantic("revenue", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_hybrid_prefers_items_found_by_both() {
        let searcher = Searcher::new(store_with_insights()).with_embedder(Arc::new(AxisEmbedder));
        let hits = searcher.search_hybrid("revenue", 10).await.unwrap();

        assert_eq!(hits[0].text, "Annual plans doubled revenue");
        assert!(hits.iter().any(|h| h.text.starts_with("Revenue per user")));
    }
}
