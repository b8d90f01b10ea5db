//! AI processing stages.
//!
//! Stage 1 turns a video's raw transcript and comments into topic summaries.
//! Stage 2 breaks one topic summary into atomic insights. Both are opaque
//! collaborators behind traits; their output only reaches the store after
//! passing [`validate_topics`] / [`validate_insights`].

mod openai;
mod validate;

pub use openai::{OpenAiInsightAtomizer, OpenAiTopicExtractor};
pub use validate::{popularity_weight, validate_insights, validate_topics};

use crate::error::StageResult;
use crate::store::{InsightType, RawComment, TopicSource, TopicSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything stage 1 gets to see for one video.
#[derive(Debug, Clone)]
pub struct Stage1Input {
    pub video_id: String,
    pub title: String,
    /// Concatenated raw transcripts, `None` when no transcript was downloaded.
    pub transcript: Option<String>,
    /// Raw comments, most liked first.
    pub comments: Vec<RawComment>,
}

impl Stage1Input {
    pub fn has_content(&self) -> bool {
        self.transcript.as_deref().is_some_and(|t| !t.trim().is_empty()) || !self.comments.is_empty()
    }
}

/// A topic as the model returned it, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTopic {
    pub title: String,
    /// May contain inline `{text [HH:MM:SS]}` citations.
    pub summary: String,
    pub source_type: TopicSource,
    #[serde(default)]
    pub comment_id: Option<String>,
    pub confidence_score: i64,
}

/// Input for atomizing one topic.
#[derive(Debug, Clone)]
pub struct Stage2Input {
    pub video_title: String,
    pub topic: TopicSummary,
}

/// An insight as the model returned it, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInsight {
    pub insight_type: InsightType,
    /// May contain inline `{text [HH:MM:SS]}` citations.
    pub insight_text: String,
    pub confidence_score: i64,
}

/// Stage 1 collaborator.
#[async_trait]
pub trait TopicExtractor: Send + Sync {
    async fn extract(&self, input: &Stage1Input) -> StageResult<Vec<ExtractedTopic>>;
}

/// Stage 2 collaborator.
#[async_trait]
pub trait InsightAtomizer: Send + Sync {
    async fn atomize(&self, input: &Stage2Input) -> StageResult<Vec<ExtractedInsight>>;
}
