//! Persisted record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a topic summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicSource {
    Transcript,
    Comment,
}

impl TopicSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSource::Transcript => "transcript",
            TopicSource::Comment => "comment",
        }
    }
}

impl std::str::FromStr for TopicSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "transcript" => Ok(TopicSource::Transcript),
            "comment" => Ok(TopicSource::Comment),
            _ => Err(format!("Unknown topic source: {}", s)),
        }
    }
}

impl std::fmt::Display for TopicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an atomic insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    /// Numbers, metrics, measurable facts.
    Quantitative,
    /// Descriptions, processes, opinions.
    Qualitative,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::Quantitative => "quantitative",
            InsightType::Qualitative => "qualitative",
        }
    }
}

impl std::str::FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "quantitative" => Ok(InsightType::Quantitative),
            "qualitative" => Ok(InsightType::Qualitative),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked YouTube channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub name: String,
}

/// A discovered video. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
    /// View count at discovery time.
    pub view_count: i64,
    /// Like count at discovery time.
    pub like_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTranscript {
    pub transcript_id: i64,
    pub video_id: String,
    pub language: String,
    /// Transcript text with `[HH:MM:SS]` markers.
    pub text: String,
    pub was_translated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawComment {
    pub comment_id: String,
    pub video_id: String,
    pub parent_comment_id: Option<String>,
    pub author: String,
    pub text: String,
    pub like_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Stage 1 output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub summary_id: i64,
    pub video_id: String,
    pub title: String,
    pub summary: String,
    pub timestamps: Vec<String>,
    pub source: TopicSource,
    pub comment_id: Option<String>,
    /// `ln(1 + likes)` of the referenced comment, for comment topics only.
    pub popularity_weight: Option<f64>,
    pub confidence: u8,
}

/// Stage 2 output row, with its stage 3 vector once embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicInsight {
    pub insight_id: i64,
    pub summary_id: i64,
    pub insight_type: InsightType,
    pub confidence: u8,
    pub text: String,
    pub timestamps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A topic summary ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTopic {
    pub title: String,
    pub summary: String,
    pub timestamps: Vec<String>,
    pub source: TopicSource,
    pub comment_id: Option<String>,
    pub popularity_weight: Option<f64>,
    pub confidence: u8,
}

/// An atomic insight ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInsight {
    pub insight_type: InsightType,
    pub confidence: u8,
    pub text: String,
    pub timestamps: Vec<String>,
}

/// An insight with the topic and video it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightContext {
    pub insight: AtomicInsight,
    pub topic_title: String,
    pub topic_timestamps: Vec<String>,
    pub video_id: String,
    pub video_title: String,
}

impl InsightContext {
    /// The insight's own first timestamp, falling back to the topic's.
    pub fn first_timestamp(&self) -> Option<&str> {
        self.insight
            .timestamps
            .first()
            .or_else(|| self.topic_timestamps.first())
            .map(String::as_str)
    }
}
