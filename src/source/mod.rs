//! Raw content sources.
//!
//! Collaborators that talk to YouTube. Every call reports a classified
//! [`StageFailure`] so the pipeline can tell "never retry" from "retry later"
//! without looking at error text.

mod captions;
mod comments;
mod youtube;

pub use captions::parse_json3;
pub use comments::YoutubeCommentClient;
pub use youtube::YoutubeSource;

use crate::error::{StageFailure, StageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One video as reported by a channel listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoListing {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u32>,
    pub view_count: i64,
    pub like_count: i64,
}

/// A channel and its current uploads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelListing {
    /// Display name, if the source reported one.
    pub name: Option<String>,
    pub videos: Vec<VideoListing>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTranscript {
    /// Text with `[HH:MM:SS]` markers.
    pub text: String,
    pub language: String,
    pub was_translated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedComment {
    pub comment_id: String,
    /// Set for replies.
    pub parent_comment_id: Option<String>,
    pub author: String,
    pub text: String,
    pub like_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Lists the videos of a channel.
#[async_trait]
pub trait VideoLister: Send + Sync {
    async fn list_videos(&self, channel_id: &str) -> StageResult<ChannelListing>;
}

/// Downloads the transcript of a video.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str) -> StageResult<FetchedTranscript>;
}

/// Downloads all comments of a video, replies included.
#[async_trait]
pub trait CommentFetcher: Send + Sync {
    async fn fetch_comments(&self, video_id: &str) -> StageResult<Vec<FetchedComment>>;
}

/// Classify a failed HTTP status. Rate limits and server errors are retryable.
pub(crate) fn classify_http_status(status: reqwest::StatusCode, context: &str) -> StageFailure {
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        StageFailure::Permanent(format!("{}: HTTP {}", context, status))
    } else {
        StageFailure::Transient(format!("{}: HTTP {}", context, status))
    }
}

/// Classify a transport-level error.
pub(crate) fn classify_reqwest_error(err: &reqwest::Error, context: &str) -> StageFailure {
    match err.status() {
        Some(status) => classify_http_status(status, context),
        None => StageFailure::Transient(format!("{}: {}", context, err)),
    }
}
