//! YouTube Data API v3 comment client.

use super::{classify_http_status, classify_reqwest_error, CommentFetcher, FetchedComment};
use crate::config::YoutubeSettings;
use crate::error::{Result, StageFailure, StageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const COMMENT_THREADS_URL: &str = "https://www.googleapis.com/youtube/v3/commentThreads";

/// API error reasons that will not change on retry.
const PERMANENT_REASONS: &[&str] = &["commentsDisabled", "videoNotFound", "forbidden"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPage {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    snippet: ThreadSnippet,
    replies: Option<Replies>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: Comment,
}

#[derive(Debug, Deserialize)]
struct Replies {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: String,
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    author_display_name: String,
    text_original: Option<String>,
    #[serde(default)]
    text_display: String,
    #[serde(default)]
    like_count: i64,
    published_at: Option<DateTime<Utc>>,
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

impl From<Comment> for FetchedComment {
    fn from(comment: Comment) -> Self {
        let snippet = comment.snippet;
        FetchedComment {
            comment_id: comment.id,
            parent_comment_id: snippet.parent_id,
            author: snippet.author_display_name,
            text: snippet.text_original.unwrap_or(snippet.text_display),
            like_count: snippet.like_count,
            published_at: snippet.published_at,
        }
    }
}

/// Flatten a page of threads into comments, each top-level comment followed by its replies.
fn flatten_page(page: ThreadPage) -> Vec<FetchedComment> {
    let mut comments = Vec::new();
    for thread in page.items {
        let top = thread.snippet.top_level_comment;
        let top_id = top.id.clone();
        comments.push(FetchedComment::from(top));

        for reply in thread.replies.map(|r| r.comments).unwrap_or_default() {
            let mut reply = FetchedComment::from(reply);
            reply.parent_comment_id.get_or_insert_with(|| top_id.clone());
            comments.push(reply);
        }
    }
    comments
}

/// Classify an API error response.
fn classify_api_error(status: reqwest::StatusCode, body: &str) -> StageFailure {
    let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) else {
        return classify_http_status(status, "Comment request failed");
    };

    let reasons: Vec<&str> = parsed.error.errors.iter().map(|e| e.reason.as_str()).collect();
    let message = format!("{} ({})", parsed.error.message, reasons.join(", "));

    if reasons.iter().any(|r| PERMANENT_REASONS.contains(r)) {
        StageFailure::Permanent(message)
    } else {
        StageFailure::Transient(message)
    }
}

/// Comment fetcher backed by the `commentThreads` endpoint.
///
/// Pages are requested one at a time with a fixed delay in between.
/// Without an API key every fetch fails transiently, so videos stay pending
/// until a key is configured.
pub struct YoutubeCommentClient {
    http: reqwest::Client,
    api_key: Option<String>,
    page_size: u32,
    page_delay: Duration,
}

impl YoutubeCommentClient {
    pub fn new(settings: &YoutubeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: settings.resolved_api_key(),
            page_size: settings.comment_page_size.clamp(1, 100),
            page_delay: Duration::from_millis(settings.comment_request_delay_ms),
        })
    }

    fn page_url(&self, video_id: &str, page_token: Option<&str>) -> StageResult<Url> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            StageFailure::Transient(
                "YouTube API key not set. Set YOUTUBE_API_KEY or youtube.api_key".to_string(),
            )
        })?;
        let page_size = self.page_size.to_string();
        let mut params = vec![
            ("part", "snippet,replies"),
            ("videoId", video_id),
            ("maxResults", page_size.as_str()),
            ("textFormat", "plainText"),
            ("key", api_key),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        Url::parse_with_params(COMMENT_THREADS_URL, &params)
            .map_err(|e| StageFailure::Transient(format!("Invalid comment URL: {}", e)))
    }

    async fn fetch_page(&self, video_id: &str, page_token: Option<&str>) -> StageResult<ThreadPage> {
        let url = self.page_url(video_id, page_token)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, "Comment request failed"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e, "Comment request failed"))?;

        if !status.is_success() {
            return Err(classify_api_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| StageFailure::Transient(format!("Malformed comment response: {}", e)))
    }
}

#[async_trait]
impl CommentFetcher for YoutubeCommentClient {
    #[instrument(skip(self))]
    async fn fetch_comments(&self, video_id: &str) -> StageResult<Vec<FetchedComment>> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            if pages > 0 {
                tokio::time::sleep(self.page_delay).await;
            }
            let page = self.fetch_page(video_id, page_token.as_deref()).await?;
            pages += 1;
            page_token = page.next_page_token.clone();
            comments.extend(flatten_page(page));

            if page_token.is_none() {
                break;
            }
        }

        debug!("Fetched {} comments in {} pages", comments.len(), pages);
        Ok(comments)
    }
}
