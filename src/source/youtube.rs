//! Channel listing and transcript download through yt-dlp.

use super::{
    captions::parse_json3, classify_http_status, classify_reqwest_error, ChannelListing,
    FetchedTranscript, TranscriptFetcher, VideoListing, VideoLister,
};
use crate::config::YoutubeSettings;
use crate::error::{Result, StageFailure, StageResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

/// yt-dlp stderr fragments that mean the video will never become available.
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video has been removed",
    "members-only",
    "This channel does not exist",
    "does not exist",
];

/// YouTube source backed by the `yt-dlp` binary.
pub struct YoutubeSource {
    http: reqwest::Client,
    languages: Vec<String>,
    max_videos: Option<usize>,
}

impl YoutubeSource {
    pub fn new(settings: &YoutubeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            languages: settings.transcript_languages.clone(),
            max_videos: settings.max_videos_per_channel,
        })
    }

    /// Uploads page for a channel id, handle or URL.
    fn channel_url(channel: &str) -> String {
        if channel.starts_with("http://") || channel.starts_with("https://") {
            channel.to_string()
        } else if channel.starts_with('@') {
            format!("https://www.youtube.com/{}/videos", channel)
        } else {
            format!("https://www.youtube.com/channel/{}/videos", channel)
        }
    }

    async fn run_ytdlp(&self, args: &[&str]) -> StageResult<String> {
        let output = Command::new("yt-dlp")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StageFailure::Transient("yt-dlp not found in PATH".to_string())
                } else {
                    StageFailure::Transient(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_ytdlp_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Map yt-dlp's stderr to a failure class.
fn classify_ytdlp_stderr(stderr: &str) -> StageFailure {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();

    if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        StageFailure::Permanent(message)
    } else {
        StageFailure::Transient(message)
    }
}

/// yt-dlp reports dates as `YYYYMMDD`.
fn parse_upload_date(json: &Value) -> Option<DateTime<Utc>> {
    if let Some(ts) = json["timestamp"].as_i64() {
        return DateTime::from_timestamp(ts, 0);
    }
    json["upload_date"]
        .as_str()
        .filter(|s| s.len() == 8)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_listing_entry(json: &Value) -> Option<VideoListing> {
    let video_id = json["id"].as_str()?.to_string();
    // Flat playlists of a channel page can contain nested tabs; only videos have 11-char ids.
    if video_id.len() != 11 {
        return None;
    }

    Some(VideoListing {
        video_id,
        title: json["title"].as_str().unwrap_or("Unknown Title").to_string(),
        published_at: parse_upload_date(json),
        duration_seconds: json["duration"].as_f64().map(|d| d as u32),
        view_count: json["view_count"].as_i64().unwrap_or(0),
        like_count: json["like_count"].as_i64().unwrap_or(0),
    })
}

/// A caption track chosen from yt-dlp's metadata.
#[derive(Debug, Clone, PartialEq)]
struct CaptionChoice {
    url: String,
    language: String,
    was_translated: bool,
}

fn json3_url(tracks: &Value) -> Option<String> {
    tracks
        .as_array()?
        .iter()
        .find(|t| t["ext"].as_str() == Some("json3"))
        .and_then(|t| t["url"].as_str())
        .map(str::to_string)
}

/// Pick the best caption track.
///
/// Manual subtitles in a preferred language come first, then automatic
/// captions. An automatic track is translated when its language differs
/// from the video's spoken language (`-orig` tracks never are).
fn choose_captions(metadata: &Value, languages: &[String]) -> Option<CaptionChoice> {
    let manual = &metadata["subtitles"];
    let automatic = &metadata["automatic_captions"];
    let spoken = metadata["language"].as_str();

    for lang in languages {
        if let Some(url) = json3_url(&manual[lang.as_str()]) {
            return Some(CaptionChoice {
                url,
                language: lang.clone(),
                was_translated: false,
            });
        }
    }

    for lang in languages {
        if let Some(url) = json3_url(&automatic[format!("{}-orig", lang).as_str()]) {
            return Some(CaptionChoice {
                url,
                language: lang.clone(),
                was_translated: false,
            });
        }
        if let Some(url) = json3_url(&automatic[lang.as_str()]) {
            let was_translated = spoken.is_some_and(|s| !s.starts_with(lang.as_str()));
            return Some(CaptionChoice {
                url,
                language: lang.clone(),
                was_translated,
            });
        }
    }

    // Fall back to whatever manual track exists, untranslated.
    let mut manual_langs: Vec<&String> = manual
        .as_object()
        .map(|m| m.keys().collect())
        .unwrap_or_default();
    manual_langs.sort();
    manual_langs.into_iter().find_map(|lang| {
        json3_url(&manual[lang.as_str()]).map(|url| CaptionChoice {
            url,
            language: lang.clone(),
            was_translated: false,
        })
    })
}

#[async_trait]
impl VideoLister for YoutubeSource {
    #[instrument(skip(self))]
    async fn list_videos(&self, channel_id: &str) -> StageResult<ChannelListing> {
        let url = Self::channel_url(channel_id);
        let mut args = vec![
            "--dump-single-json",
            "--flat-playlist",
            "--no-warnings",
            "--extractor-args",
            "youtubetab:approximate_date",
        ];
        let limit = self.max_videos.map(|n| n.to_string());
        if let Some(limit) = &limit {
            args.push("--playlist-end");
            args.push(limit);
        }
        args.push(&url);

        let stdout = self.run_ytdlp(&args).await?;
        let json: Value = serde_json::from_str(&stdout)
            .map_err(|e| StageFailure::Transient(format!("Failed to parse yt-dlp output: {}", e)))?;

        let name = json["channel"]
            .as_str()
            .or_else(|| json["uploader"].as_str())
            .map(|s| s.trim_end_matches(" - Videos").to_string());

        let videos: Vec<VideoListing> = json["entries"]
            .as_array()
            .map(|entries| entries.iter().filter_map(parse_listing_entry).collect())
            .unwrap_or_default();

        debug!("Listed {} videos for {}", videos.len(), channel_id);
        Ok(ChannelListing { name, videos })
    }
}

#[async_trait]
impl TranscriptFetcher for YoutubeSource {
    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> StageResult<FetchedTranscript> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let stdout = self
            .run_ytdlp(&["--dump-json", "--skip-download", "--no-warnings", &url])
            .await?;
        let metadata: Value = serde_json::from_str(&stdout)
            .map_err(|e| StageFailure::Transient(format!("Failed to parse yt-dlp output: {}", e)))?;

        let choice = choose_captions(&metadata, &self.languages)
            .ok_or_else(|| StageFailure::Permanent("No captions available".to_string()))?;
        debug!(language = %choice.language, translated = choice.was_translated, "Caption track chosen");

        let response = self
            .http
            .get(&choice.url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e, "Caption download failed"))?;
        if !response.status().is_success() {
            // Caption URLs are signed and expire; a 404 here is not final.
            return Err(StageFailure::Transient(
                classify_http_status(response.status(), "Caption download failed")
                    .reason()
                    .to_string(),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e, "Caption download failed"))?;

        Ok(FetchedTranscript {
            text: parse_json3(&body)?,
            language: choice.language,
            was_translated: choice.was_translated,
        })
    }
}
