//! Timestamp helpers.
//!
//! Transcripts are stored with `[HH:MM:SS]` markers. AI output cites them
//! inline as `{text [HH:MM:SS|HH:MM:SS]}`; those citations are stripped to
//! clean text plus a list of timestamps before anything is persisted.

use regex::Regex;
use std::sync::OnceLock;

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}\[\]]+?)\s*\[([^\[\]]+)\]\}").expect("Invalid regex"))
}

/// Format seconds as `HH:MM:SS`.
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Parse `HH:MM:SS` or `MM:SS` into whole seconds.
pub fn parse_hms(timestamp: &str) -> Option<u64> {
    let parts: Vec<u64> = timestamp
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match parts.as_slice() {
        [h, m, s] if *m < 60 && *s < 60 => Some(h * 3600 + m * 60 + s),
        [m, s] if *s < 60 => Some(m * 60 + s),
        _ => None,
    }
}

/// Link to a video at a given `HH:MM:SS` offset.
pub fn youtube_link(video_id: &str, timestamp: Option<&str>) -> String {
    match timestamp.and_then(parse_hms) {
        Some(seconds) => format!("https://youtube.com/watch?v={}&t={}s", video_id, seconds),
        None => format!("https://youtube.com/watch?v={}", video_id),
    }
}

/// Text with its inline citations removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CitedText {
    /// Clean text, citation syntax removed.
    pub text: String,
    /// Cited timestamps in first-seen order, without duplicates.
    pub timestamps: Vec<String>,
}

impl CitedText {
    /// Timestamps as a JSON array, or `None` when there are none.
    pub fn timestamps_json(&self) -> Option<String> {
        if self.timestamps.is_empty() {
            None
        } else {
            serde_json::to_string(&self.timestamps).ok()
        }
    }
}

/// Strip `{text [ts|ts]}` citations from `input`.
pub fn parse_citations(input: &str) -> CitedText {
    let re = citation_regex();
    let mut timestamps: Vec<String> = Vec::new();

    for caps in re.captures_iter(input) {
        for ts in caps[2].split('|').map(str::trim).filter(|t| !t.is_empty()) {
            if !timestamps.iter().any(|t| t == ts) {
                timestamps.push(ts.to_string());
            }
        }
    }

    let text = re.replace_all(input, "$1").trim().to_string();
    CitedText { text, timestamps }
}
