//! YouTube `json3` caption parsing.

use crate::error::{StageFailure, StageResult};
use crate::timestamps::format_hms;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Convert a `json3` caption track to text with one `[HH:MM:SS]` marker per cue.
///
/// A track that parses but has no text is reported as permanent: the video
/// simply has nothing to transcribe.
pub fn parse_json3(raw: &str) -> StageResult<String> {
    let track: Json3 = serde_json::from_str(raw)
        .map_err(|e| StageFailure::Transient(format!("Malformed caption track: {}", e)))?;

    let lines: Vec<String> = track
        .events
        .iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                None
            } else {
                Some(format!("[{}] {}", format_hms(event.start_ms as f64 / 1000.0), text))
            }
        })
        .collect();

    if lines.is_empty() {
        return Err(StageFailure::Permanent("Caption track is empty".to_string()));
    }

    Ok(lines.join("\n"))
}
