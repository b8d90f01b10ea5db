//! Show command: one video with its topics and insights.

use super::open_store;
use crate::cli::{format_duration, Output};
use crate::config::Settings;
use crate::status::Stage;
use crate::timestamps::youtube_link;
use anyhow::{anyhow, Result};
use console::style;

/// Run the show command.
pub fn run_show(video_id: &str, settings: Settings) -> Result<()> {
    let store = open_store(&settings)?;
    let video = store
        .get_video(video_id)?
        .ok_or_else(|| anyhow!("Unknown video: {}", video_id))?;

    Output::header(&video.title);
    Output::kv("Video", &youtube_link(&video.video_id, None));
    if let Some(published) = video.published_at {
        Output::kv("Published", &published.format("%Y-%m-%d").to_string());
    }
    if let Some(duration) = video.duration_seconds {
        Output::kv("Duration", &format_duration(duration));
    }
    Output::kv("Views", &video.view_count.to_string());

    if let Some(status) = store.get_status(video_id)? {
        let line = Stage::ALL
            .iter()
            .map(|s| format!("{} {}", s, Output::status(status.get(*s))))
            .collect::<Vec<_>>()
            .join("  ");
        Output::kv("Status", &line);
        for (stage, reason) in status.errors.iter() {
            Output::kv(&format!("{} failed", stage), reason);
        }
    }

    let transcripts = store.raw_transcripts(video_id)?;
    let comments = store.raw_comments(video_id)?;
    Output::kv(
        "Raw",
        &format!("{} transcripts, {} comments", transcripts.len(), comments.len()),
    );

    let topics = store.topics_for_video(video_id)?;
    let insights = store.insights_for_video(video_id)?;
    if topics.is_empty() {
        return Ok(());
    }

    Output::header(&format!("Topics ({})", topics.len()));
    for topic in &topics {
        let source = match (&topic.comment_id, topic.popularity_weight) {
            (Some(id), Some(weight)) => format!("comment {} weight {:.2}", id, weight),
            _ => topic.source.to_string(),
        };
        println!(
            "\n{} {} ({}, confidence {})",
            style(">>").cyan(),
            style(&topic.title).bold(),
            style(source).dim(),
            topic.confidence
        );
        println!("   {}", topic.summary);
        if let Some(first) = topic.timestamps.first() {
            println!("   {}", style(youtube_link(video_id, Some(first))).dim());
        }
        for insight in insights.iter().filter(|i| i.summary_id == topic.summary_id) {
            let embedded = if insight.embedding.is_some() { "" } else { " (not embedded)" };
            Output::list_item(&format!(
                "[{} {}] {}{}",
                insight.insight_type, insight.confidence, insight.text, embedded
            ));
        }
    }
    Ok(())
}
