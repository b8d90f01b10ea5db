//! CLI output formatting utilities.

use crate::pipeline::{BatchReport, StageOutcome};
use crate::search::SearchHit;
use crate::status::StageStatus;
use crate::usage::UsageSnapshot;
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one stage outcome, coloured by whether it will be retried.
    pub fn outcome(video_id: &str, outcome: &StageOutcome) {
        let label = match outcome {
            StageOutcome::Completed { .. } => style(outcome.label()).green(),
            StageOutcome::Skipped(_) => style(outcome.label()).dim(),
            StageOutcome::TransientlyFailed(_) => style(outcome.label()).yellow(),
            StageOutcome::PermanentlyFailed(_) | StageOutcome::IntegrityFailed(_) => {
                style(outcome.label()).red()
            }
        };
        println!("  {} {} {}", label, style(video_id).bold(), style(outcome).dim());
    }

    /// Print the tally of one stage.
    pub fn batch(report: &BatchReport) {
        println!(
            "  {:<10} {} done, {} will retry, {} will never retry, {} storage errors{}",
            style(report.stage).bold(),
            style(report.completed).green(),
            style(report.transient).yellow(),
            style(report.permanent).red(),
            report.integrity,
            if report.stopped_early { " (stopped early)" } else { "" }
        );
    }

    /// Print one model tier's usage.
    pub fn usage(snapshot: &UsageSnapshot) {
        println!(
            "  {:<10} {} requests, {} in / {} out tokens, ${:.4} ({})",
            style(&snapshot.tier).bold(),
            snapshot.requests,
            snapshot.input_tokens,
            snapshot.output_tokens,
            snapshot.cost_usd,
            style(&snapshot.model).dim()
        );
    }

    /// A stage status, coloured.
    pub fn status(status: StageStatus) -> StyledObject<&'static str> {
        let text = status.as_str();
        match status {
            StageStatus::Complete => style(text).green(),
            StageStatus::Pending | StageStatus::FailedTransient => style(text).yellow(),
            StageStatus::InProgress => style(text).cyan(),
            StageStatus::FailedPermanent => style(text).red(),
        }
    }

    /// Print search result.
    pub fn search_hit(hit: &SearchHit) {
        println!(
            "\n{} {} @ {} (score: {:.3})",
            style(">>").green(),
            style(&hit.video_title).bold(),
            style(hit.timestamp.as_deref().unwrap_or("start")).cyan(),
            hit.score
        );
        println!(
            "   [{} | {}] {}",
            hit.insight_type,
            style(&hit.topic_title).italic(),
            content_preview(&hit.text, 200)
        );
        println!("   {}", style(&hit.link).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_len: usize) -> String {
    let content = content.replace('\n', " ");
    match content.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content,
    }
}
