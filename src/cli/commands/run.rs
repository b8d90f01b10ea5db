//! Run command: the full resumable pipeline.

use super::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Settings, StopAfter};
use crate::pipeline::{Pipeline, RunReport, StopReason};
use anyhow::Result;

/// Run the run command.
pub async fn run_pipeline(
    channels: &[String],
    stop_after: Option<StopAfter>,
    mut settings: Settings,
) -> Result<()> {
    if stop_after.is_some() {
        settings.pipeline.stop_after = stop_after;
    }
    let channels = if channels.is_empty() {
        settings.youtube.channel_ids.clone()
    } else {
        channels.to_vec()
    };
    if channels.is_empty() {
        Output::warning("No channels given or configured; only known videos will be processed.");
    }

    preflight::check(Operation::Pipeline, &settings)?;

    let store = open_store(&settings)?;
    let pipeline = Pipeline::new(settings, store)?;
    let signals = pipeline.drain().listen_for_signals();

    let spinner = Output::spinner("Running pipeline (Ctrl+C to stop after running work)...");
    let report = pipeline.run(&channels).await;
    spinner.finish_and_clear();
    signals.abort();

    let report = report?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    Output::header(&format!("Run {}", report.run_id));

    for discovery in &report.discovery {
        Output::list_item(&format!(
            "{}: {} listed, {} new",
            discovery.channel_id, discovery.listed, discovery.new_videos
        ));
    }
    for (channel, reason) in &report.discovery_failures {
        Output::warning(&format!("Could not list {}: {}", channel, reason));
    }

    println!();
    for batch in &report.batches {
        Output::batch(batch);
    }

    if report.usage.iter().any(|u| u.requests > 0) {
        println!();
        for snapshot in &report.usage {
            Output::usage(snapshot);
        }
    }

    println!();
    match report.stop_reason {
        Some(StopReason::Pause) => Output::info("Paused. Run again to resume where this run stopped."),
        Some(StopReason::Shutdown) => Output::warning("Stopped early. Run again to resume."),
        None => {
            let failures: usize = report.batches.iter().map(|b| b.failures()).sum();
            if failures == 0 {
                Output::success("Run complete.");
            } else {
                Output::warning(&format!(
                    "Run complete with {} failures. Those marked 'will retry' are picked up next run.",
                    failures
                ));
            }
        }
    }
}
