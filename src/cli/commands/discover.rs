//! Discover command.

use super::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use crate::status::Stage;
use anyhow::Result;

/// Run the discover command.
pub async fn run_discover(channel: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Stage(Stage::Transcript), &settings)?;

    let store = open_store(&settings)?;
    let pipeline = Pipeline::new(settings, store)?;

    let spinner = Output::spinner(&format!("Listing {}...", channel));
    let report = pipeline.discover_channel(channel).await;
    spinner.finish_and_clear();

    match report {
        Ok(report) => {
            Output::success(&format!(
                "{}: {} listed, {} new, {} already known",
                channel, report.listed, report.new_videos, report.known_videos
            ));
            if report.failed > 0 {
                Output::warning(&format!("{} videos could not be registered", report.failed));
            }
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Failed to list {}: {}", channel, e));
            Err(e.into())
        }
    }
}
