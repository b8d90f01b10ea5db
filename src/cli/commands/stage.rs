//! Stage command: one stage for one video or every eligible video.

use super::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use crate::status::Stage;
use anyhow::Result;

/// Run the stage command.
pub async fn run_stage(stage: Stage, video: Option<&str>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Stage(stage), &settings)?;

    let store = open_store(&settings)?;
    let pipeline = Pipeline::new(settings, store)?;

    if let Some(video_id) = video {
        let outcome = pipeline.run_stage(video_id, stage).await?;
        Output::outcome(video_id, &outcome);
        return Ok(());
    }

    let signals = pipeline.drain().listen_for_signals();
    let spinner = Output::spinner(&format!("Running {} on eligible videos...", stage));
    let report = pipeline.drive_stage(stage).await;
    spinner.finish_and_clear();
    pipeline.drain().wait_idle().await;
    signals.abort();

    let report = report?;
    if report.attempted == 0 {
        Output::info(&format!("No videos are eligible for {}.", stage));
    } else {
        Output::batch(&report);
    }
    Ok(())
}
