//! Status command.

use super::open_store;
use crate::cli::Output;
use crate::config::Settings;
use crate::status::{Stage, StageStatus};
use anyhow::{anyhow, Result};
use console::style;

/// Run the status command.
pub fn run_status(video: Option<&str>, settings: Settings) -> Result<()> {
    let store = open_store(&settings)?;

    if let Some(video_id) = video {
        let status = store
            .get_status(video_id)?
            .ok_or_else(|| anyhow!("Unknown video: {}", video_id))?;
        Output::header(&format!("Status of {}", video_id));
        for stage in Stage::ALL {
            println!("  {:<10} {}", style(stage).dim(), Output::status(status.get(stage)));
        }
        for (stage, reason) in status.errors.iter() {
            Output::kv(&format!("{} failed", stage), reason);
        }
        Output::kv("Updated", &status.updated_at.to_rfc3339());
        return Ok(());
    }

    let summary = store.status_summary()?;
    if summary.total_videos == 0 {
        Output::info("No videos yet. Use 'tubeminer discover <channel>' or 'tubeminer run'.");
        return Ok(());
    }

    Output::header(&format!("Processing status ({} videos)", summary.total_videos));
    print!("  {:<10}", "");
    for status in StageStatus::ALL {
        print!(" {:>16}", status.as_str());
    }
    println!();
    for stage in Stage::ALL {
        print!("  {:<10}", style(stage).bold());
        for status in StageStatus::ALL {
            print!(" {:>16}", summary.count(stage, status));
        }
        println!();
    }
    Ok(())
}
