//! Reset command.

use super::open_store;
use crate::cli::Output;
use crate::config::Settings;
use crate::reset::{ResetConfirmation, ResetController, ResetScope};
use anyhow::{bail, Result};
use std::io::{BufRead, Write};

/// Ask the operator to type RESET.
fn confirm_interactively() -> Result<ResetConfirmation> {
    Output::warning("This deletes ALL topic summaries and insights for every video.");
    Output::warning("Raw transcripts and comments are kept.");
    print!("Type RESET to continue: ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(if answer.trim() == "RESET" {
        ResetConfirmation::Confirmed
    } else {
        ResetConfirmation::Unconfirmed
    })
}

/// Run the reset command.
pub fn run_reset(all: bool, yes: bool, videos: &[String], settings: Settings) -> Result<()> {
    let (scope, confirmation) = match (all, videos.is_empty()) {
        (true, _) => {
            let confirmation = if yes {
                ResetConfirmation::Confirmed
            } else {
                confirm_interactively()?
            };
            if confirmation == ResetConfirmation::Unconfirmed {
                Output::info("Reset cancelled.");
                return Ok(());
            }
            (ResetScope::All, confirmation)
        }
        (false, false) => (ResetScope::Videos(videos.to_vec()), ResetConfirmation::Unconfirmed),
        (false, true) => bail!("Nothing to reset: pass --all or one or more --video IDs"),
    };

    let store = open_store(&settings)?;
    let report = ResetController::new(store).reset_processing(&scope, confirmation)?;

    Output::success(&format!(
        "Reset {} videos: deleted {} topic summaries and {} insights",
        report.videos, report.topics_deleted, report.insights_deleted
    ));
    Ok(())
}
