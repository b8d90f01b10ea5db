//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{Result, TubeminerError};
use crate::status::Stage;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Building the pipeline needs yt-dlp and both API keys.
    Pipeline,
    /// A single stage only needs what that stage talks to.
    Stage(Stage),
    /// Text search needs only the database.
    TextSearch,
    /// Semantic and hybrid search embed the query.
    SemanticSearch,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Pipeline => {
            check_tool("yt-dlp")?;
            check_youtube_key(settings)?;
            check_openai_key(settings)?;
        }
        Operation::Stage(Stage::Transcript) => check_tool("yt-dlp")?,
        Operation::Stage(Stage::Comments) => check_youtube_key(settings)?,
        Operation::Stage(_) | Operation::SemanticSearch => check_openai_key(settings)?,
        Operation::TextSearch => {}
    }
    Ok(())
}

fn check_openai_key(settings: &Settings) -> Result<()> {
    match settings.models.resolved_api_key() {
        Some(_) => Ok(()),
        None => Err(TubeminerError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...' (or models.api_key)"
                .to_string(),
        )),
    }
}

fn check_youtube_key(settings: &Settings) -> Result<()> {
    match settings.youtube.resolved_api_key() {
        Some(_) => Ok(()),
        None => Err(TubeminerError::Config(
            "YOUTUBE_API_KEY not set. Set it with: export YOUTUBE_API_KEY='...' (or youtube.api_key)"
                .to_string(),
        )),
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(TubeminerError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TubeminerError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(TubeminerError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
