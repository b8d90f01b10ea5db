//! Doctor command: can each stage run, and how much work is waiting for it.

use super::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::status::{Stage, StageStatus};
use anyhow::bail;
use console::style;

/// Whether one stage has what it needs.
#[derive(Debug, PartialEq)]
struct StageReadiness {
    stage: Stage,
    /// Why the stage cannot run right now.
    problem: Option<String>,
    /// Videos still schedulable for the stage, if a database exists.
    waiting: Option<usize>,
}

impl StageReadiness {
    fn print(&self) {
        let waiting = self
            .waiting
            .map(|n| format!(" ({} waiting)", n))
            .unwrap_or_default();
        match &self.problem {
            None => println!(
                "  {} {:<10} ready{}",
                style("✓").green(),
                style(self.stage).bold(),
                style(waiting).dim()
            ),
            Some(problem) => println!(
                "  {} {:<10} {}{}",
                style("✗").red(),
                style(self.stage).bold(),
                problem,
                style(waiting).dim()
            ),
        }
    }
}

fn readiness(settings: &Settings, waiting: impl Fn(Stage) -> Option<usize>) -> Vec<StageReadiness> {
    Stage::ALL
        .iter()
        .map(|&stage| StageReadiness {
            stage,
            problem: preflight::check(Operation::Stage(stage), settings)
                .err()
                .map(|e| e.to_string()),
            waiting: waiting(stage),
        })
        .collect()
}

/// Show the first and last few characters of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn describe_key(key: Option<String>) -> String {
    key.map(|k| mask_key(&k)).unwrap_or_else(|| "not set".to_string())
}

/// Run the doctor command.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("tubeminer doctor");

    // Only look at an existing database; the doctor never creates one.
    let db_path = settings.database_path();
    let summary = if db_path.exists() {
        Some(open_store(settings)?.status_summary()?)
    } else {
        None
    };

    println!("\n{}", style("Stages").bold());
    let stages = readiness(settings, |stage| {
        summary.as_ref().map(|s| {
            s.count(stage, StageStatus::Pending) + s.count(stage, StageStatus::FailedTransient)
        })
    });
    for stage in &stages {
        stage.print();
    }

    println!("\n{}", style("Credentials").bold());
    Output::kv("OpenAI key", &describe_key(settings.models.resolved_api_key()));
    Output::kv("YouTube key", &describe_key(settings.youtube.resolved_api_key()));

    println!("\n{}", style("Run inputs").bold());
    match &summary {
        Some(s) => Output::kv(
            "Database",
            &format!("{} ({} videos)", db_path.display(), s.total_videos),
        ),
        None => Output::kv("Database", &format!("{} (created on first run)", db_path.display())),
    }
    let config_path = Settings::default_config_path();
    Output::kv(
        "Config",
        &if config_path.exists() {
            config_path.display().to_string()
        } else {
            "defaults (no config file)".to_string()
        },
    );
    match settings.youtube.channel_ids.len() {
        0 => Output::kv("Channels", "none configured; pass them to 'tubeminer run'"),
        n => Output::kv("Channels", &format!("{} configured", n)),
    }
    println!();

    let blocked = stages.iter().filter(|s| s.problem.is_some()).count();
    if blocked > 0 {
        bail!("{} of {} stages cannot run", blocked, stages.len());
    }
    Output::success("Every stage can run.");
    Ok(())
}
