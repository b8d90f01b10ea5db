//! tubeminer CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tubeminer::cli::{commands, Cli, Commands};
use tubeminer::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let file_layer = match settings.log_file() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tubeminer={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    // Ensure data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Run { channels, stop_after } => {
            commands::run_pipeline(channels, *stop_after, settings).await?;
        }

        Commands::Discover { channel } => {
            commands::run_discover(channel, settings).await?;
        }

        Commands::Stage { stage, video } => {
            commands::run_stage(*stage, video.as_deref(), settings).await?;
        }

        Commands::Status { video } => {
            commands::run_status(video.as_deref(), settings)?;
        }

        Commands::Reset { all, yes, videos } => {
            commands::run_reset(*all, *yes, videos, settings)?;
        }

        Commands::Search {
            query,
            mode,
            limit,
            min_score,
        } => {
            commands::run_search(query, *mode, *limit, *min_score, settings).await?;
        }

        Commands::Show { video_id } => {
            commands::run_show(video_id, settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), settings)?;
        }
    }

    Ok(())
}
