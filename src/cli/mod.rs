//! CLI module for tubeminer.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{format_duration, Output};

use crate::config::StopAfter;
use crate::search::SearchMode;
use crate::status::Stage;
use clap::{Parser, Subcommand};

/// tubeminer - mine YouTube channels for insights
///
/// Downloads transcripts and comments, summarizes them into topics, breaks
/// topics into atomic insights and embeds them for search. Every step is
/// resumable: rerunning only does what is still pending.
#[derive(Parser, Debug)]
#[command(name = "tubeminer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover new videos and drive every stage to completion
    Run {
        /// Channel to process (repeatable; defaults to youtube.channel_ids)
        #[arg(long = "channel")]
        channels: Vec<String>,

        /// Last phase to run (downloads, stage1, stage2, embedding)
        #[arg(long)]
        stop_after: Option<StopAfter>,
    },

    /// List a channel and register its new videos
    Discover {
        /// Channel id (UC...), @handle or URL
        channel: String,
    },

    /// Run one stage (transcript, comments, stage1, stage2, embedding)
    Stage {
        stage: Stage,

        /// Only this video; otherwise every eligible video
        #[arg(long)]
        video: Option<String>,
    },

    /// Show processing status
    Status {
        /// Show a single video instead of the summary
        #[arg(long)]
        video: Option<String>,
    },

    /// Delete topics and insights and mark the AI stages pending again
    Reset {
        /// Reset every video
        #[arg(long, conflicts_with = "videos")]
        all: bool,

        /// Skip the confirmation prompt (only with --all)
        #[arg(long, requires = "all")]
        yes: bool,

        /// Video to reset (repeatable)
        #[arg(long = "video")]
        videos: Vec<String>,
    },

    /// Search insights
    Search {
        /// Search query
        query: String,

        /// Search mode
        #[arg(short, long, value_enum, default_value = "hybrid")]
        mode: SearchMode,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Minimum similarity score for semantic hits (0.0-1.0)
        #[arg(long, default_value = "0.25")]
        min_score: f32,
    },

    /// Show a video's status, topics and insights
    Show {
        video_id: String,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_command() {
        let cli = Cli::try_parse_from(["tubeminer", "stage", "stage2", "--video", "abc"]).unwrap();
        match cli.command {
            Commands::Stage { stage, video } => {
                assert_eq!(stage, Stage::Stage2);
                assert_eq!(video.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_with_stop_after() {
        let cli = Cli::try_parse_from([
            "tubeminer", "-vv", "run", "--channel", "UC1", "--channel", "UC2", "--stop-after", "stage1",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { channels, stop_after } => {
                assert_eq!(channels, vec!["UC1", "UC2"]);
                assert_eq!(stop_after, Some(StopAfter::Stage1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_reset_yes_requires_all() {
        assert!(Cli::try_parse_from(["tubeminer", "reset", "--yes", "--video", "v1"]).is_err());
        assert!(Cli::try_parse_from(["tubeminer", "reset", "--all", "--video", "v1"]).is_err());
        assert!(Cli::try_parse_from(["tubeminer", "reset", "--all", "--yes"]).is_ok());
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Cli::try_parse_from(["tubeminer", "stage", "stage3"]).is_err());
    }
}
