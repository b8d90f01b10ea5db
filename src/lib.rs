//! tubeminer - resumable YouTube transcript and comment mining
//!
//! Discovers the videos of YouTube channels, downloads their transcripts and
//! comments, summarizes them into topics, atomizes topics into insights and
//! embeds the insights for search.
//!
//! # Architecture
//!
//! - `status` - the five-track status model and the stage gatekeeper
//! - `store` - SQLite persistence for content and status
//! - `source` - YouTube listing, transcript and comment collaborators
//! - `processing` - the AI stages and validation of their output
//! - `embedding` - embedding generation
//! - `pipeline` - orchestration, batching and draining
//! - `reset` - reset of AI outputs
//! - `search` - text, semantic and hybrid search over insights
//! - `usage` - per-tier request, token and cost tracking
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubeminer::config::Settings;
//! use tubeminer::pipeline::Pipeline;
//! use tubeminer::store::Store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let store = Arc::new(Store::open(&settings.database_path())?);
//!     let channels = settings.youtube.channel_ids.clone();
//!     let pipeline = Pipeline::new(settings, store)?;
//!
//!     let report = pipeline.run(&channels).await?;
//!     println!("{} new videos", report.new_videos());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod pipeline;
pub mod processing;
pub mod reset;
pub mod search;
pub mod source;
pub mod status;
pub mod store;
pub mod timestamps;
pub mod usage;

pub use error::{Result, TubeminerError};
