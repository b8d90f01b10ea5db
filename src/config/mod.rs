//! Configuration module for Tubeminer.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{InsightPrompts, Prompts, TopicPrompts};
pub use settings::{
    ConcurrencySettings, GeneralSettings, ModelLimits, ModelSettings, PipelineSettings,
    PromptSettings, Settings, StopAfter, UsageSettings, YoutubeSettings,
};
