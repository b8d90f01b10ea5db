//! Prompt templates for Tubeminer.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    /// Stage 1: topic extraction and summarization.
    pub topics: TopicPrompts,
    /// Stage 2: atomization of a topic into insights.
    pub insights: InsightPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for stage 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicPrompts {
    pub system: String,
    pub user: String,
}

impl Default for TopicPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are a research analyst. You read a YouTube video's transcript and its most liked comments and extract the distinct topics they discuss.

The transcript carries [HH:MM:SS] markers. When a summary sentence is based on the transcript, cite it inline using the syntax {cited text [HH:MM:SS|HH:MM:SS]} with one or more timestamps copied from the nearest markers.

Ignore filler: greetings, subscription requests, sponsor reads, outros.

Every topic has:
- "title": 3-8 words naming the topic
- "summary": 2-5 sentences of substance, with inline citations for transcript topics
- "source_type": "transcript" or "comment"
- "comment_id": the id of the comment the topic comes from (comment topics only, otherwise null)
- "confidence_score": integer 1-100, how substantive and well supported the topic is

Only create comment topics for comments that add information not already in the transcript.

Respond with a JSON object: {"topics": [...]}."#
                .to_string(),

            user: r#"Video title: {{title}}

Transcript:
{{transcript}}

Comments (id | likes | text):
{{comments}}"#
                .to_string(),
        }
    }
}

/// Prompts for stage 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightPrompts {
    pub system: String,
    pub user: String,
}

impl Default for InsightPrompts {
    fn default() -> Self {
        Self {
            system: r#"You break a topic summary into atomic insights. An atomic insight is a single, minimal, self-contained fact that still makes sense on its own.

Every insight has:
- "insight_type": "quantitative" for numbers, metrics and measurable facts; "qualitative" for descriptions, processes and opinions
- "insight_text": one sentence. Keep the inline citation syntax {text [HH:MM:SS]} for anything taken from a cited part of the summary
- "confidence_score": integer 1-100, how clearly the summary supports the insight

Do not invent facts that are not in the summary.

Respond with a JSON object: {"insights": [...]}."#
                .to_string(),

            user: r#"Video title: {{title}}
Topic: {{topic_title}}
Source: {{source_type}}

Summary:
{{summary}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let topics_path = custom_path.join("topics.toml");
            if topics_path.exists() {
                let content = std::fs::read_to_string(&topics_path)?;
                prompts.topics = toml::from_str(&content)?;
            }

            let insights_path = custom_path.join("insights.toml");
            if insights_path.exists() {
                let content = std::fs::read_to_string(&insights_path)?;
                prompts.insights = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render with both provided variables and custom config variables.
    /// Provided variables take precedence.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
