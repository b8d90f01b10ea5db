//! OpenAI chat-completion implementations of the AI stages.

use super::{
    ExtractedInsight, ExtractedTopic, InsightAtomizer, Stage1Input, Stage2Input, TopicExtractor,
};
use crate::config::Prompts;
use crate::error::{StageFailure, StageResult};
use crate::usage::UsageTracker;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Comments beyond this many (by likes) are left out of the stage 1 prompt.
const MAX_PROMPT_COMMENTS: usize = 300;

fn classify_openai_error(err: OpenAIError) -> StageFailure {
    match err {
        OpenAIError::JSONDeserialize(e) => {
            StageFailure::Validation(format!("Unreadable model response: {}", e))
        }
        other => StageFailure::Transient(other.to_string()),
    }
}

/// Parse a JSON-mode answer, tolerating stray text around the object.
fn parse_json_object<T: DeserializeOwned>(content: &str) -> StageResult<T> {
    let json_str = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    };

    serde_json::from_str(json_str).map_err(|e| {
        StageFailure::Validation(format!(
            "Response does not match schema: {}. Response was: {}",
            e,
            &content[..content.len().min(300)]
        ))
    })
}

/// Send one JSON-mode chat request and record its usage.
async fn chat_json(
    client: &Client<OpenAIConfig>,
    model: &str,
    system: String,
    user: String,
    usage: &UsageTracker,
) -> StageResult<String> {
    let build_err = |e: OpenAIError| StageFailure::Transient(format!("Failed to build request: {}", e));

    let messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(build_err)?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(build_err)?
            .into(),
    ];

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(messages)
        .temperature(0.2)
        .response_format(ResponseFormat::JsonObject)
        .build()
        .map_err(build_err)?;

    let response = client.chat().create(request).await.map_err(classify_openai_error)?;

    if let Some(u) = &response.usage {
        usage.record(u.prompt_tokens as u64, u.completion_tokens as u64);
    }

    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| StageFailure::Validation("Empty response from model".to_string()))
}

fn format_comments(input: &Stage1Input) -> String {
    if input.comments.is_empty() {
        return "(no comments)".to_string();
    }
    input
        .comments
        .iter()
        .take(MAX_PROMPT_COMMENTS)
        .map(|c| format!("{} | {} | {}", c.comment_id, c.like_count, c.text.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    topics: Vec<ExtractedTopic>,
}

#[derive(Debug, Deserialize)]
struct InsightsResponse {
    insights: Vec<ExtractedInsight>,
}

/// Stage 1 on OpenAI chat completions.
pub struct OpenAiTopicExtractor {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: Prompts,
    usage: Arc<UsageTracker>,
}

impl OpenAiTopicExtractor {
    pub fn new(client: Client<OpenAIConfig>, model: &str, usage: Arc<UsageTracker>) -> Self {
        Self {
            client,
            model: model.to_string(),
            prompts: Prompts::default(),
            usage,
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }
}

#[async_trait]
impl TopicExtractor for OpenAiTopicExtractor {
    #[instrument(skip(self, input), fields(video_id = %input.video_id))]
    async fn extract(&self, input: &Stage1Input) -> StageResult<Vec<ExtractedTopic>> {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), input.title.clone());
        vars.insert(
            "transcript".to_string(),
            input
                .transcript
                .clone()
                .unwrap_or_else(|| "(no transcript)".to_string()),
        );
        vars.insert("comments".to_string(), format_comments(input));

        let system = self.prompts.render_with_custom(&self.prompts.topics.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.topics.user, &vars);

        let content = chat_json(&self.client, &self.model, system, user, &self.usage).await?;
        let parsed: TopicsResponse = parse_json_object(&content)?;
        debug!("Model returned {} topics", parsed.topics.len());
        Ok(parsed.topics)
    }
}

/// Stage 2 on OpenAI chat completions.
pub struct OpenAiInsightAtomizer {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: Prompts,
    usage: Arc<UsageTracker>,
}

impl OpenAiInsightAtomizer {
    pub fn new(client: Client<OpenAIConfig>, model: &str, usage: Arc<UsageTracker>) -> Self {
        Self {
            client,
            model: model.to_string(),
            prompts: Prompts::default(),
            usage,
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }
}

#[async_trait]
impl InsightAtomizer for OpenAiInsightAtomizer {
    #[instrument(skip(self, input), fields(summary_id = input.topic.summary_id))]
    async fn atomize(&self, input: &Stage2Input) -> StageResult<Vec<ExtractedInsight>> {
        let topic = &input.topic;
        let summary = if topic.timestamps.is_empty() {
            topic.summary.clone()
        } else {
            format!("{} [{}]", topic.summary, topic.timestamps.join("|"))
        };

        let mut vars = HashMap::new();
        vars.insert("title".to_string(), input.video_title.clone());
        vars.insert("topic_title".to_string(), topic.title.clone());
        vars.insert("source_type".to_string(), topic.source.to_string());
        vars.insert("summary".to_string(), summary);

        let system = self.prompts.render_with_custom(&self.prompts.insights.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.insights.user, &vars);

        let content = chat_json(&self.client, &self.model, system, user, &self.usage).await?;
        let parsed: InsightsResponse = parse_json_object(&content)?;
        debug!("Model returned {} insights", parsed.insights.len());
        Ok(parsed.insights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InsightType, RawComment, TopicSource};

    #[test]
    fn test_parse_topics_response() {
        let content = r#"Here you go:
        {"topics": [{"title": "Pricing", "summary": "S {x [00:00:01]}",
          "source_type": "comment", "comment_id": "c1", "confidence_score": 70}]}"#;
        let parsed: TopicsResponse = parse_json_object(content).unwrap();
        assert_eq!(parsed.topics.len(), 1);
        assert_eq!(parsed.topics[0].source_type, TopicSource::Comment);
    }

    #[test]
    fn test_unknown_insight_type_is_validation_failure() {
        let content = r#"{"insights": [{"insight_type": "anecdotal", "insight_text": "x", "confidence_score": 5}]}"#;
        let err = parse_json_object::<InsightsResponse>(content).unwrap_err();
        assert!(matches!(err, StageFailure::Validation(_)));
    }

    #[test]
    fn test_parse_insights_response() {
        let content = r#"{"insights": [{"insight_type": "quantitative", "insight_text": "40% churn", "confidence_score": 88}]}"#;
        let parsed: InsightsResponse = parse_json_object(content).unwrap();
        assert_eq!(parsed.insights[0].insight_type, InsightType::Quantitative);
    }

    #[test]
    fn test_classify_openai_error() {
        let err = OpenAIError::InvalidArgument("bad".to_string());
        assert!(matches!(classify_openai_error(err), StageFailure::Transient(_)));

        let json_err = serde_json::from_str::<TopicsResponse>("nope").unwrap_err();
        let err = OpenAIError::JSONDeserialize(json_err);
        assert!(matches!(classify_openai_error(err), StageFailure::Validation(_)));
    }

    #[test]
    fn test_format_comments() {
        let input = Stage1Input {
            video_id: "v1".to_string(),
            title: "t".to_string(),
            transcript: None,
            comments: vec![RawComment {
                comment_id: "c1".to_string(),
                video_id: "v1".to_string(),
                parent_comment_id: None,
                author: "ann".to_string(),
                text: "line one\nline two".to_string(),
                like_count: 4,
                published_at: None,
            }],
        };
        assert_eq!(format_comments(&input), "c1 | 4 | line one line two");
    }
}
