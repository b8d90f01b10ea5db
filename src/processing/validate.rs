//! Schema checks applied to model output before anything is persisted.

use super::{ExtractedInsight, ExtractedTopic, Stage1Input};
use crate::error::{StageFailure, StageResult};
use crate::store::{NewInsight, NewTopic, TopicSource, TopicSummary};
use crate::timestamps::parse_citations;

const CONFIDENCE_RANGE: std::ops::RangeInclusive<i64> = 1..=100;

fn invalid(msg: impl Into<String>) -> StageFailure {
    StageFailure::Validation(msg.into())
}

fn check_confidence(value: i64, what: &str) -> StageResult<u8> {
    if CONFIDENCE_RANGE.contains(&value) {
        Ok(value as u8)
    } else {
        Err(invalid(format!("{} confidence {} outside 1..=100", what, value)))
    }
}

/// `ln(1 + likes)`.
pub fn popularity_weight(likes: i64) -> f64 {
    (likes.max(0) as f64).ln_1p()
}

/// Turn stage 1 output into insertable topics.
///
/// Rejects the whole batch on the first problem: a malformed answer is
/// retried, never partially stored.
pub fn validate_topics(topics: Vec<ExtractedTopic>, input: &Stage1Input) -> StageResult<Vec<NewTopic>> {
    if topics.is_empty() {
        return Err(invalid("Model returned no topics"));
    }

    let has_transcript = input.transcript.as_deref().is_some_and(|t| !t.trim().is_empty());

    topics
        .into_iter()
        .enumerate()
        .map(|(i, topic)| {
            let title = topic.title.trim().to_string();
            if title.is_empty() {
                return Err(invalid(format!("Topic {} has an empty title", i)));
            }

            let cited = parse_citations(&topic.summary);
            if cited.text.is_empty() {
                return Err(invalid(format!("Topic '{}' has an empty summary", title)));
            }

            let confidence = check_confidence(topic.confidence_score, &format!("Topic '{}'", title))?;

            let (comment_id, popularity_weight) = match topic.source_type {
                TopicSource::Transcript => {
                    if !has_transcript {
                        return Err(invalid(format!(
                            "Topic '{}' cites a transcript the video does not have",
                            title
                        )));
                    }
                    (None, None)
                }
                TopicSource::Comment => {
                    let id = topic.comment_id.as_deref().map(str::trim).unwrap_or_default();
                    let comment = input
                        .comments
                        .iter()
                        .find(|c| c.comment_id == id)
                        .ok_or_else(|| {
                            invalid(format!("Topic '{}' references unknown comment '{}'", title, id))
                        })?;
                    (
                        Some(comment.comment_id.clone()),
                        Some(popularity_weight(comment.like_count)),
                    )
                }
            };

            Ok(NewTopic {
                title,
                summary: cited.text,
                timestamps: cited.timestamps,
                source: topic.source_type,
                comment_id,
                popularity_weight,
                confidence,
            })
        })
        .collect()
}

/// Turn stage 2 output for one topic into insertable insights.
///
/// Insights without citations of their own inherit the topic's timestamps.
pub fn validate_insights(
    insights: Vec<ExtractedInsight>,
    topic: &TopicSummary,
) -> StageResult<Vec<NewInsight>> {
    if insights.is_empty() {
        return Err(invalid(format!("Model returned no insights for '{}'", topic.title)));
    }

    insights
        .into_iter()
        .map(|insight| {
            let cited = parse_citations(&insight.insight_text);
            if cited.text.is_empty() {
                return Err(invalid(format!("Empty insight for topic '{}'", topic.title)));
            }
            let confidence = check_confidence(insight.confidence_score, "Insight")?;

            let timestamps = if cited.timestamps.is_empty() {
                topic.timestamps.clone()
            } else {
                cited.timestamps
            };

            Ok(NewInsight {
                insight_type: insight.insight_type,
                confidence,
                text: cited.text,
                timestamps,
            })
        })
        .collect()
}
