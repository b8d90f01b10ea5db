//! Pipeline orchestrator.
//!
//! Drives videos through the five tracks. Each stage invocation asks the
//! gatekeeper first, calls its collaborator, validates, and then commits the
//! outputs together with the `complete` status in one transaction. A failure
//! before the commit writes nothing (transient) or only the terminal status
//! (permanent), so rerunning is always safe.

mod drain;
mod heartbeat;
mod outcome;

pub use drain::{DrainCoordinator, InFlightGuard, StopReason};
pub use heartbeat::{Heartbeat, Progress};
pub use outcome::{BatchReport, DiscoveryReport, RunReport, StageOutcome};

use crate::config::{Prompts, Settings, StopAfter};
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::{Result, StageFailure, TubeminerError};
use crate::openai::create_client;
use crate::processing::{
    validate_insights, validate_topics, InsightAtomizer, OpenAiInsightAtomizer,
    OpenAiTopicExtractor, Stage1Input, Stage2Input, TopicExtractor,
};
use crate::source::{CommentFetcher, TranscriptFetcher, VideoLister, YoutubeCommentClient, YoutubeSource};
use crate::status::{can_run, GateDecision, ProcessingStatus, Stage, StageStatus, StatusUpdate};
use crate::usage::UsageTrackers;
use crate::store::{
    count_unembedded, delete_derived, delete_insights, insert_insight, insert_raw_comments,
    insert_raw_transcript, insert_topic, read_status, set_insight_embedding, write_status,
    NewInsight, Store,
};
use futures::stream::{self, StreamExt};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// The external services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lister: Arc<dyn VideoLister>,
    pub transcripts: Arc<dyn TranscriptFetcher>,
    pub comments: Arc<dyn CommentFetcher>,
    pub extractor: Arc<dyn TopicExtractor>,
    pub atomizer: Arc<dyn InsightAtomizer>,
    pub embedder: Arc<dyn Embedder>,
}

impl Collaborators {
    /// Build the YouTube and OpenAI implementations from settings.
    pub fn from_settings(settings: &Settings, usage: &UsageTrackers) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let youtube = Arc::new(YoutubeSource::new(&settings.youtube)?);
        let comments = Arc::new(YoutubeCommentClient::new(&settings.youtube)?);

        let models = &settings.models;
        let client = create_client(models)?;

        let extractor = OpenAiTopicExtractor::new(client.clone(), &models.stage1_model, usage.stage1.clone())
            .with_prompts(prompts.clone());
        let atomizer = OpenAiInsightAtomizer::new(client.clone(), &models.stage2_model, usage.stage2.clone())
            .with_prompts(prompts);
        let embedder = OpenAiEmbedder::new(
            client,
            &models.embedding_model,
            models.embedding_dimensions as usize,
            usage.embedding.clone(),
        );

        Ok(Self {
            lister: youtube.clone(),
            transcripts: youtube,
            comments,
            extractor: Arc::new(extractor),
            atomizer: Arc::new(atomizer),
            embedder: Arc::new(embedder),
        })
    }
}

/// Why a stage body did not produce rows.
enum AttemptError {
    /// The collaborator or validation failed; classified.
    Failed(StageFailure),
    /// Reading or committing failed.
    Store(TubeminerError),
}

impl From<StageFailure> for AttemptError {
    fn from(failure: StageFailure) -> Self {
        AttemptError::Failed(failure)
    }
}

impl From<TubeminerError> for AttemptError {
    fn from(err: TubeminerError) -> Self {
        AttemptError::Store(err)
    }
}

/// What the commit transaction found.
enum Commit {
    Written(usize),
    /// Another writer finished or failed the stage first.
    Superseded(GateDecision),
}

type Attempt = std::result::Result<Commit, AttemptError>;

/// The pipeline orchestrator.
pub struct Pipeline {
    settings: Settings,
    store: Arc<Store>,
    collaborators: Collaborators,
    usage: UsageTrackers,
    drain: DrainCoordinator,
    progress: Arc<Progress>,
    /// When the last comment request went out, across every batch.
    last_comment_request: Mutex<Option<Instant>>,
}

impl Pipeline {
    /// Create a pipeline talking to YouTube and OpenAI.
    pub fn new(settings: Settings, store: Arc<Store>) -> Result<Self> {
        let usage = UsageTrackers::from_settings(&settings);
        let collaborators = Collaborators::from_settings(&settings, &usage)?;
        Ok(Self::with_components(settings, store, collaborators, usage))
    }

    /// Create a pipeline with custom collaborators.
    pub fn with_components(
        settings: Settings,
        store: Arc<Store>,
        collaborators: Collaborators,
        usage: UsageTrackers,
    ) -> Self {
        Self {
            settings,
            store,
            collaborators,
            usage,
            drain: DrainCoordinator::new(),
            progress: Arc::new(Progress::default()),
            last_comment_request: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn usage(&self) -> &UsageTrackers {
        &self.usage
    }

    pub fn drain(&self) -> &DrainCoordinator {
        &self.drain
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// List a channel and register every video it has not seen before.
    ///
    /// Each video commits on its own; one bad row does not stop the rest.
    #[instrument(skip(self))]
    pub async fn discover_channel(&self, channel_id: &str) -> Result<DiscoveryReport> {
        let listing = self.collaborators.lister.list_videos(channel_id).await?;

        let name = match listing.name.clone() {
            Some(name) => name,
            None => self
                .store
                .get_channel(channel_id)?
                .map(|c| c.name)
                .unwrap_or_else(|| channel_id.to_string()),
        };
        self.store.upsert_channel(channel_id, &name)?;

        let mut report = DiscoveryReport {
            channel_id: channel_id.to_string(),
            listed: listing.videos.len(),
            ..Default::default()
        };

        for video in &listing.videos {
            match self.store.insert_video(channel_id, video) {
                Ok(true) => report.new_videos += 1,
                Ok(false) => report.known_videos += 1,
                Err(e) => {
                    warn!(video_id = %video.video_id, "Failed to register video: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Channel {} ({}): {} listed, {} new, {} known, {} failed",
            name, channel_id, report.listed, report.new_videos, report.known_videos, report.failed
        );
        Ok(report)
    }

    /// Run one stage for one video.
    ///
    /// Errors only when the video is unknown; everything else is an outcome.
    #[instrument(skip(self))]
    pub async fn run_stage(&self, video_id: &str, stage: Stage) -> Result<StageOutcome> {
        let status = match self.store.get_status(video_id) {
            Ok(Some(status)) => status,
            Ok(None) => return Err(TubeminerError::VideoNotFound(video_id.to_string())),
            Err(e) => return Ok(StageOutcome::IntegrityFailed(e.to_string())),
        };

        let decision = can_run(&status, stage);
        if !decision.is_runnable() {
            debug!(%decision, "Skipping {} for {}", stage, video_id);
            return Ok(StageOutcome::Skipped(decision));
        }

        let attempt = match stage {
            Stage::Transcript => self.fetch_transcript(video_id).await,
            Stage::Comments => self.fetch_comments(video_id).await,
            Stage::Stage1 => self.extract_topics(video_id, &status).await,
            Stage::Stage2 => self.atomize_topics(video_id).await,
            Stage::Embedding => self.embed_insights(video_id).await,
        };

        Ok(self.settle(video_id, stage, attempt))
    }

    /// Turn a stage attempt into an outcome, recording permanent failures.
    fn settle(&self, video_id: &str, stage: Stage, attempt: Attempt) -> StageOutcome {
        match attempt {
            Ok(Commit::Written(rows)) => {
                info!("{} {} for {} ({} rows)", stage, StageStatus::Complete, video_id, rows);
                StageOutcome::Completed { rows }
            }
            Ok(Commit::Superseded(decision)) => {
                debug!(%decision, "{} for {} changed underneath us", stage, video_id);
                StageOutcome::Skipped(decision)
            }
            Err(AttemptError::Failed(StageFailure::Permanent(reason))) => {
                let update = StatusUpdate::new()
                    .set(stage, StageStatus::FailedPermanent)
                    .with_error(stage, reason.clone());
                match self.store.upsert_status(video_id, &update) {
                    Ok(_) => {
                        warn!("{} for {} will never retry: {}", stage, video_id, reason);
                        StageOutcome::PermanentlyFailed(reason)
                    }
                    Err(e) => {
                        error!("Failed to record permanent failure of {} for {}: {}", stage, video_id, e);
                        StageOutcome::IntegrityFailed(e.to_string())
                    }
                }
            }
            Err(AttemptError::Failed(failure)) => {
                warn!("{} for {} will retry: {}", stage, video_id, failure);
                StageOutcome::TransientlyFailed(failure.reason().to_string())
            }
            Err(AttemptError::Store(e)) => {
                error!("{} for {} rolled back: {}", stage, video_id, e);
                StageOutcome::IntegrityFailed(e.to_string())
            }
        }
    }

    /// Write stage outputs and mark the stage complete in one transaction.
    ///
    /// The gate is re-checked inside the transaction so a concurrent writer
    /// cannot make the outputs land twice.
    fn commit(
        &self,
        video_id: &str,
        stage: Stage,
        write: impl FnOnce(&Connection) -> Result<usize>,
    ) -> Attempt {
        let commit = self.store.transaction(|tx| {
            let current = read_status(tx, video_id)?
                .ok_or_else(|| TubeminerError::VideoNotFound(video_id.to_string()))?;
            let decision = can_run(&current, stage);
            if !decision.is_runnable() {
                return Ok(Commit::Superseded(decision));
            }

            let conn: &Connection = tx;
            let rows = write(conn)?;
            write_status(tx, video_id, &StatusUpdate::new().set(stage, StageStatus::Complete))?;
            Ok(Commit::Written(rows))
        })?;
        Ok(commit)
    }

    async fn fetch_transcript(&self, video_id: &str) -> Attempt {
        let transcript = self.collaborators.transcripts.fetch_transcript(video_id).await?;
        self.commit(video_id, Stage::Transcript, |conn| {
            insert_raw_transcript(conn, video_id, &transcript)
        })
    }

    /// Keep comment requests `comment_request_delay_ms` apart, across batches.
    async fn pace_comment_request(&self) {
        let delay = Duration::from_millis(self.settings.youtube.comment_request_delay_ms);
        let mut last = self.last_comment_request.lock().await;
        if let Some(at) = *last {
            let wait = delay.saturating_sub(at.elapsed());
            if !wait.is_zero() {
                debug!("Waiting {:?} before the next comment request", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_comments(&self, video_id: &str) -> Attempt {
        self.pace_comment_request().await;
        let comments = self.collaborators.comments.fetch_comments(video_id).await?;
        self.commit(video_id, Stage::Comments, |conn| {
            insert_raw_comments(conn, video_id, &comments)
        })
    }

    async fn extract_topics(&self, video_id: &str, status: &ProcessingStatus) -> Attempt {
        let video = self
            .store
            .get_video(video_id)?
            .ok_or_else(|| TubeminerError::VideoNotFound(video_id.to_string()))?;

        let transcripts = self.store.raw_transcripts(video_id)?;
        let transcript = (!transcripts.is_empty()).then(|| {
            transcripts
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        let input = Stage1Input {
            video_id: video_id.to_string(),
            title: video.title,
            transcript,
            comments: self.store.raw_comments(video_id)?,
        };

        if !input.has_content() {
            let more_may_arrive = [Stage::Transcript, Stage::Comments]
                .iter()
                .any(|s| status.get(*s).is_schedulable());
            let reason = "No transcript text or comments to summarize".to_string();
            return Err(if more_may_arrive {
                StageFailure::Transient(reason)
            } else {
                StageFailure::Permanent(reason)
            }
            .into());
        }

        let extracted = self.collaborators.extractor.extract(&input).await?;
        let topics = validate_topics(extracted, &input)?;

        self.commit(video_id, Stage::Stage1, |conn| {
            delete_derived(conn, Some(video_id))?;
            for topic in &topics {
                insert_topic(conn, video_id, topic)?;
            }
            Ok(topics.len())
        })
    }

    async fn atomize_topics(&self, video_id: &str) -> Attempt {
        let video = self
            .store
            .get_video(video_id)?
            .ok_or_else(|| TubeminerError::VideoNotFound(video_id.to_string()))?;
        let topics = self.store.topics_for_video(video_id)?;
        if topics.is_empty() {
            return Err(StageFailure::Permanent("Video has no topic summaries".to_string()).into());
        }

        let mut per_topic: Vec<(i64, Vec<NewInsight>)> = Vec::with_capacity(topics.len());
        for topic in topics {
            let input = Stage2Input {
                video_title: video.title.clone(),
                topic,
            };
            let extracted = self.collaborators.atomizer.atomize(&input).await?;
            let insights = validate_insights(extracted, &input.topic)?;
            per_topic.push((input.topic.summary_id, insights));
        }

        self.commit(video_id, Stage::Stage2, |conn| {
            delete_insights(conn, video_id)?;
            let mut rows = 0;
            for (summary_id, insights) in &per_topic {
                for insight in insights {
                    insert_insight(conn, *summary_id, insight)?;
                    rows += 1;
                }
            }
            Ok(rows)
        })
    }

    async fn embed_insights(&self, video_id: &str) -> Attempt {
        let insights = self.store.insights_for_video(video_id)?;
        if insights.is_empty() {
            return Err(StageFailure::Permanent("Video has no insights to embed".to_string()).into());
        }

        let texts: Vec<String> = insights.iter().map(|i| i.text.clone()).collect();
        let vectors = self.collaborators.embedder.embed_batch(&texts).await?;
        if vectors.len() != insights.len() {
            return Err(StageFailure::Validation(format!(
                "Got {} embeddings for {} insights",
                vectors.len(),
                insights.len()
            ))
            .into());
        }

        self.commit(video_id, Stage::Embedding, |conn| {
            for (insight, vector) in insights.iter().zip(&vectors) {
                set_insight_embedding(conn, insight.insight_id, vector)?;
            }
            let missing = count_unembedded(conn, video_id)?;
            if missing > 0 {
                return Err(TubeminerError::Store(format!(
                    "{} insights of {} appeared while embedding",
                    missing, video_id
                )));
            }
            Ok(vectors.len())
        })
    }

    fn concurrency(&self, stage: Stage) -> usize {
        let limits = &self.settings.concurrency;
        let limit = match stage {
            Stage::Transcript => limits.transcript_fetch,
            Stage::Comments => 1,
            Stage::Stage1 => limits.stage1,
            Stage::Stage2 => limits.stage2,
            Stage::Embedding => limits.embedding,
        };
        limit.max(1)
    }

    /// Run `stage` over the given videos, stopping dispatch on a drain request.
    async fn run_ids(&self, stage: Stage, ids: Vec<String>) -> BatchReport {
        let total = ids.len();
        let mut report = BatchReport::new(stage);

        if stage == Stage::Comments {
            // The comment API is rate limited per key, so videos go one at a time.
            for video_id in &ids {
                let Some(_guard) = self.drain.begin() else {
                    break;
                };
                report.record(&self.dispatch(video_id, stage).await);
            }
        } else {
            let outcomes: Vec<StageOutcome> = stream::iter(ids)
                .map(|video_id| async move {
                    let _guard = self.drain.begin()?;
                    Some(self.dispatch(&video_id, stage).await)
                })
                .buffer_unordered(self.concurrency(stage))
                .filter_map(|outcome| async move { outcome })
                .collect()
                .await;
            for outcome in &outcomes {
                report.record(outcome);
            }
        }

        report.stopped_early = report.attempted < total;
        report
    }

    async fn dispatch(&self, video_id: &str, stage: Stage) -> StageOutcome {
        let outcome = match self.run_stage(video_id, stage).await {
            Ok(outcome) => outcome,
            Err(e) => StageOutcome::IntegrityFailed(e.to_string()),
        };
        self.progress.record(stage);
        outcome
    }

    /// Run one batch of eligible videos for `stage`.
    pub async fn run_batch(&self, stage: Stage) -> Result<BatchReport> {
        let ids = self
            .store
            .list_eligible(stage, self.settings.pipeline.batch_size.max(1))?;
        Ok(self.run_ids(stage, ids).await)
    }

    /// Keep pulling batches until no eligible video is left.
    ///
    /// Videos that fail transiently stay eligible; each is tried once per call.
    #[instrument(skip(self))]
    pub async fn drive_stage(&self, stage: Stage) -> Result<BatchReport> {
        let batch_size = self.settings.pipeline.batch_size.max(1);
        let mut attempted: HashSet<String> = HashSet::new();
        let mut report = BatchReport::new(stage);

        loop {
            if self.drain.is_stopping() {
                report.stopped_early = true;
                break;
            }

            let ids: Vec<String> = self
                .store
                .list_eligible(stage, attempted.len() + batch_size)?
                .into_iter()
                .filter(|id| !attempted.contains(id))
                .take(batch_size)
                .collect();
            if ids.is_empty() {
                break;
            }

            attempted.extend(ids.iter().cloned());
            report.merge(self.run_ids(stage, ids).await);
        }

        info!(
            "{}: {} done, {} will retry, {} will never retry, {} storage errors",
            stage, report.completed, report.transient, report.permanent, report.integrity
        );
        Ok(report)
    }

    /// Full run: discovery, raw downloads, then the AI stages in order.
    pub async fn run(&self, channel_ids: &[String]) -> Result<RunReport> {
        self.usage.reset();
        self.progress.reset();
        let mut report = RunReport::new();
        info!(run_id = %report.run_id, "Starting run over {} channels", channel_ids.len());

        let heartbeat_secs = self.settings.pipeline.heartbeat_secs;
        let _heartbeat = (heartbeat_secs > 0).then(|| {
            Heartbeat::start(
                Duration::from_secs(heartbeat_secs),
                self.drain.clone(),
                self.progress.clone(),
            )
        });

        for channel_id in channel_ids {
            if self.drain.is_stopping() {
                break;
            }
            match self.discover_channel(channel_id).await {
                Ok(discovery) => report.discovery.push(discovery),
                Err(e) => {
                    warn!("Failed to list channel {}: {}", channel_id, e);
                    report.discovery_failures.push((channel_id.clone(), e.to_string()));
                }
            }
        }

        if !self.drain.is_stopping() {
            let (transcripts, comments) = tokio::join!(
                self.drive_stage(Stage::Transcript),
                self.drive_stage(Stage::Comments)
            );
            report.batches.push(transcripts?);
            report.batches.push(comments?);
        }

        let stop_after = self.settings.pipeline.stop_after;
        for (stage, phase) in [
            (Stage::Stage1, StopAfter::Stage1),
            (Stage::Stage2, StopAfter::Stage2),
            (Stage::Embedding, StopAfter::Embedding),
        ] {
            if self.drain.is_stopping() {
                break;
            }
            if stop_after.is_some_and(|last| last < phase) {
                info!("Stopping after {}", stop_after.map(|s| s.to_string()).unwrap_or_default());
                break;
            }
            report.batches.push(self.drive_stage(stage).await?);
        }

        self.drain.wait_idle().await;
        report.stop_reason = self.drain.stop_reason();
        report.usage = self.usage.snapshots();
        info!(run_id = %report.run_id, "Run finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests;
