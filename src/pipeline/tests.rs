use super::*;
use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::StageResult;
use crate::processing::{ExtractedInsight, ExtractedTopic};
use crate::source::{ChannelListing, FetchedComment, FetchedTranscript, VideoListing};
use crate::store::{InsightType, TopicSource};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Succeed,
    Permanent,
    Transient,
    Invalid,
}

/// Call counter plus a switchable failure mode, optionally per video.
struct Script {
    mode: Mutex<Mode>,
    per_video: Mutex<HashMap<String, Mode>>,
    calls: AtomicUsize,
    called_at: Mutex<Vec<Instant>>,
}

impl Script {
    fn new() -> Self {
        Self {
            mode: Mutex::new(Mode::Succeed),
            per_video: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            called_at: Mutex::new(Vec::new()),
        }
    }

    fn set(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn set_for(&self, video_id: &str, mode: Mode) {
        self.per_video.lock().unwrap().insert(video_id.to_string(), mode);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let at = self.called_at.lock().unwrap();
        at.windows(2).map(|w| w[1].duration_since(w[0])).collect()
    }

    fn call(&self, what: &str) -> StageResult<()> {
        self.call_for(what, "")
    }

    fn call_for(&self, what: &str, video_id: &str) -> StageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called_at.lock().unwrap().push(Instant::now());
        let mode = self
            .per_video
            .lock()
            .unwrap()
            .get(video_id)
            .copied()
            .unwrap_or(*self.mode.lock().unwrap());
        match mode {
            Mode::Succeed => Ok(()),
            Mode::Permanent => Err(StageFailure::Permanent(format!("{} is gone", what))),
            Mode::Transient => Err(StageFailure::Transient(format!("{} timed out", what))),
            Mode::Invalid => Err(StageFailure::Validation(format!("{} returned junk", what))),
        }
    }
}

struct Fakes {
    videos: Vec<String>,
    lister: Script,
    transcripts: Script,
    comments: Script,
    extractor: Script,
    atomizer: Script,
    embedder: Script,
    /// Stop requested from inside the first extractor call.
    stop_on_extract: Mutex<Option<DrainCoordinator>>,
}

struct FakeLister(Arc<Fakes>);
struct FakeTranscripts(Arc<Fakes>);
struct FakeComments(Arc<Fakes>);
struct FakeExtractor(Arc<Fakes>);
struct FakeAtomizer(Arc<Fakes>);
struct FakeEmbedder(Arc<Fakes>);

#[async_trait]
impl VideoLister for FakeLister {
    async fn list_videos(&self, _channel_id: &str) -> StageResult<ChannelListing> {
        self.0.lister.call("listing")?;
        let videos = self
            .0
            .videos
            .iter()
            .enumerate()
            .map(|(i, id)| VideoListing {
                video_id: id.clone(),
                title: format!("Video {}", id),
                published_at: Some(Utc::now() - chrono::Duration::days(i as i64)),
                duration_seconds: Some(300),
                view_count: 100,
                like_count: 5,
            })
            .collect();
        Ok(ChannelListing {
            name: Some("Founders".to_string()),
            videos,
        })
    }
}

#[async_trait]
impl TranscriptFetcher for FakeTranscripts {
    async fn fetch_transcript(&self, video_id: &str) -> StageResult<FetchedTranscript> {
        self.0.transcripts.call_for("transcript", video_id)?;
        Ok(FetchedTranscript {
            text: "[00:00:01] we doubled prices\n[00:01:00] churn went down".to_string(),
            language: "en".to_string(),
            was_translated: false,
        })
    }
}

#[async_trait]
impl CommentFetcher for FakeComments {
    async fn fetch_comments(&self, video_id: &str) -> StageResult<Vec<FetchedComment>> {
        self.0.comments.call_for("comments", video_id)?;
        Ok(vec![FetchedComment {
            comment_id: format!("{}-c1", video_id),
            parent_comment_id: None,
            author: "ann".to_string(),
            text: "What about annual plans?".to_string(),
            like_count: 12,
            published_at: None,
        }])
    }
}

#[async_trait]
impl TopicExtractor for FakeExtractor {
    async fn extract(&self, input: &Stage1Input) -> StageResult<Vec<ExtractedTopic>> {
        if let Some(drain) = self.0.stop_on_extract.lock().unwrap().take() {
            drain.request_stop(StopReason::Pause);
        }
        self.0.extractor.call_for("stage1", &input.video_id)?;

        let mut topics = Vec::new();
        if input.transcript.is_some() {
            topics.push(ExtractedTopic {
                title: "Pricing".to_string(),
                summary: "They {doubled prices [00:00:01]}.".to_string(),
                source_type: TopicSource::Transcript,
                comment_id: None,
                confidence_score: 80,
            });
        }
        if let Some(comment) = input.comments.first() {
            topics.push(ExtractedTopic {
                title: "Annual plans".to_string(),
                summary: "Viewers ask about annual plans.".to_string(),
                source_type: TopicSource::Comment,
                comment_id: Some(comment.comment_id.clone()),
                confidence_score: 60,
            });
        }
        Ok(topics)
    }
}

#[async_trait]
impl InsightAtomizer for FakeAtomizer {
    async fn atomize(&self, input: &Stage2Input) -> StageResult<Vec<ExtractedInsight>> {
        self.0.atomizer.call("stage2")?;
        Ok(vec![
            ExtractedInsight {
                insight_type: InsightType::Quantitative,
                insight_text: format!("{} changed revenue by 2x", input.topic.title),
                confidence_score: 90,
            },
            ExtractedInsight {
                insight_type: InsightType::Qualitative,
                insight_text: format!("{} matters to customers", input.topic.title),
                confidence_score: 70,
            },
        ])
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> StageResult<Vec<f32>> {
        self.0.embedder.call("embedding")?;
        Ok(vec![0.5; 4])
    }

    async fn embed_batch(&self, texts: &[String]) -> StageResult<Vec<Vec<f32>>> {
        self.0.embedder.call("embedding")?;
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }

    fn dimensions(&self) -> usize {
        4
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.youtube.comment_request_delay_ms = 0;
    settings.pipeline.batch_size = 10;
    settings
}

fn harness_with(settings: Settings, videos: &[&str]) -> (Pipeline, Arc<Fakes>) {
    let fakes = Arc::new(Fakes {
        videos: videos.iter().map(|v| v.to_string()).collect(),
        lister: Script::new(),
        transcripts: Script::new(),
        comments: Script::new(),
        extractor: Script::new(),
        atomizer: Script::new(),
        embedder: Script::new(),
        stop_on_extract: Mutex::new(None),
    });
    let collaborators = Collaborators {
        lister: Arc::new(FakeLister(fakes.clone())),
        transcripts: Arc::new(FakeTranscripts(fakes.clone())),
        comments: Arc::new(FakeComments(fakes.clone())),
        extractor: Arc::new(FakeExtractor(fakes.clone())),
        atomizer: Arc::new(FakeAtomizer(fakes.clone())),
        embedder: Arc::new(FakeEmbedder(fakes.clone())),
    };
    let usage = UsageTrackers::from_settings(&settings);
    let store = Arc::new(Store::in_memory().unwrap());
    let pipeline = Pipeline::with_components(settings, store, collaborators, usage);
    (pipeline, fakes)
}

fn harness(videos: &[&str]) -> (Pipeline, Arc<Fakes>) {
    harness_with(test_settings(), videos)
}

fn channels() -> Vec<String> {
    vec!["UCfounders".to_string()]
}

fn status(pipeline: &Pipeline, video_id: &str) -> ProcessingStatus {
    pipeline.store().get_status(video_id).unwrap().unwrap()
}

#[tokio::test]
async fn test_full_run_completes_every_stage() {
    let (pipeline, _fakes) = harness(&["vid00000001", "vid00000002"]);

    let report = pipeline.run(&channels()).await.unwrap();
    assert_eq!(report.new_videos(), 2);
    assert_eq!(report.batch(Stage::Embedding).unwrap().completed, 2);
    assert!(report.stop_reason.is_none());
    for stage in Stage::ALL {
        assert_eq!(pipeline.progress().settled(stage), 2, "{}", stage);
    }

    for id in ["vid00000001", "vid00000002"] {
        let s = status(&pipeline, id);
        for stage in Stage::ALL {
            assert_eq!(s.get(stage), StageStatus::Complete, "{} of {}", stage, id);
        }
        let insights = pipeline.store().insights_for_video(id).unwrap();
        assert_eq!(insights.len(), 4);
        assert!(insights.iter().all(|i| i.embedding.is_some()));
    }
    assert_eq!(pipeline.store().count_topics(None).unwrap(), 4);
}

#[tokio::test]
async fn test_rerun_after_completion_does_nothing() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.run(&channels()).await.unwrap();
    let topics = pipeline.store().count_topics(None).unwrap();
    let insights = pipeline.store().count_insights(None).unwrap();

    let report = pipeline.run(&channels()).await.unwrap();

    assert_eq!(report.new_videos(), 0);
    assert_eq!(fakes.transcripts.calls(), 1);
    assert_eq!(fakes.comments.calls(), 1);
    assert_eq!(fakes.extractor.calls(), 1);
    assert_eq!(fakes.atomizer.calls(), 2);
    assert_eq!(fakes.embedder.calls(), 1);
    assert_eq!(pipeline.store().count_topics(None).unwrap(), topics);
    assert_eq!(pipeline.store().count_insights(None).unwrap(), insights);

    for stage in Stage::ALL {
        let outcome = pipeline.run_stage("vid00000001", stage).await.unwrap();
        assert_eq!(outcome, StageOutcome::Skipped(GateDecision::AlreadyDone));
    }
}

#[tokio::test]
async fn test_permanent_failure_is_final() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    fakes.transcripts.set(Mode::Permanent);

    let outcome = pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();
    assert!(matches!(outcome, StageOutcome::PermanentlyFailed(_)));

    fakes.transcripts.set(Mode::Succeed);
    for _ in 0..1000 {
        let outcome = pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();
        assert!(matches!(outcome, StageOutcome::Skipped(GateDecision::Blocked(_))));
    }

    assert_eq!(fakes.transcripts.calls(), 1);
    let s = status(&pipeline, "vid00000001");
    assert_eq!(s.transcript, StageStatus::FailedPermanent);
    assert_eq!(s.errors.get(Stage::Transcript), Some("transcript is gone"));
    assert!(pipeline.store().raw_transcripts("vid00000001").unwrap().is_empty());
}

#[tokio::test]
async fn test_transient_failure_writes_nothing_and_retries() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    fakes.transcripts.set(Mode::Transient);

    let outcome = pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();
    assert!(matches!(outcome, StageOutcome::TransientlyFailed(_)));
    assert_eq!(status(&pipeline, "vid00000001").transcript, StageStatus::Pending);
    assert!(pipeline.store().raw_transcripts("vid00000001").unwrap().is_empty());

    fakes.transcripts.set(Mode::Succeed);
    let outcome = pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed { rows: 1 });
    assert_eq!(pipeline.store().raw_transcripts("vid00000001").unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_model_output_is_retried() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();
    fakes.extractor.set(Mode::Invalid);

    let outcome = pipeline.run_stage("vid00000001", Stage::Stage1).await.unwrap();
    assert!(matches!(outcome, StageOutcome::TransientlyFailed(_)));
    assert_eq!(status(&pipeline, "vid00000001").stage1, StageStatus::Pending);
    assert_eq!(pipeline.store().count_topics(Some("vid00000001")).unwrap(), 0);
}

#[tokio::test]
async fn test_failed_status_write_rolls_back_topics() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();

    pipeline
        .store()
        .execute_batch(
            r#"
            CREATE TRIGGER reject_stage1 BEFORE UPDATE OF stage1_status ON processing_status
            WHEN NEW.stage1_status = 'complete'
            BEGIN SELECT RAISE(ABORT, 'disk full'); END;
            "#,
        )
        .unwrap();

    let outcome = pipeline.run_stage("vid00000001", Stage::Stage1).await.unwrap();
    assert!(matches!(outcome, StageOutcome::IntegrityFailed(_)));
    assert_eq!(fakes.extractor.calls(), 1);
    assert_eq!(pipeline.store().count_topics(Some("vid00000001")).unwrap(), 0);
    assert_eq!(status(&pipeline, "vid00000001").stage1, StageStatus::Pending);

    pipeline.store().execute_batch("DROP TRIGGER reject_stage1").unwrap();
    let outcome = pipeline.run_stage("vid00000001", Stage::Stage1).await.unwrap();
    assert_eq!(outcome, StageOutcome::Completed { rows: 1 });
}

#[tokio::test]
async fn test_stage2_waits_for_stage1() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();

    let outcome = pipeline.run_stage("vid00000001", Stage::Stage2).await.unwrap();
    assert!(matches!(
        outcome,
        StageOutcome::Skipped(GateDecision::PrerequisiteMissing(_))
    ));
    assert_eq!(fakes.atomizer.calls(), 0);
    assert_eq!(status(&pipeline, "vid00000001").stage2, StageStatus::Pending);
}

#[tokio::test]
async fn test_disabled_comments_do_not_block_summaries() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    fakes.comments.set(Mode::Permanent);

    pipeline.run(&channels()).await.unwrap();

    let s = status(&pipeline, "vid00000001");
    assert_eq!(s.comments, StageStatus::FailedPermanent);
    assert_eq!(s.stage1, StageStatus::Complete);
    assert_eq!(s.embedding, StageStatus::Complete);

    let topics = pipeline.store().topics_for_video("vid00000001").unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].source, TopicSource::Transcript);

    pipeline.run(&channels()).await.unwrap();
    assert_eq!(fakes.comments.calls(), 1);
}

#[tokio::test]
async fn test_summaries_need_some_raw_content() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    fakes.transcripts.set(Mode::Permanent);
    fakes.comments.set(Mode::Permanent);

    pipeline.run(&channels()).await.unwrap();

    let s = status(&pipeline, "vid00000001");
    assert_eq!(s.stage1, StageStatus::Pending);
    assert_eq!(fakes.extractor.calls(), 0);
    assert!(matches!(
        pipeline.run_stage("vid00000001", Stage::Stage1).await.unwrap(),
        StageOutcome::Skipped(GateDecision::Blocked(_))
    ));
}

#[tokio::test]
async fn test_stop_request_drains_without_new_dispatch() {
    let mut settings = test_settings();
    settings.concurrency.stage1 = 1;
    let (pipeline, fakes) = harness_with(settings, &["vid00000001", "vid00000002", "vid00000003"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    for id in ["vid00000001", "vid00000002", "vid00000003"] {
        pipeline.run_stage(id, Stage::Transcript).await.unwrap();
    }
    *fakes.stop_on_extract.lock().unwrap() = Some(pipeline.drain().clone());

    let report = pipeline.drive_stage(Stage::Stage1).await.unwrap();

    assert_eq!(fakes.extractor.calls(), 1);
    assert_eq!(report.completed, 1);
    assert!(report.stopped_early);
    assert_eq!(pipeline.drain().stop_reason(), Some(StopReason::Pause));
    assert_eq!(pipeline.drain().in_flight(), 0);

    let complete = ["vid00000001", "vid00000002", "vid00000003"]
        .iter()
        .filter(|id| status(&pipeline, id).stage1 == StageStatus::Complete)
        .count();
    assert_eq!(complete, 1);
}

#[tokio::test]
async fn test_stop_after_downloads() {
    let mut settings = test_settings();
    settings.pipeline.stop_after = Some(StopAfter::Downloads);
    let (pipeline, fakes) = harness_with(settings, &["vid00000001"]);

    let report = pipeline.run(&channels()).await.unwrap();

    assert!(report.batch(Stage::Stage1).is_none());
    assert_eq!(fakes.extractor.calls(), 0);
    let s = status(&pipeline, "vid00000001");
    assert_eq!(s.transcript, StageStatus::Complete);
    assert_eq!(s.stage1, StageStatus::Pending);
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let (pipeline, _fakes) = harness(&["vid00000001", "vid00000002"]);

    let first = pipeline.discover_channel("UCfounders").await.unwrap();
    let second = pipeline.discover_channel("UCfounders").await.unwrap();

    assert_eq!(first.new_videos, 2);
    assert_eq!(second.new_videos, 0);
    assert_eq!(second.known_videos, 2);
    assert_eq!(pipeline.store().list_videos(None).unwrap().len(), 2);
    assert_eq!(
        pipeline.store().get_channel("UCfounders").unwrap().unwrap().name,
        "Founders"
    );
}

#[tokio::test]
async fn test_unknown_video_is_an_error() {
    let (pipeline, _fakes) = harness(&[]);
    let err = pipeline.run_stage("missing0000", Stage::Transcript).await.unwrap_err();
    assert!(matches!(err, TubeminerError::VideoNotFound(_)));
}

#[tokio::test]
async fn test_failure_reasons_survive_a_second_failure() {
    let (pipeline, fakes) = harness(&["vid00000001"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    fakes.comments.set(Mode::Permanent);
    fakes.transcripts.set(Mode::Permanent);

    pipeline.run_stage("vid00000001", Stage::Comments).await.unwrap();
    pipeline.run_stage("vid00000001", Stage::Transcript).await.unwrap();

    let s = status(&pipeline, "vid00000001");
    assert_eq!(s.comments, StageStatus::FailedPermanent);
    assert_eq!(s.transcript, StageStatus::FailedPermanent);
    assert_eq!(s.errors.get(Stage::Comments), Some("comments is gone"));
    assert_eq!(s.errors.get(Stage::Transcript), Some("transcript is gone"));
}

#[tokio::test]
async fn test_batch_tallies_mixed_outcomes_without_aborting() {
    let (pipeline, fakes) = harness(&["vid00000001", "vid00000002", "vid00000003"]);
    pipeline.discover_channel("UCfounders").await.unwrap();
    fakes.transcripts.set_for("vid00000001", Mode::Permanent);
    fakes.transcripts.set_for("vid00000002", Mode::Transient);

    let report = pipeline.run_batch(Stage::Transcript).await.unwrap();

    assert_eq!(report.attempted, 3);
    assert_eq!(report.completed, 1);
    assert_eq!(report.transient, 1);
    assert_eq!(report.permanent, 1);
    assert_eq!(report.integrity, 0);
    assert!(!report.stopped_early);

    assert_eq!(status(&pipeline, "vid00000001").transcript, StageStatus::FailedPermanent);
    assert_eq!(status(&pipeline, "vid00000002").transcript, StageStatus::Pending);
    assert_eq!(status(&pipeline, "vid00000003").transcript, StageStatus::Complete);
    assert_eq!(pipeline.store().raw_transcripts("vid00000003").unwrap().len(), 1);

    let retry = pipeline.run_batch(Stage::Transcript).await.unwrap();
    assert_eq!(retry.attempted, 1);
    assert_eq!(retry.transient, 1);
}

#[tokio::test]
async fn test_zero_batch_size_still_makes_progress() {
    let mut settings = test_settings();
    settings.pipeline.batch_size = 0;
    let (pipeline, _fakes) = harness_with(settings, &["vid00000001", "vid00000002"]);
    pipeline.discover_channel("UCfounders").await.unwrap();

    let report = pipeline.run_batch(Stage::Transcript).await.unwrap();
    assert_eq!(report.completed, 1);
}

#[tokio::test]
async fn test_comment_requests_are_spaced_across_batches() {
    let delay_ms = 80;
    let mut settings = test_settings();
    settings.pipeline.batch_size = 1;
    settings.youtube.comment_request_delay_ms = delay_ms;
    let (pipeline, fakes) = harness_with(settings, &["vid00000001", "vid00000002", "vid00000003"]);
    pipeline.discover_channel("UCfounders").await.unwrap();

    let report = pipeline.drive_stage(Stage::Comments).await.unwrap();
    assert_eq!(report.completed, 3);

    let gaps = fakes.comments.gaps();
    assert_eq!(gaps.len(), 2);
    for gap in gaps {
        assert!(gap >= Duration::from_millis(delay_ms), "gap {:?}", gap);
    }
}
