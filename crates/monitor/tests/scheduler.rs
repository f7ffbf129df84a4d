//! Integration tests for the polling scheduler, driven on paused tokio
//! time with fake frame sources and detectors.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{detection, feed, registry, FakeCapture, FakeDetector, FakeSource};
use crowdwatch_core::aggregation::AggregationStore;
use crowdwatch_core::feed::{FeedStatus, SourceKind};
use crowdwatch_core::ffmpeg::{FfmpegTools, VideoInfo};
use crowdwatch_monitor::playback::{PlaybackHandle, PlaybackState};
use crowdwatch_monitor::sampler::{FeedSampler, FrameSource, SampleError};
use crowdwatch_monitor::scheduler::{AnalysisMode, PollingScheduler};
use crowdwatch_monitor::settings::AnalysisFlagStore;

fn scheduler(
    store: Arc<AggregationStore>,
    source: Arc<dyn FrameSource>,
    detector: Arc<FakeDetector>,
) -> PollingScheduler {
    PollingScheduler::new(store, source, detector)
}

// ---------------------------------------------------------------------------
// Test: Live mode ticks local feeds every 500 ms and remote every 2 s
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn live_cadence_over_two_seconds() {
    let store = Arc::new(AggregationStore::new(registry(vec![
        feed("cam-local", SourceKind::Local),
        feed("cam-remote", SourceKind::Youtube),
    ])));
    let detector = Arc::new(FakeDetector::returning(detection(1, 0)));
    let sched = scheduler(store.clone(), Arc::new(FakeSource::default()), detector);

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_millis(1990)).await;

    let local = store.feed("cam-local").await.unwrap().runtime;
    let remote = store.feed("cam-remote").await.unwrap().runtime;
    assert_eq!(local.tick_attempts, 4);
    assert_eq!(remote.tick_attempts, 1);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: a slow detection never overlaps with the next one
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn at_most_one_detection_in_flight_per_feed() {
    let store = Arc::new(AggregationStore::new(registry(vec![feed(
        "cam-001",
        SourceKind::Local,
    )])));
    let detector =
        Arc::new(FakeDetector::returning(detection(2, 0)).with_delay(Duration::from_millis(1200)));
    let sched = scheduler(
        store.clone(),
        Arc::new(FakeSource::default()),
        detector.clone(),
    );

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_millis(4990)).await;

    assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
    let runtime = store.feed("cam-001").await.unwrap().runtime;
    assert!(runtime.skipped_ticks > 0);
    assert_eq!(
        runtime.tick_attempts,
        runtime.skipped_ticks + detector.calls.load(Ordering::SeqCst) as u64
    );
    assert_eq!(runtime.people_count, 2);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: cam-001 with 3 person objects and 2 faces counts 3 people
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn person_objects_outnumber_faces() {
    let store = Arc::new(AggregationStore::new(registry(vec![
        feed("cam-001", SourceKind::Local),
        feed("cam-002", SourceKind::Local),
    ])));
    store.update_feed_count("cam-002", 4).await.unwrap();
    let before = store.stats().await.total_people;

    let detector = Arc::new(FakeDetector::returning(detection(3, 2)));
    let sched = scheduler(store.clone(), Arc::new(FakeSource::default()), detector);
    sched.set_feed_status("cam-002", FeedStatus::Maintenance).await.unwrap();

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let cam = store.feed("cam-001").await.unwrap().runtime;
    assert_eq!(cam.people_count, 3);
    assert_eq!(cam.last_detection.unwrap().faces_detected, 2);
    assert_eq!(store.stats().await.total_people, before + 3);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: nothing is written after stop, even by in-flight cycles
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_prevents_further_writes() {
    let store = Arc::new(AggregationStore::new(registry(vec![
        feed("cam-001", SourceKind::Local),
        feed("cam-003", SourceKind::Youtube),
    ])));
    let detector =
        Arc::new(FakeDetector::returning(detection(1, 1)).with_delay(Duration::from_millis(300)));
    let sched = scheduler(store.clone(), Arc::new(FakeSource::default()), detector.clone());

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let status = sched.stop().await;
    assert!(!status.enabled);
    assert!(status.running_feeds.is_empty());

    let writes_at_stop = store.writes().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(store.writes().await, writes_at_stop);
    let runtime = store.feed("cam-001").await.unwrap().runtime;
    assert!(!runtime.analyzing);
    assert!(!runtime.tracked);
}

// ---------------------------------------------------------------------------
// Test: detection failures leave the previous count in place
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_cycles_keep_prior_count() {
    let store = Arc::new(AggregationStore::new(registry(vec![feed(
        "cam-001",
        SourceKind::Local,
    )])));
    store.update_feed_count("cam-001", 7).await.unwrap();
    let sched = scheduler(
        store.clone(),
        Arc::new(FakeSource::default()),
        Arc::new(FakeDetector::failing()),
    );

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let runtime = store.feed("cam-001").await.unwrap().runtime;
    assert_eq!(runtime.people_count, 7);
    assert!(runtime.failed_ticks >= 3);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: remote feed falls back to the thumbnail, and both failing is a
// skipped tick with the count unchanged
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_capture_falls_back_to_thumbnail() {
    let capture = FakeCapture::new(false);
    let thumbnails = FakeCapture::new(true);
    let sampler = FeedSampler::new(
        "public",
        FfmpegTools::default(),
        capture.clone(),
        thumbnails.clone(),
    );

    let frame = sampler
        .sample(&feed("cam-003", SourceKind::Youtube))
        .await
        .unwrap();

    assert_eq!((frame.width, frame.height), (1280, 720));
    assert_eq!(capture.calls.load(Ordering::SeqCst), 1);
    assert_eq!(thumbnails.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_capture_and_thumbnail_failing_skips_detection() {
    let sampler = Arc::new(FeedSampler::new(
        "public",
        FfmpegTools::default(),
        FakeCapture::new(false),
        FakeCapture::new(false),
    ));
    let err = sampler
        .sample(&feed("cam-003", SourceKind::Youtube))
        .await
        .unwrap_err();
    assert!(matches!(err, SampleError::Remote { .. }));

    let store = Arc::new(AggregationStore::new(registry(vec![feed(
        "cam-003",
        SourceKind::Youtube,
    )])));
    store.update_feed_count("cam-003", 5).await.unwrap();
    let detector = Arc::new(FakeDetector::returning(detection(9, 0)));
    let sched = scheduler(store.clone(), sampler, detector.clone());

    sched.start(AnalysisMode::Live).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    let runtime = store.feed("cam-003").await.unwrap().runtime;
    assert_eq!(runtime.people_count, 5);
    assert!(runtime.failed_ticks >= 1);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: status changes start and stop individual feed tasks
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn feed_status_reconciles_tasks() {
    let store = Arc::new(AggregationStore::new(registry(vec![
        feed("cam-001", SourceKind::Local),
        feed("cam-002", SourceKind::Local),
    ])));
    let sched = scheduler(
        store.clone(),
        Arc::new(FakeSource::default()),
        Arc::new(FakeDetector::returning(detection(1, 0))),
    );

    let status = sched.start(AnalysisMode::Background).await;
    assert_eq!(status.running_feeds, vec!["cam-001", "cam-002"]);

    sched
        .set_feed_status("cam-002", FeedStatus::Offline)
        .await
        .unwrap();
    let status = sched.status().await;
    assert_eq!(status.running_feeds, vec!["cam-001"]);
    assert!(!store.feed("cam-002").await.unwrap().runtime.tracked);

    sched
        .set_feed_status("cam-002", FeedStatus::Active)
        .await
        .unwrap();
    assert_eq!(sched.status().await.running_feeds.len(), 2);

    assert!(sched
        .set_feed_status("cam-404", FeedStatus::Active)
        .await
        .is_err());

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: background cadence is 5 s for every kind
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn background_mode_ticks_every_five_seconds() {
    let store = Arc::new(AggregationStore::new(registry(vec![
        feed("cam-local", SourceKind::Local),
        feed("cam-remote", SourceKind::Youtube),
    ])));
    let sched = scheduler(
        store.clone(),
        Arc::new(FakeSource::default()),
        Arc::new(FakeDetector::returning(detection(0, 1))),
    );

    sched.start(AnalysisMode::Background).await;
    tokio::time::sleep(Duration::from_millis(9000)).await;

    for id in ["cam-local", "cam-remote"] {
        assert_eq!(store.feed(id).await.unwrap().runtime.tick_attempts, 2, "{id}");
    }

    // Switching to live restarts tasks at the faster cadence.
    let status = sched.start(AnalysisMode::Live).await;
    assert_eq!(status.mode, AnalysisMode::Live);
    tokio::time::sleep(Duration::from_millis(1990)).await;
    let local = store.feed("cam-local").await.unwrap().runtime;
    assert_eq!(local.tick_attempts, 6);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: start and stop persist the analysis flag
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_and_stop_persist_flag() {
    let dir = tempfile::tempdir().unwrap();
    let flag = Arc::new(AnalysisFlagStore::new(dir.path().join("analysis-state.json")));
    let store = Arc::new(AggregationStore::new(registry(vec![feed(
        "cam-001",
        SourceKind::Local,
    )])));
    let sched = scheduler(
        store,
        Arc::new(FakeSource::default()),
        Arc::new(FakeDetector::returning(detection(0, 0))),
    )
    .with_flag_store(flag.clone());

    assert!(!flag.load().await);
    sched.start(AnalysisMode::Background).await;
    assert!(flag.load().await);
    sched.stop().await;
    assert!(!flag.load().await);

    sched.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: mode switches keep local playback attached; stop releases it
// before returning
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mode_switches_keep_local_playback() {
    let dir = tempfile::tempdir().unwrap();
    let tools = FfmpegTools {
        ffmpeg: dir.path().join("no-ffmpeg"),
        ffprobe: dir.path().join("no-ffprobe"),
    };
    let sampler = Arc::new(FeedSampler::new(
        dir.path(),
        tools,
        FakeCapture::new(true),
        FakeCapture::new(true),
    ));
    let store = Arc::new(AggregationStore::new(registry(vec![feed(
        "cam-001",
        SourceKind::Local,
    )])));
    let sched = scheduler(
        store,
        sampler.clone(),
        Arc::new(FakeDetector::returning(detection(1, 0))),
    );
    let info = VideoInfo {
        duration_secs: 30.0,
        dimensions: Some((64, 48)),
    };

    for round in 0..50 {
        sampler
            .attach_playback(
                "cam-001",
                PlaybackHandle::with_info(dir.path().join("videos/cam-001.mp4"), info, true),
            )
            .await;
        let attached = sampler.playback("cam-001").await.unwrap();

        sched.start(AnalysisMode::Background).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let status = sched.start(AnalysisMode::Live).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(status.running_feeds, vec!["cam-001".to_string()], "round {round}");
        let current = sampler
            .playback("cam-001")
            .await
            .unwrap_or_else(|| panic!("playback released in round {round}"));
        assert!(Arc::ptr_eq(&attached, &current), "round {round}");

        sched.stop().await;
        assert!(sampler.playback("cam-001").await.is_none(), "round {round}");
    }

    // After a stop, a fresh start opens playback again. The file is
    // missing, so the handle records the failure.
    sched.start(AnalysisMode::Live).await;
    let mut reopened = None;
    for _ in 0..100 {
        reopened = sampler.playback("cam-001").await;
        if reopened.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let reopened = reopened.expect("playback reopened after restart");
    assert!(matches!(reopened.state(), PlaybackState::Failed(_)));

    sched.shutdown().await;
}
