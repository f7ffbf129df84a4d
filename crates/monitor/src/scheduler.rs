//! Per-feed polling scheduler.
//!
//! [`PollingScheduler`] owns one background task per Active feed. Each
//! task sleeps a random stagger, then ticks on a fixed interval that
//! depends on the [`AnalysisMode`] and the feed's source kind. A tick
//! claims the feed through [`AggregationStore::begin_tick`] and runs the
//! sample + detect cycle on its own task, so a slow cycle never delays
//! the timer; ticks that land while a cycle is in flight are skipped.
//!
//! Stopping cancels every feed's token while holding the task table's
//! write lock. Cycles take the read lock around their cancellation check
//! and commit, so once [`PollingScheduler::stop`] returns no further count
//! writes happen until analysis is started again.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crowdwatch_cloud::vision::{DetectionError, Detector};
use crowdwatch_core::aggregation::{AggregationStore, CommitOutcome, TickOutcome, TickStart};
use crowdwatch_core::detection::DetectionResult;
use crowdwatch_core::error::CoreError;
use crowdwatch_core::feed::{FeedDescriptor, FeedStatus, SourceKind};
use crowdwatch_core::types::FeedId;

use crate::sampler::{FrameSource, SampleError};
use crate::settings::AnalysisFlagStore;

/// How long [`PollingScheduler::shutdown`] waits for each task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// A feed is on screen; sample as fast as the source allows.
    Live,
    /// Nobody is watching; keep counts fresh at a slow cadence.
    #[default]
    Background,
}

/// Tick interval for a feed.
pub fn tick_interval(mode: AnalysisMode, kind: SourceKind) -> Duration {
    match (mode, kind) {
        (AnalysisMode::Live, SourceKind::Local) => Duration::from_millis(500),
        (AnalysisMode::Live, SourceKind::Youtube) => Duration::from_millis(2000),
        (AnalysisMode::Background, _) => Duration::from_millis(5000),
    }
}

/// Range, in milliseconds, the first-tick delay is drawn from.
pub fn stagger_range(kind: SourceKind) -> RangeInclusive<u64> {
    match kind {
        SourceKind::Local => 0..=300,
        SourceKind::Youtube => 500..=1000,
    }
}

fn draw_stagger(kind: SourceKind) -> Duration {
    Duration::from_millis(rand::rng().random_range(stagger_range(kind)))
}

/// Snapshot of the scheduler for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub mode: AnalysisMode,
    pub running_feeds: Vec<FeedId>,
}

#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Detect(#[from] DetectionError),
}

/// Bookkeeping for one feed's polling task.
struct ManagedFeed {
    task_handle: tokio::task::JoinHandle<()>,
    /// Per-feed cancellation token (child of the master token).
    cancel: CancellationToken,
}

/// State shared between the scheduler and its tasks.
struct Shared {
    store: Arc<AggregationStore>,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    /// Active polling tasks indexed by feed id.
    tasks: RwLock<HashMap<FeedId, ManagedFeed>>,
}

#[derive(Debug, Clone, Copy)]
struct RunState {
    enabled: bool,
    mode: AnalysisMode,
}

pub struct PollingScheduler {
    shared: Arc<Shared>,
    /// Serializes start/stop/reconcile so table updates never interleave.
    run_state: Mutex<RunState>,
    flag: Option<Arc<AnalysisFlagStore>>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl PollingScheduler {
    pub fn new(
        store: Arc<AggregationStore>,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                source,
                detector,
                tasks: RwLock::new(HashMap::new()),
            }),
            run_state: Mutex::new(RunState {
                enabled: false,
                mode: AnalysisMode::default(),
            }),
            flag: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Persist the enabled flag whenever analysis starts or stops.
    pub fn with_flag_store(mut self, flag: Arc<AnalysisFlagStore>) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn store(&self) -> &Arc<AggregationStore> {
        &self.shared.store
    }

    /// Enable analysis in `mode` and start tasks for every Active feed.
    ///
    /// Changing the mode while running restarts every task at the new
    /// cadence.
    pub async fn start(&self, mode: AnalysisMode) -> SchedulerStatus {
        {
            let mut run = self.run_state.lock().await;
            let mode_changed = run.enabled && run.mode != mode;
            run.enabled = true;
            run.mode = mode;
            if mode_changed {
                tracing::info!(?mode, "Analysis mode changed, restarting feed tasks");
                // Playback keeps running across a mode change.
                self.stop_all(false).await;
            }
            self.reconcile_locked(&run).await;
        }
        tracing::info!(?mode, "Analysis started");
        self.persist(true).await;
        self.status().await
    }

    /// Cancel every feed task. Returns once no further commits can land.
    pub async fn stop(&self) -> SchedulerStatus {
        {
            let mut run = self.run_state.lock().await;
            run.enabled = false;
            self.stop_all(true).await;
        }
        tracing::info!("Analysis stopped");
        self.persist(false).await;
        self.status().await
    }

    /// Bring the task table in line with the feeds' statuses.
    pub async fn reconcile(&self) {
        let run = self.run_state.lock().await;
        self.reconcile_locked(&run).await;
    }

    /// Update a feed's status and start or stop its task accordingly.
    pub async fn set_feed_status(
        &self,
        id: &str,
        status: FeedStatus,
    ) -> Result<FeedDescriptor, CoreError> {
        let descriptor = self.shared.store.set_status(id, status).await?;
        tracing::info!(feed_id = %id, ?status, "Feed status changed");
        self.reconcile().await;
        Ok(descriptor)
    }

    /// Commit a detection made outside the polling loop.
    ///
    /// Only lands while analysis is enabled, so nothing is written after
    /// [`PollingScheduler::stop`]. Returns whether it was committed.
    pub async fn record_detection(
        &self,
        id: &str,
        result: DetectionResult,
    ) -> Result<bool, CoreError> {
        let run = self.run_state.lock().await;
        if !run.enabled {
            if self.shared.store.feed(id).await.is_none() {
                return Err(CoreError::NotFound {
                    entity: "Feed",
                    id: id.to_string(),
                });
            }
            tracing::debug!(feed_id = %id, "Analysis stopped, detection not committed");
            return Ok(false);
        }
        self.shared.store.record_detection(id, result).await?;
        Ok(true)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let run = *self.run_state.lock().await;
        let mut running_feeds: Vec<FeedId> =
            self.shared.tasks.read().await.keys().cloned().collect();
        running_feeds.sort();
        SchedulerStatus {
            enabled: run.enabled,
            mode: run.mode,
            running_feeds,
        }
    }

    /// Gracefully shut down all feed tasks.
    ///
    /// Cancels the master token, then waits up to 5 seconds per task
    /// for a clean exit. The persisted flag is left untouched so the next
    /// start resumes where this one left off.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down polling scheduler");
        self.cancel.cancel();

        let drained: Vec<(FeedId, ManagedFeed)> = {
            let mut tasks = self.shared.tasks.write().await;
            tasks.drain().collect()
        };
        for (id, managed) in drained {
            tracing::debug!(feed_id = %id, "Stopping feed task");
            managed.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, managed.task_handle).await;
        }

        tracing::info!("Polling scheduler shut down complete");
    }

    // ---- private helpers ----

    async fn reconcile_locked(&self, run: &RunState) {
        if self.cancel.is_cancelled() {
            return;
        }
        if !run.enabled {
            self.stop_all(true).await;
            return;
        }

        let active = self.shared.store.active_descriptors().await;
        let mut tasks = self.shared.tasks.write().await;

        let stale: Vec<FeedId> = tasks
            .keys()
            .filter(|id| !active.iter().any(|f| &f.id == *id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(managed) = tasks.remove(&id) {
                managed.cancel.cancel();
                self.untrack(&id, true).await;
                tracing::info!(feed_id = %id, "Feed no longer active, task stopped");
            }
        }

        for feed in active {
            if tasks.contains_key(&feed.id) {
                continue;
            }
            let id = feed.id.clone();
            let _ = self.shared.store.set_tracked(&id, true).await;
            let managed = self.spawn_feed(feed, run.mode);
            tasks.insert(id, managed);
        }
    }

    /// Cancel and drop every task while holding the table's write lock.
    async fn stop_all(&self, release: bool) {
        let mut tasks = self.shared.tasks.write().await;
        let ids: Vec<FeedId> = tasks.keys().cloned().collect();
        for id in ids {
            if let Some(managed) = tasks.remove(&id) {
                managed.cancel.cancel();
                self.untrack(&id, release).await;
            }
        }
    }

    /// Mark a feed untracked and, if asked, release its source.
    ///
    /// The release completes before the caller can spawn a replacement
    /// task, so a new task's `activate` never races it.
    async fn untrack(&self, id: &str, release: bool) {
        let _ = self.shared.store.set_tracked(id, false).await;
        if release {
            self.shared.source.release(id).await;
        }
    }

    fn spawn_feed(&self, feed: FeedDescriptor, mode: AnalysisMode) -> ManagedFeed {
        let cancel = self.cancel.child_token();
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        tracing::info!(feed_id = %feed.id, ?mode, "Starting feed task");
        let task_handle = tokio::spawn(run_feed(shared, feed, mode, task_cancel));
        ManagedFeed {
            task_handle,
            cancel,
        }
    }

    async fn persist(&self, enabled: bool) {
        if let Some(flag) = &self.flag {
            if let Err(e) = flag.save(enabled).await {
                tracing::warn!(error = %e, enabled, "Failed to persist analysis flag");
            }
        }
    }
}

/// Timer loop for one feed.
async fn run_feed(
    shared: Arc<Shared>,
    feed: FeedDescriptor,
    mode: AnalysisMode,
    cancel: CancellationToken,
) {
    if let Err(e) = shared.source.activate(&feed).await {
        tracing::warn!(feed_id = %feed.id, error = %e, "Feed activation failed");
    }

    let stagger = draw_stagger(feed.source_kind);
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(stagger) => {}
    }

    let mut ticker = tokio::time::interval(tick_interval(mode, feed.source_kind));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match shared.store.begin_tick(&feed.id).await {
            TickStart::Started { seq } => {
                tokio::spawn(run_cycle(
                    Arc::clone(&shared),
                    feed.clone(),
                    seq,
                    cancel.clone(),
                ));
            }
            TickStart::Busy => {
                tracing::debug!(feed_id = %feed.id, "Cycle still in flight, tick skipped");
            }
            TickStart::Unknown => {
                tracing::warn!(feed_id = %feed.id, "Feed vanished from store, task exiting");
                break;
            }
        }
    }

    tracing::debug!(feed_id = %feed.id, "Feed task exited");
}

/// One sample + detect cycle, committed under the task table's read lock.
async fn run_cycle(
    shared: Arc<Shared>,
    feed: FeedDescriptor,
    seq: u64,
    cancel: CancellationToken,
) {
    let outcome = match sample_and_detect(&shared, &feed).await {
        Ok(result) => TickOutcome::Detected(result),
        Err(e) => {
            tracing::warn!(feed_id = %feed.id, error = %e, "Analysis cycle failed");
            TickOutcome::Failed
        }
    };

    let _table = shared.tasks.read().await;
    let outcome = if cancel.is_cancelled() {
        TickOutcome::Cancelled
    } else {
        outcome
    };
    match shared.store.finish_tick(&feed.id, seq, outcome).await {
        CommitOutcome::Applied => {
            tracing::debug!(feed_id = %feed.id, seq, "Detection committed");
        }
        CommitOutcome::Stale => {
            tracing::debug!(feed_id = %feed.id, seq, "Stale detection dropped");
        }
        CommitOutcome::Discarded => {
            tracing::debug!(feed_id = %feed.id, seq, "Detection discarded after cancellation");
        }
        CommitOutcome::Failed | CommitOutcome::Unknown => {}
    }
}

async fn sample_and_detect(
    shared: &Shared,
    feed: &FeedDescriptor,
) -> Result<DetectionResult, CycleError> {
    let frame = shared.source.sample(feed).await?;
    Ok(shared.detector.detect(&frame.jpeg).await?)
}
