//! Shared per-feed runtime state and the dashboard statistics derived
//! from it.
//!
//! [`AggregationStore`] is the only shared mutable resource in the
//! system. Every write is a single-feed replacement under one write lock,
//! after which [`AggregateStats`] is recomputed before the lock is
//! released, so readers never observe stats that disagree with the feed
//! counts.
//!
//! Detection results carry a per-feed sequence number assigned when the
//! tick started. A result is committed only if its sequence number is
//! newer than the last committed one, so an earlier-issued request that
//! completes late can never overwrite newer data.

use serde::Serialize;
use tokio::sync::RwLock;

use crate::chat::{AnalyticsContext, FeedSummary};
use crate::detection::DetectionResult;
use crate::error::CoreError;
use crate::feed::{FeedDescriptor, FeedRegistry, FeedStatus};
use crate::types::Timestamp;

/// Mutable runtime state of one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRuntimeState {
    pub people_count: u32,
    pub last_detection: Option<DetectionResult>,
    /// True while a sample + detect cycle is in flight.
    pub analyzing: bool,
    pub last_analysis_at: Option<Timestamp>,
    /// When `people_count` was last written, by detection or directly.
    pub updated_at: Option<Timestamp>,
    /// True while a polling task owns this feed.
    pub tracked: bool,
    /// Sequence number of the most recently started tick.
    pub issued_seq: u64,
    /// Sequence number of the most recently committed detection.
    pub applied_seq: u64,
    pub tick_attempts: u64,
    pub skipped_ticks: u64,
    pub failed_ticks: u64,
}

/// Dashboard-wide statistics. Always a pure function of the feed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_people: u64,
    pub total_alerts: u64,
    pub active_cameras: u32,
    pub total_cameras: u32,
    pub last_update: Option<Timestamp>,
}

impl AggregateStats {
    pub fn compute<'a, I>(entries: I, last_update: Option<Timestamp>) -> Self
    where
        I: IntoIterator<Item = (&'a FeedDescriptor, &'a FeedRuntimeState)>,
    {
        let mut stats = AggregateStats {
            last_update,
            ..Default::default()
        };
        for (descriptor, runtime) in entries {
            stats.total_people += u64::from(runtime.people_count);
            stats.total_alerts += u64::from(descriptor.alerts);
            stats.total_cameras += 1;
            if descriptor.status.is_active() {
                stats.active_cameras += 1;
            }
        }
        stats
    }
}

/// Descriptor plus runtime state, as returned to readers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    #[serde(flatten)]
    pub descriptor: FeedDescriptor,
    #[serde(flatten)]
    pub runtime: FeedRuntimeState,
}

/// Result of trying to start a tick for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStart {
    /// The feed was idle; `analyzing` is now set.
    Started { seq: u64 },
    /// A cycle is already in flight; this tick is skipped.
    Busy,
    Unknown,
}

/// How a started tick ended.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Detected(DetectionResult),
    Failed,
    /// The owning task was cancelled while the cycle was in flight.
    Cancelled,
}

/// What [`AggregationStore::finish_tick`] did with the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// A newer detection had already been committed.
    Stale,
    Failed,
    Discarded,
    Unknown,
}

struct FeedEntry {
    descriptor: FeedDescriptor,
    runtime: FeedRuntimeState,
}

struct StoreInner {
    entries: Vec<FeedEntry>,
    stats: AggregateStats,
    last_update: Option<Timestamp>,
    writes: u64,
}

impl StoreInner {
    fn entry_mut(&mut self, id: &str) -> Option<&mut FeedEntry> {
        self.entries.iter_mut().find(|e| e.descriptor.id == id)
    }

    fn recompute(&mut self) {
        self.stats = AggregateStats::compute(
            self.entries.iter().map(|e| (&e.descriptor, &e.runtime)),
            self.last_update,
        );
    }
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Feed",
        id: id.to_string(),
    }
}

/// Thread-safe store of every feed's latest state.
///
/// Designed to be wrapped in `Arc` and shared by the scheduler and HTTP
/// handlers.
pub struct AggregationStore {
    inner: RwLock<StoreInner>,
}

impl AggregationStore {
    pub fn new(registry: FeedRegistry) -> Self {
        let entries = registry
            .into_feeds()
            .into_iter()
            .map(|descriptor| FeedEntry {
                descriptor,
                runtime: FeedRuntimeState::default(),
            })
            .collect();
        let mut inner = StoreInner {
            entries,
            stats: AggregateStats::default(),
            last_update: None,
            writes: 0,
        };
        inner.recompute();
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Last-write-wins replacement of one feed's people count.
    ///
    /// Calling this twice with the same value leaves the stats unchanged.
    pub async fn update_feed_count(
        &self,
        id: &str,
        count: u32,
    ) -> Result<AggregateStats, CoreError> {
        let mut inner = self.inner.write().await;
        let now = chrono::Utc::now();
        let entry = inner.entry_mut(id).ok_or_else(|| not_found(id))?;
        entry.runtime.people_count = count;
        entry.runtime.updated_at = Some(now);
        inner.last_update = Some(now);
        inner.writes += 1;
        inner.recompute();
        Ok(inner.stats.clone())
    }

    /// Commit a detection made outside the polling loop.
    ///
    /// It supersedes every tick issued so far, so a cycle still in flight
    /// lands as stale instead of overwriting it.
    pub async fn record_detection(
        &self,
        id: &str,
        result: DetectionResult,
    ) -> Result<AggregateStats, CoreError> {
        let mut inner = self.inner.write().await;
        let now = chrono::Utc::now();
        let entry = inner.entry_mut(id).ok_or_else(|| not_found(id))?;
        let runtime = &mut entry.runtime;
        runtime.people_count = result.people;
        runtime.last_detection = Some(result);
        runtime.last_analysis_at = Some(now);
        runtime.updated_at = Some(now);
        runtime.applied_seq = runtime.issued_seq;
        inner.last_update = Some(now);
        inner.writes += 1;
        inner.recompute();
        Ok(inner.stats.clone())
    }

    /// Check-and-set the `analyzing` flag for one feed.
    pub async fn begin_tick(&self, id: &str) -> TickStart {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.entry_mut(id) else {
            return TickStart::Unknown;
        };
        let runtime = &mut entry.runtime;
        runtime.tick_attempts += 1;
        if runtime.analyzing {
            runtime.skipped_ticks += 1;
            return TickStart::Busy;
        }
        runtime.analyzing = true;
        runtime.issued_seq += 1;
        TickStart::Started {
            seq: runtime.issued_seq,
        }
    }

    /// Clear `analyzing` and commit the outcome of a started tick.
    pub async fn finish_tick(&self, id: &str, seq: u64, outcome: TickOutcome) -> CommitOutcome {
        let mut inner = self.inner.write().await;
        let now = chrono::Utc::now();
        let Some(entry) = inner.entry_mut(id) else {
            return CommitOutcome::Unknown;
        };
        let runtime = &mut entry.runtime;
        if seq == runtime.issued_seq {
            runtime.analyzing = false;
        }

        let result = match outcome {
            TickOutcome::Detected(result) => result,
            TickOutcome::Failed => {
                runtime.failed_ticks += 1;
                return CommitOutcome::Failed;
            }
            TickOutcome::Cancelled => return CommitOutcome::Discarded,
        };

        if seq <= runtime.applied_seq {
            return CommitOutcome::Stale;
        }

        runtime.people_count = result.people;
        runtime.last_detection = Some(result);
        runtime.last_analysis_at = Some(now);
        runtime.updated_at = Some(now);
        runtime.applied_seq = seq;
        inner.last_update = Some(now);
        inner.writes += 1;
        inner.recompute();
        CommitOutcome::Applied
    }

    /// Mark whether a polling task currently owns the feed.
    ///
    /// Untracking freezes the feed: its last count is kept.
    pub async fn set_tracked(&self, id: &str, tracked: bool) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id).ok_or_else(|| not_found(id))?;
        entry.runtime.tracked = tracked;
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: FeedStatus,
    ) -> Result<FeedDescriptor, CoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id).ok_or_else(|| not_found(id))?;
        entry.descriptor.status = status;
        let descriptor = entry.descriptor.clone();
        inner.recompute();
        Ok(descriptor)
    }

    pub async fn stats(&self) -> AggregateStats {
        self.inner.read().await.stats.clone()
    }

    /// Number of committed count writes since creation.
    pub async fn writes(&self) -> u64 {
        self.inner.read().await.writes
    }

    pub async fn feed(&self, id: &str) -> Option<FeedSnapshot> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| FeedSnapshot {
                descriptor: e.descriptor.clone(),
                runtime: e.runtime.clone(),
            })
    }

    pub async fn feeds(&self) -> Vec<FeedSnapshot> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|e| FeedSnapshot {
                descriptor: e.descriptor.clone(),
                runtime: e.runtime.clone(),
            })
            .collect()
    }

    /// Descriptors of every feed currently marked Active.
    pub async fn active_descriptors(&self) -> Vec<FeedDescriptor> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.descriptor.status.is_active())
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Stats plus per-feed summary, taken under one read lock.
    pub async fn analytics_context(&self) -> AnalyticsContext {
        let inner = self.inner.read().await;
        AnalyticsContext {
            active_cameras: inner.stats.active_cameras,
            total_people: inner.stats.total_people,
            total_alerts: inner.stats.total_alerts,
            last_update: inner.last_update.map(|t| t.to_rfc3339()),
            feeds: inner
                .entries
                .iter()
                .map(|e| FeedSummary {
                    name: e.descriptor.name.clone(),
                    location: e.descriptor.location.clone(),
                    people_count: e.runtime.people_count,
                    status: e.descriptor.status,
                    alerts: e.descriptor.alerts,
                })
                .collect(),
        }
    }
}
