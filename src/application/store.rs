//! In-memory registry of rendered artifacts awaiting pickup.
//!
//! Handles map to [`Artifact`] records behind a single `RwLock`. Lookups take
//! the shared side; register/remove/sweep/drain take the exclusive side only
//! for the map mutation itself. Physical backings are released after the
//! entries have left the map, so a lookup never hands out a deleted file.
//!
//! At most one eviction sweep runs at a time. The gate is an `AtomicBool`
//! separate from the map lock; a caller that finds a sweep in progress
//! returns immediately with [`SweepOutcome::Skipped`].

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::domain::artifact::{Artifact, ArtifactDraft};

use super::{
    clock::Clock,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "application::store";

pub const METRIC_ARTIFACTS_REGISTERED: &str = "pressroom_artifacts_registered_total";
pub const METRIC_ARTIFACTS_EVICTED: &str = "pressroom_artifacts_evicted_total";
pub const METRIC_ARTIFACTS_STORED: &str = "pressroom_artifacts_stored";
pub const METRIC_EVICTION_SKIPPED: &str = "pressroom_eviction_skipped_total";

/// Releases the physical backing of artifacts that left the store.
///
/// Implementations are best-effort: failures are logged, never returned.
pub trait StorageReclaimer: Send + Sync {
    fn reclaim(&self, artifact: &Artifact);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep was already running.
    Skipped,
    Completed { evicted: usize },
}

pub struct ArtifactStore {
    entries: RwLock<HashMap<String, Artifact>>,
    sweeping: AtomicBool,
    retention: Duration,
    clock: Arc<dyn Clock>,
    reclaimer: Arc<dyn StorageReclaimer>,
}

impl ArtifactStore {
    pub fn new(
        retention: Duration,
        clock: Arc<dyn Clock>,
        reclaimer: Arc<dyn StorageReclaimer>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sweeping: AtomicBool::new(false),
            retention,
            clock,
            reclaimer,
        }
    }

    /// Publish a draft under its handle, stamping the creation time.
    pub fn register(&self, draft: ArtifactDraft) -> Artifact {
        let artifact = Artifact::from_draft(draft, self.clock.now());

        let displaced = {
            let mut entries = rw_write(&self.entries, SOURCE, "register");
            let displaced = entries.insert(artifact.handle.clone(), artifact.clone());
            gauge!(METRIC_ARTIFACTS_STORED).set(entries.len() as f64);
            displaced
        };

        counter!(METRIC_ARTIFACTS_REGISTERED).increment(1);
        debug!(
            target = "pressroom::store",
            handle = %artifact.handle,
            content_type = %artifact.content_type(),
            "Registered artifact"
        );

        if let Some(previous) = displaced {
            warn!(
                target = "pressroom::store",
                handle = %previous.handle,
                path = %previous.storage.path().display(),
                "Handle collision; releasing displaced artifact"
            );
            self.reclaimer.reclaim(&previous);
        }

        artifact
    }

    pub fn lookup(&self, handle: &str) -> Option<Artifact> {
        rw_read(&self.entries, SOURCE, "lookup").get(handle).cloned()
    }

    /// Take an entry out of the store. The caller owns its backing afterwards.
    pub fn remove(&self, handle: &str) -> Option<Artifact> {
        let mut entries = rw_write(&self.entries, SOURCE, "remove");
        let removed = entries.remove(handle);
        gauge!(METRIC_ARTIFACTS_STORED).set(entries.len() as f64);
        removed
    }

    /// Remove an entry and release its backing. Returns whether it existed.
    pub fn purge(&self, handle: &str) -> bool {
        match self.remove(handle) {
            Some(artifact) => {
                self.reclaimer.reclaim(&artifact);
                true
            }
            None => false,
        }
    }

    /// Evict every artifact created strictly before `threshold`.
    pub fn evict_older_than(&self, threshold: OffsetDateTime) -> SweepOutcome {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            counter!(METRIC_EVICTION_SKIPPED).increment(1);
            debug!(
                target = "pressroom::store",
                "Eviction sweep already in progress; skipping"
            );
            return SweepOutcome::Skipped;
        }
        let _gate = SweepGate(&self.sweeping);

        let mut stale = Vec::new();
        {
            let mut entries = rw_write(&self.entries, SOURCE, "evict_older_than");
            entries.retain(|_, artifact| {
                if artifact.created_at < threshold {
                    stale.push(artifact.clone());
                    false
                } else {
                    true
                }
            });
            gauge!(METRIC_ARTIFACTS_STORED).set(entries.len() as f64);
        }

        for artifact in &stale {
            self.reclaimer.reclaim(artifact);
        }

        if !stale.is_empty() {
            counter!(METRIC_ARTIFACTS_EVICTED).increment(stale.len() as u64);
            info!(
                target = "pressroom::store",
                evicted = stale.len(),
                threshold = %threshold,
                "Evicted expired artifacts"
            );
        }

        SweepOutcome::Completed {
            evicted: stale.len(),
        }
    }

    /// Evict everything older than the retention window, measured from now.
    pub fn evict_expired(&self) -> SweepOutcome {
        self.evict_older_than(self.clock.now() - self.retention)
    }

    /// Remove and release every artifact regardless of age.
    pub fn drain_all(&self) -> usize {
        let drained = {
            let mut entries = rw_write(&self.entries, SOURCE, "drain_all");
            let drained = std::mem::take(&mut *entries);
            gauge!(METRIC_ARTIFACTS_STORED).set(0.0);
            drained
        };

        let count = drained.len();
        for artifact in drained.into_values() {
            self.reclaimer.reclaim(&artifact);
        }
        counter!(METRIC_ARTIFACTS_EVICTED).increment(count as u64);
        count
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reopens the sweep gate when the sweep ends, however it ends.
struct SweepGate<'a>(&'a AtomicBool);

impl Drop for SweepGate<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
