//! timing-decorrelation queue for disclosures and proofs
//!
//! submissions are held until either `min_batch_size` are pending or the
//! oldest has waited `max_delay`, then all pending items leave together in
//! shuffled order. an observer of the released batch learns neither the
//! submission order nor which item arrived when.
//!
//! ```text
//! QUEUED ──release──▶ BATCHED ──mark_released──▶ RELEASED
//!    │
//!    └──withdraw──▶ WITHDRAWN
//! ```
//!
//! released and withdrawn items keep their status in a bounded archive;
//! once it is full the oldest entries are forgotten and report as unknown.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{Error, Result};

pub type SubmissionId = u64;
pub type BatchId = u64;

/// terminal statuses remembered by default
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 1024;

/// release policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// release as soon as this many are pending
    pub min_batch_size: usize,
    /// release anyway once the oldest pending item is this old
    pub max_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 5,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(Error::Config("min_batch_size must be at least 1".into()));
        }
        if self.max_delay.is_zero() {
            return Err(Error::Config("max_delay must be positive".into()));
        }
        Ok(())
    }
}

/// what was submitted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Dispute,
    Proof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "batch")]
pub enum SubmissionStatus {
    Queued,
    Batched(BatchId),
    Released(BatchId),
    Withdrawn,
}

/// a queued item
#[derive(Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub kind: SubmissionKind,
    pub payload: Vec<u8>,
    pub earliest_release_time: Instant,
    /// set when the item is batched
    pub batch_id: Option<BatchId>,
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.payload.len())
            .field("batch_id", &self.batch_id)
            .finish()
    }
}

/// items released together
#[derive(Clone, Debug)]
pub struct Batch {
    pub id: BatchId,
    pub items: Vec<Submission>,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<Submission>,
    status: HashMap<SubmissionId, SubmissionStatus>,
    batches: HashMap<BatchId, Vec<SubmissionId>>,
    /// terminal items, oldest first
    archive: VecDeque<SubmissionId>,
    next_submission: SubmissionId,
    next_batch: BatchId,
}

impl Inner {
    fn archive(&mut self, id: SubmissionId, status: SubmissionStatus, capacity: usize) {
        self.status.insert(id, status);
        self.archive.push_back(id);
        while self.archive.len() > capacity {
            if let Some(old) = self.archive.pop_front() {
                self.status.remove(&old);
            }
        }
    }
}

/// the pending set and its release policy, behind one lock
pub struct BatchQueue {
    config: BatchConfig,
    archive_capacity: usize,
    inner: Mutex<Inner>,
    wake: Notify,
}

impl BatchQueue {
    pub fn new(config: BatchConfig) -> Result<Self> {
        Self::with_archive_capacity(config, DEFAULT_ARCHIVE_CAPACITY)
    }

    /// like [`BatchQueue::new`], remembering at most `capacity` released or
    /// withdrawn statuses
    pub fn with_archive_capacity(config: BatchConfig, capacity: usize) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            archive_capacity: capacity,
            inner: Mutex::new(Inner {
                next_submission: 1,
                next_batch: 1,
                ..Inner::default()
            }),
            wake: Notify::new(),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| Error::Storage(e.to_string()))
    }

    /// queue a payload; eligible for release from now
    pub fn enqueue(&self, kind: SubmissionKind, payload: Vec<u8>) -> Result<SubmissionId> {
        let id = {
            let mut inner = self.lock()?;
            let id = inner.next_submission;
            inner.next_submission += 1;
            inner.pending.push_back(Submission {
                id,
                kind,
                payload,
                earliest_release_time: Instant::now(),
                batch_id: None,
            });
            inner.status.insert(id, SubmissionStatus::Queued);
            id
        };
        debug!(submission = id, ?kind, "queued");
        self.wake.notify_one();
        Ok(id)
    }

    /// pull a queued item back out
    ///
    /// returns false without changing anything once the item is batched,
    /// released or already withdrawn.
    pub fn withdraw(&self, id: SubmissionId) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.status.get(&id).copied() {
            None => Err(Error::UnknownSubmission(id)),
            Some(SubmissionStatus::Queued) => {
                inner.pending.retain(|s| s.id != id);
                inner.archive(id, SubmissionStatus::Withdrawn, self.archive_capacity);
                debug!(submission = id, "withdrawn");
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    pub fn status(&self, id: SubmissionId) -> Result<SubmissionStatus> {
        self.lock()?
            .status
            .get(&id)
            .copied()
            .ok_or(Error::UnknownSubmission(id))
    }

    pub fn pending_len(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// submissions whose status is still known, in any state
    pub fn tracked_len(&self) -> Result<usize> {
        Ok(self.lock()?.status.len())
    }

    /// when the oldest pending item forces a release
    pub fn next_deadline(&self) -> Result<Option<Instant>> {
        Ok(self
            .lock()?
            .pending
            .front()
            .map(|s| s.earliest_release_time + self.config.max_delay))
    }

    /// form a batch if the policy says so, atomically moving every pending
    /// item to `Batched`
    pub fn release_ready(&self, now: Instant) -> Result<Option<Batch>> {
        let mut inner = self.lock()?;
        let size_reached = inner.pending.len() >= self.config.min_batch_size;
        let delay_reached = inner
            .pending
            .front()
            .is_some_and(|s| now >= s.earliest_release_time + self.config.max_delay);
        if !(size_reached || delay_reached) {
            return Ok(None);
        }

        let batch_id = inner.next_batch;
        inner.next_batch += 1;

        let mut items: Vec<Submission> = inner.pending.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        for item in &mut items {
            item.batch_id = Some(batch_id);
        }
        let ids: Vec<SubmissionId> = items.iter().map(|s| s.id).collect();
        for id in &ids {
            inner.status.insert(*id, SubmissionStatus::Batched(batch_id));
        }
        inner.batches.insert(batch_id, ids);

        info!(
            batch = batch_id,
            size = items.len(),
            trigger = if size_reached { "size" } else { "delay" },
            "formed batch"
        );
        Ok(Some(Batch { id: batch_id, items }))
    }

    /// record that a batch went out; its items are archived as `Released`
    pub fn mark_released(&self, batch_id: BatchId) -> Result<()> {
        let mut inner = self.lock()?;
        let ids = inner
            .batches
            .remove(&batch_id)
            .ok_or(Error::UnknownBatch(batch_id))?;
        for id in ids {
            inner.archive(id, SubmissionStatus::Released(batch_id), self.archive_capacity);
        }
        debug!(batch = batch_id, "released");
        Ok(())
    }

    /// run the release policy in the background
    ///
    /// wakes on every enqueue and at the oldest item's deadline, and hands
    /// each formed batch to `tx`. exits when the receiver is dropped.
    pub fn spawn_release_loop(self: Arc<Self>, tx: mpsc::Sender<Batch>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.release_ready(Instant::now()) {
                    Ok(Some(batch)) => {
                        if tx.send(batch).await.is_err() {
                            debug!("batch receiver dropped, stopping release loop");
                            break;
                        }
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("release loop stopped: {e}");
                        break;
                    }
                }

                let deadline = match self.next_deadline() {
                    Ok(deadline) => deadline,
                    Err(e) => {
                        warn!("release loop stopped: {e}");
                        break;
                    }
                };
                match deadline {
                    Some(at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at) => {}
                            _ = self.wake.notified() => {}
                            _ = tx.closed() => break,
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = self.wake.notified() => {}
                            _ = tx.closed() => break,
                        }
                    }
                }
            }
        })
    }
}
