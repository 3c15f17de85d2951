//! Persisted print queue
//!
//! One ordered pending list shared by every printer; each job carries its
//! target. A new job goes after every job of the same or higher priority,
//! a retried job goes to the head of its own tier. Pending and failed lists
//! are written to the store after every mutation, outside the state lock;
//! a revision number keeps an older copy from overwriting a newer one.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::PrintEvent;
use shared::models::{Document, JobStatus, PrintJob};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, error, info, warn};

use crate::core::Config;
use crate::error::{HubResult, PrintHubError};
use crate::storage::{FAILED_JOBS_KEY, KvStore, PENDING_JOBS_KEY, load_json, save_json};

/// Completed jobs kept in memory for status queries
const RECENT_COMPLETIONS_CAP: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub max_size: usize,
    pub max_retries: u32,
    pub failed_cap: usize,
    pub retention: chrono::Duration,
    /// Pause between two jobs
    pub job_pause: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_retries: 3,
            failed_cap: 50,
            retention: chrono::Duration::hours(24),
            job_pause: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for QueueConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_size: config.queue_max_size,
            max_retries: config.queue_max_retries,
            failed_cap: config.failed_jobs_cap,
            retention: chrono::Duration::hours(config.job_retention_hours),
            job_pause: config.job_pause(),
        }
    }
}

/// Point-in-time copy of the queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pending: Vec<PrintJob>,
    pub active: Option<PrintJob>,
    pub failed: Vec<PrintJob>,
    /// Most recent first
    pub completed: Vec<PrintJob>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub printing: bool,
    pub failed: usize,
    pub completed: usize,
}

/// What happened to a job after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct FailOutcome {
    pub job: PrintJob,
    pub will_retry: bool,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<PrintJob>,
    active: Option<PrintJob>,
    failed: VecDeque<PrintJob>,
    completed: VecDeque<PrintJob>,
    /// Bumped on every mutation
    revision: u64,
}

/// Copy of the persisted lists, taken under the state lock
struct Checkpoint {
    revision: u64,
    pending: Vec<PrintJob>,
    failed: Vec<PrintJob>,
    /// Pending jobs, not counting the active one
    queued: usize,
}

impl QueueState {
    /// After every job of the same or higher priority
    fn insert_new(&mut self, job: PrintJob) {
        let priority = job.priority();
        let at = self
            .pending
            .iter()
            .position(|j| j.priority() < priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(at, job);
    }

    /// Head of its own tier, after strictly higher priorities
    fn insert_retry(&mut self, job: PrintJob) {
        let priority = job.priority();
        let at = self
            .pending
            .iter()
            .position(|j| j.priority() <= priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(at, job);
    }

    fn push_failed(&mut self, job: PrintJob, cap: usize) {
        self.failed.push_back(job);
        while self.failed.len() > cap {
            if let Some(dropped) = self.failed.pop_front() {
                debug!(job_id = %dropped.id, "Failed list full, oldest entry dropped");
            }
        }
    }

    /// Pending list as persisted: the active job first, still `printing`,
    /// so a crash mid-print brings it back on reload
    fn persisted_pending(&self) -> Vec<PrintJob> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.revision += 1;
        Checkpoint {
            revision: self.revision,
            pending: self.persisted_pending(),
            failed: self.failed.iter().cloned().collect(),
            queued: self.pending.len(),
        }
    }
}

pub struct PrintQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    store: Arc<dyn KvStore>,
    events: broadcast::Sender<PrintEvent>,
    work: Notify,
    /// Revision last written to the store; held while writing
    written: Mutex<u64>,
}

impl PrintQueue {
    /// Empty queue; nothing is read from the store
    pub fn new(
        config: QueueConfig,
        store: Arc<dyn KvStore>,
        events: broadcast::Sender<PrintEvent>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            store,
            events,
            work: Notify::new(),
            written: Mutex::new(0),
        }
    }

    /// Queue restored from the store.
    ///
    /// Jobs older than the retention window are dropped; jobs found
    /// `printing` were interrupted and go back to `pending`.
    pub fn load(
        config: QueueConfig,
        store: Arc<dyn KvStore>,
        events: broadcast::Sender<PrintEvent>,
    ) -> HubResult<Self> {
        let cutoff = Utc::now() - config.retention;

        let stored: Vec<PrintJob> = load_json(store.as_ref(), PENDING_JOBS_KEY)?.unwrap_or_default();
        let stored_failed: Vec<PrintJob> =
            load_json(store.as_ref(), FAILED_JOBS_KEY)?.unwrap_or_default();
        let total = stored.len() + stored_failed.len();

        let pending: Vec<PrintJob> = stored
            .into_iter()
            .filter(|job| job.created_at >= cutoff && !job.status.is_terminal())
            .map(|mut job| {
                if job.status == JobStatus::Printing {
                    debug!(job_id = %job.id, "Interrupted job reset to pending");
                    job.set_status(JobStatus::Pending);
                }
                job
            })
            .collect();
        let failed: VecDeque<PrintJob> = stored_failed
            .into_iter()
            .filter(|job| job.created_at >= cutoff)
            .collect();

        let restored = pending.len() + failed.len();
        info!(
            pending = pending.len(),
            failed = failed.len(),
            expired = total - restored,
            "Print queue restored"
        );

        let queue = Self::new(config, store, events);
        let checkpoint = {
            let mut state = queue.state.lock();
            state.pending = pending;
            state.failed = failed;
            state.checkpoint()
        };
        queue.persist(&checkpoint);
        if !queue.is_empty() {
            queue.work.notify_one();
        }
        Ok(queue)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // ========== Submission ==========

    /// Add a document for a printer; fails with `QueueFull` at capacity
    pub fn enqueue(&self, document: Document, printer_id: &str) -> HubResult<PrintJob> {
        let job = PrintJob::new(document, printer_id, self.config.max_retries);
        self.insert_batch(std::slice::from_ref(&job))?;
        Ok(job)
    }

    /// Add several documents at once.
    ///
    /// Either every job is queued or none is: the batch is refused with
    /// `QueueFull` when it does not fit in the remaining capacity.
    pub fn enqueue_all(&self, batch: Vec<(Document, String)>) -> HubResult<Vec<PrintJob>> {
        let jobs: Vec<PrintJob> = batch
            .into_iter()
            .map(|(document, printer_id)| {
                PrintJob::new(document, printer_id, self.config.max_retries)
            })
            .collect();
        self.insert_batch(&jobs)?;
        Ok(jobs)
    }

    fn insert_batch(&self, jobs: &[PrintJob]) -> HubResult<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let checkpoint = {
            let mut state = self.state.lock();
            if state.pending.len() + jobs.len() > self.config.max_size {
                warn!(
                    max = self.config.max_size,
                    pending = state.pending.len(),
                    batch = jobs.len(),
                    "Print queue full, rejected"
                );
                return Err(PrintHubError::QueueFull(self.config.max_size));
            }
            for job in jobs {
                state.insert_new(job.clone());
            }
            state.checkpoint()
        };
        self.publish(checkpoint);

        for job in jobs {
            info!(
                job_id = %job.id,
                printer_id = %job.printer_id,
                priority = %job.priority(),
                title = %job.document.title(),
                "Job enqueued"
            );
        }
        self.work.notify_one();
        Ok(())
    }

    // ========== Processing (worker side) ==========

    /// Take the head of the queue and mark it printing
    pub fn next_job(&self) -> Option<PrintJob> {
        let (job, checkpoint) = {
            let mut state = self.state.lock();
            if state.active.is_some() || state.pending.is_empty() {
                return None;
            }
            let mut job = state.pending.remove(0);
            job.set_status(JobStatus::Printing);
            state.active = Some(job.clone());
            (job, state.checkpoint())
        };
        self.publish(checkpoint);
        Some(job)
    }

    /// Resolves when a job may be available
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }

    pub fn complete(&self, job_id: &str) -> Option<PrintJob> {
        let (job, checkpoint) = {
            let mut state = self.state.lock();
            let mut job = take_active(&mut state, job_id)?;
            job.set_status(JobStatus::Completed);
            job.last_error = None;
            state.completed.push_front(job.clone());
            state.completed.truncate(RECENT_COMPLETIONS_CAP);
            (job, state.checkpoint())
        };
        self.publish(checkpoint);
        Some(job)
    }

    /// Record a failed attempt.
    ///
    /// A retryable failure goes back to the head of its tier until
    /// `max_retries` is exceeded; after that, or when not retryable, the
    /// job lands in the failed list and is never retried automatically.
    pub fn fail(&self, job_id: &str, error: &str, retryable: bool) -> Option<FailOutcome> {
        let mut state = self.state.lock();
        let mut job = take_active(&mut state, job_id)?;
        job.retries += 1;

        let will_retry = retryable && job.retries <= job.max_retries;
        if will_retry {
            job.last_error = Some(error.to_string());
            job.set_status(JobStatus::Pending);
            state.insert_retry(job.clone());
        } else {
            job.last_error = Some(if retryable {
                format!("retry exhausted after {} attempts: {}", job.retries, error)
            } else {
                error.to_string()
            });
            job.set_status(JobStatus::Failed);
            state.push_failed(job.clone(), self.config.failed_cap);
        }
        let checkpoint = state.checkpoint();
        drop(state);
        self.publish(checkpoint);

        if will_retry {
            self.work.notify_one();
        }
        Some(FailOutcome { job, will_retry })
    }

    // ========== Manual control ==========

    /// Resubmit a job from the failed list with a fresh retry budget
    pub fn retry_job(&self, job_id: &str) -> HubResult<PrintJob> {
        let (job, checkpoint) = {
            let mut state = self.state.lock();
            let Some(index) = state.failed.iter().position(|j| j.id == job_id) else {
                return Err(self.not_found(&state, job_id));
            };
            if state.pending.len() >= self.config.max_size {
                return Err(PrintHubError::QueueFull(self.config.max_size));
            }
            let Some(mut job) = state.failed.remove(index) else {
                return Err(PrintHubError::JobNotFound(job_id.to_string()));
            };
            job.retries = 0;
            job.last_error = None;
            job.set_status(JobStatus::Pending);
            state.insert_retry(job.clone());
            (job, state.checkpoint())
        };
        self.publish(checkpoint);
        info!(job_id = %job_id, "Failed job resubmitted");
        self.work.notify_one();
        Ok(job)
    }

    /// Cancel a pending job; it moves to the failed list as `cancelled`
    pub fn cancel_job(&self, job_id: &str, reason: Option<&str>) -> HubResult<PrintJob> {
        let (job, checkpoint) = {
            let mut state = self.state.lock();
            let Some(index) = state.pending.iter().position(|j| j.id == job_id) else {
                return Err(self.not_found(&state, job_id));
            };
            let mut job = state.pending.remove(index);
            job.set_status(JobStatus::Cancelled);
            job.last_error = Some(reason.unwrap_or("cancelled").to_string());
            state.push_failed(job.clone(), self.config.failed_cap);
            (job, state.checkpoint())
        };
        self.publish(checkpoint);
        info!(job_id = %job_id, "Job cancelled");
        Ok(job)
    }

    pub fn dismiss_failed(&self, job_id: &str) -> HubResult<PrintJob> {
        let (job, checkpoint) = {
            let mut state = self.state.lock();
            let job = state
                .failed
                .iter()
                .position(|j| j.id == job_id)
                .and_then(|index| state.failed.remove(index))
                .ok_or_else(|| PrintHubError::JobNotFound(job_id.to_string()))?;
            (job, state.checkpoint())
        };
        self.publish(checkpoint);
        Ok(job)
    }

    pub fn clear_failed(&self) -> usize {
        let (count, checkpoint) = {
            let mut state = self.state.lock();
            let count = state.failed.len();
            state.failed.clear();
            (count, state.checkpoint())
        };
        self.publish(checkpoint);
        count
    }

    /// Drop every pending job (the active one finishes)
    pub fn clear(&self) -> usize {
        let (count, checkpoint) = {
            let mut state = self.state.lock();
            let count = state.pending.len();
            state.pending.clear();
            (count, state.checkpoint())
        };
        self.publish(checkpoint);
        info!(dropped = count, "Print queue cleared");
        count
    }

    // ========== Queries ==========

    pub fn job(&self, job_id: &str) -> Option<PrintJob> {
        let state = self.state.lock();
        state
            .active
            .iter()
            .chain(state.pending.iter())
            .chain(state.failed.iter())
            .chain(state.completed.iter())
            .find(|j| j.id == job_id)
            .cloned()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            pending: state.pending.clone(),
            active: state.active.clone(),
            failed: state.failed.iter().cloned().collect(),
            completed: state.completed.iter().cloned().collect(),
        }
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            pending: state.pending.len(),
            printing: state.active.is_some(),
            failed: state.failed.len(),
            completed: state.completed.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    // ========== Internals ==========

    fn not_found(&self, state: &QueueState, job_id: &str) -> PrintHubError {
        let status = state
            .active
            .iter()
            .chain(state.failed.iter())
            .chain(state.completed.iter())
            .find(|j| j.id == job_id)
            .map(|j| j.status);
        match status {
            Some(status) => PrintHubError::JobNotPending {
                id: job_id.to_string(),
                status,
            },
            None => PrintHubError::JobNotFound(job_id.to_string()),
        }
    }

    /// Write a checkpoint and announce it. Must be called without the
    /// state lock held.
    fn publish(&self, checkpoint: Checkpoint) {
        if !self.persist(&checkpoint) {
            return;
        }
        let _ = self.events.send(PrintEvent::QueueUpdated {
            pending: checkpoint.queued,
            failed: checkpoint.failed.len(),
        });
    }

    /// Returns false when a newer revision is already stored
    fn persist(&self, checkpoint: &Checkpoint) -> bool {
        let mut written = self.written.lock();
        if checkpoint.revision <= *written {
            debug!(revision = checkpoint.revision, "Stale queue checkpoint skipped");
            return false;
        }
        if let Err(e) = save_json(self.store.as_ref(), PENDING_JOBS_KEY, &checkpoint.pending) {
            error!(error = %e, "Failed to persist pending jobs");
        }
        if let Err(e) = save_json(self.store.as_ref(), FAILED_JOBS_KEY, &checkpoint.failed) {
            error!(error = %e, "Failed to persist failed jobs");
        }
        *written = checkpoint.revision;
        true
    }
}

fn take_active(state: &mut QueueState, job_id: &str) -> Option<PrintJob> {
    match state.active.take() {
        Some(job) if job.id == job_id => Some(job),
        other => {
            warn!(job_id = %job_id, "Job is not the active job");
            state.active = other;
            None
        }
    }
}
