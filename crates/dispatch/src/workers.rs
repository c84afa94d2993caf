//! Liveness bookkeeping for workers.
//!
//! Workers are registered implicitly by their first heartbeat, fetch or
//! push. The registry is informational: it feeds the dispatcher stats and
//! never changes job state or dispatch order.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use simfarm_core::{Beat, JobId, Timestamp, WorkerId};

/// Workers silent for this many staleness windows are forgotten.
pub const FORGET_AFTER_STALE_WINDOWS: u32 = 10;

#[derive(Debug, Clone)]
struct WorkerRecord {
    last_seen: Timestamp,
    busy: bool,
    current_job: Option<JobId>,
    jobs_fetched: u64,
    jobs_pushed: u64,
}

impl WorkerRecord {
    fn new(now: Timestamp) -> Self {
        Self {
            last_seen: now,
            busy: false,
            current_job: None,
            jobs_fetched: 0,
            jobs_pushed: 0,
        }
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: WorkerId,
    pub busy: bool,
    pub current_job: Option<JobId>,
    pub last_seen: Timestamp,
    pub jobs_fetched: u64,
    pub jobs_pushed: u64,
    /// Seen within the configured staleness window.
    pub alive: bool,
}

#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, WorkerRecord>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heartbeat(&mut self, beat: &Beat, now: Timestamp) {
        let record = self.touch(beat.worker_id, now);
        record.busy = beat.busy;
        record.current_job = if beat.busy { beat.current_job } else { None };
    }

    pub fn job_fetched(&mut self, worker_id: WorkerId, job_id: JobId, now: Timestamp) {
        let record = self.touch(worker_id, now);
        record.busy = true;
        record.current_job = Some(job_id);
        record.jobs_fetched += 1;
    }

    pub fn job_pushed(&mut self, worker_id: WorkerId, job_id: JobId, now: Timestamp) {
        let record = self.touch(worker_id, now);
        if record.current_job == Some(job_id) {
            record.busy = false;
            record.current_job = None;
        }
        record.jobs_pushed += 1;
    }

    /// All known workers ordered by id.
    pub fn snapshot(&self, now: Timestamp, stale_after: Duration) -> Vec<WorkerStatus> {
        let window = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        let mut workers: Vec<WorkerStatus> = self
            .workers
            .iter()
            .map(|(id, r)| WorkerStatus {
                worker_id: *id,
                busy: r.busy,
                current_job: r.current_job,
                last_seen: r.last_seen,
                jobs_fetched: r.jobs_fetched,
                jobs_pushed: r.jobs_pushed,
                alive: now.signed_duration_since(r.last_seen) < window,
            })
            .collect();
        workers.sort_by_key(|w| w.worker_id);
        workers
    }

    /// Drop workers not seen for [`FORGET_AFTER_STALE_WINDOWS`] times
    /// `stale_after`. Returns how many were dropped.
    pub fn prune(&mut self, now: Timestamp, stale_after: Duration) -> usize {
        let window = chrono::Duration::from_std(
            stale_after.saturating_mul(FORGET_AFTER_STALE_WINDOWS),
        )
        .unwrap_or(chrono::Duration::MAX);
        let before = self.workers.len();
        self.workers.retain(|worker_id, r| {
            let keep = now.signed_duration_since(r.last_seen) < window;
            if !keep {
                tracing::info!(worker_id = %worker_id, last_seen = %r.last_seen, "Forgetting silent worker");
            }
            keep
        });
        before - self.workers.len()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn touch(&mut self, worker_id: WorkerId, now: Timestamp) -> &mut WorkerRecord {
        let record = self.workers.entry(worker_id).or_insert_with(|| {
            tracing::info!(worker_id = %worker_id, "Worker registered");
            WorkerRecord::new(now)
        });
        record.last_seen = now;
        record
    }
}
