//! The dispatcher state and the task that owns it.
//!
//! [`Dispatcher`] holds the pending queue, result cache, waiter registry and
//! worker registry and implements the core operations as plain synchronous
//! methods. [`spawn_dispatcher`] moves one instance into a tokio task that
//! applies [`DispatchCommand`]s one at a time; nothing else can reach the
//! state.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use simfarm_core::{Beat, CoreError, Job, JobId, JobStatus, WorkerId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::config::DispatcherConfig;
use crate::handle::DispatcherHandle;
use crate::queue::PendingQueue;
use crate::waiters::WaiterRegistry;
use crate::workers::{WorkerRegistry, WorkerStatus};

/// A request to the dispatcher task. Each variant carries the channel its
/// reply goes back on.
#[derive(Debug)]
pub(crate) enum DispatchCommand {
    Submit {
        job: Job,
        waiter: Option<oneshot::Sender<Job>>,
        reply: oneshot::Sender<Result<JobId, CoreError>>,
    },
    Fetch {
        worker_id: WorkerId,
        reply: oneshot::Sender<Result<Job, CoreError>>,
    },
    Push {
        job: Job,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Stat {
        id: JobId,
        reply: oneshot::Sender<Result<Job, CoreError>>,
    },
    Heartbeat {
        beat: Beat,
        reply: oneshot::Sender<()>,
    },
    CancelWait {
        id: JobId,
    },
    Stats {
        reply: oneshot::Sender<DispatcherStats>,
    },
}

/// Counters and worker liveness, as served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub queued: usize,
    pub cached_jobs: usize,
    pub cache_bytes: usize,
    pub cache_capacity_bytes: usize,
    pub evictions: u64,
    pub waiters: usize,
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug)]
pub struct Dispatcher {
    queue: PendingQueue,
    cache: ResultCache,
    waiters: WaiterRegistry,
    workers: WorkerRegistry,
    worker_stale_after: Duration,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            queue: PendingQueue::new(),
            cache: ResultCache::new(config.cache_capacity_bytes),
            waiters: WaiterRegistry::new(),
            workers: WorkerRegistry::new(),
            worker_stale_after: config.worker_stale_after,
        }
    }

    /// Enqueue `job` and cache it as queued.
    ///
    /// When `waiter` is given it receives the job once a worker pushes it
    /// back. Ids already known to the dispatcher are rejected so a finished
    /// job can never be sent back to the queue.
    pub fn submit(
        &mut self,
        mut job: Job,
        waiter: Option<oneshot::Sender<Job>>,
    ) -> Result<JobId, CoreError> {
        job.validate()?;
        let id = job.id;
        if self.cache.contains(&id) || self.waiters.contains(&id) || self.queue.contains(&id) {
            return Err(CoreError::DuplicateJob(id));
        }

        job.status = JobStatus::Queued;
        job.submitted = Some(Utc::now());
        job.started = None;
        job.finished = None;
        job.worker_id = None;
        job.outfiles.clear();

        self.queue.push_back(job.clone());
        self.cache_snapshot(job);
        let waiting = waiter.is_some();
        if let Some(tx) = waiter {
            self.waiters.register(id, tx);
        }

        tracing::info!(job_id = %id, waiting, queued = self.queue.len(), "Job submitted");
        Ok(id)
    }

    /// Hand the head of the queue to `worker_id`, marking it running.
    pub fn fetch(&mut self, worker_id: WorkerId) -> Result<Job, CoreError> {
        let Some(mut job) = self.queue.pop_front() else {
            return Err(CoreError::NoJobsAvailable);
        };

        job.status = JobStatus::Running;
        job.started = Some(Utc::now());
        job.worker_id = Some(worker_id);
        self.cache_snapshot(job.clone());
        self.workers.job_fetched(worker_id, job.id, Utc::now());

        tracing::info!(job_id = %job.id, worker_id = %worker_id, "Job fetched");
        Ok(job)
    }

    /// Record a finished job and wake its waiter, if one is registered.
    ///
    /// Only Complete or Failed jobs with uniquely named outfiles may be
    /// pushed; a rejected push changes nothing. Pushing the same terminal
    /// status again refreshes the snapshot; switching a finished job to the
    /// other terminal status is rejected.
    pub fn push(&mut self, job: Job) -> Result<(), CoreError> {
        let id = job.id;
        if !job.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "pushed job {id} has non-final status {}",
                job.status
            )));
        }
        job.validate_outfiles()?;
        if let Some(cached) = self.cache.peek(&id) {
            if !cached.status.can_advance_to(job.status) {
                return Err(CoreError::InvalidTransition {
                    id,
                    from: cached.status,
                    to: job.status,
                });
            }
        }

        // A job pushed before any worker fetched it must not be handed out.
        if self.queue.remove(&id).is_some() {
            tracing::warn!(job_id = %id, "Pushed job was still queued, dequeued it");
        }
        if let Some(worker_id) = job.worker_id {
            self.workers.job_pushed(worker_id, id, Utc::now());
        }

        self.cache_snapshot(job.clone());
        let delivered = self.waiters.deliver(&job);

        tracing::info!(job_id = %id, status = %job.status, delivered, "Job pushed");
        Ok(())
    }

    /// Latest snapshot of a job.
    pub fn stat(&mut self, id: &JobId) -> Result<Job, CoreError> {
        self.cache.get(id).ok_or(CoreError::UnknownJob(*id))
    }

    pub fn heartbeat(&mut self, beat: &Beat) {
        tracing::debug!(worker_id = %beat.worker_id, busy = beat.busy, "Worker heartbeat");
        let now = Utc::now();
        self.workers.heartbeat(beat, now);
        self.workers.prune(now, self.worker_stale_after);
    }

    /// Forget the waiter for `id` without touching the job itself.
    pub fn cancel_wait(&mut self, id: &JobId) -> bool {
        self.waiters.cancel(id)
    }

    pub fn stats(&mut self) -> DispatcherStats {
        let now = Utc::now();
        self.workers.prune(now, self.worker_stale_after);
        DispatcherStats {
            queued: self.queue.len(),
            cached_jobs: self.cache.len(),
            cache_bytes: self.cache.size_bytes(),
            cache_capacity_bytes: self.cache.capacity_bytes(),
            evictions: self.cache.evictions(),
            waiters: self.waiters.len(),
            workers: self.workers.snapshot(now, self.worker_stale_after),
        }
    }

    /// Apply commands until cancelled or every handle is dropped.
    ///
    /// Pending waiters are dropped on exit, which wakes blocked submitters
    /// with a closed-channel error.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<DispatchCommand>,
        cancel: CancellationToken,
    ) {
        tracing::info!(
            cache_capacity_bytes = self.cache.capacity_bytes(),
            "Dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => {
                        tracing::info!("All dispatcher handles dropped, stopping");
                        break;
                    }
                },
            }
        }

        tracing::info!(
            queued = self.queue.len(),
            waiters = self.waiters.len(),
            "Dispatcher stopped",
        );
    }

    fn handle(&mut self, cmd: DispatchCommand) {
        match cmd {
            DispatchCommand::Submit { job, waiter, reply } => {
                let _ = reply.send(self.submit(job, waiter));
            }
            DispatchCommand::Fetch { worker_id, reply } => {
                if let Err(Ok(job)) = reply.send(self.fetch(worker_id)) {
                    self.requeue_undelivered(job);
                }
            }
            DispatchCommand::Push { job, reply } => {
                let _ = reply.send(self.push(job));
            }
            DispatchCommand::Stat { id, reply } => {
                let _ = reply.send(self.stat(&id));
            }
            DispatchCommand::Heartbeat { beat, reply } => {
                self.heartbeat(&beat);
                let _ = reply.send(());
            }
            DispatchCommand::CancelWait { id } => {
                if self.cancel_wait(&id) {
                    tracing::info!(job_id = %id, "Submitter stopped waiting");
                }
            }
            DispatchCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// A fetched job whose requester vanished goes back to the head of the
    /// queue. Nothing can have observed it as running in between.
    fn requeue_undelivered(&mut self, mut job: Job) {
        tracing::warn!(job_id = %job.id, "Fetch requester went away, requeueing job");
        job.status = JobStatus::Queued;
        job.started = None;
        job.worker_id = None;
        self.queue.push_front(job.clone());
        self.cache_snapshot(job);
    }

    fn cache_snapshot(&mut self, job: Job) {
        for evicted in self.cache.insert(job) {
            tracing::debug!(job_id = %evicted, "Evicted job from result cache");
        }
    }
}

/// Start a dispatcher task with a fresh, empty state.
///
/// The task runs until `cancel` fires or every handle has been dropped.
pub fn spawn_dispatcher(
    config: DispatcherConfig,
    cancel: CancellationToken,
) -> (DispatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let dispatcher = Dispatcher::new(&config);
    let task = tokio::spawn(dispatcher.run(rx, cancel));
    (DispatcherHandle::new(tx, config.wait_timeout), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use simfarm_core::OutFile;

    fn job(payload: &str) -> Job {
        Job::new(vec!["sim".into()], payload)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&DispatcherConfig::default())
    }

    fn finished(mut job: Job, status: JobStatus) -> Job {
        job.status = status;
        job
    }

    #[test]
    fn fetch_follows_submission_order() {
        let mut d = dispatcher();
        let ids: Vec<JobId> = (0..5)
            .map(|i| d.submit(job(&i.to_string()), None).unwrap())
            .collect();

        let worker = WorkerId::new();
        let fetched: Vec<JobId> = (0..5).map(|_| d.fetch(worker).unwrap().id).collect();
        assert_eq!(fetched, ids);
    }

    #[test]
    fn fetch_on_empty_queue_reports_no_jobs() {
        let mut d = dispatcher();
        assert_matches!(d.fetch(WorkerId::new()), Err(CoreError::NoJobsAvailable));

        let id = d.submit(job("c"), None).unwrap();
        assert_eq!(d.fetch(WorkerId::new()).unwrap().id, id);
    }

    #[test]
    fn submit_sets_queued_state_and_clears_results() {
        let mut d = dispatcher();
        let mut j = job("x");
        j.status = JobStatus::Complete;
        j.outfiles.push(OutFile::new("stale", "1"));

        let id = d.submit(j, None).unwrap();
        let cached = d.stat(&id).unwrap();
        assert_eq!(cached.status, JobStatus::Queued);
        assert!(cached.submitted.is_some());
        assert!(cached.outfiles.is_empty());
    }

    #[test]
    fn invalid_submission_leaves_state_untouched() {
        let mut d = dispatcher();
        let err = d.submit(Job::new(Vec::new(), "x"), None).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));

        let stats = d.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.cached_jobs, 0);
    }

    #[test]
    fn resubmitting_a_known_id_is_rejected() {
        let mut d = dispatcher();
        let j = job("x");
        d.submit(j.clone(), None).unwrap();
        assert_matches!(d.submit(j, None), Err(CoreError::DuplicateJob(_)));
        assert_eq!(d.stats().queued, 1);
    }

    #[test]
    fn fetch_marks_running_in_cache() {
        let mut d = dispatcher();
        let a = d.submit(job("x"), None).unwrap();
        let b = d.submit(job("y"), None).unwrap();
        let worker = WorkerId::new();

        let fetched = d.fetch(worker).unwrap();
        assert_eq!(fetched.id, a);
        assert_eq!(fetched.status, JobStatus::Running);
        assert_eq!(fetched.worker_id, Some(worker));
        assert_eq!(d.stat(&a).unwrap().status, JobStatus::Running);
        assert_eq!(d.stat(&b).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn push_requires_terminal_status() {
        let mut d = dispatcher();
        d.submit(job("x"), None).unwrap();
        let running = d.fetch(WorkerId::new()).unwrap();

        assert_matches!(d.push(running.clone()), Err(CoreError::Validation(_)));
        assert_eq!(d.stat(&running.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn push_with_duplicate_outfile_names_is_rejected() {
        let mut d = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        let id = d.submit(job("x"), Some(tx)).unwrap();
        let running = d.fetch(WorkerId::new()).unwrap();

        let mut done = finished(running, JobStatus::Complete);
        done.outfiles.push(OutFile::new("out.txt", "1"));
        done.outfiles.push(OutFile::new("out.txt", "2"));

        assert_matches!(d.push(done), Err(CoreError::Validation(_)));
        assert_eq!(d.stat(&id).unwrap().status, JobStatus::Running);
        assert_eq!(d.stats().waiters, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_delivers_to_waiter_exactly_once() {
        let mut d = dispatcher();
        let (tx, mut rx) = oneshot::channel();
        let id = d.submit(job("x"), Some(tx)).unwrap();
        let running = d.fetch(WorkerId::new()).unwrap();

        let mut done = finished(running, JobStatus::Complete);
        done.outfiles.push(OutFile::new("out.txt", "42"));
        d.push(done.clone()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), done);
        assert_eq!(d.stats().waiters, 0);

        // A duplicate push only refreshes the cache.
        d.push(done.clone()).unwrap();
        assert_eq!(d.stat(&id).unwrap(), done);
    }

    #[test]
    fn push_cannot_flip_terminal_status() {
        let mut d = dispatcher();
        d.submit(job("x"), None).unwrap();
        let running = d.fetch(WorkerId::new()).unwrap();
        d.push(finished(running.clone(), JobStatus::Complete)).unwrap();

        let err = d
            .push(finished(running.clone(), JobStatus::Failed))
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::InvalidTransition {
                from: JobStatus::Complete,
                to: JobStatus::Failed,
                ..
            }
        );
        assert_eq!(d.stat(&running.id).unwrap().status, JobStatus::Complete);
    }

    #[test]
    fn push_for_unknown_id_is_cached() {
        let mut d = dispatcher();
        let stray = finished(job("x"), JobStatus::Failed);
        d.push(stray.clone()).unwrap();
        assert_eq!(d.stat(&stray.id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn push_of_queued_job_removes_it_from_queue() {
        let mut d = dispatcher();
        let id = d.submit(job("x"), None).unwrap();
        let queued = d.stat(&id).unwrap();
        d.push(finished(queued, JobStatus::Complete)).unwrap();

        assert_matches!(d.fetch(WorkerId::new()), Err(CoreError::NoJobsAvailable));
        assert_eq!(d.stat(&id).unwrap().status, JobStatus::Complete);
    }

    #[test]
    fn evicted_job_becomes_unknown() {
        let first = job("x");
        let unit = first.size_bytes();
        let config = DispatcherConfig::default().with_cache_capacity_bytes(unit);
        let mut d = Dispatcher::new(&config);

        let a = d.submit(first, None).unwrap();
        let b = d.submit(job("y"), None).unwrap();

        assert_matches!(d.stat(&a), Err(CoreError::UnknownJob(id)) if id == a);
        assert!(d.stat(&b).is_ok());
        // The evicted job is still queued and is dispatched normally.
        assert_eq!(d.fetch(WorkerId::new()).unwrap().id, a);
    }

    #[test]
    fn heartbeat_and_fetch_show_in_stats() {
        let mut d = dispatcher();
        let worker = WorkerId::new();
        d.heartbeat(&Beat {
            worker_id: worker,
            busy: false,
            current_job: None,
        });
        let id = d.submit(job("x"), None).unwrap();
        d.fetch(worker).unwrap();

        let stats = d.stats();
        assert_eq!(stats.workers.len(), 1);
        assert_eq!(stats.workers[0].current_job, Some(id));
        assert!(stats.workers[0].alive);
    }

    #[test]
    fn undelivered_fetch_is_requeued_at_head() {
        let mut d = dispatcher();
        let a = d.submit(job("x"), None).unwrap();
        let b = d.submit(job("y"), None).unwrap();

        let (reply, rx) = oneshot::channel();
        drop(rx);
        d.handle(DispatchCommand::Fetch {
            worker_id: WorkerId::new(),
            reply,
        });

        assert_eq!(d.stat(&a).unwrap().status, JobStatus::Queued);
        assert_eq!(d.fetch(WorkerId::new()).unwrap().id, a);
        assert_eq!(d.fetch(WorkerId::new()).unwrap().id, b);
    }
}
