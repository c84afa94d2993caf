//! Fetch, run, push loop and the heartbeat side task.

use std::time::Duration;

use simfarm_core::{Beat, Job, JobId, WorkerId};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, RpcClient};
use crate::config::WorkerConfig;
use crate::runner::JobRunner;

/// A single remote worker. Runs one job at a time.
#[derive(Debug)]
pub struct Worker {
    client: RpcClient,
    runner: JobRunner,
    worker_id: WorkerId,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    /// Job currently being run, read by the heartbeat task.
    current: watch::Sender<Option<JobId>>,
}

impl Worker {
    pub fn new(config: &WorkerConfig) -> Self {
        Self::from_parts(
            RpcClient::new(&config.server_url),
            JobRunner::new(config.work_dir.clone()),
            config.worker_id,
            config.poll_interval,
            config.heartbeat_interval,
        )
    }

    pub fn from_parts(
        client: RpcClient,
        runner: JobRunner,
        worker_id: WorkerId,
        poll_interval: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            client,
            runner,
            worker_id,
            poll_interval,
            heartbeat_interval,
            current,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Poll for work until `cancel` fires.
    ///
    /// A job that is already running when `cancel` fires is finished, and
    /// its push is tried once more before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(worker_id = %self.worker_id, "Worker started");

        let heartbeat_cancel = cancel.child_token();
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.client.clone(),
            self.worker_id,
            self.heartbeat_interval,
            self.current.subscribe(),
            heartbeat_cancel.clone(),
        ));

        while !cancel.is_cancelled() {
            match self.run_once(&cancel).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tracing::trace!(worker_id = %self.worker_id, "No jobs, waiting");
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "RPC call failed, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        heartbeat_cancel.cancel();
        let _ = heartbeat.await;
        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Fetch one job, run it and push the result.
    ///
    /// Returns the id of the job that ran, or `None` if the queue was empty.
    /// A push that fails transiently is retried every poll interval until
    /// it lands or `cancel` fires.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Option<JobId>, ClientError> {
        let job = match self.client.fetch(self.worker_id).await {
            Ok(job) => job,
            Err(ClientError::NoJobs) => return Ok(None),
            Err(e) => return Err(e),
        };
        let id = job.id;
        tracing::info!(job_id = %id, worker_id = %self.worker_id, "Fetched job");

        self.current.send_replace(Some(id));
        let done = self.runner.run(job).await;
        self.current.send_replace(None);

        tracing::info!(job_id = %id, status = %done.status, "Pushing finished job");
        self.push_until_accepted(done, cancel).await?;
        Ok(Some(id))
    }

    async fn push_until_accepted(&self, job: Job, cancel: &CancellationToken) -> Result<(), ClientError> {
        let mut attempt = 1u32;
        loop {
            match self.client.push(job.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && !cancel.is_cancelled() => {
                    tracing::warn!(job_id = %job.id, attempt, error = %e, "Push failed, retrying");
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, attempt, error = %e, "Giving up on pushing job");
                    return Err(e);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            attempt += 1;
        }
    }
}

async fn heartbeat_loop(
    client: RpcClient,
    worker_id: WorkerId,
    interval: Duration,
    current: watch::Receiver<Option<JobId>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let current_job = *current.borrow();
                let beat = Beat {
                    worker_id,
                    busy: current_job.is_some(),
                    current_job,
                };
                if let Err(e) = client.heartbeat(beat).await {
                    tracing::warn!(worker_id = %worker_id, error = %e, "Heartbeat failed");
                }
            }
        }
    }
}
