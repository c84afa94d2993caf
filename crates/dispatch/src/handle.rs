use std::time::Duration;

use simfarm_core::{Beat, Job, JobId, WorkerId};
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::{DispatchCommand, DispatcherStats};
use crate::error::{DispatchError, DispatchResult};

/// Cheaply cloneable entry point to a running dispatcher.
///
/// Every method is one round trip through the dispatcher's command channel
/// except [`submit_and_wait`](Self::submit_and_wait), which additionally
/// waits for the job to be pushed back.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchCommand>,
    wait_timeout: Option<Duration>,
}

impl DispatcherHandle {
    pub(crate) fn new(tx: mpsc::Sender<DispatchCommand>, wait_timeout: Option<Duration>) -> Self {
        Self { tx, wait_timeout }
    }

    /// Enqueue a job and return its id without waiting for it to run.
    pub async fn submit(&self, job: Job) -> DispatchResult<JobId> {
        let id = self
            .request(|reply| DispatchCommand::Submit {
                job,
                waiter: None,
                reply,
            })
            .await??;
        Ok(id)
    }

    /// Enqueue a job and wait until a worker pushes it back.
    ///
    /// Without a configured wait timeout this waits indefinitely. When the
    /// timeout elapses the registration is withdrawn and
    /// [`DispatchError::WaitTimedOut`] is returned; the job itself stays
    /// queued or running.
    pub async fn submit_and_wait(&self, job: Job) -> DispatchResult<Job> {
        let (waiter, done) = oneshot::channel();
        let id = self
            .request(|reply| DispatchCommand::Submit {
                job,
                waiter: Some(waiter),
                reply,
            })
            .await??;

        let Some(limit) = self.wait_timeout else {
            return done.await.map_err(|_| DispatchError::Closed);
        };
        match tokio::time::timeout(limit, done).await {
            Ok(result) => result.map_err(|_| DispatchError::Closed),
            Err(_) => {
                tracing::warn!(job_id = %id, timeout_secs = limit.as_secs(), "Gave up waiting for job");
                let _ = self.tx.send(DispatchCommand::CancelWait { id }).await;
                Err(DispatchError::WaitTimedOut(id))
            }
        }
    }

    /// Take the next queued job for `worker_id`. Never waits for work.
    pub async fn fetch(&self, worker_id: WorkerId) -> DispatchResult<Job> {
        let job = self
            .request(|reply| DispatchCommand::Fetch { worker_id, reply })
            .await??;
        Ok(job)
    }

    pub async fn push(&self, job: Job) -> DispatchResult<()> {
        self.request(|reply| DispatchCommand::Push { job, reply })
            .await??;
        Ok(())
    }

    /// Latest cached snapshot of a job.
    pub async fn stat(&self, id: JobId) -> DispatchResult<Job> {
        let job = self
            .request(|reply| DispatchCommand::Stat { id, reply })
            .await??;
        Ok(job)
    }

    pub async fn heartbeat(&self, beat: Beat) -> DispatchResult<()> {
        self.request(|reply| DispatchCommand::Heartbeat { beat, reply })
            .await
    }

    pub async fn stats(&self) -> DispatchResult<DispatcherStats> {
        self.request(|reply| DispatchCommand::Stats { reply }).await
    }

    /// Whether the dispatcher task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DispatchCommand,
    ) -> DispatchResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| DispatchError::Closed)?;
        rx.await.map_err(|_| DispatchError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::dispatcher::spawn_dispatcher;
    use assert_matches::assert_matches;
    use simfarm_core::{CoreError, JobStatus, OutFile};
    use tokio_util::sync::CancellationToken;

    fn job(payload: &str) -> Job {
        Job::new(vec!["sim".into()], payload)
    }

    fn start(config: DispatcherConfig) -> (DispatcherHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let (handle, _task) = spawn_dispatcher(config, cancel.clone());
        (handle, cancel)
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let (d, _cancel) = start(DispatcherConfig::default());
        let worker = WorkerId::new();

        let a = d.submit(job("x")).await.unwrap();
        let b = d.submit(job("y")).await.unwrap();

        let fetched = d.fetch(worker).await.unwrap();
        assert_eq!(fetched.id, a);
        assert_eq!(d.stat(a).await.unwrap().status, JobStatus::Running);
        assert_eq!(d.stat(b).await.unwrap().status, JobStatus::Queued);

        let mut done = fetched;
        done.status = JobStatus::Complete;
        done.outfiles.push(OutFile::new("out.txt", "42"));
        d.push(done).await.unwrap();

        let cached = d.stat(a).await.unwrap();
        assert_eq!(cached.status, JobStatus::Complete);
        assert_eq!(cached.outfile("out.txt").unwrap().data, b"42");

        assert_eq!(d.fetch(worker).await.unwrap().id, b);
        assert_matches!(
            d.fetch(worker).await,
            Err(DispatchError::Core(CoreError::NoJobsAvailable))
        );
    }

    #[tokio::test]
    async fn blocking_submit_is_released_by_push() {
        let (d, _cancel) = start(DispatcherConfig::default());
        let submitted = job("x");
        let id = submitted.id;

        let waiter = tokio::spawn({
            let d = d.clone();
            async move { d.submit_and_wait(submitted).await }
        });

        // Poll until the submission has landed in the queue.
        let running = loop {
            match d.fetch(WorkerId::new()).await {
                Ok(job) => break job,
                Err(DispatchError::Core(CoreError::NoJobsAvailable)) => tokio::task::yield_now().await,
                Err(e) => panic!("unexpected fetch error: {e}"),
            }
        };
        assert_eq!(running.id, id);

        let mut done = running;
        done.status = JobStatus::Complete;
        done.stdout = "ok".into();
        d.push(done.clone()).await.unwrap();

        let delivered = waiter.await.unwrap().unwrap();
        assert_eq!(delivered, done);
        assert_eq!(d.stats().await.unwrap().waiters, 0);

        // Second push is accepted but has no one to deliver to.
        d.push(done).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_withdraws_registration() {
        let config = DispatcherConfig::default().with_wait_timeout(Duration::from_secs(5));
        let (d, _cancel) = start(config);
        let submitted = job("x");
        let id = submitted.id;

        let err = d.submit_and_wait(submitted).await.unwrap_err();
        assert_matches!(err, DispatchError::WaitTimedOut(timed_out) if timed_out == id);

        let stats = d.stats().await.unwrap();
        assert_eq!(stats.waiters, 0);
        assert_eq!(stats.queued, 1);
    }

    #[tokio::test]
    async fn cancelled_dispatcher_reports_closed() {
        let cancel = CancellationToken::new();
        let (d, task) = spawn_dispatcher(DispatcherConfig::default(), cancel.clone());

        cancel.cancel();
        task.await.unwrap();

        assert!(d.is_closed());
        assert_matches!(d.submit(job("x")).await, Err(DispatchError::Closed));
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_submitter() {
        let cancel = CancellationToken::new();
        let (d, task) = spawn_dispatcher(DispatcherConfig::default(), cancel.clone());

        let waiter = tokio::spawn({
            let d = d.clone();
            async move { d.submit_and_wait(job("x")).await }
        });
        while d.stats().await.unwrap().waiters == 0 {
            tokio::task::yield_now().await;
        }

        cancel.cancel();
        task.await.unwrap();
        assert_matches!(waiter.await.unwrap(), Err(DispatchError::Closed));
    }

    #[tokio::test]
    async fn concurrent_submitters_all_get_queued() {
        let (d, _cancel) = start(DispatcherConfig::default());

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let d = d.clone();
                tokio::spawn(async move { d.submit(job(&i.to_string())).await.unwrap() })
            })
            .collect();
        let mut submitted = Vec::new();
        for t in tasks {
            submitted.push(t.await.unwrap());
        }

        let worker = WorkerId::new();
        let mut fetched = Vec::new();
        while let Ok(job) = d.fetch(worker).await {
            fetched.push(job.id);
        }
        submitted.sort();
        fetched.sort();
        assert_eq!(fetched, submitted);
    }
}
