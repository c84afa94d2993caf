//! Callers blocked on a synchronous submit, keyed by job id.
//!
//! Each registration is a single-use channel. It is consumed by the first
//! push for its id; later pushes find nothing to deliver to.

use std::collections::HashMap;

use simfarm_core::{Job, JobId};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct WaiterRegistry {
    waiters: HashMap<JobId, oneshot::Sender<Job>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: JobId, tx: oneshot::Sender<Job>) {
        self.waiters.insert(id, tx);
    }

    /// Hand `job` to its waiter, if any, and drop the registration.
    ///
    /// Returns whether a registration existed. A waiter whose receiver has
    /// already gone away still counts as consumed.
    pub fn deliver(&mut self, job: &Job) -> bool {
        let Some(tx) = self.waiters.remove(&job.id) else {
            return false;
        };
        if tx.send(job.clone()).is_err() {
            tracing::warn!(job_id = %job.id, "Waiter went away before its job finished");
        }
        true
    }

    pub fn cancel(&mut self, id: &JobId) -> bool {
        self.waiters.remove(id).is_some()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.waiters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_once_then_forgets() {
        let mut registry = WaiterRegistry::new();
        let job = Job::new(vec!["true".into()], "x");
        let (tx, rx) = oneshot::channel();
        registry.register(job.id, tx);

        assert!(registry.deliver(&job));
        assert_eq!(rx.await.unwrap(), job);
        assert!(!registry.deliver(&job));
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_receiver_still_consumes_registration() {
        let mut registry = WaiterRegistry::new();
        let job = Job::new(vec!["true".into()], "x");
        let (tx, rx) = oneshot::channel();
        registry.register(job.id, tx);
        drop(rx);

        assert!(registry.deliver(&job));
        assert!(!registry.contains(&job.id));
    }

    #[test]
    fn cancel_removes_registration() {
        let mut registry = WaiterRegistry::new();
        let id = JobId::new();
        let (tx, _rx) = oneshot::channel();
        registry.register(id, tx);

        assert!(registry.cancel(&id));
        assert!(!registry.cancel(&id));
        assert_eq!(registry.len(), 0);
    }
}
