use std::collections::VecDeque;

use simfarm_core::{Job, JobId};

/// FIFO of jobs waiting for a worker.
#[derive(Debug, Default)]
pub struct PendingQueue {
    jobs: VecDeque<Job>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    /// Put a job back at the head, ahead of everything else.
    pub fn push_front(&mut self, job: Job) {
        self.jobs.push_front(job);
    }

    pub fn pop_front(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    /// Take a specific job out of the queue, wherever it sits.
    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        let index = self.position(id)?;
        self.jobs.remove(index)
    }

    pub fn position(&self, id: &JobId) -> Option<usize> {
        self.jobs.iter().position(|j| j.id == *id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(payload: &str) -> Job {
        Job::new(vec!["true".into()], payload)
    }

    #[test]
    fn pops_in_insertion_order() {
        let mut queue = PendingQueue::new();
        let jobs: Vec<Job> = ["a", "b", "c"].iter().map(|p| job(p)).collect();
        for j in &jobs {
            queue.push_back(j.clone());
        }

        let popped: Vec<JobId> = std::iter::from_fn(|| queue.pop_front())
            .map(|j| j.id)
            .collect();
        assert_eq!(popped, jobs.iter().map(|j| j.id).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_takes_job_from_the_middle() {
        let mut queue = PendingQueue::new();
        let (a, b, c) = (job("a"), job("b"), job("c"));
        queue.push_back(a.clone());
        queue.push_back(b.clone());
        queue.push_back(c.clone());

        assert_eq!(queue.remove(&b.id).map(|j| j.id), Some(b.id));
        assert!(queue.remove(&b.id).is_none());
        assert_eq!(queue.position(&c.id), Some(1));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn push_front_jumps_the_line() {
        let mut queue = PendingQueue::new();
        let (a, b) = (job("a"), job("b"));
        queue.push_back(a.clone());
        queue.push_front(b.clone());

        assert_eq!(queue.pop_front().map(|j| j.id), Some(b.id));
        assert!(queue.contains(&a.id));
    }
}
