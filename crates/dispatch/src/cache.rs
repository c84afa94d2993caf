//! Size-bounded least-recently-used store of job snapshots.
//!
//! Every job the dispatcher has seen is kept here until evicted, keyed by
//! id and weighted by [`Job::size_bytes`]. Eviction is silent: a later
//! lookup for an evicted id simply misses.
//!
//! Recency is tracked with a monotonically increasing tick per access; the
//! `recency` map orders ticks so the oldest entry is always its first key.

use std::collections::{BTreeMap, HashMap};

use simfarm_core::{Job, JobId};

pub const MB: usize = 1 << 20;

/// Default capacity of the result cache.
pub const DEFAULT_CAPACITY_BYTES: usize = 500 * MB;

#[derive(Debug)]
struct CacheEntry {
    job: Job,
    size: usize,
    tick: u64,
}

#[derive(Debug)]
pub struct ResultCache {
    entries: HashMap<JobId, CacheEntry>,
    recency: BTreeMap<u64, JobId>,
    tick: u64,
    size_bytes: usize,
    capacity_bytes: usize,
    evictions: u64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

impl ResultCache {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            size_bytes: 0,
            capacity_bytes,
            evictions: 0,
        }
    }

    /// Insert or replace the snapshot for `job.id` and mark it most recently
    /// used, then evict until the cache fits its capacity.
    ///
    /// The entry just inserted is never evicted by its own insert; an
    /// oversized job stays cached on its own. Returns the evicted ids.
    pub fn insert(&mut self, job: Job) -> Vec<JobId> {
        let id = job.id;
        let size = job.size_bytes();
        let tick = self.next_tick();

        if let Some(old) = self.entries.insert(id, CacheEntry { job, size, tick }) {
            self.recency.remove(&old.tick);
            self.size_bytes -= old.size;
        }
        self.recency.insert(tick, id);
        self.size_bytes += size;

        self.evict_over_capacity(id)
    }

    /// Clone the snapshot for `id`, marking it most recently used.
    pub fn get(&mut self, id: &JobId) -> Option<Job> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(id)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, *id);
        Some(entry.job.clone())
    }

    /// Look at a snapshot without affecting recency.
    pub fn peek(&self, id: &JobId) -> Option<&Job> {
        self.entries.get(id).map(|e| &e.job)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Total entries evicted since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_over_capacity(&mut self, keep: JobId) -> Vec<JobId> {
        let mut evicted = Vec::new();
        while self.size_bytes > self.capacity_bytes {
            let Some((&tick, &oldest)) = self.recency.first_key_value() else {
                break;
            };
            // `keep` holds the newest tick, so reaching it means it is alone.
            if oldest == keep {
                break;
            }
            self.recency.remove(&tick);
            if let Some(entry) = self.entries.remove(&oldest) {
                self.size_bytes -= entry.size;
            }
            self.evictions += 1;
            evicted.push(oldest);
        }
        evicted
    }
}
