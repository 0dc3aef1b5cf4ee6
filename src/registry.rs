//! In-memory registry of live download jobs
//!
//! One entry per media id, covering the window from first client request to
//! terminal cleanup. The registry is the deduplication point: concurrent
//! requests for the same id share one [`Job`], and exactly one caller of
//! [`JobRegistry::get_or_create`] is told it created the entry. It is also the
//! liveness oracle for the retention sweeper, which never deletes a directory
//! whose name is a tracked id.

use crate::job::{Job, JobSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Concurrency-safe map of media id to live [`Job`]
///
/// Cloning the registry clones a handle to the same underlying map. Lock
/// scopes are synchronous and short; handlers and background tasks share one
/// instance passed in at construction time.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<String, Arc<Job>>>>,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a job with this id is currently tracked
    pub fn has(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Look up a job by id
    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.read().get(id).cloned()
    }

    /// Fetch the job for `id`, creating it if absent
    ///
    /// Atomic under the registry's write lock: of any number of concurrent
    /// callers with the same id, exactly one receives `true` (it created the
    /// entry and owns spawning the download), and all receive the same
    /// [`Job`] handle.
    pub fn get_or_create(&self, id: &str) -> (Arc<Job>, bool) {
        let mut jobs = self.write();
        match jobs.get(id) {
            Some(job) => (Arc::clone(job), false),
            None => {
                let job = Arc::new(Job::new(id));
                jobs.insert(id.to_string(), Arc::clone(&job));
                (job, true)
            }
        }
    }

    /// Remove a job by id, returning it if it was tracked
    pub fn remove(&self, id: &str) -> Option<Arc<Job>> {
        self.write().remove(id)
    }

    /// Snapshot of all tracked ids
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of tracked jobs
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshots of all tracked jobs, for the debug/state endpoint
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let jobs: Vec<Arc<Job>> = self.read().values().cloned().collect();
        let mut snaps: Vec<JobSnapshot> = jobs.iter().map(|job| job.snapshot()).collect();
        snaps.sort_by(|a, b| a.id.cmp(&b.id));
        snaps
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Job>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Job>>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("len", &self.len())
            .finish()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_deduplicates() {
        let registry = JobRegistry::new();
        let (first, created_first) = registry.get_or_create("abc");
        let (second, created_second) = registry.get_or_create("abc");

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_untracks_id() {
        let registry = JobRegistry::new();
        registry.get_or_create("abc");
        assert!(registry.has("abc"));

        let removed = registry.remove("abc");
        assert!(removed.is_some());
        assert!(!registry.has("abc"));
        assert!(registry.remove("abc").is_none());
    }

    #[test]
    fn test_keys_snapshot() {
        let registry = JobRegistry::new();
        registry.get_or_create("abc");
        registry.get_or_create("def");

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec!["abc".to_string(), "def".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_creator() {
        let registry = JobRegistry::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                registry.get_or_create("same-id")
            }));
        }

        let mut created_count = 0;
        let mut jobs = Vec::new();
        for handle in handles {
            let (job, created) = handle.await.unwrap();
            if created {
                created_count += 1;
            }
            jobs.push(job);
        }

        assert_eq!(created_count, 1);
        for job in &jobs[1..] {
            assert!(Arc::ptr_eq(&jobs[0], job));
        }
    }

    #[test]
    fn test_snapshots_sorted_by_id() {
        let registry = JobRegistry::new();
        registry.get_or_create("zzz");
        registry.get_or_create("aaa");

        let snaps = registry.snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].id, "aaa");
        assert_eq!(snaps[1].id, "zzz");
    }
}
