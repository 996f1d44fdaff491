//! Mock spawner for testing
//!
//! Runs tasks on the calling thread, either immediately or when joined, and
//! counts how many were spawned.

use super::{run_caught, TaskHandle, TaskSpawner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Spawn behavior for MockSpawner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSpawnBehavior {
    /// Run the task inside `spawn`
    Inline,
    /// Run the task inside `join`
    Deferred,
}

/// Mock spawner for testing
///
/// Inline mode makes decode order deterministic; deferred mode checks that
/// callers only read results after joining.
#[derive(Clone, Debug)]
pub struct MockSpawner {
    behavior: MockSpawnBehavior,
    spawned: Arc<AtomicUsize>,
}

impl Default for MockSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpawner {
    /// Create a mock spawner that runs tasks inline
    pub fn new() -> Self {
        Self::with_behavior(MockSpawnBehavior::Inline)
    }

    /// Create a mock spawner with specific behavior
    pub fn with_behavior(behavior: MockSpawnBehavior) -> Self {
        Self {
            behavior,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a mock spawner that defers tasks until joined
    pub fn deferred() -> Self {
        Self::with_behavior(MockSpawnBehavior::Deferred)
    }

    pub fn behavior(&self) -> MockSpawnBehavior {
        self.behavior
    }

    /// Tasks spawned through this spawner and its clones
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl TaskSpawner for MockSpawner {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        match self.behavior {
            MockSpawnBehavior::Inline => TaskHandle::ready(run_caught(task)),
            MockSpawnBehavior::Deferred => TaskHandle::deferred(task),
        }
    }

    fn runtime_name(&self) -> &'static str {
        "Mock"
    }
}
