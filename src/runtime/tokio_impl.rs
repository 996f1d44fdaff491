//! Tokio runtime implementation
//!
//! Decode tasks go to Tokio's blocking pool so they never stall async workers.

use super::{TaskError, TaskHandle, TaskSpawner};
use tokio::runtime::Handle;

/// Tokio-based spawner
///
/// Spawns tasks with `spawn_blocking` on the runtime it was created from.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Create a spawner for the runtime the caller is running inside
    pub fn current() -> Result<Self, TaskError> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| TaskError::NoRuntime(e.to_string()))
    }

    /// Create a spawner for an explicit runtime
    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        TaskHandle::tokio(self.handle.spawn_blocking(task))
    }

    fn runtime_name(&self) -> &'static str {
        "Tokio"
    }

    fn worker_count(&self) -> usize {
        self.handle.metrics().num_workers()
    }
}
