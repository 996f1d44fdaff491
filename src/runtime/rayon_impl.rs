//! Rayon thread-pool spawner
//!
//! The default decode pool. Each task sends its result (or its panic) back
//! over a one-slot crossbeam channel.

use super::{run_caught, TaskError, TaskHandle, TaskSpawner};
use crate::config::PipelineConfig;
use std::fmt;
use std::sync::Arc;

/// Spawner backed by a dedicated rayon pool
#[derive(Clone)]
pub struct RayonSpawner {
    pool: Arc<rayon::ThreadPool>,
}

impl fmt::Debug for RayonSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonSpawner")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl RayonSpawner {
    /// Build a pool with `threads` workers named `texture-decode-N`
    pub fn new(threads: usize) -> Result<Self, TaskError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("texture-decode-{i}"))
            .build()
            .map_err(|e| TaskError::PoolBuild(e.to_string()))?;
        log::debug!("Decode pool started with {} threads", pool.current_num_threads());
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Build a pool sized by `config.decode_threads`
    pub fn from_config(config: &PipelineConfig) -> Result<Self, TaskError> {
        Self::new(config.decode_threads)
    }
}

impl TaskSpawner for RayonSpawner {
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.pool.spawn(move || {
            // The receiver may already be gone if the handle was dropped
            let _ = tx.send(run_caught(task));
        });
        TaskHandle::channel(rx)
    }

    fn runtime_name(&self) -> &'static str {
        "Rayon"
    }

    fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}
