//! Task runtime abstraction for texture decoding
//!
//! Decode work is plain blocking CPU work, so a spawner takes a closure and
//! hands back a [`TaskHandle`] whose only rendezvous is a blocking
//! [`TaskHandle::join`]. There is no cancellation: dropping a handle
//! detaches the task.

pub mod mock;
pub mod rayon_impl;
#[cfg(feature = "runtime-tokio")]
pub mod tokio_impl;

use crossbeam_channel::Receiver;
use std::any::Any;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Error type for task execution
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was dropped before producing a result")]
    Dropped,

    #[error("Failed to build worker pool: {0}")]
    PoolBuild(String),

    #[error("No runtime available: {0}")]
    NoRuntime(String),
}

/// Run a closure, capturing a panic instead of unwinding through the worker
pub(crate) fn run_caught<F, T>(task: F) -> std::thread::Result<T>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(task))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

enum HandleInner<T> {
    /// Already ran to completion on the spawning thread
    Ready(std::thread::Result<T>),
    /// Result arrives over a one-shot channel from a worker
    Channel(Receiver<std::thread::Result<T>>),
    /// Runs on the joining thread
    Deferred(Box<dyn FnOnce() -> T + Send>),
    #[cfg(feature = "runtime-tokio")]
    Tokio(tokio::task::JoinHandle<T>),
}

/// Handle to a spawned task
pub struct TaskHandle<T> {
    inner: HandleInner<T>,
}

impl<T> Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            HandleInner::Ready(_) => "Ready",
            HandleInner::Channel(_) => "Channel",
            HandleInner::Deferred(_) => "Deferred",
            #[cfg(feature = "runtime-tokio")]
            HandleInner::Tokio(_) => "Tokio",
        };
        f.debug_struct("TaskHandle").field("kind", &kind).finish()
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn ready(result: std::thread::Result<T>) -> Self {
        Self {
            inner: HandleInner::Ready(result),
        }
    }

    pub(crate) fn channel(receiver: Receiver<std::thread::Result<T>>) -> Self {
        Self {
            inner: HandleInner::Channel(receiver),
        }
    }

    pub(crate) fn deferred<F>(task: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            inner: HandleInner::Deferred(Box::new(task)),
        }
    }

    #[cfg(feature = "runtime-tokio")]
    pub(crate) fn tokio(handle: tokio::task::JoinHandle<T>) -> Self {
        Self {
            inner: HandleInner::Tokio(handle),
        }
    }

    /// Block until the task finishes and return its value
    pub fn join(self) -> Result<T, TaskError> {
        let outcome = match self.inner {
            HandleInner::Ready(result) => result,
            HandleInner::Channel(receiver) => receiver.recv().map_err(|_| TaskError::Dropped)?,
            HandleInner::Deferred(task) => run_caught(task),
            #[cfg(feature = "runtime-tokio")]
            HandleInner::Tokio(handle) => {
                return futures::executor::block_on(handle).map_err(|e| {
                    if e.is_panic() {
                        TaskError::Panicked(panic_message(e.into_panic()))
                    } else {
                        TaskError::Dropped
                    }
                });
            }
        };
        outcome.map_err(|payload| TaskError::Panicked(panic_message(payload)))
    }

    /// Whether `join` would return without blocking on a worker
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Ready(_) => true,
            HandleInner::Channel(receiver) => !receiver.is_empty(),
            HandleInner::Deferred(_) => false,
            #[cfg(feature = "runtime-tokio")]
            HandleInner::Tokio(handle) => handle.is_finished(),
        }
    }
}

/// Spawner for blocking background tasks
///
/// This trait abstracts where decode tasks run, allowing the manager to
/// work with a rayon pool, a tokio blocking pool or a test double.
///
/// # Example
/// ```ignore
/// let spawner = RayonSpawner::new(4)?;
/// let handle = spawner.spawn(move || decoder.decode(&path));
/// let image = handle.join()?;
/// ```
pub trait TaskSpawner: Send + Sync + Clone + Debug {
    /// Start `task` in the background
    fn spawn<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static;

    /// Get the name of this runtime (for debugging)
    fn runtime_name(&self) -> &'static str;

    /// Number of tasks that can make progress at once
    fn worker_count(&self) -> usize {
        1
    }
}

// Re-export implementations
pub use mock::{MockSpawnBehavior, MockSpawner};
pub use rayon_impl::RayonSpawner;

#[cfg(feature = "runtime-tokio")]
pub use tokio_impl::TokioSpawner;
