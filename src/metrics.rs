//! Cumulative load statistics
//!
//! A [`LoadMetricsHandle`] is shared between the manager and whatever
//! diagnostics view wants to display it.

use crate::manager::{LoadReport, LoadTimings};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Timings of one completed load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRecord {
    pub path: PathBuf,
    pub reload: bool,
    pub timings: LoadTimings,
}

/// Tracks counters across every load of a manager
#[derive(Debug, Default)]
pub struct LoadMetrics {
    loads: AtomicU64,
    reloads: AtomicU64,
    failures: AtomicU64,
    decoded_textures: AtomicU64,
    fallback_textures: AtomicU64,
    staging_bytes: AtomicU64,
    submissions: AtomicU64,
    history: RwLock<Vec<LoadRecord>>,
}

impl LoadMetrics {
    /// Create a new instance of LoadMetrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed load
    pub fn record_load(&self, report: &LoadReport, reload: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if reload {
            self.reloads.fetch_add(1, Ordering::Relaxed);
        }
        self.decoded_textures
            .fetch_add(report.decoded_textures as u64, Ordering::Relaxed);
        self.fallback_textures
            .fetch_add(report.fallback_textures as u64, Ordering::Relaxed);
        self.staging_bytes
            .fetch_add(report.staging_bytes, Ordering::Relaxed);
        self.submissions
            .fetch_add(report.submissions, Ordering::Relaxed);

        self.history.write().push(LoadRecord {
            path: report.path.clone(),
            reload,
            timings: report.timings.clone(),
        });
    }

    /// Record a load that ended in an error
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful loads, reloads included
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Textures whose file decoded and was uploaded
    pub fn decoded_textures(&self) -> u64 {
        self.decoded_textures.load(Ordering::Relaxed)
    }

    /// Material slots that fell back to a solid colour
    pub fn fallback_textures(&self) -> u64 {
        self.fallback_textures.load(Ordering::Relaxed)
    }

    pub fn staging_bytes(&self) -> u64 {
        self.staging_bytes.load(Ordering::Relaxed)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Timings of the most recent successful load
    pub fn last(&self) -> Option<LoadRecord> {
        self.history.read().last().cloned()
    }

    /// Every recorded load, oldest first
    pub fn history(&self) -> Vec<LoadRecord> {
        self.history.read().clone()
    }

    /// Mean total time over every recorded load
    pub fn average_total_ms(&self) -> Option<f64> {
        let history = self.history.read();
        if history.is_empty() {
            return None;
        }
        let sum: f64 = history.iter().map(|r| r.timings.total_ms).sum();
        Some(sum / history.len() as f64)
    }
}

/// A thread-safe wrapper around LoadMetrics
#[derive(Debug, Clone, Default)]
pub struct LoadMetricsHandle(Arc<LoadMetrics>);

impl LoadMetricsHandle {
    /// Create a new metrics handle
    pub fn new() -> Self {
        Self(Arc::new(LoadMetrics::new()))
    }

    /// Get a reference to the underlying metrics
    pub fn inner(&self) -> &LoadMetrics {
        &self.0
    }
}

impl std::ops::Deref for LoadMetricsHandle {
    type Target = LoadMetrics;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(total_ms: f64) -> LoadReport {
        LoadReport {
            path: PathBuf::from("scene.obj"),
            decoded_textures: 2,
            fallback_textures: 6,
            staging_bytes: 128,
            submissions: 5,
            timings: LoadTimings {
                total_ms,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = LoadMetricsHandle::new();
        metrics.record_load(&report(10.0), false);
        metrics.record_load(&report(30.0), true);
        metrics.record_failure();

        assert_eq!(metrics.load_count(), 2);
        assert_eq!(metrics.reload_count(), 1);
        assert_eq!(metrics.failure_count(), 1);
        assert_eq!(metrics.decoded_textures(), 4);
        assert_eq!(metrics.fallback_textures(), 12);
        assert_eq!(metrics.staging_bytes(), 256);
        assert_eq!(metrics.submissions(), 10);
        assert_eq!(metrics.average_total_ms(), Some(20.0));
        assert!(metrics.last().unwrap().reload);
    }

    #[test]
    fn test_clones_share_state() {
        let metrics = LoadMetricsHandle::new();
        let view = metrics.clone();
        assert_eq!(view.average_total_ms(), None);
        metrics.record_load(&report(1.0), false);
        assert_eq!(view.history().len(), 1);
        assert_eq!(view.inner().load_count(), 1);
    }
}
