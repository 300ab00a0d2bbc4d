//! Worker pools for threshold slicing and metric computation.

use crate::error::{Result, StatisticsError};
use crate::statistic::Statistic;
use crate::store::StatisticsFuture;
use futures::channel::oneshot;
use futures::FutureExt;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Thread counts for the two worker pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Threads that partition pools by threshold
    pub threshold_threads: usize,

    /// Threads that compute metrics
    pub metric_threads: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            threshold_threads: (cpus / 2).max(1),
            metric_threads: cpus,
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            threshold_threads: std::env::var("THRESHOLD_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.threshold_threads),
            metric_threads: std::env::var("METRIC_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.metric_threads),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.threshold_threads == 0 {
            return Err("threshold_threads must be > 0".to_string());
        }
        if self.metric_threads == 0 {
            return Err("metric_threads must be > 0".to_string());
        }
        Ok(())
    }
}

/// Handles to the threshold and metric worker pools.
///
/// Cloning shares the pools. They shut down when the last handle is dropped.
#[derive(Clone)]
pub struct WorkerPools {
    thresholds: Arc<ThreadPool>,
    metrics: Arc<ThreadPool>,
}

impl WorkerPools {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        config.validate().map_err(StatisticsError::WorkerPool)?;

        let thresholds = build_pool("threshold", config.threshold_threads)?;
        let metrics = build_pool("metric", config.metric_threads)?;

        info!(
            threshold_threads = config.threshold_threads,
            metric_threads = config.metric_threads,
            "Worker pools started"
        );

        Ok(Self {
            thresholds: Arc::new(thresholds),
            metrics: Arc::new(metrics),
        })
    }

    /// The pool on which pools are partitioned by threshold.
    pub fn thresholds(&self) -> &ThreadPool {
        &self.thresholds
    }

    /// Run a metric computation on the metric pool, returning a future of its result.
    ///
    /// A task that panics drops its sender and resolves as
    /// [`StatisticsError::Cancelled`].
    pub fn submit<F>(&self, task: F) -> StatisticsFuture
    where
        F: FnOnce() -> Result<Vec<Statistic>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.metrics.spawn(move || {
            // The receiver may already be gone if the caller gave up.
            let _ = sender.send(task());
        });
        receiver
            .map(|received| received.unwrap_or(Err(StatisticsError::Cancelled)))
            .boxed()
    }
}

fn build_pool(name: &'static str, threads: usize) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{name}-worker-{i}"))
        .panic_handler(move |_| error!(pool = name, "Worker task panicked"))
        .build()
        .map_err(|e| StatisticsError::WorkerPool(e.to_string()))
}
