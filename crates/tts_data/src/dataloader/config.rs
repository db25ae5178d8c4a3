//! src/dataloader/config.rs
//!
//! Configuration for DataLoader behaviour.
//!
//! Batch membership is decided by the sampler, so the config only covers
//! parallelism and timing.
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .num_workers(8)
//!     .prefetch_factor(2)
//!     .build();
//! ```

use std::time::Duration;

/// Configuration for DataLoader
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of parallel workers (0 = batches are built on the calling thread)
    pub num_workers: usize,
    /// Number of batches kept in flight per worker (must be >0 when using workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for the next batch from workers.
    /// If exceeded, returns an error (assuming workers are stuck). Default: 300s
    pub timeout: Duration,
    /// How often idle workers check for the shutdown signal.
    /// Not an error timeout - just a polling interval. Default: 100ms.
    pub worker_timeout: Duration,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            prefetch_factor: 2,
            timeout: Duration::from_secs(300),
            worker_timeout: Duration::from_millis(100),
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }
}

/// Builder for DataLoaderConfig with method chaining
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the prefetch factor.
    /// Higher values keep workers busier but hold more batches in memory.
    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for receiving a batch.
    ///
    /// - Too low: May fail batches during legitimate heavy feature extraction
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the worker polling interval
    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}
