//! src/dataloader/loader.rs
//!
//! The `DataLoader`: a speech-synthesis dataset plus a cut sampler.
//!
//! # Seed Coordination
//!
//! Two independent seeds are in play:
//! - The sampler's seed controls batch order (`seed + epoch`).
//! - The optional [`SeedWorkers`] hook controls per-worker randomness
//!   (`base_seed + worker_id`), applied when each epoch's workers start.

use crate::dataset::SpeechSynthesisDataset;
use crate::sampler::{CutSampler, SamplerState};
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

use super::common::thread::SeedWorkers;
use super::config::DataLoaderConfig;
use super::iterator::DataLoaderIter;

/// Coordinates batch assembly for one phase.
///
/// Each call to [`DataLoader::iter`] runs one epoch: the sampler is iterated
/// on the calling thread and its batches are assembled either inline
/// (`num_workers = 0`) or by a fresh pool of worker threads that lives as
/// long as the iterator. Batches are always delivered in sampler order.
///
/// The loader counts delivered batches, so [`DataLoader::state_dict`] can be
/// taken at any point and later passed to [`DataLoader::load_state_dict`] to
/// continue the same epoch without repeating or skipping a batch.
///
/// # Example
/// ```ignore
/// let loader = DataLoader::new(dataset, Box::new(sampler), config)?;
/// for epoch in 0..num_epochs {
///     loader.set_epoch(epoch);
///     for batch in loader.iter()? {
///         let batch = batch?;
///         // batch.features: [B, T, F]
///     }
/// }
/// ```
pub struct DataLoader {
    pub(crate) dataset: Arc<SpeechSynthesisDataset>,
    pub(crate) sampler: Box<dyn CutSampler>,
    pub(crate) config: DataLoaderConfig,
    pub(crate) worker_init: Option<SeedWorkers>,
    pub(crate) current_epoch: AtomicUsize,
    pub(crate) batches_consumed: AtomicUsize,
    pub(crate) resume_from: AtomicUsize,
}

impl DataLoader {
    /// # Errors
    /// - Returns error if `prefetch_factor` is 0 when using workers
    pub fn new(
        dataset: SpeechSynthesisDataset,
        sampler: Box<dyn CutSampler>,
        config: DataLoaderConfig,
    ) -> Result<Self> {
        if config.prefetch_factor == 0 && config.num_workers > 0 {
            bail!(
                "Prefetch factor must be > 0 when using {} workers",
                config.num_workers
            );
        }

        Ok(Self {
            dataset: Arc::new(dataset),
            sampler,
            config,
            worker_init: None,
            current_epoch: AtomicUsize::new(0),
            batches_consumed: AtomicUsize::new(0),
            resume_from: AtomicUsize::new(0),
        })
    }

    /// Installs a hook run on every worker thread at startup.
    pub fn with_worker_init(mut self, hook: SeedWorkers) -> Self {
        self.worker_init = Some(hook);
        self
    }

    pub fn worker_init(&self) -> Option<SeedWorkers> {
        self.worker_init
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn dataset(&self) -> &SpeechSynthesisDataset {
        &self.dataset
    }

    pub fn sampler(&self) -> &dyn CutSampler {
        self.sampler.as_ref()
    }

    /// Selects the epoch the next [`DataLoader::iter`] runs.
    pub fn set_epoch(&self, epoch: usize) {
        if self.current_epoch.swap(epoch, Ordering::Relaxed) != epoch {
            self.resume_from.store(0, Ordering::Relaxed);
            self.batches_consumed.store(0, Ordering::Relaxed);
        }
    }

    pub fn epoch(&self) -> usize {
        self.current_epoch.load(Ordering::Relaxed)
    }

    /// Sampling progress: the current epoch and the number of batches
    /// delivered from it so far.
    pub fn state_dict(&self) -> SamplerState {
        self.sampler.state(
            self.epoch(),
            self.batches_consumed.load(Ordering::Relaxed),
        )
    }

    /// Restores progress saved by [`DataLoader::state_dict`]. The next
    /// [`DataLoader::iter`] continues with the first batch not yet delivered.
    ///
    /// # Errors
    /// Fails if the state belongs to another kind of sampler or was taken with
    /// different batching parameters.
    pub fn load_state_dict(&mut self, state: &SamplerState) -> Result<()> {
        self.sampler
            .load_state(state)
            .context("Failed to load sampler state")?;
        self.current_epoch.store(state.epoch(), Ordering::Relaxed);
        self.resume_from
            .store(state.batches_consumed(), Ordering::Relaxed);
        self.batches_consumed
            .store(state.batches_consumed(), Ordering::Relaxed);
        info!(
            kind = %state.kind(),
            epoch = state.epoch(),
            batches_consumed = state.batches_consumed(),
            "Resuming sampler"
        );
        Ok(())
    }

    /// Starts iterating the current epoch.
    pub fn iter(&self) -> Result<DataLoaderIter<'_>> {
        let skip = self.resume_from.swap(0, Ordering::Relaxed);
        self.batches_consumed.store(skip, Ordering::Relaxed);
        DataLoaderIter::new(self, skip)
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Result<crate::batch::Batch>;
    type IntoIter = DataLoaderIter<'a>;

    /// If the worker pool cannot be started, the iterator yields that error
    /// once and ends.
    fn into_iter(self) -> Self::IntoIter {
        self.iter().unwrap_or_else(|e| DataLoaderIter::failed(self, e))
    }
}
