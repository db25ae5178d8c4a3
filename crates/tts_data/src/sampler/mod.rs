//! Duration-capped batch samplers over cut collections.
//!
//! A sampler decides batch membership: each item it yields is the list of
//! cuts that form one batch, with the sum of their durations never above
//! `max_duration`. Two strategies exist:
//! - [`DynamicBucketingSampler`]: groups cuts of similar duration into
//!   buckets before batching, which keeps padding waste low.
//! - [`SimpleCutSampler`]: greedy batching in stream order.
//!
//! Both derive their randomness from `seed + epoch`, so the same seed and
//! epoch reproduce the same batches.

use crate::cut::Cut;
use crate::error::DataModuleError;
use anyhow::Result;
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

mod bucketing;
mod simple;

pub use bucketing::DynamicBucketingSampler;
pub use simple::SimpleCutSampler;

/// A batch of cuts as decided by a sampler.
pub type CutBatch = Vec<Cut>;

/// Iterator over batches for one epoch.
pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<CutBatch>> + Send + 'a>;

/// A `CutSampler` turns a cut collection into an epoch's sequence of batches.
///
/// `iter(epoch)` is pure with respect to `(seed, epoch)`: calling it twice
/// with the same epoch yields the same batches. Manifest read errors are
/// yielded in-stream.
///
/// Implementations must be `Send + Sync` so a loader can be moved to the
/// thread that drives it.
pub trait CutSampler: Send + Sync {
    fn kind(&self) -> SamplerKind;

    fn iter(&self, epoch: usize) -> BatchIter<'_>;

    /// Snapshot of this sampler positioned after `batches_consumed` batches
    /// of `epoch`.
    fn state(&self, epoch: usize, batches_consumed: usize) -> SamplerState;

    /// Adopts a snapshot taken from a compatible sampler.
    ///
    /// # Errors
    /// - [`DataModuleError::SamplerStateMismatch`] if the state was taken
    ///   from the other kind of sampler.
    /// - [`DataModuleError::SamplerParamMismatch`] if the state was taken
    ///   with different batching parameters.
    fn load_state(&mut self, state: &SamplerState) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    Bucketing,
    Simple,
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::Bucketing => f.write_str("bucketing"),
            SamplerKind::Simple => f.write_str("simple"),
        }
    }
}

/// Resumable snapshot of sampling progress.
///
/// Serialized with a `kind` tag, e.g.
/// ```text
/// {"kind":"bucketing","epoch":3,"seed":0,"batches_consumed":120,
///  "max_duration":200.0,"num_buckets":30,"shuffle":true,"drop_last":true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SamplerState {
    Bucketing(BucketingState),
    Simple(SimpleState),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketingState {
    pub epoch: usize,
    pub seed: u64,
    pub batches_consumed: usize,
    pub max_duration: f64,
    pub num_buckets: usize,
    pub shuffle: bool,
    pub drop_last: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleState {
    pub epoch: usize,
    pub seed: u64,
    pub batches_consumed: usize,
    pub max_duration: f64,
    pub shuffle: bool,
}

impl SamplerState {
    pub fn kind(&self) -> SamplerKind {
        match self {
            SamplerState::Bucketing(_) => SamplerKind::Bucketing,
            SamplerState::Simple(_) => SamplerKind::Simple,
        }
    }

    pub fn epoch(&self) -> usize {
        match self {
            SamplerState::Bucketing(s) => s.epoch,
            SamplerState::Simple(s) => s.epoch,
        }
    }

    pub fn batches_consumed(&self) -> usize {
        match self {
            SamplerState::Bucketing(s) => s.batches_consumed,
            SamplerState::Simple(s) => s.batches_consumed,
        }
    }

    pub fn seed(&self) -> u64 {
        match self {
            SamplerState::Bucketing(s) => s.seed,
            SamplerState::Simple(s) => s.seed,
        }
    }
}

pub(crate) fn kind_mismatch(expected: SamplerKind, state: &SamplerState) -> anyhow::Error {
    DataModuleError::SamplerStateMismatch {
        expected,
        found: state.kind(),
    }
    .into()
}

pub(crate) fn check_param<T>(param: &'static str, expected: T, found: T) -> Result<()>
where
    T: PartialEq + fmt::Display,
{
    if expected != found {
        return Err(DataModuleError::SamplerParamMismatch {
            param,
            expected: expected.to_string(),
            found: found.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Cuts longer than the batch budget can never be batched; they are dropped
/// with a warning.
pub(crate) fn fits_budget(cut: &Cut, max_duration: f64) -> bool {
    if cut.duration > max_duration {
        warn!(
            cut_id = %cut.id,
            duration = cut.duration,
            max_duration,
            "Skipping cut longer than the batch duration budget"
        );
        return false;
    }
    true
}

pub(crate) fn total_duration(cuts: &[Cut]) -> f64 {
    cuts.iter().map(|c| c.duration).sum()
}

/// Approximate shuffling of an unbounded stream.
///
/// Items are held in a buffer of `capacity`; once it is full, every incoming
/// item evicts a uniformly chosen buffered item. When the input ends the
/// remainder is shuffled and drained. Errors pass through immediately.
pub(crate) struct StreamingShuffle<I> {
    inner: I,
    buffer: Vec<Cut>,
    capacity: usize,
    rng: StdRng,
    drained: bool,
}

impl<I> StreamingShuffle<I>
where
    I: Iterator<Item = Result<Cut>>,
{
    pub(crate) fn new(inner: I, capacity: usize, rng: StdRng) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity: capacity.max(1),
            rng,
            drained: false,
        }
    }
}

impl<I> Iterator for StreamingShuffle<I>
where
    I: Iterator<Item = Result<Cut>>,
{
    type Item = Result<Cut>;

    fn next(&mut self) -> Option<Self::Item> {
        use rand::seq::SliceRandom;

        while !self.drained {
            match self.inner.next() {
                Some(Ok(cut)) => {
                    self.buffer.push(cut);
                    if self.buffer.len() >= self.capacity {
                        let k = self.rng.random_range(0..self.buffer.len());
                        return Some(Ok(self.buffer.swap_remove(k)));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.drained = true;
                    self.buffer.shuffle(&mut self.rng);
                }
            }
        }
        self.buffer.pop().map(Ok)
    }
}
