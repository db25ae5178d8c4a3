use super::{
    check_param, fits_budget, kind_mismatch, BatchIter, BucketingState, CutBatch, CutSampler,
    SamplerKind, SamplerState, StreamingShuffle,
};
use crate::cut::Cut;
use crate::cutset::CutSet;
use anyhow::{ensure, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::OnceLock;
use tracing::debug;

/// Number of leading cuts used to estimate bucket boundaries.
const NUM_CUTS_FOR_BINS_ESTIMATE: usize = 10_000;

/// Read-ahead buffer size per bucket.
const BUFFER_SIZE_PER_BUCKET: usize = 2_000;

/// Streaming shuffle buffer size per bucket.
const SHUFFLE_BUFFER_SIZE_PER_BUCKET: usize = 5_000;

/// Batches cuts of similar duration together under a total-duration budget.
///
/// # How it works
/// 1. Bucket boundaries are estimated from the first 10 000 cuts so that
///    every bucket covers roughly the same total duration.
/// 2. Cuts are streamed from the collection (through a streaming shuffle
///    buffer of `shuffle_buffer_size` when shuffling) into a read-ahead
///    buffer of `buffer_size` cuts, each placed in the bucket its duration
///    falls into.
/// 3. A bucket whose buffered duration reaches `max_duration` is ready; one
///    ready bucket is picked (at random when shuffling, otherwise the lowest
///    index) and a batch is taken from its front while the batch total stays
///    within `max_duration`.
/// 4. Once the stream is drained, the remaining buckets are flushed. With
///    `drop_last`, the trailing partial batch of each bucket is discarded.
///
/// Randomness comes from `StdRng::seed_from_u64(seed + epoch)`.
///
/// # Example
/// ```ignore
/// let sampler = DynamicBucketingSampler::new(cuts, 200.0, 30, true, true)?;
/// for batch in sampler.iter(epoch) {
///     let batch = batch?; // Vec<Cut>, total duration <= 200s
/// }
/// ```
#[derive(Debug)]
pub struct DynamicBucketingSampler {
    cuts: CutSet,
    max_duration: f64,
    num_buckets: usize,
    shuffle: bool,
    drop_last: bool,
    buffer_size: usize,
    shuffle_buffer_size: usize,
    seed: u64,
    boundaries: OnceLock<Vec<f64>>,
}

impl DynamicBucketingSampler {
    pub fn new(
        cuts: CutSet,
        max_duration: f64,
        num_buckets: usize,
        shuffle: bool,
        drop_last: bool,
    ) -> Result<Self> {
        ensure!(
            max_duration > 0.0,
            "max_duration must be positive, but got max_duration={}",
            max_duration
        );
        ensure!(
            num_buckets > 0,
            "num_buckets must be >= 1, but got num_buckets={}",
            num_buckets
        );

        Ok(Self {
            cuts,
            max_duration,
            num_buckets,
            shuffle,
            drop_last,
            buffer_size: num_buckets * BUFFER_SIZE_PER_BUCKET,
            shuffle_buffer_size: num_buckets * SHUFFLE_BUFFER_SIZE_PER_BUCKET,
            seed: 0,
            boundaries: OnceLock::new(),
        })
    }

    pub fn with_buffer_sizes(mut self, buffer_size: usize, shuffle_buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self.shuffle_buffer_size = shuffle_buffer_size.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn drop_last(&self) -> bool {
        self.drop_last
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn shuffle_buffer_size(&self) -> usize {
        self.shuffle_buffer_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn boundaries(&self) -> Result<Vec<f64>> {
        if let Some(b) = self.boundaries.get() {
            return Ok(b.clone());
        }
        let mut durations = Vec::new();
        for cut in self.cuts.iter()?.take(NUM_CUTS_FOR_BINS_ESTIMATE) {
            durations.push(cut.context("Failed to read cut for bucket estimation")?.duration);
        }
        let boundaries = estimate_boundaries(&mut durations, self.num_buckets);
        debug!(?boundaries, sampled = durations.len(), "Estimated duration buckets");
        let _ = self.boundaries.set(boundaries.clone());
        Ok(boundaries)
    }

    fn start(&self, epoch: usize) -> Result<BucketingIter> {
        let boundaries = self.boundaries()?;
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));

        let stream = self.cuts.iter()?;
        let stream: Box<dyn Iterator<Item = Result<Cut>> + Send> = if self.shuffle {
            let shuffle_rng = StdRng::from_rng(&mut rng);
            Box::new(StreamingShuffle::new(
                stream,
                self.shuffle_buffer_size,
                shuffle_rng,
            ))
        } else {
            stream
        };

        let num_buckets = boundaries.len() + 1;
        Ok(BucketingIter {
            stream,
            boundaries,
            buckets: (0..num_buckets).map(|_| VecDeque::new()).collect(),
            bucket_durations: vec![0.0; num_buckets],
            buffered: 0,
            buffer_size: self.buffer_size,
            max_duration: self.max_duration,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            rng,
            exhausted: false,
            failed: false,
        })
    }
}

impl CutSampler for DynamicBucketingSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Bucketing
    }

    fn iter(&self, epoch: usize) -> BatchIter<'_> {
        match self.start(epoch) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn state(&self, epoch: usize, batches_consumed: usize) -> SamplerState {
        SamplerState::Bucketing(BucketingState {
            epoch,
            seed: self.seed,
            batches_consumed,
            max_duration: self.max_duration,
            num_buckets: self.num_buckets,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
        })
    }

    fn load_state(&mut self, state: &SamplerState) -> Result<()> {
        let SamplerState::Bucketing(s) = state else {
            return Err(kind_mismatch(SamplerKind::Bucketing, state));
        };
        check_param("max_duration", self.max_duration, s.max_duration)?;
        check_param("num_buckets", self.num_buckets, s.num_buckets)?;
        check_param("shuffle", self.shuffle, s.shuffle)?;
        check_param("drop_last", self.drop_last, s.drop_last)?;
        self.seed = s.seed;
        Ok(())
    }
}

/// Splits sorted durations into `num_buckets` bins of roughly equal total
/// duration and returns the `num_buckets - 1` inner boundaries.
fn estimate_boundaries(durations: &mut [f64], num_buckets: usize) -> Vec<f64> {
    if num_buckets <= 1 || durations.is_empty() {
        return Vec::new();
    }
    durations.sort_unstable_by(|a, b| a.total_cmp(b));
    let per_bucket = durations.iter().sum::<f64>() / num_buckets as f64;

    let mut boundaries = Vec::with_capacity(num_buckets - 1);
    let mut acc = 0.0;
    for &d in durations.iter() {
        if acc > per_bucket {
            boundaries.push(d);
            acc = 0.0;
        }
        acc += d;
    }
    boundaries.truncate(num_buckets - 1);
    boundaries
}

struct BucketingIter {
    stream: Box<dyn Iterator<Item = Result<Cut>> + Send>,
    boundaries: Vec<f64>,
    buckets: Vec<VecDeque<Cut>>,
    bucket_durations: Vec<f64>,
    buffered: usize,
    buffer_size: usize,
    max_duration: f64,
    shuffle: bool,
    drop_last: bool,
    rng: StdRng,
    exhausted: bool,
    failed: bool,
}

impl BucketingIter {
    fn bucket_index(&self, duration: f64) -> usize {
        self.boundaries.partition_point(|&b| b <= duration)
    }

    /// Moves one cut from the stream into its bucket.
    fn pull(&mut self) -> Result<()> {
        match self.stream.next() {
            None => self.exhausted = true,
            Some(Err(e)) => return Err(e),
            Some(Ok(cut)) => {
                if fits_budget(&cut, self.max_duration) {
                    let idx = self.bucket_index(cut.duration);
                    self.bucket_durations[idx] += cut.duration;
                    self.buckets[idx].push_back(cut);
                    self.buffered += 1;
                }
            }
        }
        Ok(())
    }

    fn pick(&mut self, eligible: impl Fn(usize) -> bool) -> Option<usize> {
        let candidates: Vec<usize> = (0..self.buckets.len()).filter(|&i| eligible(i)).collect();
        if candidates.is_empty() {
            return None;
        }
        if self.shuffle {
            Some(candidates[self.rng.random_range(0..candidates.len())])
        } else {
            Some(candidates[0])
        }
    }

    /// Takes cuts from the front of bucket `idx` while the batch fits the
    /// budget. The flag tells whether the batch is full, i.e. the next cut
    /// would not have fit.
    fn take_batch(&mut self, idx: usize) -> (CutBatch, bool) {
        let bucket = &mut self.buckets[idx];
        let mut batch = Vec::new();
        let mut total = 0.0;
        while let Some(front) = bucket.front() {
            if total + front.duration > self.max_duration {
                break;
            }
            total += front.duration;
            batch.extend(bucket.pop_front());
        }

        let full = !bucket.is_empty() || total >= self.max_duration;
        self.bucket_durations[idx] = if bucket.is_empty() {
            0.0
        } else {
            self.bucket_durations[idx] - total
        };
        self.buffered -= batch.len();
        (batch, full)
    }

    fn next_batch(&mut self) -> Result<Option<CutBatch>> {
        loop {
            while !self.exhausted && self.buffered < self.buffer_size {
                self.pull()?;
            }
            let max = self.max_duration;
            let durations = self.bucket_durations.clone();
            if let Some(idx) = self.pick(|i| durations[i] >= max) {
                return Ok(Some(self.take_batch(idx).0));
            }
            if self.exhausted {
                break;
            }
            // No bucket can fill a batch yet: read past the buffer limit.
            self.pull()?;
        }

        loop {
            let sizes: Vec<usize> = self.buckets.iter().map(VecDeque::len).collect();
            let Some(idx) = self.pick(|i| sizes[i] > 0) else {
                return Ok(None);
            };
            let (batch, full) = self.take_batch(idx);
            if full || !self.drop_last {
                return Ok(Some(batch));
            }
            debug!(bucket = idx, cuts = batch.len(), "Dropping last partial batch");
        }
    }
}

impl Iterator for BucketingIter {
    type Item = Result<CutBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{total_duration, SimpleState};
    use crate::error::DataModuleError;
    use std::collections::HashSet;

    const TEST_SEED: u64 = 42;

    fn varied_cuts(n: usize) -> CutSet {
        CutSet::from_cuts(
            (0..n)
                .map(|i| Cut::new(format!("c{}", i), 0.0, 1.0 + (i % 7) as f64 * 0.5))
                .collect(),
        )
    }

    fn collect(sampler: &DynamicBucketingSampler, epoch: usize) -> Result<Vec<CutBatch>> {
        sampler.iter(epoch).collect()
    }

    fn ids(batches: &[CutBatch]) -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|b| b.iter().map(|c| c.id.clone()).collect())
            .collect()
    }

    #[test]
    fn validates_parameters() {
        assert!(DynamicBucketingSampler::new(varied_cuts(1), 0.0, 2, false, false).is_err());
        assert!(DynamicBucketingSampler::new(varied_cuts(1), 10.0, 0, false, false).is_err());

        let sampler = DynamicBucketingSampler::new(varied_cuts(1), 200.0, 30, true, true).unwrap();
        assert_eq!(sampler.buffer_size(), 60_000);
        assert_eq!(sampler.shuffle_buffer_size(), 150_000);
        assert_eq!(sampler.seed(), 0);
    }

    #[test]
    fn boundaries_split_total_duration_evenly() {
        let mut durations = vec![3.0, 1.0, 2.0, 1.0, 3.0, 1.0, 2.0, 1.0];
        assert_eq!(estimate_boundaries(&mut durations, 2), vec![3.0]);
        assert!(estimate_boundaries(&mut durations, 1).is_empty());
        assert!(estimate_boundaries(&mut [], 4).is_empty());
    }

    #[test]
    fn batches_respect_budget_and_cover_all_cuts() -> Result<()> {
        let sampler = DynamicBucketingSampler::new(varied_cuts(200), 12.0, 4, true, false)?
            .with_seed(TEST_SEED);
        let batches = collect(&sampler, 0)?;

        let mut seen = HashSet::new();
        for batch in &batches {
            assert!(!batch.is_empty());
            assert!(total_duration(batch) <= 12.0);
            for cut in batch {
                assert!(seen.insert(cut.id.clone()), "cut {} repeated", cut.id);
            }
        }
        assert_eq!(seen.len(), 200);
        Ok(())
    }

    #[test]
    fn same_seed_and_epoch_reproduce_batches() -> Result<()> {
        let sampler = DynamicBucketingSampler::new(varied_cuts(300), 10.0, 3, true, true)?
            .with_buffer_sizes(50, 40)
            .with_seed(TEST_SEED);
        assert_eq!(ids(&collect(&sampler, 1)?), ids(&collect(&sampler, 1)?));
        assert_ne!(ids(&collect(&sampler, 1)?), ids(&collect(&sampler, 2)?));
        Ok(())
    }

    #[test]
    fn unshuffled_order_is_stable_across_instances() -> Result<()> {
        let cuts = varied_cuts(100);
        let a = DynamicBucketingSampler::new(cuts.clone(), 8.0, 3, false, false)?.with_seed(1);
        let b = DynamicBucketingSampler::new(cuts, 8.0, 3, false, false)?.with_seed(2);
        assert_eq!(ids(&collect(&a, 0)?), ids(&collect(&b, 5)?));
        Ok(())
    }

    #[test]
    fn drop_last_discards_trailing_partial_batch() -> Result<()> {
        let cuts = CutSet::from_cuts(
            (0..10)
                .map(|i| Cut::new(format!("c{}", i), 0.0, 3.0))
                .collect(),
        );
        let keep = DynamicBucketingSampler::new(cuts.clone(), 10.0, 1, false, false)?;
        let sizes: Vec<usize> = collect(&keep, 0)?.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);

        let drop = DynamicBucketingSampler::new(cuts, 10.0, 1, false, true)?;
        let sizes: Vec<usize> = collect(&drop, 0)?.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3]);
        Ok(())
    }

    #[test]
    fn skips_cuts_longer_than_budget() -> Result<()> {
        let cuts = CutSet::from_cuts(vec![
            Cut::new("short", 0.0, 4.0),
            Cut::new("long", 0.0, 25.0),
            Cut::new("mid", 0.0, 6.0),
        ]);
        let sampler = DynamicBucketingSampler::new(cuts, 20.0, 2, false, false)?;
        let all: Vec<String> = ids(&collect(&sampler, 0)?).concat();
        assert_eq!(all.len(), 2);
        assert!(!all.contains(&"long".to_string()));
        Ok(())
    }

    #[test]
    fn small_buffer_still_makes_progress() -> Result<()> {
        let sampler =
            DynamicBucketingSampler::new(varied_cuts(60), 30.0, 6, false, false)?.with_buffer_sizes(1, 1);
        let total: usize = collect(&sampler, 0)?.iter().map(Vec::len).sum();
        assert_eq!(total, 60);
        Ok(())
    }

    #[test]
    fn manifest_errors_surface_in_stream() {
        let sampler = DynamicBucketingSampler::new(
            crate::cutset::load_manifest_lazy("/nonexistent/cuts.jsonl.gz"),
            20.0,
            2,
            false,
            false,
        )
        .unwrap();
        let out: Vec<Result<CutBatch>> = sampler.iter(0).collect();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    mod state_tests {
        use super::*;

        #[test]
        fn roundtrip_adopts_seed() -> Result<()> {
            let source = DynamicBucketingSampler::new(varied_cuts(10), 20.0, 2, true, true)?
                .with_seed(TEST_SEED);
            let state = source.state(3, 7);
            assert_eq!((state.epoch(), state.batches_consumed()), (3, 7));

            let mut target = DynamicBucketingSampler::new(varied_cuts(10), 20.0, 2, true, true)?;
            target.load_state(&state)?;
            assert_eq!(target.seed(), TEST_SEED);
            Ok(())
        }

        #[test]
        fn rejects_simple_state() -> Result<()> {
            let mut sampler = DynamicBucketingSampler::new(varied_cuts(10), 20.0, 2, true, true)?;
            let state = SamplerState::Simple(SimpleState {
                epoch: 0,
                seed: 0,
                batches_consumed: 1,
                max_duration: 20.0,
                shuffle: true,
            });
            let err = sampler.load_state(&state).unwrap_err();
            assert_eq!(
                err.downcast_ref::<DataModuleError>(),
                Some(&DataModuleError::SamplerStateMismatch {
                    expected: SamplerKind::Bucketing,
                    found: SamplerKind::Simple,
                })
            );
            Ok(())
        }

        #[test]
        fn rejects_changed_parameters() -> Result<()> {
            let state = DynamicBucketingSampler::new(varied_cuts(10), 20.0, 2, true, true)?
                .state(0, 0);
            let mut other = DynamicBucketingSampler::new(varied_cuts(10), 20.0, 4, true, true)?;
            let err = other.load_state(&state).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<DataModuleError>(),
                Some(DataModuleError::SamplerParamMismatch { param: "num_buckets", .. })
            ));
            Ok(())
        }
    }
}
