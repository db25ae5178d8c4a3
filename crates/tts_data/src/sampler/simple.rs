use super::{
    check_param, fits_budget, kind_mismatch, BatchIter, CutBatch, CutSampler, SamplerKind,
    SamplerState, SimpleState, StreamingShuffle,
};
use crate::cut::Cut;
use crate::cutset::CutSet;
use anyhow::{ensure, Result};
use rand::{rngs::StdRng, SeedableRng};

/// Streaming shuffle buffer used when shuffling.
const SHUFFLE_BUFFER_SIZE: usize = 10_000;

/// Greedy duration-capped batching in stream order.
///
/// Cuts are appended to the current batch until the next one would push the
/// total over `max_duration`; that cut then starts a new batch. The final
/// batch is always emitted, even if short.
#[derive(Debug, Clone)]
pub struct SimpleCutSampler {
    cuts: CutSet,
    max_duration: f64,
    shuffle: bool,
    seed: u64,
}

impl SimpleCutSampler {
    pub fn new(cuts: CutSet, max_duration: f64, shuffle: bool) -> Result<Self> {
        ensure!(
            max_duration > 0.0,
            "max_duration must be positive, but got max_duration={}",
            max_duration
        );
        Ok(Self {
            cuts,
            max_duration,
            shuffle,
            seed: 0,
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_duration(&self) -> f64 {
        self.max_duration
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl CutSampler for SimpleCutSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Simple
    }

    fn iter(&self, epoch: usize) -> BatchIter<'_> {
        let stream = match self.cuts.iter() {
            Ok(stream) => stream,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let stream: Box<dyn Iterator<Item = Result<Cut>> + Send> = if self.shuffle {
            let rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            Box::new(StreamingShuffle::new(stream, SHUFFLE_BUFFER_SIZE, rng))
        } else {
            stream
        };

        Box::new(GreedyBatches {
            stream,
            pending: None,
            max_duration: self.max_duration,
            done: false,
        })
    }

    fn state(&self, epoch: usize, batches_consumed: usize) -> SamplerState {
        SamplerState::Simple(SimpleState {
            epoch,
            seed: self.seed,
            batches_consumed,
            max_duration: self.max_duration,
            shuffle: self.shuffle,
        })
    }

    fn load_state(&mut self, state: &SamplerState) -> Result<()> {
        let SamplerState::Simple(s) = state else {
            return Err(kind_mismatch(SamplerKind::Simple, state));
        };
        check_param("max_duration", self.max_duration, s.max_duration)?;
        check_param("shuffle", self.shuffle, s.shuffle)?;
        self.seed = s.seed;
        Ok(())
    }
}

struct GreedyBatches {
    stream: Box<dyn Iterator<Item = Result<Cut>> + Send>,
    // First cut of the next batch, held over from the previous call
    pending: Option<Cut>,
    max_duration: f64,
    done: bool,
}

impl Iterator for GreedyBatches {
    type Item = Result<CutBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch: CutBatch = self.pending.take().into_iter().collect();
        let mut total: f64 = batch.iter().map(|c| c.duration).sum();

        loop {
            match self.stream.next() {
                Some(Ok(cut)) => {
                    if !fits_budget(&cut, self.max_duration) {
                        continue;
                    }
                    if total + cut.duration > self.max_duration {
                        self.pending = Some(cut);
                        return Some(Ok(batch));
                    }
                    total += cut.duration;
                    batch.push(cut);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    return (!batch.is_empty()).then_some(Ok(batch));
                }
            }
        }
    }
}
