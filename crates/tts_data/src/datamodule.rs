//! src/datamodule.rs
//!
//! `TtsDataModule`: builds the train, dev and test loaders from
//! [`TtsDataArgs`] and hands out memoized cut collections for the known
//! corpora.
//!
//! # Manifest layout
//!
//! All accessors resolve file names inside `args.manifest_dir`:
//!
//! | accessor | file |
//! |---|---|
//! | `train_emilia_{en,zh}_cuts` | `emilia_cuts_{EN,ZH}.jsonl.gz` |
//! | `dev_emilia_{en,zh}_cuts` | `emilia_cuts_{EN,ZH}-dev.jsonl.gz` |
//! | `train_libritts_cuts` | `libritts_cuts_train-all-shuf.jsonl.gz` |
//! | `dev_libritts_cuts` | `libritts_cuts_dev-clean.jsonl.gz` |
//! | `train_opendialog_{en,zh}_cuts` | `opendialog_cuts_{EN,ZH}-train.jsonl.gz` |
//! | `dev_opendialog_{en,zh}_cuts` | `opendialog_cuts_{EN,ZH}-dev.jsonl.gz` |
//!
//! `train_custom_cuts` and `dev_custom_cuts` take an arbitrary path.

use crate::args::TtsDataArgs;
use crate::cutset::{load_manifest_lazy, CutSet};
use crate::dataloader::{DataLoader, DataLoaderConfig, SeedWorkers};
use crate::dataset::SpeechSynthesisDataset;
use crate::features::InputStrategy;
use crate::sampler::{CutSampler, DynamicBucketingSampler, SamplerState, SimpleCutSampler};
use anyhow::{ensure, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Workers used by the dev loader regardless of `--num-workers`.
pub const DEV_NUM_WORKERS: usize = 2;

/// Bucket count of the dev and test samplers.
pub const EVAL_NUM_BUCKETS: usize = 10;

/// Read-ahead buffer of the dev and test samplers.
const EVAL_BUFFER_SIZE: usize = 20_000;

/// Upper bound (exclusive) of the training worker base seed.
const MAX_BASE_SEED: u64 = 100_000;

/// Data pipelines for TTS training.
///
/// There is always one train and one dev loader; any number of test loaders
/// can be built from different cut collections.
pub struct TtsDataModule {
    args: TtsDataArgs,
    rng: Mutex<StdRng>,
    cache: Mutex<HashMap<(&'static str, PathBuf), CutSet>>,
}

impl TtsDataModule {
    /// Creates a data module whose worker base seeds come from OS entropy.
    pub fn new(args: TtsDataArgs) -> Self {
        Self::from_rng(args, StdRng::from_rng(&mut rand::rng()))
    }

    /// Creates a data module with a reproducible generator for worker base
    /// seeds.
    pub fn with_seed(args: TtsDataArgs, seed: u64) -> Self {
        Self::from_rng(args, StdRng::seed_from_u64(seed))
    }

    fn from_rng(args: TtsDataArgs, rng: StdRng) -> Self {
        Self {
            args,
            rng: Mutex::new(rng),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn args(&self) -> &TtsDataArgs {
        &self.args
    }

    /// Loader for the training phase.
    ///
    /// Uses a [`DynamicBucketingSampler`] when `--bucketing-sampler` is on,
    /// otherwise a [`SimpleCutSampler`]. A saved `sampler_state` is loaded
    /// before the loader is returned.
    ///
    /// Every call draws a fresh worker base seed in `0..100000`; worker `w`
    /// is then seeded with `base_seed + w`.
    ///
    /// # Errors
    /// Fails if the batching options are invalid or `sampler_state` does not
    /// match the sampler that was built.
    pub fn train_dataloaders(
        &self,
        cuts_train: CutSet,
        sampler_state: Option<&SamplerState>,
    ) -> Result<DataLoader> {
        info!("About to create train dataset");
        let train = self.dataset();

        let max_duration = self.max_duration()?;
        let sampler: Box<dyn CutSampler> = if self.args.bucketing_sampler {
            info!("Using DynamicBucketingSampler.");
            Box::new(DynamicBucketingSampler::new(
                cuts_train,
                max_duration,
                self.args.num_buckets,
                self.args.shuffle,
                self.args.drop_last,
            )?)
        } else {
            info!("Using SimpleCutSampler.");
            Box::new(SimpleCutSampler::new(
                cuts_train,
                max_duration,
                self.args.shuffle,
            )?)
        };

        let base_seed = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..MAX_BASE_SEED);

        info!("About to create train dataloader");
        let config = DataLoaderConfig::builder()
            .num_workers(self.args.num_workers)
            .build();
        let mut train_dl = DataLoader::new(train, sampler, config)?
            .with_worker_init(SeedWorkers::new(base_seed));

        if let Some(state) = sampler_state {
            info!("Loading sampler state dict");
            train_dl.load_state_dict(state)?;
        }

        Ok(train_dl)
    }

    /// Loader for the validation phase: unshuffled bucketing, every batch
    /// kept, two workers.
    pub fn dev_dataloaders(&self, cuts_valid: CutSet) -> Result<DataLoader> {
        info!("About to create dev dataset");
        let validate = self.dataset();
        let dev_sampler = self.eval_sampler(cuts_valid)?;

        info!("About to create valid dataloader");
        let config = DataLoaderConfig::builder()
            .num_workers(DEV_NUM_WORKERS)
            .build();
        DataLoader::new(validate, Box::new(dev_sampler), config)
    }

    /// Loader for the test phase: like dev, but batches also carry the raw
    /// audio and the configured worker count is used.
    pub fn test_dataloaders(&self, cuts: CutSet) -> Result<DataLoader> {
        info!("About to create test dataset");
        let test = self.dataset().return_audio(true);
        let test_sampler = self.eval_sampler(cuts)?;

        info!("About to create test dataloader");
        let config = DataLoaderConfig::builder()
            .num_workers(self.args.num_workers)
            .build();
        DataLoader::new(test, Box::new(test_sampler), config)
    }

    fn dataset(&self) -> SpeechSynthesisDataset {
        SpeechSynthesisDataset::new(InputStrategy::from_flag(self.args.on_the_fly_feats))
            .return_text(true)
            .return_tokens(true)
            .return_spk_ids(true)
            .return_cuts(self.args.return_cuts)
    }

    fn eval_sampler(&self, cuts: CutSet) -> Result<DynamicBucketingSampler> {
        Ok(
            DynamicBucketingSampler::new(cuts, self.max_duration()?, EVAL_NUM_BUCKETS, false, false)?
                .with_buffer_sizes(EVAL_BUFFER_SIZE, EVAL_BUFFER_SIZE),
        )
    }

    fn max_duration(&self) -> Result<f64> {
        ensure!(
            self.args.max_duration > 0,
            "--max-duration must be positive, but got {}",
            self.args.max_duration
        );
        Ok(self.args.max_duration as f64)
    }

    /// Returns the cached collection for `(accessor, path)`, creating it on
    /// first use.
    fn cached(&self, accessor: &'static str, path: PathBuf) -> CutSet {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry((accessor, path))
            .or_insert_with_key(|(_, path)| load_manifest_lazy(path.clone()))
            .clone()
    }

    fn manifest(&self, file_name: &str) -> PathBuf {
        self.args.manifest_dir.join(file_name)
    }

    pub fn train_custom_cuts(&self, file: impl AsRef<Path>) -> CutSet {
        let file = file.as_ref();
        info!("About to get the custom training cuts {}", file.display());
        self.cached("train_custom_cuts", file.to_path_buf())
    }

    pub fn dev_custom_cuts(&self, file: impl AsRef<Path>) -> CutSet {
        let file = file.as_ref();
        info!("About to get the custom validation cuts {}", file.display());
        self.cached("dev_custom_cuts", file.to_path_buf())
    }

    pub fn train_emilia_en_cuts(&self) -> CutSet {
        info!("About to get train the EN subset");
        self.cached("train_emilia_en_cuts", self.manifest("emilia_cuts_EN.jsonl.gz"))
    }

    pub fn train_emilia_zh_cuts(&self) -> CutSet {
        info!("About to get train the ZH subset");
        self.cached("train_emilia_zh_cuts", self.manifest("emilia_cuts_ZH.jsonl.gz"))
    }

    pub fn dev_emilia_en_cuts(&self) -> CutSet {
        info!("About to get dev the EN subset");
        self.cached("dev_emilia_en_cuts", self.manifest("emilia_cuts_EN-dev.jsonl.gz"))
    }

    pub fn dev_emilia_zh_cuts(&self) -> CutSet {
        info!("About to get dev the ZH subset");
        self.cached("dev_emilia_zh_cuts", self.manifest("emilia_cuts_ZH-dev.jsonl.gz"))
    }

    /// The pre-shuffled union of train-clean-100, train-clean-360 and
    /// train-other-500.
    pub fn train_libritts_cuts(&self) -> CutSet {
        info!(
            "About to get the shuffled train-clean-100, \
            train-clean-360 and train-other-500 cuts"
        );
        self.cached(
            "train_libritts_cuts",
            self.manifest("libritts_cuts_train-all-shuf.jsonl.gz"),
        )
    }

    pub fn dev_libritts_cuts(&self) -> CutSet {
        info!("About to get dev-clean cuts");
        self.cached(
            "dev_libritts_cuts",
            self.manifest("libritts_cuts_dev-clean.jsonl.gz"),
        )
    }

    pub fn train_opendialog_en_cuts(&self) -> CutSet {
        info!("About to get the EN train subset of OpenDialog");
        self.cached(
            "train_opendialog_en_cuts",
            self.manifest("opendialog_cuts_EN-train.jsonl.gz"),
        )
    }

    pub fn train_opendialog_zh_cuts(&self) -> CutSet {
        info!("About to get the ZH train subset of OpenDialog");
        self.cached(
            "train_opendialog_zh_cuts",
            self.manifest("opendialog_cuts_ZH-train.jsonl.gz"),
        )
    }

    pub fn dev_opendialog_en_cuts(&self) -> CutSet {
        info!("About to get the EN dev subset of OpenDialog");
        self.cached(
            "dev_opendialog_en_cuts",
            self.manifest("opendialog_cuts_EN-dev.jsonl.gz"),
        )
    }

    pub fn dev_opendialog_zh_cuts(&self) -> CutSet {
        info!("About to get the ZH dev subset of OpenDialog");
        self.cached(
            "dev_opendialog_zh_cuts",
            self.manifest("opendialog_cuts_ZH-dev.jsonl.gz"),
        )
    }

    /// Resolves a corpus name (`emilia_en`, `libritts`, ...) or a manifest
    /// path to the collection for `phase`.
    ///
    /// # Errors
    /// Fails for an unknown corpus name that is not an existing file either.
    pub fn cuts_by_name(&self, phase: Phase, name: &str) -> Result<CutSet> {
        let cuts = match (phase, name) {
            (Phase::Train, "emilia_en") => self.train_emilia_en_cuts(),
            (Phase::Train, "emilia_zh") => self.train_emilia_zh_cuts(),
            (Phase::Train, "libritts") => self.train_libritts_cuts(),
            (Phase::Train, "opendialog_en") => self.train_opendialog_en_cuts(),
            (Phase::Train, "opendialog_zh") => self.train_opendialog_zh_cuts(),
            (_, "emilia_en") => self.dev_emilia_en_cuts(),
            (_, "emilia_zh") => self.dev_emilia_zh_cuts(),
            (_, "libritts") => self.dev_libritts_cuts(),
            (_, "opendialog_en") => self.dev_opendialog_en_cuts(),
            (_, "opendialog_zh") => self.dev_opendialog_zh_cuts(),
            (phase, path) => {
                let path = Path::new(path);
                ensure!(
                    path.is_file(),
                    "Unknown corpus or missing manifest: {}",
                    path.display()
                );
                match phase {
                    Phase::Train => self.train_custom_cuts(path),
                    Phase::Dev | Phase::Test => self.dev_custom_cuts(path),
                }
            }
        };
        Ok(cuts)
    }

    /// Builds the loader for `phase` over `cuts`.
    pub fn dataloader(
        &self,
        phase: Phase,
        cuts: CutSet,
        sampler_state: Option<&SamplerState>,
    ) -> Result<DataLoader> {
        let loader = match phase {
            Phase::Train => self.train_dataloaders(cuts, sampler_state),
            Phase::Dev => self.dev_dataloaders(cuts),
            Phase::Test => self.test_dataloaders(cuts),
        };
        loader.with_context(|| format!("Failed to build the {} dataloader", phase))
    }
}

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Phase {
    Train,
    Dev,
    Test,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Phase::Train => "train",
            Phase::Dev => "dev",
            Phase::Test => "test",
        })
    }
}
