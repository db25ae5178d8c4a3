//! Command-line options controlling the TTS data pipelines.
//!
//! [`TtsDataArgs`] can be flattened into any `clap` parser:
//!
//! ```ignore
//! #[derive(Parser)]
//! struct Cli {
//!     #[command(flatten)]
//!     data: TtsDataArgs,
//! }
//! ```
//!
//! or registered on a hand-built [`Command`] with [`TtsDataArgs::add_arguments`].

use clap::{ArgAction, Args, Command, FromArgMatches};
use std::path::PathBuf;

/// Options for the train, dev and test data pipelines.
#[derive(Debug, Clone, PartialEq, Args)]
#[command(next_help_heading = "TTS data related options")]
pub struct TtsDataArgs {
    /// Path to directory with train/valid/test cuts.
    #[arg(long, default_value = "data/fbank")]
    pub manifest_dir: PathBuf,

    /// Maximum pooled recordings duration (seconds) in a single batch.
    /// You can reduce it if it causes OOM.
    #[arg(long, default_value_t = 200)]
    pub max_duration: i64,

    /// When enabled, the batches will come from buckets of similar duration
    /// (saves padding frames).
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = str2bool)]
    pub bucketing_sampler: bool,

    /// The number of buckets for the DynamicBucketingSampler (you might want
    /// to increase it for larger datasets).
    #[arg(long, default_value_t = 30)]
    pub num_buckets: usize,

    /// When enabled, extract features on the fly from the audio instead of
    /// reading precomputed feature manifests.
    #[arg(long, default_value_t = false, action = ArgAction::Set, value_parser = str2bool)]
    pub on_the_fly_feats: bool,

    /// When enabled (=default), the examples will be shuffled for each epoch.
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = str2bool)]
    pub shuffle: bool,

    /// Whether to drop last batch. Used by sampler.
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = str2bool)]
    pub drop_last: bool,

    /// When enabled, each batch will carry the cuts that were used to
    /// construct it.
    #[arg(long, default_value_t = false, action = ArgAction::Set, value_parser = str2bool)]
    pub return_cuts: bool,

    /// The number of training dataloader workers that collect the batches.
    #[arg(long, default_value_t = 8)]
    pub num_workers: usize,

    /// AudioSamples or PrecomputedFeatures
    #[arg(long, default_value = "PrecomputedFeatures")]
    pub input_strategy: String,
}

impl TtsDataArgs {
    /// Registers the data options on an existing command.
    pub fn add_arguments(cmd: Command) -> Command {
        <Self as Args>::augment_args(cmd)
    }

    /// Reads the data options back out of parsed matches.
    pub fn from_matches(matches: &clap::ArgMatches) -> Result<Self, clap::Error> {
        <Self as FromArgMatches>::from_arg_matches(matches)
    }
}

impl Default for TtsDataArgs {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("data/fbank"),
            max_duration: 200,
            bucketing_sampler: true,
            num_buckets: 30,
            on_the_fly_feats: false,
            shuffle: true,
            drop_last: true,
            return_cuts: false,
            num_workers: 8,
            input_strategy: "PrecomputedFeatures".to_string(),
        }
    }
}

/// Parses a loose boolean such as `yes`, `t` or `0`.
pub fn str2bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        other => Err(format!("Boolean value expected, got '{}'", other)),
    }
}
