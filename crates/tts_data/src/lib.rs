pub mod args;
pub mod batch;
pub mod collator;
pub mod cut;
pub mod cutset;
pub mod dataloader;
pub mod datamodule;
pub mod dataset;
pub mod error;
pub mod features;
pub mod logging;
pub mod readers;
pub mod sampler;

pub use args::TtsDataArgs;
pub use batch::Batch;
pub use collator::PaddingCollator;
pub use cut::Cut;
pub use cutset::{load_manifest_lazy, CutSet};
pub use dataloader::{DataLoader, DataLoaderConfig, SeedWorkers};
pub use datamodule::{Phase, TtsDataModule};
pub use dataset::SpeechSynthesisDataset;
pub use error::DataModuleError;
pub use features::{InputStrategy, VocosFbank, SAMPLING_RATE};
pub use sampler::{
    CutSampler, DynamicBucketingSampler, SamplerKind, SamplerState, SimpleCutSampler,
};
