//! Acoustic feature inputs for the speech-synthesis dataset.

use crate::cut::Cut;
use crate::error::DataModuleError;
use crate::readers::{load_cut_audio, SafetensorsSource};
use anyhow::{ensure, Context, Result};
use ndarray::Array2;

mod fbank;

pub use fbank::VocosFbank;

/// Sampling rate assumed for every manifest and feature extractor.
pub const SAMPLING_RATE: u32 = 24_000;

/// Where a cut's feature matrix comes from.
#[derive(Debug, Clone)]
pub enum InputStrategy {
    /// Read from the archive referenced by the cut's `features` field.
    PrecomputedFeatures,
    /// Computed from the cut's audio at batch-assembly time.
    OnTheFlyFeatures(VocosFbank),
}

impl InputStrategy {
    /// Picks the strategy for the `--on-the-fly-feats` flag.
    pub fn from_flag(on_the_fly_feats: bool) -> Self {
        if on_the_fly_feats {
            InputStrategy::OnTheFlyFeatures(VocosFbank::default())
        } else {
            InputStrategy::PrecomputedFeatures
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputStrategy::PrecomputedFeatures => "PrecomputedFeatures",
            InputStrategy::OnTheFlyFeatures(_) => "OnTheFlyFeatures",
        }
    }

    /// Feature matrix `[num_frames, num_features]` for one cut.
    pub fn load_features(&self, cut: &Cut) -> Result<Array2<f32>> {
        match self {
            InputStrategy::PrecomputedFeatures => {
                let features = cut.features()?;
                if features.storage_type != "safetensors" {
                    return Err(
                        DataModuleError::UnsupportedStorage(features.storage_type.clone()).into(),
                    );
                }
                SafetensorsSource::new(&features.storage_path)
                    .load_matrix(&features.storage_key)
                    .with_context(|| format!("Failed to load features for cut '{}'", cut.id))
            }
            InputStrategy::OnTheFlyFeatures(fbank) => {
                let recording = cut.recording()?;
                ensure!(
                    recording.sampling_rate == fbank.sampling_rate(),
                    "Cut '{}' is sampled at {} Hz but the extractor expects {} Hz",
                    cut.id,
                    recording.sampling_rate,
                    fbank.sampling_rate()
                );
                let audio = load_cut_audio(cut)?;
                Ok(fbank.extract(&audio))
            }
        }
    }
}
