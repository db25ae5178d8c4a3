use crate::batch::Batch;
use crate::collator::{PaddingCollator, LOG_EPSILON};
use crate::cut::Cut;
use crate::features::InputStrategy;
use crate::readers::load_cut_audio;
use anyhow::{bail, Context, Result};

/// Turns a sampler-chosen list of cuts into a padded [`Batch`].
///
/// Nothing is read at construction; manifest fields, feature archives and
/// audio files are accessed only when a batch is assembled, so a malformed
/// cut fails its batch and nothing else.
///
/// Defaults: text, tokens and speaker ids on; cuts and raw audio off.
///
/// # Example
/// ```ignore
/// let dataset = SpeechSynthesisDataset::new(InputStrategy::from_flag(false))
///     .return_cuts(true)
///     .return_audio(true);
/// let batch = dataset.get_batch(&cuts)?;
/// ```
#[derive(Debug, Clone)]
pub struct SpeechSynthesisDataset {
    return_text: bool,
    return_tokens: bool,
    return_spk_ids: bool,
    return_cuts: bool,
    return_audio: bool,
    feature_input_strategy: InputStrategy,
    feature_collator: PaddingCollator,
    audio_collator: PaddingCollator,
}

impl SpeechSynthesisDataset {
    pub fn new(feature_input_strategy: InputStrategy) -> Self {
        Self {
            return_text: true,
            return_tokens: true,
            return_spk_ids: true,
            return_cuts: false,
            return_audio: false,
            feature_input_strategy,
            feature_collator: PaddingCollator::default().with_pad_value(LOG_EPSILON),
            audio_collator: PaddingCollator::default(),
        }
    }

    pub fn return_text(mut self, enable: bool) -> Self {
        self.return_text = enable;
        self
    }

    pub fn return_tokens(mut self, enable: bool) -> Self {
        self.return_tokens = enable;
        self
    }

    pub fn return_spk_ids(mut self, enable: bool) -> Self {
        self.return_spk_ids = enable;
        self
    }

    pub fn return_cuts(mut self, enable: bool) -> Self {
        self.return_cuts = enable;
        self
    }

    pub fn return_audio(mut self, enable: bool) -> Self {
        self.return_audio = enable;
        self
    }

    pub fn input_strategy(&self) -> &InputStrategy {
        &self.feature_input_strategy
    }

    pub fn returns_audio(&self) -> bool {
        self.return_audio
    }

    pub fn returns_cuts(&self) -> bool {
        self.return_cuts
    }

    pub fn get_batch(&self, cuts: &[Cut]) -> Result<Batch> {
        if cuts.is_empty() {
            bail!("Cannot build a batch from zero cuts");
        }

        let matrices = cuts
            .iter()
            .map(|cut| self.feature_input_strategy.load_features(cut))
            .collect::<Result<Vec<_>>>()?;
        let (features, features_lens) = self
            .feature_collator
            .collate_matrices(&matrices)
            .with_context(|| format!("Collation failed for {} cuts", cuts.len()))?;

        let text = if self.return_text {
            Some(cuts.iter().map(Cut::text).collect::<Result<Vec<_>>>()?)
        } else {
            None
        };
        let tokens = if self.return_tokens {
            Some(
                cuts.iter()
                    .map(|c| c.tokens().map(<[String]>::to_vec))
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            None
        };
        let speakers = if self.return_spk_ids {
            Some(
                cuts.iter()
                    .map(|c| c.speaker().map(str::to_owned))
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            None
        };

        let (audio, audio_lens) = if self.return_audio {
            let waves = cuts
                .iter()
                .map(load_cut_audio)
                .collect::<Result<Vec<_>>>()?;
            let (audio, lens) = self.audio_collator.collate_sequences(&waves)?;
            (Some(audio), Some(lens))
        } else {
            (None, None)
        };

        Ok(Batch {
            cut_ids: cuts.iter().map(|c| c.id.clone()).collect(),
            durations: cuts.iter().map(|c| c.duration).collect(),
            features,
            features_lens,
            text,
            tokens,
            speakers,
            audio,
            audio_lens,
            cuts: self.return_cuts.then(|| cuts.to_vec()),
        })
    }
}
