use crate::cut::Cut;
use ndarray::{Array2, Array3};

/// One training step's worth of data, produced by
/// [`SpeechSynthesisDataset::get_batch`](crate::dataset::SpeechSynthesisDataset::get_batch).
///
/// Row `i` of every field belongs to the same cut. Optional fields are
/// present only when the dataset was configured to return them.
///
/// # Shapes
/// - `features`: `[batch_size, max_frames, num_features]`, padded with
///   [`LOG_EPSILON`](crate::collator::LOG_EPSILON)
/// - `audio`: `[batch_size, max_samples]`, zero-padded
#[derive(Debug, Clone)]
pub struct Batch {
    pub cut_ids: Vec<String>,
    pub durations: Vec<f64>,
    pub features: Array3<f32>,
    pub features_lens: Vec<usize>,
    pub text: Option<Vec<String>>,
    pub tokens: Option<Vec<Vec<String>>>,
    pub speakers: Option<Vec<String>>,
    pub audio: Option<Array2<f32>>,
    pub audio_lens: Option<Vec<usize>>,
    pub cuts: Option<Vec<Cut>>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.cut_ids.len()
    }

    /// Sum of the cut durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.durations.iter().sum()
    }
}
