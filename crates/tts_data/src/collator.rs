use anyhow::{bail, Result};
use ndarray::{s, Array2, Array3};

/// Log of the smallest energy a padded feature frame is considered to have.
pub const LOG_EPSILON: f32 = -23.025_85;

/// Pads variable-length items along their time axis to the longest item so
/// they can be stacked into one batch array. Padding is appended on the
/// right; the original lengths are returned alongside so the model can mask.
///
/// # Example
/// ```ignore
/// let collator = PaddingCollator::default().with_pad_value(LOG_EPSILON);
/// let (features, lens) = collator.collate_matrices(&[feats_a, feats_b])?; // [2, T_max, F]
/// ```
#[derive(Debug, Clone, Default)]
pub struct PaddingCollator {
    pad_value: f32,
}

impl PaddingCollator {
    /// Value written into padded positions (0.0 by default).
    pub fn with_pad_value(mut self, pad_value: f32) -> Self {
        self.pad_value = pad_value;
        self
    }

    /// Stacks `[T_i, F]` matrices into `[B, T_max, F]`.
    pub fn collate_matrices(&self, items: &[Array2<f32>]) -> Result<(Array3<f32>, Vec<usize>)> {
        if items.is_empty() {
            bail!("Cannot collate empty sample list");
        }
        let dim = items[0].ncols();
        for (i, item) in items.iter().enumerate() {
            if item.ncols() != dim {
                bail!(
                    "Shape mismatch in sample {}: expected {} features per frame, got {}",
                    i,
                    dim,
                    item.ncols()
                );
            }
        }

        let target = items.iter().map(|m| m.nrows()).max().unwrap_or(0);
        let mut batch = Array3::from_elem((items.len(), target, dim), self.pad_value);
        let mut lens = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let len = item.nrows();
            batch.slice_mut(s![i, ..len, ..]).assign(item);
            lens.push(len);
        }
        Ok((batch, lens))
    }

    /// Stacks 1-D sequences into `[B, S_max]`.
    pub fn collate_sequences(&self, items: &[Vec<f32>]) -> Result<(Array2<f32>, Vec<usize>)> {
        if items.is_empty() {
            bail!("Cannot collate empty sample list");
        }
        let target = items.iter().map(Vec::len).max().unwrap_or(0);
        let mut batch = Array2::from_elem((items.len(), target), self.pad_value);
        let mut lens = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            for (dst, &src) in batch.row_mut(i).iter_mut().zip(item) {
                *dst = src;
            }
            lens.push(item.len());
        }
        Ok((batch, lens))
    }
}
