//! Log-mel filterbank matching the Vocos vocoder's front end.
//!
//! Magnitude STFT (periodic Hann window, centered frames with reflect
//! padding), an HTK-scale triangular mel filterbank without area
//! normalization, then `ln(max(mel, 1e-7))`.

use ndarray::Array2;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use super::SAMPLING_RATE;

const LOG_FLOOR: f32 = 1e-7;

/// Filterbank extractor producing `[num_frames, n_mels]` matrices.
#[derive(Clone)]
pub struct VocosFbank {
    sampling_rate: u32,
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    window: Vec<f32>,
    // Sparse filters: per mel band, (frequency bin, weight) pairs
    filters: Vec<Vec<(usize, f32)>>,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for VocosFbank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VocosFbank")
            .field("sampling_rate", &self.sampling_rate)
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .field("n_mels", &self.n_mels)
            .finish()
    }
}

impl Default for VocosFbank {
    fn default() -> Self {
        Self::new(SAMPLING_RATE, 1024, 256, 100)
    }
}

impl VocosFbank {
    pub fn new(sampling_rate: u32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
        let window = (0..n_fft)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / n_fft as f32).cos())
            .collect();
        let filters = mel_filters(sampling_rate, n_fft, n_mels);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        Self {
            sampling_rate,
            n_fft,
            hop_length,
            n_mels,
            window,
            filters,
            fft,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.n_mels
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Seconds between consecutive frames.
    pub fn frame_shift(&self) -> f64 {
        self.hop_length as f64 / self.sampling_rate as f64
    }

    /// Number of frames produced for `num_samples` input samples.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_length
    }

    pub fn extract(&self, samples: &[f32]) -> Array2<f32> {
        let pad = self.n_fft / 2;
        let padded = reflect_pad(samples, pad);
        let num_frames = self.num_frames(samples.len());
        let num_bins = self.n_fft / 2 + 1;

        let mut out = Array2::<f32>::zeros((num_frames, self.n_mels));
        let mut buffer = vec![Complex32::new(0.0, 0.0); self.n_fft];
        let mut magnitude = vec![0.0f32; num_bins];

        for frame in 0..num_frames {
            let offset = frame * self.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let x = padded.get(offset + i).copied().unwrap_or(0.0);
                *slot = Complex32::new(x * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);
            for (bin, m) in magnitude.iter_mut().enumerate() {
                *m = buffer[bin].norm();
            }

            for (band, filter) in self.filters.iter().enumerate() {
                let energy: f32 = filter.iter().map(|&(bin, w)| magnitude[bin] * w).sum();
                out[[frame, band]] = energy.max(LOG_FLOOR).ln();
            }
        }
        out
    }
}

/// Pads both ends by mirroring around the edge samples (edge not repeated).
/// Falls back to zeros where the signal is too short to mirror.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    let n = samples.len() as isize;
    let mut out = Vec::with_capacity(samples.len() + 2 * pad);
    for i in -(pad as isize)..(n + pad as isize) {
        let j = if i < 0 {
            -i
        } else if i >= n {
            2 * (n - 1) - i
        } else {
            i
        };
        out.push(if (0..n).contains(&j) { samples[j as usize] } else { 0.0 });
    }
    out
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn mel_filters(sampling_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<(usize, f32)>> {
    let num_bins = n_fft / 2 + 1;
    let f_max = sampling_rate as f32 / 2.0;
    let bin_hz = |bin: usize| f_max * bin as f32 / (num_bins - 1).max(1) as f32;

    let mel_max = hz_to_mel(f_max);
    let f_pts: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (f_pts[m], f_pts[m + 1], f_pts[m + 2]);
            (0..num_bins)
                .filter_map(|bin| {
                    let f = bin_hz(bin);
                    let down = (f - left) / (center - left);
                    let up = (right - f) / (right - center);
                    let w = down.min(up);
                    (w > 0.0).then_some((bin, w))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_follows_centered_stft() {
        let fbank = VocosFbank::default();
        let audio = vec![0.0f32; SAMPLING_RATE as usize];
        let feats = fbank.extract(&audio);
        assert_eq!(feats.dim(), (1 + 24000 / 256, 100));
        assert!((fbank.frame_shift() - 256.0 / 24000.0).abs() < 1e-12);
    }

    #[test]
    fn silence_hits_log_floor() {
        let fbank = VocosFbank::default();
        let feats = fbank.extract(&[0.0; 2048]);
        let floor = LOG_FLOOR.ln();
        assert!(feats.iter().all(|&v| (v - floor).abs() < 1e-4));
    }

    #[test]
    fn tone_energy_lands_in_matching_band() {
        let sr = SAMPLING_RATE as f32;
        let fbank = VocosFbank::default();
        let tone: Vec<f32> = (0..8192)
            .map(|n| (2.0 * PI * 1000.0 * n as f32 / sr).sin())
            .collect();
        let feats = fbank.extract(&tone);

        let frame = feats.row(10);
        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(band, _)| band)
            .unwrap();
        let filters = mel_filters(SAMPLING_RATE, 1024, 100);
        let tone_bin = (1000.0 * 1024.0 / sr).round() as usize;
        assert!(filters[loudest].iter().any(|&(bin, _)| bin == tone_bin));
    }

    #[test]
    fn filters_cover_spectrum_without_gaps() {
        let filters = mel_filters(SAMPLING_RATE, 1024, 100);
        assert_eq!(filters.len(), 100);
        assert!(filters.iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn reflect_pad_mirrors_edges() {
        assert_eq!(
            reflect_pad(&[1.0, 2.0, 3.0], 2),
            vec![3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0]
        );
        assert_eq!(reflect_pad(&[5.0], 1), vec![0.0, 5.0, 0.0]);
    }
}
