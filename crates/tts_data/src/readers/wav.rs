use crate::cut::Cut;
use anyhow::{ensure, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;

/// Reads the samples of one channel between `offset` and `offset + duration`
/// seconds from a WAV file, as `f32` in `[-1, 1]`.
///
/// Only the requested frames are decoded: the reader seeks to the first frame
/// and stops after the last one. A segment running past the end of the file
/// is truncated to what the file holds.
pub fn read_wav_segment(
    path: impl AsRef<Path>,
    channel: usize,
    offset: f64,
    duration: f64,
) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)
        .with_context(|| format!("Failed to open audio file {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    ensure!(
        channel < channels,
        "Channel {} requested from {} which has {} channel(s)",
        channel,
        path.display(),
        channels
    );

    let sample_rate = spec.sample_rate;
    let total_frames = reader.duration() as usize;
    let first = ((offset * sample_rate as f64).round() as usize).min(total_frames);
    let wanted = (duration * sample_rate as f64).round() as usize;
    let last = (first + wanted).min(total_frames);

    reader
        .seek(first as u32)
        .with_context(|| format!("Failed to seek to frame {} in {}", first, path.display()))?;

    let num_samples = (last - first) * channels;
    let mut out = Vec::with_capacity(last - first);
    match spec.sample_format {
        SampleFormat::Float => {
            for (idx, sample) in reader.samples::<f32>().take(num_samples).enumerate() {
                let value = sample?;
                if idx % channels == channel {
                    out.push(value);
                }
            }
        }
        SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            for (idx, sample) in reader.samples::<i32>().take(num_samples).enumerate() {
                let value = sample? as f32 / max;
                if idx % channels == channel {
                    out.push(value);
                }
            }
        }
    }

    Ok((out, sample_rate))
}

/// Loads the audio covered by `cut` from its recording's first source.
pub fn load_cut_audio(cut: &Cut) -> Result<Vec<f32>> {
    let recording = cut.recording()?;
    let source = recording
        .sources
        .first()
        .with_context(|| format!("Recording '{}' has no audio sources", recording.id))?;
    let path = source.path()?;

    // The source stores the channels it lists interleaved, in that order
    let channel = if source.channels.is_empty() {
        0
    } else {
        source
            .channels
            .iter()
            .position(|&c| c == cut.channel)
            .with_context(|| {
                format!(
                    "Cut '{}' uses channel {} but its audio source only has channels {:?}",
                    cut.id, cut.channel, source.channels
                )
            })?
    };

    let (samples, sample_rate) = read_wav_segment(&path, channel, cut.start, cut.duration)
        .with_context(|| format!("Failed to load audio for cut '{}'", cut.id))?;
    ensure!(
        sample_rate == recording.sampling_rate,
        "Cut '{}': {} is sampled at {} Hz but the recording declares {} Hz",
        cut.id,
        path.display(),
        sample_rate,
        recording.sampling_rate
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut::{AudioSource, Recording};
    use hound::{WavSpec, WavWriter};
    use tempfile::tempdir;

    fn cut_for(path: &Path, channel: usize, channels: Vec<usize>, sampling_rate: u32) -> Cut {
        let mut cut = Cut::new("cut-1", 1.0, 0.5).with_recording(Recording {
            id: "rec-1".into(),
            sources: vec![AudioSource {
                source_type: "file".into(),
                channels,
                source: path.display().to_string(),
            }],
            sampling_rate,
            num_samples: 1000,
            duration: 10.0,
        });
        cut.channel = channel;
        cut
    }

    fn write_ramp(path: &Path, channels: u16, frames: usize, sample_rate: u32) -> Result<()> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for frame in 0..frames {
            for ch in 0..channels {
                writer.write_sample((frame as i16) * if ch == 0 { 1 } else { -1 })?;
            }
        }
        writer.finalize()?;
        Ok(())
    }

    #[test]
    fn reads_requested_segment_of_one_channel() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 2, 1000, 100)?;

        // 100 Hz: offset 2.0s = frame 200, 0.5s = 50 frames
        let (samples, sr) = read_wav_segment(&path, 1, 2.0, 0.5)?;
        assert_eq!(sr, 100);
        assert_eq!(samples.len(), 50);
        assert_eq!(samples[0], -200.0 / 32768.0);
        assert_eq!(samples[49], -249.0 / 32768.0);
        Ok(())
    }

    #[test]
    fn truncates_at_end_of_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("short.wav");
        write_ramp(&path, 1, 100, 100)?;

        let (samples, _) = read_wav_segment(&path, 0, 0.8, 1.0)?;
        assert_eq!(samples.len(), 20);
        assert!(read_wav_segment(&path, 1, 0.0, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn loads_cut_channel_by_id() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stereo.wav");
        write_ramp(&path, 2, 1000, 100)?;

        let samples = load_cut_audio(&cut_for(&path, 3, vec![2, 3], 100))?;
        assert_eq!(samples.len(), 50);
        assert_eq!(samples[0], -100.0 / 32768.0);
        Ok(())
    }

    #[test]
    fn rejects_channel_missing_from_source() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stereo.wav");
        write_ramp(&path, 2, 1000, 100)?;

        let err = load_cut_audio(&cut_for(&path, 5, vec![0, 1], 100)).unwrap_err();
        assert!(format!("{:#}", err).contains("cut-1"));
        Ok(())
    }

    #[test]
    fn rejects_file_rate_differing_from_recording() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mono.wav");
        write_ramp(&path, 1, 1000, 100)?;

        assert!(load_cut_audio(&cut_for(&path, 0, vec![0], 100)).is_ok());
        let err = load_cut_audio(&cut_for(&path, 0, vec![0], 24_000)).unwrap_err();
        assert!(format!("{:#}", err).contains("24000 Hz"));
        Ok(())
    }
}
