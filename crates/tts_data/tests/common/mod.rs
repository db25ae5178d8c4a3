#![allow(dead_code)]

use anyhow::Result;
use flate2::{write::GzEncoder, Compression};
use hound::{SampleFormat, WavSpec, WavWriter};
use safetensors::tensor::{Dtype, TensorView};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tts_data::cut::{AudioSource, Features, Recording, Supervision};
use tts_data::{Cut, TtsDataArgs, SAMPLING_RATE};

pub const TEST_SEED: u64 = 42;

/// Feature frames per second of audio in the test corpora.
pub const FRAMES_PER_SECOND: usize = 10;

pub const NUM_FEATURES: usize = 4;

/// Durations (seconds) of a 10-cut, 50 s corpus.
pub const TEN_CUTS_50S: [f64; 10] = [2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 5.0, 6.0, 4.0];

/// Writes a corpus with one cut per entry of `durations` into `dir` and
/// returns the manifest path.
///
/// Every cut gets a WAV file, a feature matrix in `<name>.safetensors`, a
/// supervision with text, tokens and speaker, and is listed in the gzip
/// JSONL manifest `<name>`.
pub fn write_corpus(dir: &Path, name: &str, durations: &[f64]) -> Result<PathBuf> {
    let cuts = make_cuts(dir, name, durations)?;
    let manifest = dir.join(name);
    write_manifest(&manifest, &cuts)?;
    Ok(manifest)
}

pub fn make_cuts(dir: &Path, name: &str, durations: &[f64]) -> Result<Vec<Cut>> {
    let stem = name.split('.').next().unwrap_or(name);
    let feats_path = dir.join(format!("{}.safetensors", stem));
    let ids: Vec<String> = (0..durations.len())
        .map(|i| format!("{}-{:03}", stem, i))
        .collect();

    let frames: Vec<usize> = durations
        .iter()
        .map(|d| (d * FRAMES_PER_SECOND as f64).round() as usize)
        .collect();
    let data: Vec<Vec<u8>> = frames
        .iter()
        .enumerate()
        .map(|(i, &n)| bytemuck::cast_slice(vec![i as f32; n * NUM_FEATURES].as_slice()).to_vec())
        .collect();
    let mut views = Vec::new();
    for (i, &n) in frames.iter().enumerate() {
        views.push((
            ids[i].as_str(),
            TensorView::new(Dtype::F32, vec![n, NUM_FEATURES], &data[i])?,
        ));
    }
    safetensors::serialize_to_file(views, &None, &feats_path)?;

    let mut cuts = Vec::with_capacity(durations.len());
    for (i, &duration) in durations.iter().enumerate() {
        let wav = dir.join(format!("{}.wav", ids[i]));
        let num_samples = (duration * SAMPLING_RATE as f64).round() as usize;
        write_wav(&wav, num_samples)?;

        cuts.push(
            Cut::new(ids[i].clone(), 0.0, duration)
                .with_supervision(
                    Supervision::new(ids[i].clone(), format!("utterance {}", i), format!("spk{}", i % 3))
                        .with_tokens(["u", "t", "t"]),
                )
                .with_recording(Recording {
                    id: ids[i].clone(),
                    sources: vec![AudioSource {
                        source_type: "file".into(),
                        channels: vec![0],
                        source: wav.display().to_string(),
                    }],
                    sampling_rate: SAMPLING_RATE,
                    num_samples: num_samples as u64,
                    duration,
                })
                .with_features(Features {
                    num_frames: frames[i],
                    num_features: NUM_FEATURES,
                    frame_shift: 1.0 / FRAMES_PER_SECOND as f64,
                    sampling_rate: SAMPLING_RATE,
                    storage_type: "safetensors".into(),
                    storage_path: feats_path.display().to_string(),
                    storage_key: ids[i].clone(),
                }),
        );
    }
    Ok(cuts)
}

pub fn write_manifest(path: &Path, cuts: &[Cut]) -> Result<()> {
    let mut encoder = GzEncoder::new(File::create(path)?, Compression::fast());
    for cut in cuts {
        writeln!(encoder, "{}", serde_json::to_string(cut)?)?;
    }
    encoder.finish()?;
    Ok(())
}

fn write_wav(path: &Path, num_samples: usize) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLING_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for n in 0..num_samples {
        writer.write_sample(((n % 200) as i16 - 100) * 50)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Data options pointing at `dir`, without workers.
pub fn args(dir: &Path) -> TtsDataArgs {
    TtsDataArgs {
        manifest_dir: dir.to_path_buf(),
        max_duration: 20,
        num_workers: 0,
        ..TtsDataArgs::default()
    }
}
