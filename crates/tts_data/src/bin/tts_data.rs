//! `tts-data`: builds one phase's loader and walks it, logging a line per
//! batch. Useful for checking manifests and batching options before a
//! training run.
//!
//! ```text
//! tts-data --manifest-dir data/fbank --phase train --manifest libritts \
//!     --max-duration 100 --num-workers 4 --epochs 2
//! RUST_LOG=debug tts-data --phase test --manifest my_cuts.jsonl.gz
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tts_data::{logging, Phase, SamplerState, TtsDataArgs, TtsDataModule};

#[derive(Parser, Debug)]
#[command(name = "tts-data")]
#[command(about = "Iterate a TTS data pipeline and report its batches", long_about = None)]
struct Cli {
    #[command(flatten)]
    data: TtsDataArgs,

    /// Pipeline phase to build.
    #[arg(long, value_enum, default_value_t = Phase::Train)]
    phase: Phase,

    /// Corpus name (emilia_en, emilia_zh, libritts, opendialog_en,
    /// opendialog_zh) or path to a cut manifest.
    #[arg(long)]
    manifest: String,

    /// Number of epochs to iterate.
    #[arg(long, default_value_t = 1)]
    epochs: usize,

    /// Seed of the generator that draws worker base seeds.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop each epoch after this many batches.
    #[arg(long)]
    max_batches: Option<usize>,

    /// Sampler state (JSON) to resume the training loader from.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write the sampler state (JSON) here when iteration stops.
    #[arg(long)]
    save_state: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init()?;
    let cli = Cli::parse();
    info!(args = ?cli.data, "Starting tts-data");

    let dm = match cli.seed {
        Some(seed) => TtsDataModule::with_seed(cli.data.clone(), seed),
        None => TtsDataModule::new(cli.data.clone()),
    };

    let resume = cli
        .resume
        .as_ref()
        .map(|path| -> Result<SamplerState> {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read sampler state {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse sampler state {}", path.display()))
        })
        .transpose()?;
    if resume.is_some() && cli.phase != Phase::Train {
        warn!("--resume only applies to the train phase; ignoring it");
    }

    let cuts = dm.cuts_by_name(cli.phase, &cli.manifest)?;
    let loader = dm.dataloader(cli.phase, cuts, resume.as_ref())?;

    let first_epoch = loader.epoch();
    for epoch in first_epoch..first_epoch + cli.epochs {
        loader.set_epoch(epoch);
        let start = Instant::now();
        let mut num_batches = 0usize;
        let mut num_cuts = 0usize;
        let mut total_duration = 0.0f64;
        let mut num_errors = 0usize;

        let limit = cli.max_batches.unwrap_or(usize::MAX);
        for (index, batch) in loader.iter()?.take(limit).enumerate() {
            match batch {
                Ok(batch) => {
                    num_batches += 1;
                    num_cuts += batch.batch_size();
                    total_duration += batch.total_duration();
                    info!(
                        epoch,
                        batch = index,
                        cuts = batch.batch_size(),
                        duration = batch.total_duration(),
                        features = ?batch.features.dim(),
                        audio = ?batch.audio.as_ref().map(|a| a.dim()),
                        "Batch"
                    );
                }
                Err(e) => {
                    num_errors += 1;
                    error!(epoch, batch = index, "{:#}", e);
                }
            }
        }

        info!(
            epoch,
            batches = num_batches,
            cuts = num_cuts,
            duration = total_duration,
            errors = num_errors,
            elapsed = ?start.elapsed(),
            "Epoch done"
        );
    }

    if let Some(path) = &cli.save_state {
        let state = serde_json::to_string_pretty(&loader.state_dict())?;
        fs::write(path, state)
            .with_context(|| format!("Failed to write sampler state {}", path.display()))?;
        info!("Saved sampler state to {}", path.display());
    }

    Ok(())
}
