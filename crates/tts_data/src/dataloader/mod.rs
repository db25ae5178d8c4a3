//! src/dataloader/mod.rs
//!
//! This module implements the `DataLoader`.
//!
//! The `DataLoader` coordinates a `CutSampler` and a `SpeechSynthesisDataset`
//! to turn a cut collection into padded batches, with optional parallel
//! batch assembly.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌─────────┐
//!                    │ CutSet  │ (lazy manifest)
//!                    └────┬────┘
//!                         │ streams cuts
//!                         ↓
//!                  ┌──────────────┐
//!                  │  CutSampler  │ (bucketing or simple, duration budget)
//!                  └──────┬───────┘
//!                         │ Vec<Cut> per batch
//!                         ↓
//!                  ┌──────────────┐
//!                  │  DataLoader  │ ←───── Config (workers, prefetch, timeouts)
//!                  └──────┬───────┘
//!                         │ round-robin, SeedWorkers hook at startup
//!                         ↓
//!                   [Worker Threads] (optional parallelism)
//!                         │
//!                         │ features / audio loading, padding
//!                         ↓
//!                    ┌─────────┐
//!                    │  Batch  │ (in sampler order)
//!                    └─────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs             # Public API exports + module-level architecture docs
//! ├── config.rs          # DataLoaderConfig and builder
//! ├── loader.rs          # DataLoader struct, epochs and sampler state
//! ├── iterator.rs        # DataLoaderIter (single-threaded and worker-backed)
//! ├── workers/
//! │   ├── mod.rs         # Task and output types
//! │   └── pool.rs        # Generic `WorkerPool<Task, Output>` implementation
//! └── common/
//!     ├── mod.rs
//!     └── thread.rs      # Thread-local worker ID, seed and RNG; SeedWorkers hook
//! ```
//!
//! # Performance Guidelines
//! - `num_workers = 0`: Single-threaded, lowest memory usage but no parallelism
//! - `num_workers > 0`: Workers are started per epoch and joined when the
//!   epoch's iterator is dropped
//! - Memory: O(num_workers x prefetch_factor) batches in flight

mod common;
mod config;
mod iterator;
mod loader;
mod workers;

pub use config::{DataLoaderConfig, DataLoaderConfigBuilder};
pub use iterator::DataLoaderIter;
pub use loader::DataLoader;

pub use common::thread::{
    init_worker_rng, with_worker_rng, worker_id, worker_seed, SeedWorkers, WORKER_ID,
    WORKER_RNG, WORKER_SEED,
};
