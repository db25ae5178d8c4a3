//! Worker management for parallel batch assembly.
//!
//! Workers receive `(batch_index, cuts)` tasks over per-worker channels and
//! send back `(batch_index, result)`; the index lets the consumer restore
//! sampler order.

pub(crate) mod pool;

use crate::batch::Batch;
use crate::sampler::CutBatch;
use anyhow::Result;

pub(crate) type BatchTask = (usize, CutBatch);
pub(crate) type BatchOutput = (usize, Result<Batch>);
