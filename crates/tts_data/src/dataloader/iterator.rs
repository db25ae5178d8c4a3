//! src/dataloader/iterator.rs
//!
//! Epoch iterator for the DataLoader.
//!
//! # Iterator Variants
//! - `Single`: batches are assembled on the calling thread.
//! - `Multi`: a fresh worker pool assembles batches; tasks are assigned
//!   round-robin and results are put back into sampler order through a
//!   small reorder buffer.
//!
//! Batch indices are absolute positions within the epoch, so a resumed
//! epoch keeps the same numbering in logs and error messages.
//!
//! A batch that fails to assemble is reported and the epoch goes on. A batch
//! that never comes back from the workers (timeout, or every worker gone) is
//! reported once and ends the epoch; the pool is dropped and joined then.

use crate::batch::Batch;
use crate::sampler::BatchIter;
use anyhow::{Context, Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::common::thread::worker_id;
use super::loader::DataLoader;
use super::workers::pool::{run_worker, WorkerPool};
use super::workers::{BatchOutput, BatchTask};

/// Iterator over the batches of one epoch.
///
/// Created by calling `dataloader.iter()`. Dropping it stops and joins the
/// epoch's workers.
pub struct DataLoaderIter<'a> {
    loader: &'a DataLoader,
    inner: IteratorImpl<'a>,
}

enum IteratorImpl<'a> {
    Single {
        batches: BatchIter<'a>,
        next_index: usize,
    },
    /// - `next_to_send`: index of the next batch handed to a worker
    /// - `next_to_yield`: index of the next batch returned to the caller
    /// - `reorder`: results that arrived ahead of `next_to_yield`
    /// - `sampler_error`: held back until in-flight batches are delivered
    Multi {
        pool: WorkerPool<BatchTask, BatchOutput>,
        batches: BatchIter<'a>,
        next_to_send: usize,
        next_to_yield: usize,
        max_in_flight: usize,
        reorder: BTreeMap<usize, Result<Batch>>,
        sampler_error: Option<Error>,
        exhausted: bool,
    },
    Failed(Option<Error>),
}

impl<'a> DataLoaderIter<'a> {
    pub(crate) fn new(loader: &'a DataLoader, skip: usize) -> Result<Self> {
        let epoch = loader.epoch();
        let batches: BatchIter<'a> = Box::new(loader.sampler.iter(epoch).skip(skip));
        let num_workers = loader.config.num_workers;
        debug!(epoch, skip, num_workers, "Starting epoch");

        if num_workers == 0 {
            return Ok(Self {
                loader,
                inner: IteratorImpl::Single {
                    batches,
                    next_index: skip,
                },
            });
        }

        let dataset = loader.dataset.clone();
        let poll = loader.config.worker_timeout;
        let pool = WorkerPool::new(
            num_workers,
            loader.config.prefetch_factor,
            loader.worker_init,
            move |task_rx: Receiver<BatchTask>,
                  output_tx: Sender<BatchOutput>,
                  shutdown: Arc<AtomicBool>| {
                run_worker(&task_rx, &output_tx, &shutdown, poll, |(index, cuts): BatchTask| {
                    let result = dataset.get_batch(&cuts).with_context(|| {
                        format!(
                            "Worker {} failed to assemble batch {}",
                            worker_id().unwrap_or_default(),
                            index
                        )
                    });
                    (index, result)
                });
            },
        )
        .context("Failed to start dataloader workers")?;

        Ok(Self::with_pool(loader, batches, skip, pool))
    }

    fn with_pool(
        loader: &'a DataLoader,
        batches: BatchIter<'a>,
        skip: usize,
        pool: WorkerPool<BatchTask, BatchOutput>,
    ) -> Self {
        let max_in_flight = pool.num_workers() * loader.config.prefetch_factor;
        Self {
            loader,
            inner: IteratorImpl::Multi {
                pool,
                batches,
                next_to_send: skip,
                next_to_yield: skip,
                max_in_flight,
                reorder: BTreeMap::new(),
                sampler_error: None,
                exhausted: false,
            },
        }
    }

    pub(crate) fn failed(loader: &'a DataLoader, error: Error) -> Self {
        Self {
            loader,
            inner: IteratorImpl::Failed(Some(error)),
        }
    }

    fn mark_consumed(&self) {
        self.loader.batches_consumed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Iterator for DataLoaderIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let loader = self.loader;
        let item = match &mut self.inner {
            IteratorImpl::Failed(error) => return error.take().map(Err),

            IteratorImpl::Single {
                batches,
                next_index,
            } => {
                let cuts = match batches.next()? {
                    Ok(cuts) => cuts,
                    Err(e) => return Some(Err(e)),
                };
                let index = *next_index;
                *next_index += 1;
                loader
                    .dataset
                    .get_batch(&cuts)
                    .with_context(|| format!("Failed to assemble batch {}", index))
            }

            IteratorImpl::Multi {
                pool,
                batches,
                next_to_send,
                next_to_yield,
                max_in_flight,
                reorder,
                sampler_error,
                exhausted,
            } => {
                // Keep the pipeline full
                while !*exhausted && *next_to_send - *next_to_yield < *max_in_flight {
                    match batches.next() {
                        Some(Ok(cuts)) => {
                            let worker = *next_to_send % pool.num_workers();
                            if let Err(e) = pool.send_to(worker, (*next_to_send, cuts)) {
                                let error = e.context(format!(
                                    "Failed to send batch {} to worker {}",
                                    *next_to_send, worker
                                ));
                                self.inner = IteratorImpl::Failed(None);
                                return Some(Err(error));
                            }
                            *next_to_send += 1;
                        }
                        Some(Err(e)) => {
                            *sampler_error = Some(e);
                            *exhausted = true;
                        }
                        None => *exhausted = true,
                    }
                }

                if *next_to_yield == *next_to_send {
                    return sampler_error.take().map(Err);
                }

                loop {
                    if let Some(result) = reorder.remove(&*next_to_yield) {
                        *next_to_yield += 1;
                        break result;
                    }
                    match pool.recv_timeout(loader.config.timeout) {
                        Ok((index, result)) => {
                            reorder.insert(index, result);
                        }
                        Err(e) => {
                            // A missing batch cannot be recovered: end the epoch
                            let error = e.context(format!(
                                "Failed to receive batch {} from workers \
                                (in flight: {}, possible deadlock or slow feature loading)",
                                *next_to_yield,
                                *next_to_send - *next_to_yield
                            ));
                            self.inner = IteratorImpl::Failed(None);
                            return Some(Err(error));
                        }
                    }
                }
            }
        };

        self.mark_consumed();
        Some(item)
    }
}
