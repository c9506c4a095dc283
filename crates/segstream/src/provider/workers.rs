//! Intra-batch worker pool.
//!
//! One batch fans its pairs out to a small pool of named threads. Each task
//! carries the batch slot it belongs to, so results can arrive in any order
//! and still land in the right tensor row. Channels are bounded to the batch
//! size: the assembly thread can submit a whole batch without blocking, and
//! workers never run ahead of the batch being assembled.

use crate::augmentors::Augmentor;
use crate::loaders::PairLoader;
use crate::pair::{FilenamePair, ImageLabelPair};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// One pair to prepare, tagged with its batch slot.
pub(crate) struct PairTask {
    pub(crate) slot: usize,
    pub(crate) files: FilenamePair,
}

/// Loads, augments, and scrubs one pair. Shared by the pool workers and the
/// provider's dimension probe.
pub(crate) fn prepare_pair(
    loader: &PairLoader,
    augmentor: &dyn Augmentor,
    files: &FilenamePair,
) -> Result<ImageLabelPair> {
    let mut pair = loader.load(files)?;
    augmentor
        .augment(&mut pair)
        .with_context(|| format!("Augmentation failed for image '{}'", files.image))?;
    pair.scrub_nans();
    Ok(pair)
}

/// Pool of pair-loading threads living for the provider's lifetime.
pub(crate) struct PairWorkerPool {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<PairTask>>,
    result_rx: Receiver<(usize, Result<ImageLabelPair>)>,
}

impl PairWorkerPool {
    pub(crate) fn new(
        num_workers: usize,
        queue_depth: usize,
        loader: Arc<PairLoader>,
        augmentor: Arc<dyn Augmentor>,
    ) -> Result<Self> {
        let (task_tx, task_rx) = bounded::<PairTask>(queue_depth);
        let (result_tx, result_rx) = bounded(queue_depth);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let loader = Arc::clone(&loader);
            let augmentor = Arc::clone(&augmentor);

            let handle = thread::Builder::new()
                .name(format!("segstream-pair-{}", worker_id))
                .spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        let result = prepare_pair(&loader, augmentor.as_ref(), &task.files);
                        if result_tx.send((task.slot, result)).is_err() {
                            break;
                        }
                    }
                })
                .with_context(|| format!("Failed to spawn pair worker {}", worker_id))?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            result_rx,
        })
    }

    /// Queues one pair for preparation.
    pub(crate) fn submit(&self, task: PairTask) -> Result<()> {
        self.task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("Pair worker pool is shut down"))?
            .send(task)
            .map_err(|_| anyhow!("Pair workers are gone"))
    }

    /// Receives one prepared pair, in whatever order the workers finish.
    pub(crate) fn collect(&self) -> Result<(usize, Result<ImageLabelPair>)> {
        self.result_rx
            .recv()
            .map_err(|_| anyhow!("Pair workers are gone"))
    }
}

impl Drop for PairWorkerPool {
    fn drop(&mut self) {
        // Closing the task channel ends every worker's recv loop.
        self.task_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
