//! The provider itself: one prefetch thread, one batch slot, cooperative
//! shutdown.

use crate::augmentors::Augmentor;
use crate::batch::{allocate_targets, pack_image, pack_target, Batch, TargetEncoding};
use crate::iterators::FileIterator;
use crate::loaders::PairLoader;
use crate::pair::ImageLabelPair;
use anyhow::{anyhow, ensure, Result};
use ndarray::Array4;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tracing::{debug, warn};

use super::config::ProviderConfig;
use super::workers::{prepare_pair, PairTask, PairWorkerPool};

/// The single-entry buffer between the prefetch worker and the consumer.
///
/// States: `Empty` (batch is None) and `Filled`. The worker fills only when
/// empty, the consumer drains only when filled, and each transition wakes
/// exactly one waiter. The terminate flag ends the worker from either state.
struct SlotState {
    batch: Option<Result<Batch>>,
    terminate: bool,
}

struct Shared {
    iterator: Arc<dyn FileIterator>,
    loader: Arc<PairLoader>,
    augmentor: Arc<dyn Augmentor>,
    batch_size: usize,
    num_classes: usize,
    encoding: TargetEncoding,
    num_workers: usize,
    /// Post-augmentation reference dimensions, probed at construction.
    image_size: (u32, u32),
    target_size: (u32, u32),
    slot: Mutex<SlotState>,
    signal: Condvar,
}

/// Streams batches of augmented image/label pairs to a training loop,
/// overlapping disk I/O, decoding, and augmentation with the consumer's
/// compute.
///
/// A dedicated prefetch thread assembles the next batch behind a one-slot
/// double buffer while the consumer works on the current one; backpressure
/// is automatic because the worker cannot produce until the consumer has
/// taken. Within one batch, pairs are prepared in parallel by a small
/// worker pool.
///
/// Construction probes one pair through the full augmentor chain to learn
/// the output dimensions, then rewinds the iterator so the first batch
/// starts from the head of the sequence.
pub struct DataProvider {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DataProvider {
    pub fn new(
        augmentor: Arc<dyn Augmentor>,
        loader: PairLoader,
        iterator: Arc<dyn FileIterator>,
        config: ProviderConfig,
    ) -> Result<Self> {
        ensure!(
            config.batch_size >= 1,
            "Batch size must be >= 1, got {}",
            config.batch_size
        );
        ensure!(
            config.num_classes >= 1,
            "Number of classes must be >= 1, got {}",
            config.num_classes
        );

        let loader = Arc::new(loader);

        // One probe load tells us the post-augmentation dimensions; the reset
        // keeps the first real batch aligned with the iterator's sequence.
        let probe = prepare_pair(&loader, augmentor.as_ref(), iterator.next())?;
        iterator.reset();
        let image_size = probe.image.dimensions();
        let target_size = probe.target.dimensions();

        let num_workers = config
            .num_workers
            .unwrap_or_else(|| {
                thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .min(config.batch_size)
            .max(1);

        let shared = Arc::new(Shared {
            iterator,
            loader,
            augmentor,
            batch_size: config.batch_size,
            num_classes: config.num_classes,
            encoding: config.target_encoding,
            num_workers,
            image_size,
            target_size,
            slot: Mutex::new(SlotState {
                batch: None,
                terminate: false,
            }),
            signal: Condvar::new(),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("segstream-prefetch".to_string())
                .spawn(move || prefetch_loop(&shared))?
        };
        debug!(
            batch_size = config.batch_size,
            workers = num_workers,
            image_size = ?image_size,
            target_size = ?target_size,
            "data provider started"
        );

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Blocks until the prefetched batch is available and takes it.
    ///
    /// Never returns a partially constructed batch: errors captured inside
    /// the prefetch worker are replayed here in full.
    pub fn next(&self) -> Result<Batch> {
        let mut slot = self.shared.slot.lock().expect("provider slot mutex poisoned");
        loop {
            if let Some(result) = slot.batch.take() {
                drop(slot);
                self.shared.signal.notify_one();
                return result;
            }
            slot = self
                .shared
                .signal
                .wait(slot)
                .expect("provider slot mutex poisoned");
        }
    }

    /// Rewinds the underlying iterator.
    ///
    /// The already-prefetched batch is not drained: the consumer may observe
    /// one pre-reset batch after this call. That race is benign and mirrors
    /// the asynchronous nature of the prefetcher.
    pub fn reset(&self) {
        self.shared.iterator.reset();
    }

    /// Number of full batches per pass over the underlying container.
    pub fn num_batches(&self) -> usize {
        self.shared.iterator.len() / self.shared.batch_size
    }
}

impl Drop for DataProvider {
    fn drop(&mut self) {
        {
            let mut slot = self.shared.slot.lock().expect("provider slot mutex poisoned");
            slot.terminate = true;
            // Free the slot so a worker blocked on a filled slot can exit.
            slot.batch = None;
        }
        self.shared.signal.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Blocks until the slot is empty. Returns false when asked to terminate.
fn wait_for_empty_slot(shared: &Shared) -> bool {
    let mut slot = shared.slot.lock().expect("provider slot mutex poisoned");
    while !slot.terminate && slot.batch.is_some() {
        slot = shared
            .signal
            .wait(slot)
            .expect("provider slot mutex poisoned");
    }
    !slot.terminate
}

/// Publishes an assembled batch (or its error). Returns false when asked to
/// terminate instead.
fn publish(shared: &Shared, batch: Result<Batch>) -> bool {
    let mut slot = shared.slot.lock().expect("provider slot mutex poisoned");
    if slot.terminate {
        return false;
    }
    slot.batch = Some(batch);
    drop(slot);
    shared.signal.notify_one();
    true
}

fn prefetch_loop(shared: &Shared) {
    let pool = match PairWorkerPool::new(
        shared.num_workers,
        shared.batch_size,
        Arc::clone(&shared.loader),
        Arc::clone(&shared.augmentor),
    ) {
        Ok(pool) => pool,
        Err(error) => {
            warn!("pair worker pool unavailable: {error:#}");
            let message = format!("{error:#}");
            while wait_for_empty_slot(shared) {
                if !publish(shared, Err(anyhow!("Pair worker pool unavailable: {message}"))) {
                    break;
                }
            }
            return;
        }
    };

    debug!(workers = shared.num_workers, "prefetch worker started");
    loop {
        if !wait_for_empty_slot(shared) {
            debug!("prefetch worker exiting");
            return;
        }
        let batch = assemble_batch(shared, &pool);
        if let Err(error) = &batch {
            warn!("batch assembly failed: {error:#}");
        }
        if !publish(shared, batch) {
            debug!("prefetch worker exiting");
            return;
        }
    }
}

fn assemble_batch(shared: &Shared, pool: &PairWorkerPool) -> Result<Batch> {
    let batch_size = shared.batch_size;

    // Filenames are pulled sequentially on this thread, so slot i always
    // receives the i-th emission of the iterator; only the pixel work fans
    // out to the pool.
    for slot in 0..batch_size {
        pool.submit(PairTask {
            slot,
            files: shared.iterator.next().clone(),
        })?;
    }

    let mut prepared: Vec<Option<Result<ImageLabelPair>>> =
        std::iter::repeat_with(|| None).take(batch_size).collect();
    for _ in 0..batch_size {
        let (slot, result) = pool.collect()?;
        prepared[slot] = Some(result);
    }

    let (image_width, image_height) = shared.image_size;
    let (target_width, target_height) = shared.target_size;
    let mut images = Array4::zeros((
        batch_size,
        3,
        image_height as usize,
        image_width as usize,
    ));
    let mut targets = allocate_targets(
        shared.encoding,
        batch_size,
        shared.num_classes,
        target_width,
        target_height,
    );

    for (slot, entry) in prepared.into_iter().enumerate() {
        let result = entry.ok_or_else(|| anyhow!("Batch slot {} was never filled", slot))?;
        let pair = result?;
        expect_dimensions(pair.image.dimensions(), shared.image_size, "image")?;
        expect_dimensions(pair.target.dimensions(), shared.target_size, "target")?;
        pack_image(&mut images, slot, &pair.image);
        pack_target(&mut targets, slot, &pair.target, shared.num_classes)?;
    }

    Ok(Batch { images, targets })
}

fn expect_dimensions(actual: (u32, u32), expected: (u32, u32), plane: &str) -> Result<()> {
    ensure!(
        actual == expected,
        "Expected {} to be of size {}x{}, got {}x{}",
        plane,
        expected.0,
        expected.1,
        actual.0,
        actual.1
    );
    Ok(())
}
