use crate::pair::FilenamePair;
use anyhow::{ensure, Result};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

/// A `FileIterator` defines the policy for drawing the next image/label
/// filename pair from a finite container.
///
/// # Methods
/// - `next()`: returns a handle to the next pair under the iterator's policy.
///    The handle borrows the iterator's immutable container, so it stays
///    valid for the iterator's whole lifetime.
/// - `reset()`: returns the iteration to its initial state. Randomized
///    policies re-seed from the originally supplied seed, so a reset from the
///    same seed replays the same sequence.
/// - `len()`: number of pairs in the container.
///
/// Implementations must be `Send + Sync`: the provider invokes `next()` from
/// its prefetch path while the consumer may call `reset()` concurrently.
/// Each variant serializes its mutable state (cursor / RNG / key vector)
/// behind its own mutex; the container itself is read-only after
/// construction.
///
/// An empty container is rejected at construction, which is why `next()` is
/// infallible.
pub trait FileIterator: Send + Sync {
    fn next(&self) -> &FilenamePair;

    fn reset(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ============================================================================
/// Visits pairs in declared order and wraps back to the first pair after the
/// last one. Epoch boundaries are derived by the provider via
/// `len() / batch_size`, never from the iterator itself.
///
/// # Example
/// ```ignore
/// let it = SequentialIterator::new(files)?;
/// let first = it.next(); // files[0]
/// ```
#[derive(Debug)]
pub struct SequentialIterator {
    files: Vec<FilenamePair>,
    cursor: Mutex<usize>,
}

impl SequentialIterator {
    pub fn new(files: Vec<FilenamePair>) -> Result<Self> {
        ensure!(!files.is_empty(), "File list must not be empty");
        Ok(Self {
            files,
            cursor: Mutex::new(0),
        })
    }
}

impl FileIterator for SequentialIterator {
    fn next(&self) -> &FilenamePair {
        let mut cursor = self.cursor.lock().expect("iterator cursor mutex poisoned");
        let index = *cursor;
        *cursor = (index + 1) % self.files.len();
        &self.files[index]
    }

    fn reset(&self) {
        *self.cursor.lock().expect("iterator cursor mutex poisoned") = 0;
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

/// ============================================================================
/// Epoch-shuffled random iteration.
///
/// Maintains a shuffled key vector (a permutation of `[0, N)`) and hands out
/// pairs in key order. Exhausting the keys re-shuffles with the ongoing RNG
/// and restarts, so consecutive epochs see different permutations while the
/// whole sequence stays a deterministic function of the seed.
///
/// # Arguments
/// - `files`: the pairs to iterate over.
/// - `seed`: base RNG seed. `reset()` re-seeds from this value, replaying
///   the exact emission sequence.
#[derive(Debug)]
pub struct RandomIterator {
    files: Vec<FilenamePair>,
    seed: u64,
    state: Mutex<ShuffleState>,
}

#[derive(Debug)]
struct ShuffleState {
    rng: StdRng,
    keys: Vec<usize>,
    cursor: usize,
}

impl ShuffleState {
    fn seeded(seed: u64, len: usize) -> Self {
        let mut state = Self {
            rng: StdRng::seed_from_u64(seed),
            keys: (0..len).collect(),
            cursor: 0,
        };
        state.shuffle();
        state
    }

    fn shuffle(&mut self) {
        self.keys.shuffle(&mut self.rng);
        self.cursor = 0;
    }
}

impl RandomIterator {
    pub fn new(files: Vec<FilenamePair>, seed: u64) -> Result<Self> {
        ensure!(!files.is_empty(), "File list must not be empty");
        let state = Mutex::new(ShuffleState::seeded(seed, files.len()));
        Ok(Self { files, seed, state })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(files: Vec<FilenamePair>) -> Result<Self> {
        Self::new(files, rand::rng().random())
    }
}

impl FileIterator for RandomIterator {
    fn next(&self) -> &FilenamePair {
        let mut state = self.state.lock().expect("iterator state mutex poisoned");
        if state.cursor == state.keys.len() {
            state.shuffle();
        }
        let key = state.keys[state.cursor];
        state.cursor += 1;
        &self.files[key]
    }

    fn reset(&self) {
        let mut state = self.state.lock().expect("iterator state mutex poisoned");
        *state = ShuffleState::seeded(self.seed, self.files.len());
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

/// ============================================================================
/// Samples each pair independently according to the given weights.
///
/// Weights are folded to their absolute value and normalized at construction
/// into a cumulative distribution; every `next()` draws `u ~ U(0, 1)` and
/// binary-searches the half-open interval `[c_{k-1}, c_k)` containing it.
/// If rounding pushes `u` to or past the last boundary, the last pair is
/// returned.
///
/// # Arguments
/// - `files`: the pairs to sample from.
/// - `weights`: one finite weight per pair; the sum must be positive.
/// - `seed`: base RNG seed, re-applied on `reset()`.
#[derive(Debug)]
pub struct WeightedRandomIterator {
    files: Vec<FilenamePair>,
    cumulative: Vec<f64>,
    seed: u64,
    rng: Mutex<StdRng>,
}

impl WeightedRandomIterator {
    pub fn new(files: Vec<FilenamePair>, weights: Vec<f64>, seed: u64) -> Result<Self> {
        ensure!(!files.is_empty(), "File list must not be empty");
        ensure!(
            weights.len() == files.len(),
            "Number of weights ({}) differs from number of files ({})",
            weights.len(),
            files.len()
        );
        ensure!(
            weights.iter().all(|w| w.is_finite()),
            "All weights must be finite"
        );

        let folded: Vec<f64> = weights.iter().map(|w| w.abs()).collect();
        let total: f64 = folded.iter().sum();
        ensure!(
            total > 0.0,
            "All weights are zero - at least one weight must be non-zero"
        );

        let mut cumulative = Vec::with_capacity(folded.len());
        let mut running = 0.0;
        for weight in folded {
            running += weight / total;
            cumulative.push(running);
        }

        Ok(Self {
            files,
            cumulative,
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(files: Vec<FilenamePair>, weights: Vec<f64>) -> Result<Self> {
        Self::new(files, weights, rand::rng().random())
    }

    /// Inverse-CDF lookup: the index whose interval `[c_{k-1}, c_k)`
    /// contains `u`, clamped to the last index when `u` reaches the final
    /// boundary.
    fn lookup(&self, u: f64) -> usize {
        self.cumulative
            .partition_point(|&bound| bound <= u)
            .min(self.cumulative.len() - 1)
    }
}

impl FileIterator for WeightedRandomIterator {
    fn next(&self) -> &FilenamePair {
        let u = {
            let mut rng = self.rng.lock().expect("iterator rng mutex poisoned");
            rng.random::<f64>()
        };
        &self.files[self.lookup(u)]
    }

    fn reset(&self) {
        *self.rng.lock().expect("iterator rng mutex poisoned") = StdRng::seed_from_u64(self.seed);
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}
