//! src/provider/mod.rs
//!
//! The `DataProvider` coordinates the filename iterator, the pair loader,
//! and the augmentor chain to keep one fully packed batch ready for the
//! training loop at all times.
//!
//! # Architecture Overview
//!
//! ```text
//!              ┌──────────────┐
//!              │ FileIterator │ (sequential / random / weighted)
//!              └──────┬───────┘
//!                     │ filename pairs (pulled sequentially)
//!                     ↓
//!              ┌──────────────┐
//!              │  PairLoader  │ (decode image + label planes)
//!              └──────┬───────┘
//!                     │ one task per batch slot
//!                     ↓
//!            [ pair worker pool ]  min(batch_size, cores) threads
//!                     │ load → augment → NaN scrub, per pair
//!                     ↓
//!              ┌──────────────┐
//!              │   packing    │ (B,3,H,W) images + dense/one-hot targets
//!              └──────┬───────┘
//!                     │ one Result<Batch>
//!                     ↓
//!              [ prefetch slot ]  Mutex + Condvar, capacity 1
//!                     │
//!                     ↓
//!                  next()  (consumer)
//! ```
//!
//! The prefetch worker and the consumer hand the single slot back and forth:
//! the worker refills it as soon as the consumer takes a batch, and blocks
//! while a batch is waiting. Errors captured during assembly travel through
//! the same slot and are replayed on the consumer's `next()` call.
//!
//! # Module Structure
//!
//! ```text
//! src/provider/
//! ├── mod.rs       # architecture docs + re-exports
//! ├── config.rs    # ProviderConfig and builder
//! ├── workers.rs   # intra-batch pair worker pool
//! └── core.rs      # DataProvider, prefetch slot, batch assembly
//! ```

mod config;
mod core;
mod workers;

pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use core::DataProvider;
