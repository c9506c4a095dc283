//! Stochastic in-place augmentation of image/label pairs.
//!
//! Every augmentor implements the single capability [`Augmentor::augment`];
//! chains are plain sequences of shared augmentors applied in declared
//! order. Stochastic augmentors own a seeded RNG behind a mutex: parameter
//! sampling happens under the lock, pixel work runs unlocked, so one chain
//! instance can serve all of the provider's pair workers concurrently.

pub mod geometric;
pub mod labels;
pub(crate) mod ops;
pub mod photometric;

pub use geometric::{
    CropAugmentor, RotationAugmentor, SubsampleAugmentor, TranslationAugmentor, ZoomingAugmentor,
};
pub use labels::CityscapesLabelRemap;
pub use photometric::{
    BlurAugmentor, BrightnessAugmentor, GammaAugmentor, HueAugmentor, SaturationAugmentor,
};

use crate::pair::ImageLabelPair;
use anyhow::Result;
use std::sync::Arc;

/// An augmentation step. `augment` mutates the passed pair in place.
///
/// Implementations are stateless between calls apart from their RNG and must
/// be reentrant: the provider applies the same chain to several pairs in
/// parallel.
pub trait Augmentor: Send + Sync {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()>;
}

/// Combines several augmentors into one, applying them in declared order.
#[derive(Default)]
pub struct CombinedAugmentor {
    steps: Vec<Arc<dyn Augmentor>>,
}

impl CombinedAugmentor {
    pub fn new(steps: Vec<Arc<dyn Augmentor>>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: Arc<dyn Augmentor>) {
        self.steps.push(step);
    }
}

impl Augmentor for CombinedAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        for step in &self.steps {
            step.augment(pair)?;
        }
        Ok(())
    }
}
