//! Configuration for the data provider.
//!
//! Example:
//! ```ignore
//! let config = ProviderConfig::builder()
//!     .batch_size(4)
//!     .num_classes(19)
//!     .target_encoding(TargetEncoding::Dense)
//!     .build();
//! ```

use crate::batch::TargetEncoding;

/// Parameters controlling batch assembly.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Number of image/label pairs per batch. Must be >= 1.
    pub batch_size: usize,
    /// Number of training classes; bounds one-hot labels. Must be >= 1.
    pub num_classes: usize,
    /// Layout of the targets tensor handed to the consumer.
    pub target_encoding: TargetEncoding,
    /// Number of pair-loading threads inside one batch. Defaults to
    /// `min(batch_size, available hardware parallelism)` when unset.
    pub num_workers: Option<usize>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_classes: 1,
            target_encoding: TargetEncoding::OneHot,
            num_workers: None,
        }
    }
}

impl ProviderConfig {
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }
}

/// Builder for [`ProviderConfig`] with method chaining.
#[derive(Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Set the number of pairs per batch (must be > 0).
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the number of training classes (must be > 0).
    pub fn num_classes(mut self, num_classes: usize) -> Self {
        self.config.num_classes = num_classes;
        self
    }

    /// Choose between dense index targets and one-hot targets.
    pub fn target_encoding(mut self, encoding: TargetEncoding) -> Self {
        self.config.target_encoding = encoding;
        self
    }

    /// Override the intra-batch worker count.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.config.num_workers = Some(num_workers);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}
