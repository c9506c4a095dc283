use anyhow::{ensure, Result};
use image::{GrayImage, Rgb32FImage};

/// The source image plane: 3-channel, 32-bit float per channel, values in [0, 1].
pub type ImagePlane = Rgb32FImage;

/// The label plane: 1-channel, 8-bit unsigned, one class id per pixel.
pub type LabelPlane = GrayImage;

/// Sentinel marking a pixel as "do not supervise here" in 8-bit label space.
pub const VOID_LABEL: u8 = 255;

/// The same sentinel after remapping labels into signed training-id space.
pub const VOID_TRAINING_ID: i32 = -1;

/// A pair of on-disk paths: the source image and its dense label image.
///
/// Both paths must be non-empty. Pairs are immutable after construction and
/// owned by the iterator that hands out references to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePair {
    pub image: String,
    pub target: String,
}

impl FilenamePair {
    pub fn new(image: impl Into<String>, target: impl Into<String>) -> Result<Self> {
        let image = image.into();
        let target = target.into();
        ensure!(
            !image.is_empty() && !target.is_empty(),
            "Filename pair must not contain empty paths (image='{}', target='{}')",
            image,
            target
        );
        Ok(Self { image, target })
    }
}

/// A decoded image/label pair flowing through the augmentation chain.
///
/// Augmentors mutate the pair in place. The float/3-channel image type and
/// the 8-bit/1-channel target type are fixed by construction; geometric
/// augmentors additionally require both planes to share dimensions.
#[derive(Debug, Clone)]
pub struct ImageLabelPair {
    pub image: ImagePlane,
    pub target: LabelPlane,
}

impl ImageLabelPair {
    pub fn new(image: ImagePlane, target: LabelPlane) -> Self {
        Self { image, target }
    }

    /// Whether image and target cover the same pixel grid.
    pub fn planes_aligned(&self) -> bool {
        self.image.dimensions() == self.target.dimensions()
    }

    /// Replaces NaN values in the image plane by 0.
    ///
    /// Gamma and resampling arithmetic can produce NaNs on degenerate inputs;
    /// the packed batch must never carry them.
    pub fn scrub_nans(&mut self) {
        for pixel in self.image.pixels_mut() {
            for value in pixel.0.iter_mut() {
                if value.is_nan() {
                    *value = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn rejects_empty_paths() {
        assert!(FilenamePair::new("", "label.png").is_err());
        assert!(FilenamePair::new("image.png", "").is_err());
        assert!(FilenamePair::new("image.png", "label.png").is_ok());
    }

    #[test]
    fn scrub_replaces_nans_with_zero() {
        let mut image = ImagePlane::new(2, 1);
        image.put_pixel(0, 0, Rgb([f32::NAN, 0.5, f32::NAN]));
        image.put_pixel(1, 0, Rgb([0.25, 0.75, 1.0]));
        let mut pair = ImageLabelPair::new(image, LabelPlane::new(2, 1));

        pair.scrub_nans();

        assert_eq!(pair.image.get_pixel(0, 0).0, [0.0, 0.5, 0.0]);
        assert_eq!(pair.image.get_pixel(1, 0).0, [0.25, 0.75, 1.0]);
    }

    #[test]
    fn plane_alignment_check() {
        let pair = ImageLabelPair::new(ImagePlane::new(4, 4), LabelPlane::new(4, 4));
        assert!(pair.planes_aligned());

        let pair = ImageLabelPair::new(ImagePlane::new(4, 4), LabelPlane::new(2, 4));
        assert!(!pair.planes_aligned());
    }
}
