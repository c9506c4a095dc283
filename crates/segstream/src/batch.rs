//! Packed batch tensors handed to the training loop.

use crate::pair::{ImagePlane, LabelPlane, VOID_LABEL, VOID_TRAINING_ID};
use anyhow::{ensure, Result};
use ndarray::{Array3, Array4};

/// How the label plane is laid out in the targets tensor. A binding-time
/// choice; the provider supports either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEncoding {
    /// `(B, H, W)` of 32-bit signed label indices, -1 for void.
    Dense,
    /// `(B, C, H, W)` of 32-bit floats, 1.0 in the class channel and 0.0
    /// elsewhere; void pixels leave the whole class column at zero.
    OneHot,
}

/// The targets tensor in one of the two supported encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetTensor {
    Dense(Array3<i32>),
    OneHot(Array4<f32>),
}

/// One batch: an images tensor of shape `(B, 3, H, W)` (channel order R,G,B,
/// values in [0, 1]) and a targets tensor sharing the batch dimension. The
/// consumer takes ownership and frees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Array4<f32>,
    pub targets: TargetTensor,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.images.shape()[0]
    }
}

/// Allocates the targets tensor for a batch. The one-hot layout starts
/// zero-filled so that void pixels need no writes at all.
pub(crate) fn allocate_targets(
    encoding: TargetEncoding,
    batch_size: usize,
    num_classes: usize,
    width: u32,
    height: u32,
) -> TargetTensor {
    let (height, width) = (height as usize, width as usize);
    match encoding {
        TargetEncoding::Dense => {
            TargetTensor::Dense(Array3::zeros((batch_size, height, width)))
        }
        TargetEncoding::OneHot => {
            TargetTensor::OneHot(Array4::zeros((batch_size, num_classes, height, width)))
        }
    }
}

/// Copies one image plane into the `(slot, c, :, :)` slices, splitting the
/// interleaved R,G,B samples into per-channel planes.
pub(crate) fn pack_image(images: &mut Array4<f32>, slot: usize, image: &ImagePlane) {
    for (x, y, pixel) in image.enumerate_pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            images[[slot, channel, y as usize, x as usize]] = value;
        }
    }
}

/// Writes one label plane into the targets tensor at the given batch slot.
pub(crate) fn pack_target(
    targets: &mut TargetTensor,
    slot: usize,
    target: &LabelPlane,
    num_classes: usize,
) -> Result<()> {
    match targets {
        TargetTensor::Dense(dense) => {
            for (x, y, pixel) in target.enumerate_pixels() {
                let value = pixel.0[0];
                dense[[slot, y as usize, x as usize]] = if value == VOID_LABEL {
                    VOID_TRAINING_ID
                } else {
                    value as i32
                };
            }
        }
        TargetTensor::OneHot(one_hot) => {
            for (x, y, pixel) in target.enumerate_pixels() {
                let value = pixel.0[0];
                if value == VOID_LABEL {
                    continue;
                }
                let class = value as usize;
                ensure!(
                    class < num_classes,
                    "Label {} at ({}, {}) exceeds the {} configured classes",
                    value,
                    x,
                    y,
                    num_classes
                );
                one_hot[[slot, class, y as usize, x as usize]] = 1.0;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn images_are_packed_channel_planar() {
        let mut image = ImagePlane::new(2, 1);
        image.put_pixel(0, 0, Rgb([1.0, 0.5, 0.0]));
        image.put_pixel(1, 0, Rgb([0.1, 0.2, 0.3]));

        let mut images = Array4::zeros((1, 3, 1, 2));
        pack_image(&mut images, 0, &image);

        assert_eq!(images[[0, 0, 0, 0]], 1.0);
        assert_eq!(images[[0, 1, 0, 0]], 0.5);
        assert_eq!(images[[0, 2, 0, 0]], 0.0);
        assert_eq!(images[[0, 0, 0, 1]], 0.1);
    }

    #[test]
    fn dense_targets_map_void_to_minus_one() -> Result<()> {
        let mut target = LabelPlane::new(2, 1);
        target.put_pixel(0, 0, Luma([5]));
        target.put_pixel(1, 0, Luma([VOID_LABEL]));

        let mut targets = allocate_targets(TargetEncoding::Dense, 1, 19, 2, 1);
        pack_target(&mut targets, 0, &target, 19)?;

        let TargetTensor::Dense(dense) = targets else {
            unreachable!()
        };
        assert_eq!(dense[[0, 0, 0]], 5);
        assert_eq!(dense[[0, 0, 1]], VOID_TRAINING_ID);
        Ok(())
    }

    #[test]
    fn one_hot_void_leaves_an_all_zero_column() -> Result<()> {
        let mut target = LabelPlane::new(1, 2);
        target.put_pixel(0, 0, Luma([1]));
        target.put_pixel(0, 1, Luma([VOID_LABEL]));

        let mut targets = allocate_targets(TargetEncoding::OneHot, 1, 3, 1, 2);
        pack_target(&mut targets, 0, &target, 3)?;

        let TargetTensor::OneHot(one_hot) = targets else {
            unreachable!()
        };
        // Labelled pixel: exactly one channel set.
        assert_eq!(one_hot[[0, 0, 0, 0]], 0.0);
        assert_eq!(one_hot[[0, 1, 0, 0]], 1.0);
        assert_eq!(one_hot[[0, 2, 0, 0]], 0.0);
        // Void pixel: all channels zero.
        for class in 0..3 {
            assert_eq!(one_hot[[0, class, 1, 0]], 0.0);
        }
        Ok(())
    }

    #[test]
    fn one_hot_rejects_labels_beyond_num_classes() {
        let target = LabelPlane::from_pixel(1, 1, Luma([7]));
        let mut targets = allocate_targets(TargetEncoding::OneHot, 1, 3, 1, 1);
        let err = pack_target(&mut targets, 0, &target, 3).unwrap_err();
        assert!(err.to_string().contains("exceeds the 3 configured classes"));
    }
}
