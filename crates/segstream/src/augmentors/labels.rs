//! Label-space augmentors.

use super::Augmentor;
use crate::pair::{ImageLabelPair, VOID_LABEL};
use anyhow::Result;

/// Maps raw Cityscapes label ids to the 19 contiguous training ids used by
/// the loss function. Ids outside the training set (including everything at
/// or above the 34 raw ids) become the void sentinel.
///
/// The table belongs to the augmentor instance rather than living as a
/// global, so alternative datasets can ship their own remap via
/// `ValueMapLoader` without touching this type.
#[derive(Debug, Clone)]
pub struct CityscapesLabelRemap {
    table: [u8; 256],
}

/// Raw label id -> training id for the 19 Cityscapes evaluation classes.
const TRAINING_IDS: [(u8, u8); 19] = [
    (7, 0),
    (8, 1),
    (11, 2),
    (12, 3),
    (13, 4),
    (17, 5),
    (19, 6),
    (20, 7),
    (21, 8),
    (22, 9),
    (23, 10),
    (24, 11),
    (25, 12),
    (26, 13),
    (27, 14),
    (28, 15),
    (31, 16),
    (32, 17),
    (33, 18),
];

impl CityscapesLabelRemap {
    pub fn new() -> Self {
        let mut table = [VOID_LABEL; 256];
        for (raw, training) in TRAINING_IDS {
            table[raw as usize] = training;
        }
        Self { table }
    }
}

impl Default for CityscapesLabelRemap {
    fn default() -> Self {
        Self::new()
    }
}

impl Augmentor for CityscapesLabelRemap {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        for pixel in pair.target.pixels_mut() {
            pixel.0[0] = self.table[pixel.0[0] as usize];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::{ImagePlane, LabelPlane};
    use image::Luma;

    fn remap_single(raw: u8) -> u8 {
        let mut pair = ImageLabelPair::new(
            ImagePlane::new(1, 1),
            LabelPlane::from_pixel(1, 1, Luma([raw])),
        );
        CityscapesLabelRemap::new().augment(&mut pair).unwrap();
        pair.target.get_pixel(0, 0).0[0]
    }

    #[test]
    fn training_classes_become_contiguous() {
        assert_eq!(remap_single(7), 0);
        assert_eq!(remap_single(8), 1);
        assert_eq!(remap_single(26), 13);
        assert_eq!(remap_single(33), 18);
    }

    #[test]
    fn ignored_classes_become_void() {
        assert_eq!(remap_single(0), VOID_LABEL);
        assert_eq!(remap_single(6), VOID_LABEL);
        assert_eq!(remap_single(29), VOID_LABEL);
    }

    #[test]
    fn ids_outside_the_raw_table_become_void() {
        assert_eq!(remap_single(34), VOID_LABEL);
        assert_eq!(remap_single(200), VOID_LABEL);
        assert_eq!(remap_single(VOID_LABEL), VOID_LABEL);
    }

    #[test]
    fn image_plane_is_untouched() {
        let mut image = ImagePlane::new(1, 1);
        image.put_pixel(0, 0, image::Rgb([0.1, 0.2, 0.3]));
        let mut pair =
            ImageLabelPair::new(image, LabelPlane::from_pixel(1, 1, Luma([7])));
        CityscapesLabelRemap::new().augment(&mut pair).unwrap();
        assert_eq!(pair.image.get_pixel(0, 0).0, [0.1, 0.2, 0.3]);
    }
}
