use crate::pair::{FilenamePair, ImageLabelPair, ImagePlane, LabelPlane};
use anyhow::{anyhow, ensure, Context, Result};
use image::io::Reader as ImageReader;
use image::{DynamicImage, Luma, Rgb};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Codec facade
// ============================================================================

/// Decodes a file into whatever pixel format it carries on disk.
/// A missing or unreadable file is an error naming the path.
fn decode(path: &str) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Could not open image '{}'", path))?
        .with_guessed_format()
        .with_context(|| format!("Could not probe image format of '{}'", path))?
        .decode()
        .with_context(|| format!("Could not decode image '{}'", path))
}

fn decode_rgb8(path: &str) -> Result<image::RgbImage> {
    Ok(match decode(path)? {
        DynamicImage::ImageRgb8(img) => img,
        other => other.to_rgb8(),
    })
}

fn decode_gray8(path: &str) -> Result<LabelPlane> {
    Ok(match decode(path)? {
        DynamicImage::ImageLuma8(img) => img,
        other => other.to_luma8(),
    })
}

// ============================================================================
// Loader traits
// ============================================================================

/// Maps one filename to the 3-channel float image plane.
///
/// `load` is pure and reentrant; the provider calls it concurrently from its
/// pair workers.
pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<ImagePlane>;
}

/// Maps one filename to the 1-channel 8-bit label plane.
pub trait TargetLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<LabelPlane>;
}

// ============================================================================
// RgbLoader
// ============================================================================

/// Decodes the file as 3-channel color, converts to 32-bit float, and scales
/// intensities by 1/255 into [0, 1]. The emitted channel order is R,G,B.
#[derive(Debug, Clone, Default)]
pub struct RgbLoader;

impl ImageLoader for RgbLoader {
    fn load(&self, path: &str) -> Result<ImagePlane> {
        let rgb = decode_rgb8(path)?;
        let (width, height) = rgb.dimensions();
        let mut out = ImagePlane::new(width, height);
        for (src, dst) in rgb.pixels().zip(out.pixels_mut()) {
            *dst = Rgb([
                src.0[0] as f32 / 255.0,
                src.0[1] as f32 / 255.0,
                src.0[2] as f32 / 255.0,
            ]);
        }
        Ok(out)
    }
}

// ============================================================================
// LabelLoader
// ============================================================================

/// Decodes the file as a single-channel 8-bit label image, unmodified.
#[derive(Debug, Clone, Default)]
pub struct LabelLoader;

impl TargetLoader for LabelLoader {
    fn load(&self, path: &str) -> Result<LabelPlane> {
        decode_gray8(path)
    }
}

// ============================================================================
// ValueMapLoader
// ============================================================================

/// Decodes a single-channel 8-bit label image and pushes every pixel through
/// a fixed 256-entry remap table.
#[derive(Debug, Clone)]
pub struct ValueMapLoader {
    table: [u8; 256],
}

impl ValueMapLoader {
    /// The table must contain exactly 256 entries, one per possible 8-bit
    /// input value.
    pub fn new(table: Vec<u8>) -> Result<Self> {
        ensure!(
            table.len() == 256,
            "Value map must contain exactly 256 entries, got {}",
            table.len()
        );
        let mut fixed = [0u8; 256];
        fixed.copy_from_slice(&table);
        Ok(Self { table: fixed })
    }
}

impl TargetLoader for ValueMapLoader {
    fn load(&self, path: &str) -> Result<LabelPlane> {
        let mut labels = decode_gray8(path)?;
        for pixel in labels.pixels_mut() {
            pixel.0[0] = self.table[pixel.0[0] as usize];
        }
        Ok(labels)
    }
}

// ============================================================================
// ColorMapLoader
// ============================================================================

/// Decodes a 3-channel 8-bit image and maps each `(R, G, B)` pixel to a
/// label id. A color missing from the map is fatal for that image.
#[derive(Debug, Clone)]
pub struct ColorMapLoader {
    map: HashMap<[u8; 3], u8>,
}

impl ColorMapLoader {
    pub fn new(map: HashMap<[u8; 3], u8>) -> Result<Self> {
        ensure!(!map.is_empty(), "Color map must not be empty");
        Ok(Self { map })
    }
}

impl TargetLoader for ColorMapLoader {
    fn load(&self, path: &str) -> Result<LabelPlane> {
        let rgb = decode_rgb8(path)?;
        let (width, height) = rgb.dimensions();
        let mut labels = LabelPlane::new(width, height);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let label = self.map.get(&pixel.0).ok_or_else(|| {
                anyhow!(
                    "Unknown color ({}, {}, {}) in image '{}'",
                    pixel.0[0],
                    pixel.0[1],
                    pixel.0[2],
                    path
                )
            })?;
            labels.put_pixel(x, y, Luma([*label]));
        }
        Ok(labels)
    }
}

// ============================================================================
// PairLoader
// ============================================================================

/// Composes an image loader and a target loader into a single pair load.
/// All errors propagate unchanged.
#[derive(Clone)]
pub struct PairLoader {
    image: Arc<dyn ImageLoader>,
    target: Arc<dyn TargetLoader>,
}

impl PairLoader {
    pub fn new(image: Arc<dyn ImageLoader>, target: Arc<dyn TargetLoader>) -> Self {
        Self { image, target }
    }

    pub fn load(&self, files: &FilenamePair) -> Result<ImageLabelPair> {
        Ok(ImageLabelPair::new(
            self.image.load(&files.image)?,
            self.target.load(&files.target)?,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};
    use tempfile::NamedTempFile;

    fn write_rgb_png(pixels: &[(u32, u32, [u8; 3])], width: u32, height: u32) -> NamedTempFile {
        let mut img = RgbImage::new(width, height);
        for &(x, y, rgb) in pixels {
            img.put_pixel(x, y, Rgb(rgb));
        }
        let file = NamedTempFile::with_suffix(".png").unwrap();
        img.save(file.path()).unwrap();
        file
    }

    fn write_gray_png(pixels: &[(u32, u32, u8)], width: u32, height: u32) -> NamedTempFile {
        let mut img = GrayImage::new(width, height);
        for &(x, y, value) in pixels {
            img.put_pixel(x, y, Luma([value]));
        }
        let file = NamedTempFile::with_suffix(".png").unwrap();
        img.save(file.path()).unwrap();
        file
    }

    #[test]
    fn rgb_loader_scales_into_unit_range() -> Result<()> {
        let file = write_rgb_png(&[(0, 0, [255, 128, 0])], 1, 1);
        let image = RgbLoader.load(file.path().to_str().unwrap())?;

        let pixel = image.get_pixel(0, 0).0;
        assert_eq!(pixel[0], 1.0);
        assert!((pixel[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(pixel[2], 0.0);
        Ok(())
    }

    #[test]
    fn missing_file_error_names_the_path() {
        let err = RgbLoader.load("does_not_exist.png").unwrap_err();
        assert!(format!("{err:#}").contains("does_not_exist.png"));
    }

    #[test]
    fn label_loader_passes_values_through() -> Result<()> {
        let file = write_gray_png(&[(0, 0, 7), (1, 0, 255)], 2, 1);
        let labels = LabelLoader.load(file.path().to_str().unwrap())?;
        assert_eq!(labels.get_pixel(0, 0).0[0], 7);
        assert_eq!(labels.get_pixel(1, 0).0[0], 255);
        Ok(())
    }

    #[test]
    fn value_map_requires_256_entries() {
        assert!(ValueMapLoader::new(vec![0; 255]).is_err());
        assert!(ValueMapLoader::new(vec![0; 256]).is_ok());
    }

    #[test]
    fn value_map_applies_table() -> Result<()> {
        let mut table: Vec<u8> = (0u8..=255).collect();
        table[10] = 3;
        let loader = ValueMapLoader::new(table)?;

        let file = write_gray_png(&[(0, 0, 10), (1, 0, 20)], 2, 1);
        let labels = loader.load(file.path().to_str().unwrap())?;
        assert_eq!(labels.get_pixel(0, 0).0[0], 3);
        assert_eq!(labels.get_pixel(1, 0).0[0], 20);
        Ok(())
    }

    #[test]
    fn color_map_translates_known_colors() -> Result<()> {
        let map = HashMap::from([([255, 0, 0], 1), ([0, 0, 255], 2)]);
        let loader = ColorMapLoader::new(map)?;

        let file = write_rgb_png(&[(0, 0, [255, 0, 0]), (1, 0, [0, 0, 255])], 2, 1);
        let labels = loader.load(file.path().to_str().unwrap())?;
        assert_eq!(labels.get_pixel(0, 0).0[0], 1);
        assert_eq!(labels.get_pixel(1, 0).0[0], 2);
        Ok(())
    }

    #[test]
    fn color_map_rejects_unknown_colors() -> Result<()> {
        let loader = ColorMapLoader::new(HashMap::from([([255, 0, 0], 1)]))?;
        let file = write_rgb_png(&[(0, 0, [1, 2, 3])], 1, 1);

        let err = loader.load(file.path().to_str().unwrap()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Unknown color (1, 2, 3)"));
        Ok(())
    }

    #[test]
    fn pair_loader_composes_both_planes() -> Result<()> {
        let image_file = write_rgb_png(&[(0, 0, [255, 255, 255])], 2, 2);
        let label_file = write_gray_png(&[(0, 0, 5)], 2, 2);
        let files = FilenamePair::new(
            image_file.path().to_str().unwrap(),
            label_file.path().to_str().unwrap(),
        )?;

        let loader = PairLoader::new(Arc::new(RgbLoader), Arc::new(LabelLoader));
        let pair = loader.load(&files)?;

        assert!(pair.planes_aligned());
        assert_eq!(pair.image.get_pixel(0, 0).0, [1.0, 1.0, 1.0]);
        assert_eq!(pair.target.get_pixel(0, 0).0[0], 5);
        Ok(())
    }
}
