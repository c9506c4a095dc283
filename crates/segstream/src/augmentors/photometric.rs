//! Photometric augmentors. They touch only the image plane and never change
//! dimensions, so the label plane passes through untouched.

use super::ops::{gaussian_kernel, hsv_to_rgb, rgb_to_hsv};
use super::Augmentor;
use crate::pair::{ImageLabelPair, ImagePlane};
use anyhow::{ensure, Result};
use image::Rgb;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

// ============================================================================
// GammaAugmentor
// ============================================================================

/// Random gamma adjustment of the image.
///
/// Draws `g ~ U(-a, a)` with `a` in [0, 0.5] and raises every channel to the
/// power `ln(0.5 + g/sqrt(2)) / ln(0.5 - g/sqrt(2))`. The transform maps the
/// symmetric draw onto a gamma curve that is 1 at g = 0, and keeps [0, 1]
/// values inside [0, 1].
pub struct GammaAugmentor {
    strength: f64,
    rng: Mutex<StdRng>,
}

impl GammaAugmentor {
    pub fn new(strength: f64, seed: u64) -> Result<Self> {
        ensure!(
            (0.0..=0.5).contains(&strength),
            "Gamma strength must lie in [0, 0.5], got {}",
            strength
        );
        Ok(Self {
            strength,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(strength: f64) -> Result<Self> {
        Self::new(strength, rand::rng().random())
    }
}

impl Augmentor for GammaAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let draw = if self.strength == 0.0 {
            0.0
        } else {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(-self.strength..self.strength)
        };
        apply_gamma(pair, draw);
        Ok(())
    }
}

pub(crate) fn apply_gamma(pair: &mut ImageLabelPair, draw: f64) {
    let exponent = ((0.5 + std::f64::consts::FRAC_1_SQRT_2 * draw).ln()
        / (0.5 - std::f64::consts::FRAC_1_SQRT_2 * draw).ln()) as f32;

    for pixel in pair.image.pixels_mut() {
        for value in pixel.0.iter_mut() {
            *value = value.powf(exponent);
        }
    }
}

// ============================================================================
// BrightnessAugmentor
// ============================================================================

/// Adds one random offset, drawn from `[lo, hi]`, to every image channel and
/// clamps the result back to [0, 1].
pub struct BrightnessAugmentor {
    lo: f64,
    hi: f64,
    rng: Mutex<StdRng>,
}

impl BrightnessAugmentor {
    pub fn new(lo: f64, hi: f64, seed: u64) -> Result<Self> {
        ensure!(lo <= hi, "Brightness range is empty: [{}, {}]", lo, hi);
        Ok(Self {
            lo,
            hi,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(lo: f64, hi: f64) -> Result<Self> {
        Self::new(lo, hi, rand::rng().random())
    }
}

impl Augmentor for BrightnessAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let offset = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(self.lo..=self.hi)
        };
        apply_brightness(pair, offset as f32);
        Ok(())
    }
}

pub(crate) fn apply_brightness(pair: &mut ImageLabelPair, offset: f32) {
    for pixel in pair.image.pixels_mut() {
        for value in pixel.0.iter_mut() {
            *value = (*value + offset).clamp(0.0, 1.0);
        }
    }
}

// ============================================================================
// SaturationAugmentor
// ============================================================================

/// Rescales the HSV saturation channel by a random factor from `[lo, hi]`,
/// clamped to [0, 1], then converts back to RGB.
pub struct SaturationAugmentor {
    lo: f64,
    hi: f64,
    rng: Mutex<StdRng>,
}

impl SaturationAugmentor {
    pub fn new(lo: f64, hi: f64, seed: u64) -> Result<Self> {
        ensure!(lo <= hi, "Saturation range is empty: [{}, {}]", lo, hi);
        ensure!(
            lo >= 0.0,
            "Saturation factors must be non-negative, got {}",
            lo
        );
        Ok(Self {
            lo,
            hi,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(lo: f64, hi: f64) -> Result<Self> {
        Self::new(lo, hi, rand::rng().random())
    }
}

impl Augmentor for SaturationAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let factor = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(self.lo..=self.hi)
        };
        apply_saturation(pair, factor as f32);
        Ok(())
    }
}

pub(crate) fn apply_saturation(pair: &mut ImageLabelPair, factor: f32) {
    for pixel in pair.image.pixels_mut() {
        let mut hsv = rgb_to_hsv(pixel.0);
        hsv[1] = (hsv[1] * factor).clamp(0.0, 1.0);
        pixel.0 = hsv_to_rgb(hsv);
    }
}

// ============================================================================
// HueAugmentor
// ============================================================================

/// Shifts the HSV hue channel by a random offset from `[lo, hi]` degrees,
/// wrapped into [0, 360), then converts back to RGB.
pub struct HueAugmentor {
    lo: f64,
    hi: f64,
    rng: Mutex<StdRng>,
}

impl HueAugmentor {
    pub fn new(lo: f64, hi: f64, seed: u64) -> Result<Self> {
        ensure!(lo <= hi, "Hue range is empty: [{}, {}]", lo, hi);
        Ok(Self {
            lo,
            hi,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(lo: f64, hi: f64) -> Result<Self> {
        Self::new(lo, hi, rand::rng().random())
    }
}

impl Augmentor for HueAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let offset = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(self.lo..=self.hi)
        };
        apply_hue(pair, offset as f32);
        Ok(())
    }
}

pub(crate) fn apply_hue(pair: &mut ImageLabelPair, offset: f32) {
    for pixel in pair.image.pixels_mut() {
        let mut hsv = rgb_to_hsv(pixel.0);
        hsv[0] = (hsv[0] + offset).rem_euclid(360.0);
        pixel.0 = hsv_to_rgb(hsv);
    }
}

// ============================================================================
// BlurAugmentor
// ============================================================================

/// Gaussian-blurs the image plane with a sigma drawn from `U(0, sigma_max)`.
///
/// A non-positive `sigma_max` disables the augmentor entirely. The kernel
/// width is `3 * ceil(sigma)`, forced odd; borders clamp to the edge pixel.
pub struct BlurAugmentor {
    sigma_max: f64,
    rng: Mutex<StdRng>,
}

impl BlurAugmentor {
    pub fn new(sigma_max: f64, seed: u64) -> Self {
        Self {
            sigma_max,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(sigma_max: f64) -> Self {
        Self::new(sigma_max, rand::rng().random())
    }
}

impl Augmentor for BlurAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        if self.sigma_max <= 0.0 {
            return Ok(());
        }
        let sigma = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(0.0..=self.sigma_max)
        };
        apply_blur(pair, sigma as f32);
        Ok(())
    }
}

pub(crate) fn apply_blur(pair: &mut ImageLabelPair, sigma: f32) {
    if sigma < f32::EPSILON {
        return;
    }
    let kernel = gaussian_kernel(sigma);
    let horizontal = convolve_rows(&pair.image, &kernel);
    pair.image = convolve_columns(&horizontal, &kernel);
}

fn convolve_rows(image: &ImagePlane, kernel: &[f32]) -> ImagePlane {
    let (width, height) = image.dimensions();
    let radius = (kernel.len() / 2) as i64;
    let mut out = ImagePlane::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let tap_x = (x as i64 + k as i64 - radius).clamp(0, width as i64 - 1);
                let pixel = image.get_pixel(tap_x as u32, y).0;
                for c in 0..3 {
                    acc[c] += pixel[c] * weight;
                }
            }
            out.put_pixel(x, y, Rgb(acc));
        }
    }
    out
}

fn convolve_columns(image: &ImagePlane, kernel: &[f32]) -> ImagePlane {
    let (width, height) = image.dimensions();
    let radius = (kernel.len() / 2) as i64;
    let mut out = ImagePlane::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let tap_y = (y as i64 + k as i64 - radius).clamp(0, height as i64 - 1);
                let pixel = image.get_pixel(x, tap_y as u32).0;
                for c in 0..3 {
                    acc[c] += pixel[c] * weight;
                }
            }
            out.put_pixel(x, y, Rgb(acc));
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::LabelPlane;
    use image::Luma;

    fn gradient_pair(width: u32, height: u32) -> ImageLabelPair {
        let mut image = ImagePlane::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let v = (x + y * width) as f32 / (width * height) as f32;
            *pixel = Rgb([v, 1.0 - v, 0.5]);
        }
        ImageLabelPair::new(image, LabelPlane::from_pixel(width, height, Luma([3])))
    }

    fn assert_unit_range(pair: &ImageLabelPair) {
        for pixel in pair.image.pixels() {
            for &value in &pixel.0 {
                assert!((0.0..=1.0).contains(&value), "value {value} out of range");
            }
        }
    }

    mod gamma_tests {
        use super::*;

        #[test]
        fn rejects_out_of_range_strength() {
            assert!(GammaAugmentor::new(-0.1, 1).is_err());
            assert!(GammaAugmentor::new(0.6, 1).is_err());
            assert!(GammaAugmentor::new(0.5, 1).is_ok());
        }

        #[test]
        fn zero_draw_is_identity() {
            let mut pair = gradient_pair(4, 4);
            let reference = pair.image.clone();
            apply_gamma(&mut pair, 0.0);
            for (expected, got) in reference.pixels().zip(pair.image.pixels()) {
                for c in 0..3 {
                    assert!((expected.0[c] - got.0[c]).abs() < 1e-6);
                }
            }
        }

        #[test]
        fn preserves_unit_range_and_labels() -> Result<()> {
            let mut pair = gradient_pair(6, 6);
            let labels = pair.target.clone();
            GammaAugmentor::new(0.5, 13)?.augment(&mut pair)?;
            assert_unit_range(&pair);
            assert_eq!(pair.target, labels);
            Ok(())
        }
    }

    mod brightness_tests {
        use super::*;

        #[test]
        fn clamps_to_unit_range() {
            let mut pair = gradient_pair(4, 4);
            apply_brightness(&mut pair, 0.9);
            assert_unit_range(&pair);
            assert_eq!(pair.image.get_pixel(3, 3).0[2], 1.0);

            let mut pair = gradient_pair(4, 4);
            apply_brightness(&mut pair, -0.9);
            assert_unit_range(&pair);
            assert_eq!(pair.image.get_pixel(0, 0).0[0], 0.0);
        }

        #[test]
        fn shifts_all_channels_equally() {
            let mut pair = gradient_pair(2, 2);
            // Pixel (1, 0) keeps all channels below 0.9, so nothing clamps.
            let before = pair.image.get_pixel(1, 0).0;
            apply_brightness(&mut pair, 0.1);
            let after = pair.image.get_pixel(1, 0).0;
            for c in 0..3 {
                assert!((after[c] - (before[c] + 0.1)).abs() < 1e-6);
            }
        }

        #[test]
        fn rejects_empty_range() {
            assert!(BrightnessAugmentor::new(0.3, -0.3, 1).is_err());
        }
    }

    mod saturation_tests {
        use super::*;

        #[test]
        fn factor_zero_desaturates_to_gray() {
            let mut pair = gradient_pair(3, 3);
            apply_saturation(&mut pair, 0.0);
            for pixel in pair.image.pixels() {
                let [r, g, b] = pixel.0;
                assert!((r - g).abs() < 1e-5 && (g - b).abs() < 1e-5);
            }
        }

        #[test]
        fn factor_one_is_identity() {
            let mut pair = gradient_pair(3, 3);
            let reference = pair.image.clone();
            apply_saturation(&mut pair, 1.0);
            for (expected, got) in reference.pixels().zip(pair.image.pixels()) {
                for c in 0..3 {
                    assert!((expected.0[c] - got.0[c]).abs() < 1e-4);
                }
            }
        }

        #[test]
        fn saturation_is_clamped() {
            let mut pair = gradient_pair(3, 3);
            apply_saturation(&mut pair, 100.0);
            assert_unit_range(&pair);
        }
    }

    mod hue_tests {
        use super::*;

        #[test]
        fn full_turn_is_identity() {
            let mut pair = gradient_pair(3, 3);
            let reference = pair.image.clone();
            apply_hue(&mut pair, 360.0);
            for (expected, got) in reference.pixels().zip(pair.image.pixels()) {
                for c in 0..3 {
                    assert!((expected.0[c] - got.0[c]).abs() < 1e-4);
                }
            }
        }

        #[test]
        fn offset_rotates_primaries() {
            let mut image = ImagePlane::new(1, 1);
            image.put_pixel(0, 0, Rgb([1.0, 0.0, 0.0]));
            let mut pair = ImageLabelPair::new(image, LabelPlane::new(1, 1));

            // Red shifted by 120 degrees becomes green.
            apply_hue(&mut pair, 120.0);
            let [r, g, b] = pair.image.get_pixel(0, 0).0;
            assert!(r.abs() < 1e-5 && (g - 1.0).abs() < 1e-5 && b.abs() < 1e-5);
        }

        #[test]
        fn negative_offsets_wrap_into_range() {
            let mut image = ImagePlane::new(1, 1);
            image.put_pixel(0, 0, Rgb([1.0, 0.0, 0.0]));
            let mut pair = ImageLabelPair::new(image, LabelPlane::new(1, 1));

            apply_hue(&mut pair, -120.0);
            let [r, g, b] = pair.image.get_pixel(0, 0).0;
            // Red shifted by -120 degrees becomes blue.
            assert!(r.abs() < 1e-5 && g.abs() < 1e-5 && (b - 1.0).abs() < 1e-5);
        }
    }

    mod blur_tests {
        use super::*;

        #[test]
        fn non_positive_sigma_disables_the_augmentor() -> Result<()> {
            let mut pair = gradient_pair(4, 4);
            let reference = pair.image.clone();
            BlurAugmentor::new(0.0, 5).augment(&mut pair)?;
            assert_eq!(reference.as_raw(), pair.image.as_raw());
            Ok(())
        }

        #[test]
        fn uniform_images_are_unchanged() {
            let mut image = ImagePlane::new(5, 5);
            for pixel in image.pixels_mut() {
                *pixel = Rgb([0.25, 0.5, 0.75]);
            }
            let mut pair = ImageLabelPair::new(image, LabelPlane::new(5, 5));
            apply_blur(&mut pair, 1.3);
            for pixel in pair.image.pixels() {
                assert!((pixel.0[0] - 0.25).abs() < 1e-5);
                assert!((pixel.0[1] - 0.5).abs() < 1e-5);
                assert!((pixel.0[2] - 0.75).abs() < 1e-5);
            }
        }

        #[test]
        fn blur_smooths_an_impulse() {
            let mut image = ImagePlane::new(5, 5);
            image.put_pixel(2, 2, Rgb([1.0, 1.0, 1.0]));
            let mut pair = ImageLabelPair::new(image, LabelPlane::new(5, 5));
            apply_blur(&mut pair, 1.0);

            let center = pair.image.get_pixel(2, 2).0[0];
            let neighbour = pair.image.get_pixel(1, 2).0[0];
            assert!(center < 1.0, "impulse must spread");
            assert!(neighbour > 0.0, "neighbours must receive mass");
            assert!(center > neighbour, "kernel must stay peaked");
        }
    }
}
