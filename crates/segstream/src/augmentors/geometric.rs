//! Geometric augmentors. All of them either require the two planes to share
//! dimensions or resize both planes together, so that image pixel `(x, y)`
//! and target pixel `(x, y)` keep describing the same spatial location (or
//! the target becomes the void sentinel).

use super::ops::bilinear_sample;
use super::Augmentor;
use crate::pair::{ImageLabelPair, ImagePlane, LabelPlane, VOID_LABEL};
use anyhow::{ensure, Result};
use image::imageops::{self, FilterType};
use image::{Luma, Rgb};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

// ============================================================================
// SubsampleAugmentor
// ============================================================================

/// Subsamples the pair by an integer factor.
///
/// The image is Lanczos-resized to `(W/f, H/f)`. The target cannot be
/// resampled by interpolation (interpolated label ids are meaningless), so it
/// is reduced by per-tile majority vote: each output pixel takes the most
/// frequent label of its `f x f` input block, or the void sentinel when no
/// label covers more than half the block.
#[derive(Debug)]
pub struct SubsampleAugmentor {
    factor: u32,
}

impl SubsampleAugmentor {
    pub fn new(factor: u32) -> Result<Self> {
        ensure!(factor > 0, "Subsample factor must be >= 1, got {}", factor);
        Ok(Self { factor })
    }
}

impl Augmentor for SubsampleAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let (width, height) = pair.image.dimensions();
        let (new_width, new_height) = (width / self.factor, height / self.factor);
        ensure!(
            new_width > 0 && new_height > 0,
            "Subsample factor {} exceeds image size {}x{}",
            self.factor,
            width,
            height
        );

        pair.image = imageops::resize(&pair.image, new_width, new_height, FilterType::Lanczos3);
        pair.target = vote_subsample(&pair.target, self.factor);
        Ok(())
    }
}

fn vote_subsample(target: &LabelPlane, factor: u32) -> LabelPlane {
    let (width, height) = target.dimensions();
    let (new_width, new_height) = (width / factor, height / factor);

    // A label must cover strictly more than half the block to win the vote.
    let half_block = factor * factor / 2;

    let mut out = LabelPlane::new(new_width, new_height);
    for oy in 0..new_height {
        for ox in 0..new_width {
            let mut histogram = [0u32; 256];
            for y in oy * factor..(oy + 1) * factor {
                for x in ox * factor..(ox + 1) * factor {
                    histogram[target.get_pixel(x, y).0[0] as usize] += 1;
                }
            }

            let mut mode = 0usize;
            for label in 1..256 {
                if histogram[label] > histogram[mode] {
                    mode = label;
                }
            }

            let value = if histogram[mode] > half_block {
                mode as u8
            } else {
                VOID_LABEL
            };
            out.put_pixel(ox, oy, Luma([value]));
        }
    }
    out
}

// ============================================================================
// TranslationAugmentor
// ============================================================================

/// Shifts the pair by a random integer offset drawn uniformly from
/// `{-d, ..., d}` in each direction.
///
/// Out-of-bounds reads reflect without repeating the edge pixel on the image
/// plane and become the void sentinel on the target plane. Requires both
/// planes to share dimensions.
pub struct TranslationAugmentor {
    offset: i32,
    rng: Mutex<StdRng>,
}

impl TranslationAugmentor {
    pub fn new(offset: i32, seed: u64) -> Result<Self> {
        ensure!(
            offset >= 0,
            "Translation offset must be non-negative, got {}",
            offset
        );
        Ok(Self {
            offset,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(offset: i32) -> Result<Self> {
        Self::new(offset, rand::rng().random())
    }
}

impl Augmentor for TranslationAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let (shift_y, shift_x) = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            (
                rng.random_range(-self.offset..=self.offset),
                rng.random_range(-self.offset..=self.offset),
            )
        };
        apply_translation(pair, shift_y, shift_x)
    }
}

pub(crate) fn apply_translation(
    pair: &mut ImageLabelPair,
    shift_y: i32,
    shift_x: i32,
) -> Result<()> {
    ensure!(
        pair.planes_aligned(),
        "Image ({}x{}) and target ({}x{}) must be of the same size when using \
         translation augmentation",
        pair.image.width(),
        pair.image.height(),
        pair.target.width(),
        pair.target.height()
    );

    let (width, height) = pair.image.dimensions();
    let mut image = ImagePlane::new(width, height);
    let mut target = LabelPlane::new(width, height);

    // Reflect without repeating the edge pixel: |i| below zero, 2H - i - 1
    // past the end. A single reflection covers offsets below the image size.
    let reflect = |coord: i32, extent: u32| -> (u32, bool) {
        let extent = extent as i32;
        if coord < 0 {
            (coord.abs().min(extent - 1) as u32, true)
        } else if coord >= extent {
            ((2 * extent - coord - 1).max(0) as u32, true)
        } else {
            (coord as u32, false)
        }
    };

    for y in 0..height {
        for x in 0..width {
            let (src_y, oob_y) = reflect(y as i32 + shift_y, height);
            let (src_x, oob_x) = reflect(x as i32 + shift_x, width);

            image.put_pixel(x, y, *pair.image.get_pixel(src_x, src_y));
            let label = if oob_y || oob_x {
                VOID_LABEL
            } else {
                pair.target.get_pixel(src_x, src_y).0[0]
            };
            target.put_pixel(x, y, Luma([label]));
        }
    }

    pair.image = image;
    pair.target = target;
    Ok(())
}

// ============================================================================
// ZoomingAugmentor
// ============================================================================

/// Randomly zooms in or out by a factor drawn from `U(1 - r, 1 + r)`.
///
/// Both planes are resized together (Lanczos for the image, nearest for the
/// target). Zooming in center-crops back to the original size; zooming out
/// center-embeds into a canvas of zeros (image) and void (target).
pub struct ZoomingAugmentor {
    range: f64,
    rng: Mutex<StdRng>,
}

impl ZoomingAugmentor {
    pub fn new(range: f64, seed: u64) -> Result<Self> {
        ensure!(
            range > 0.0 && range < 1.0,
            "Zoom range must lie in (0, 1), got {}",
            range
        );
        Ok(Self {
            range,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(range: f64) -> Result<Self> {
        Self::new(range, rand::rng().random())
    }
}

impl Augmentor for ZoomingAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let factor = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range((1.0 - self.range)..(1.0 + self.range))
        };
        apply_zoom(pair, factor)
    }
}

pub(crate) fn apply_zoom(pair: &mut ImageLabelPair, factor: f64) -> Result<()> {
    ensure!(
        pair.planes_aligned(),
        "Image ({}x{}) and target ({}x{}) must be of the same size when using \
         zoom augmentation",
        pair.image.width(),
        pair.image.height(),
        pair.target.width(),
        pair.target.height()
    );

    let (width, height) = pair.image.dimensions();
    let scaled_width = (width as f64 * factor) as u32;
    let scaled_height = (height as f64 * factor) as u32;
    ensure!(
        scaled_width > 0 && scaled_height > 0,
        "Zoom factor {} collapses a {}x{} pair to an empty image",
        factor,
        width,
        height
    );

    let scaled_image = imageops::resize(&pair.image, scaled_width, scaled_height, FilterType::Lanczos3);
    let scaled_target = imageops::resize(&pair.target, scaled_width, scaled_height, FilterType::Nearest);

    let mut image = ImagePlane::new(width, height);
    let mut target = LabelPlane::from_pixel(width, height, Luma([VOID_LABEL]));

    if factor > 1.0 {
        // Zoomed in: crop the center window back out.
        let offset_x = (scaled_width - width) / 2;
        let offset_y = (scaled_height - height) / 2;
        for y in 0..height {
            for x in 0..width {
                image.put_pixel(x, y, *scaled_image.get_pixel(x + offset_x, y + offset_y));
                target.put_pixel(x, y, *scaled_target.get_pixel(x + offset_x, y + offset_y));
            }
        }
    } else {
        // Zoomed out: embed the smaller pair into the center of the canvas.
        let offset_x = (width - scaled_width) / 2;
        let offset_y = (height - scaled_height) / 2;
        for y in 0..scaled_height {
            for x in 0..scaled_width {
                image.put_pixel(x + offset_x, y + offset_y, *scaled_image.get_pixel(x, y));
                target.put_pixel(x + offset_x, y + offset_y, *scaled_target.get_pixel(x, y));
            }
        }
    }

    pair.image = image;
    pair.target = target;
    Ok(())
}

// ============================================================================
// RotationAugmentor
// ============================================================================

/// Rotates the pair by an angle drawn from `U(-max, max)` degrees (negative
/// draws wrap to `[0, 360)`), around the pixel center of the image.
///
/// The image is resampled bilinearly with zero fill; the target uses nearest
/// neighbour with void fill.
pub struct RotationAugmentor {
    max_angle: f64,
    rng: Mutex<StdRng>,
}

impl RotationAugmentor {
    pub fn new(max_angle: f64, seed: u64) -> Result<Self> {
        ensure!(
            max_angle >= 0.0,
            "Rotation angle must be non-negative, got {}",
            max_angle
        );
        Ok(Self {
            max_angle,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(max_angle: f64) -> Result<Self> {
        Self::new(max_angle, rand::rng().random())
    }
}

impl Augmentor for RotationAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        let mut angle = if self.max_angle == 0.0 {
            0.0
        } else {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random_range(-self.max_angle..self.max_angle)
        };
        if angle < 0.0 {
            angle += 360.0;
        }
        apply_rotation(pair, angle)
    }
}

pub(crate) fn apply_rotation(pair: &mut ImageLabelPair, angle_degrees: f64) -> Result<()> {
    ensure!(
        pair.planes_aligned(),
        "Image ({}x{}) and target ({}x{}) must be of the same size when using \
         rotation augmentation",
        pair.image.width(),
        pair.image.height(),
        pair.target.width(),
        pair.target.height()
    );

    let (width, height) = pair.image.dimensions();
    // Integer-division pixel center, like the affine warp this replaces.
    let center_x = (width / 2) as f32;
    let center_y = (height / 2) as f32;
    let radians = (angle_degrees as f32).to_radians();
    let (sin, cos) = radians.sin_cos();

    let mut image = ImagePlane::new(width, height);
    let mut target = LabelPlane::new(width, height);

    for y in 0..height {
        for x in 0..width {
            // Inverse mapping: rotate each output pixel back into the source.
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let src_x = cos * dx - sin * dy + center_x;
            let src_y = sin * dx + cos * dy + center_y;

            image.put_pixel(x, y, Rgb(bilinear_sample(&pair.image, src_x, src_y)));

            let nearest_x = src_x.round() as i64;
            let nearest_y = src_y.round() as i64;
            let label = if nearest_x < 0
                || nearest_y < 0
                || nearest_x >= width as i64
                || nearest_y >= height as i64
            {
                VOID_LABEL
            } else {
                pair.target.get_pixel(nearest_x as u32, nearest_y as u32).0[0]
            };
            target.put_pixel(x, y, Luma([label]));
        }
    }

    pair.image = image;
    pair.target = target;
    Ok(())
}

// ============================================================================
// CropAugmentor
// ============================================================================

/// Extracts a square crop whose position is sampled with probability
/// proportional to the class entropy of the window's label histogram, so
/// that windows showing many classes are preferred over void-heavy or
/// single-class ones.
///
/// The per-window histograms for all `(H-s+1) x (W-s+1)` positions are
/// computed in O(H*W*C) total via 2-D prefix-sum dynamic programming.
pub struct CropAugmentor {
    size: usize,
    num_classes: usize,
    rng: Mutex<StdRng>,
}

impl CropAugmentor {
    pub fn new(size: usize, num_classes: usize, seed: u64) -> Result<Self> {
        ensure!(size > 0, "Crop size must be >= 1, got {}", size);
        ensure!(
            num_classes > 0,
            "Number of classes must be >= 1, got {}",
            num_classes
        );
        Ok(Self {
            size,
            num_classes,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Draws the seed once from the platform's entropy source.
    pub fn from_entropy(size: usize, num_classes: usize) -> Result<Self> {
        Self::new(size, num_classes, rand::rng().random())
    }
}

impl Augmentor for CropAugmentor {
    fn augment(&self, pair: &mut ImageLabelPair) -> Result<()> {
        ensure!(
            pair.planes_aligned(),
            "Image ({}x{}) and target ({}x{}) must be of the same size when using \
             crop augmentation",
            pair.image.width(),
            pair.image.height(),
            pair.target.width(),
            pair.target.height()
        );

        let (width, height) = pair.target.dimensions();
        ensure!(
            self.size <= width as usize && self.size <= height as usize,
            "Crop size {} exceeds target size {}x{}",
            self.size,
            width,
            height
        );

        let histograms = class_histograms(&pair.target, self.size, self.num_classes);
        let cdf = entropy_cdf(&histograms, self.num_classes, self.size);

        let u = {
            let mut rng = self.rng.lock().expect("augmentor rng mutex poisoned");
            rng.random::<f64>()
        };
        let flat = cdf.partition_point(|&bound| bound <= u).min(cdf.len() - 1);

        let positions_x = width as usize - self.size + 1;
        let row = flat / positions_x;
        let col = flat % positions_x;
        extract_window(pair, col as u32, row as u32, self.size as u32);
        Ok(())
    }
}

/// Per-position class histograms of every `size x size` window, void pixels
/// excluded. Labels outside `[0, num_classes)` are ignored like void.
///
/// The origin window is counted from scratch (O(size^2)); the remaining
/// windows along the first row and column reuse their left/upper neighbour
/// with a linear update; interior windows combine three neighbours plus four
/// corner corrections in O(num_classes).
pub(crate) fn class_histograms(
    target: &LabelPlane,
    size: usize,
    num_classes: usize,
) -> Vec<i32> {
    let width = target.width() as usize;
    let height = target.height() as usize;
    let positions_y = height - size + 1;
    let positions_x = width - size + 1;

    let mut histograms = vec![0i32; positions_y * positions_x * num_classes];

    let at = |x: usize, y: usize| target.get_pixel(x as u32, y as u32).0[0];
    let class_of = |value: u8| {
        let class = value as usize;
        (value != VOID_LABEL && class < num_classes).then_some(class)
    };
    let idx = |i: usize, j: usize, c: usize| (i * positions_x + j) * num_classes + c;

    // Origin window, from scratch.
    for y in 0..size {
        for x in 0..size {
            if let Some(class) = class_of(at(x, y)) {
                histograms[idx(0, 0, class)] += 1;
            }
        }
    }

    // First row: slide one column to the right of the left neighbour.
    for j in 1..positions_x {
        for c in 0..num_classes {
            histograms[idx(0, j, c)] = histograms[idx(0, j - 1, c)];
        }
        for y in 0..size {
            if let Some(class) = class_of(at(j - 1, y)) {
                histograms[idx(0, j, class)] -= 1;
            }
            if let Some(class) = class_of(at(j + size - 1, y)) {
                histograms[idx(0, j, class)] += 1;
            }
        }
    }

    for i in 1..positions_y {
        // First window of the row: slide one row down from the upper neighbour.
        for c in 0..num_classes {
            histograms[idx(i, 0, c)] = histograms[idx(i - 1, 0, c)];
        }
        for x in 0..size {
            if let Some(class) = class_of(at(x, i - 1)) {
                histograms[idx(i, 0, class)] -= 1;
            }
            if let Some(class) = class_of(at(x, i + size - 1)) {
                histograms[idx(i, 0, class)] += 1;
            }
        }

        // Interior: inclusion-exclusion over the three computed neighbours.
        for j in 1..positions_x {
            for c in 0..num_classes {
                histograms[idx(i, j, c)] = histograms[idx(i - 1, j, c)]
                    + histograms[idx(i, j - 1, c)]
                    - histograms[idx(i - 1, j - 1, c)];
            }
            if let Some(class) = class_of(at(j - 1, i - 1)) {
                histograms[idx(i, j, class)] += 1;
            }
            if let Some(class) = class_of(at(j + size - 1, i - 1)) {
                histograms[idx(i, j, class)] -= 1;
            }
            if let Some(class) = class_of(at(j - 1, i + size - 1)) {
                histograms[idx(i, j, class)] -= 1;
            }
            if let Some(class) = class_of(at(j + size - 1, i + size - 1)) {
                histograms[idx(i, j, class)] += 1;
            }
        }
    }

    histograms
}

/// Turns per-window histograms into a cumulative sampling distribution over
/// flat window positions.
///
/// Score per window: `(-sum n_c*log2(n_c) + N*log2(N)) / size^2`. The
/// division keeps void-heavy windows (small N) from scoring like genuinely
/// mixed ones. A target where every window scores zero (single-class image)
/// falls back to a uniform draw.
pub(crate) fn entropy_cdf(histograms: &[i32], num_classes: usize, size: usize) -> Vec<f64> {
    let positions = histograms.len() / num_classes;
    let window_area = (size * size) as f64;

    let mut scores = vec![0.0f64; positions];
    let mut total = 0.0;
    for (position, score) in scores.iter_mut().enumerate() {
        let counts = &histograms[position * num_classes..(position + 1) * num_classes];
        let mut entropy = 0.0;
        let mut occupied = 0.0;
        for &count in counts {
            if count > 0 {
                let value = count as f64;
                occupied += value;
                entropy -= value * value.log2();
            }
        }
        if occupied > 0.0 {
            entropy += occupied * occupied.log2();
            entropy /= window_area;
        }
        *score = entropy;
        total += entropy;
    }

    if total <= 0.0 {
        scores.fill(1.0);
        total = positions as f64;
    }

    let mut running = 0.0;
    for score in scores.iter_mut() {
        running += *score / total;
        *score = running;
    }
    scores
}

fn extract_window(pair: &mut ImageLabelPair, col: u32, row: u32, size: u32) {
    let mut image = ImagePlane::new(size, size);
    let mut target = LabelPlane::new(size, size);
    for y in 0..size {
        for x in 0..size {
            image.put_pixel(x, y, *pair.image.get_pixel(col + x, row + y));
            target.put_pixel(x, y, *pair.target.get_pixel(col + x, row + y));
        }
    }
    pair.image = image;
    pair.target = target;
}

// ============================================================================
// Tests
// ============================================================================
