use image::{GrayImage, Luma, Rgb, RgbImage};
use segstream::FilenamePair;
use std::path::Path;

/// Writes an image/label PNG pair where every label pixel carries `label`
/// and every image pixel carries `rgb`. Returns the filename pair.
pub fn write_uniform_pair(
    dir: &Path,
    stem: &str,
    width: u32,
    height: u32,
    rgb: [u8; 3],
    label: u8,
) -> FilenamePair {
    let mut image = RgbImage::new(width, height);
    for pixel in image.pixels_mut() {
        *pixel = Rgb(rgb);
    }
    let mut labels = GrayImage::new(width, height);
    for pixel in labels.pixels_mut() {
        *pixel = Luma([label]);
    }
    write_pair(dir, stem, image, labels)
}

/// Writes an arbitrary image/label PNG pair and returns the filename pair.
pub fn write_pair(dir: &Path, stem: &str, image: RgbImage, labels: GrayImage) -> FilenamePair {
    let image_path = dir.join(format!("{stem}.png"));
    let label_path = dir.join(format!("{stem}_labels.png"));
    image.save(&image_path).unwrap();
    labels.save(&label_path).unwrap();
    FilenamePair::new(
        image_path.to_str().unwrap(),
        label_path.to_str().unwrap(),
    )
    .unwrap()
}

/// A small dataset of `count` pairs where pair `i` has every label pixel set
/// to `i` and a per-pair gradient image, so batches are distinguishable.
pub fn write_indexed_dataset(
    dir: &Path,
    count: usize,
    width: u32,
    height: u32,
) -> Vec<FilenamePair> {
    (0..count)
        .map(|index| {
            let mut image = RgbImage::new(width, height);
            for (x, y, pixel) in image.enumerate_pixels_mut() {
                *pixel = Rgb([
                    (index * 40) as u8,
                    (x * 30) as u8,
                    (y * 30) as u8,
                ]);
            }
            let mut labels = GrayImage::new(width, height);
            for pixel in labels.pixels_mut() {
                *pixel = Luma([index as u8]);
            }
            write_pair(dir, &format!("pair_{index}"), image, labels)
        })
        .collect()
}
