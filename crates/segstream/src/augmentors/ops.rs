//! Shared pixel math for the augmentor kernels: HSV conversion, bilinear
//! sampling, and Gaussian kernel construction.

use crate::pair::ImagePlane;

/// RGB ([0, 1] per channel) to HSV with H in degrees [0, 360) and S, V in
/// [0, 1].
pub(crate) fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max > 0.0 { delta / max } else { 0.0 };
    [hue, saturation, max]
}

/// Inverse of [`rgb_to_hsv`]. H outside [0, 360) is wrapped first.
pub(crate) fn hsv_to_rgb(hsv: [f32; 3]) -> [f32; 3] {
    let [h, s, v] = hsv;
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

/// Bilinear tap at continuous coordinates. Out-of-bounds neighbours read as
/// zero, so samples near the border blend towards the constant fill.
pub(crate) fn bilinear_sample(image: &ImagePlane, x: f32, y: f32) -> [f32; 3] {
    let (width, height) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let tap = |ix: i64, iy: i64| -> [f32; 3] {
        if ix < 0 || iy < 0 || ix >= width as i64 || iy >= height as i64 {
            [0.0; 3]
        } else {
            image.get_pixel(ix as u32, iy as u32).0
        }
    };

    let p00 = tap(x0 as i64, y0 as i64);
    let p10 = tap(x0 as i64 + 1, y0 as i64);
    let p01 = tap(x0 as i64, y0 as i64 + 1);
    let p11 = tap(x0 as i64 + 1, y0 as i64 + 1);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Normalized 1-D Gaussian kernel of width `3 * ceil(sigma)`, forced odd.
pub(crate) fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let mut width = 3 * sigma.ceil() as usize;
    if width % 2 == 0 {
        width += 1;
    }
    let radius = (width / 2) as i64;

    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|offset| {
            let distance = offset as f32;
            (-(distance * distance) / (2.0 * sigma * sigma)).exp()
        })
        .collect();

    let total: f32 = kernel.iter().sum();
    for weight in kernel.iter_mut() {
        *weight /= total;
    }
    kernel
}
