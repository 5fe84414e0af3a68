//! Dithering algorithms for grayscale rasters.
//!
//! Every algorithm quantizes to an evenly spaced gray palette whose size the
//! caller picks: 2 levels for 1bpp output, 16 for 4bpp. Ordered (Bayer)
//! dithering additionally takes a strength scale, because a 16-level palette
//! needs far less contrast push than a 2-level one.

use image::GrayImage;

use crate::error::Error;

/// Dither method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dither {
    None,
    FloydSteinberg,
    Bayer2x2,
    Bayer4x4,
    Bayer8x8,
    Bayer16x16,
    Atkinson,
    JarvisJudiceNinke,
}

impl Dither {
    /// Parses a selector name from the command line. Unknown names are a
    /// configuration error, raised before any pixel work begins.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "none" => Ok(Dither::None),
            "floyd" => Ok(Dither::FloydSteinberg),
            "bayer2x2" => Ok(Dither::Bayer2x2),
            "bayer4x4" => Ok(Dither::Bayer4x4),
            "bayer8x8" => Ok(Dither::Bayer8x8),
            "bayer16x16" => Ok(Dither::Bayer16x16),
            "atkinson" => Ok(Dither::Atkinson),
            "jjn" => Ok(Dither::JarvisJudiceNinke),
            other => Err(Error::Config(format!("unknown dither type: {other}"))),
        }
    }
}

// Error-diffusion kernels as (dx, dy, weight) with a common divisor.
const FLOYD_STEINBERG: (&[(i32, i32, f32)], f32) = (
    &[(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)],
    16.0,
);
const ATKINSON: (&[(i32, i32, f32)], f32) = (
    &[
        (1, 0, 1.0),
        (2, 0, 1.0),
        (-1, 1, 1.0),
        (0, 1, 1.0),
        (1, 1, 1.0),
        (0, 2, 1.0),
    ],
    8.0,
);
const JARVIS_JUDICE_NINKE: (&[(i32, i32, f32)], f32) = (
    &[
        (1, 0, 7.0),
        (2, 0, 5.0),
        (-2, 1, 3.0),
        (-1, 1, 5.0),
        (0, 1, 7.0),
        (1, 1, 5.0),
        (2, 1, 3.0),
        (-2, 2, 1.0),
        (-1, 2, 3.0),
        (0, 2, 5.0),
        (1, 2, 3.0),
        (2, 2, 1.0),
    ],
    48.0,
);

/// Applies the selected method in place, quantizing to `levels` evenly spaced
/// grays. `Dither::None` leaves the image untouched; the encoder thresholds
/// or quantizes it directly.
pub fn apply(img: &mut GrayImage, method: Dither, levels: u16, bayer_strength: f32) {
    debug_assert!(levels >= 2);
    match method {
        Dither::None => {}
        Dither::FloydSteinberg => diffuse(img, levels, FLOYD_STEINBERG),
        Dither::Atkinson => diffuse(img, levels, ATKINSON),
        Dither::JarvisJudiceNinke => diffuse(img, levels, JARVIS_JUDICE_NINKE),
        Dither::Bayer2x2 => ordered(img, levels, 2, bayer_strength),
        Dither::Bayer4x4 => ordered(img, levels, 4, bayer_strength),
        Dither::Bayer8x8 => ordered(img, levels, 8, bayer_strength),
        Dither::Bayer16x16 => ordered(img, levels, 16, bayer_strength),
    }
}

/// Snaps a gray value to the nearest of `levels` evenly spaced palette
/// entries.
fn quantize(value: f32, levels: u16) -> u8 {
    let step = 255.0 / (levels - 1) as f32;
    let snapped = (value / step).round() * step;
    snapped.clamp(0.0, 255.0) as u8
}

fn diffuse(img: &mut GrayImage, levels: u16, kernel: (&[(i32, i32, f32)], f32)) {
    let (taps, divisor) = kernel;
    let (width, height) = img.dimensions();
    let mut work: Vec<f32> = img.as_raw().iter().map(|&v| v as f32).collect();

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let idx = (y * width as i32 + x) as usize;
            let old = work[idx];
            let new = quantize(old, levels) as f32;
            work[idx] = new;
            let error = old - new;
            for &(dx, dy, weight) in taps {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && nx < width as i32 && ny >= 0 && ny < height as i32 {
                    let nidx = (ny * width as i32 + nx) as usize;
                    work[nidx] += error * weight / divisor;
                }
            }
        }
    }

    for (x, y, px) in img.enumerate_pixels_mut() {
        px[0] = work[(y * width + x) as usize].clamp(0.0, 255.0) as u8;
    }
}

fn ordered(img: &mut GrayImage, levels: u16, size: u32, strength: f32) {
    let matrix = bayer_matrix(size);
    let cells = (size * size) as f32;

    for (x, y, px) in img.enumerate_pixels_mut() {
        let m = matrix[((y % size) * size + (x % size)) as usize] as f32;
        // Centered threshold offset in (-0.5, 0.5), scaled by strength.
        let offset = (m + 0.5) / cells - 0.5;
        let value = px[0] as f32 + strength * 255.0 * offset;
        px[0] = quantize(value, levels);
    }
}

/// Builds the `size` x `size` Bayer matrix (values `0..size*size`) by the
/// standard recursive doubling. `size` must be a power of two.
fn bayer_matrix(size: u32) -> Vec<u32> {
    debug_assert!(size.is_power_of_two());
    let mut matrix = vec![0u32];
    let mut n = 1;
    while n < size {
        let double = 2 * n;
        let mut next = vec![0u32; (double * double) as usize];
        for y in 0..n {
            for x in 0..n {
                let v = 4 * matrix[(y * n + x) as usize];
                next[(y * double + x) as usize] = v;
                next[(y * double + x + n) as usize] = v + 2;
                next[((y + n) * double + x) as usize] = v + 3;
                next[((y + n) * double + x + n) as usize] = v + 1;
            }
        }
        matrix = next;
        n = double;
    }
    matrix
}
