// preprocess.rs - 🚀 Blazingly Fast Image Preprocessing with Memory Safety 🚀

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use rayon::prelude::*;
use tracing::info;

/// CLAHE clip limit relative to the uniform histogram level.
const CLAHE_CLIP_LIMIT: f64 = 3.0;
/// CLAHE tile grid is CLAHE_GRID × CLAHE_GRID.
const CLAHE_GRID: u32 = 8;
/// Bilateral filter window is 2·BILATERAL_RADIUS + 1 = 9.
const BILATERAL_RADIUS: i32 = 4;
const BILATERAL_SIGMA_SPATIAL: f64 = 75.0;
const BILATERAL_SIGMA_COLOR: f64 = 75.0;
/// Gaussian σ equivalent to a 5×5 smoothing kernel.
const GAUSSIAN_BLUR_SIGMA: f32 = 1.1;
/// Gaussian σ equivalent to a 15-pixel adaptive-threshold block.
const ADAPTIVE_BLOCK_SIGMA: f32 = 2.6;
/// Offset subtracted from the local mean in the adaptive threshold.
const ADAPTIVE_OFFSET: i16 = 3;
/// Fixed fallback threshold for heavy, unambiguous ink.
const MANUAL_THRESHOLD: u8 = 180;
const MORPH_KERNEL_SIZE: u32 = 3;
const MORPH_CLEAN_KERNEL_SIZE: u32 = 2;

/// Rasters produced from one decoded sheet. `gray` is the equalized
/// grayscale that fill analysis samples; `mask` holds candidate ink as
/// nonzero pixels.
#[derive(Debug)]
pub struct Preprocessed {
    pub gray: GrayImage,
    pub mask: GrayImage,
    pub blurred: GrayImage,
}

/// Run the full preprocessing chain on a decoded color raster.
///
/// Three independent binarizations are OR-combined so that photographed,
/// scanned and photocopied sheets all keep their ink in the mask; the
/// morphology pass afterwards drops speckle and rejoins broken outlines.
pub fn preprocess(image: &DynamicImage) -> Preprocessed {
    info!("Preprocessing scanned image");

    let gray = image.to_luma8();
    let equalized = clahe(&gray, CLAHE_CLIP_LIMIT, CLAHE_GRID);
    let denoised = bilateral_filter(
        &equalized,
        BILATERAL_RADIUS,
        BILATERAL_SIGMA_SPATIAL,
        BILATERAL_SIGMA_COLOR,
    );
    let blurred = gaussian_blur_f32(&denoised, GAUSSIAN_BLUR_SIGMA);

    let thresh_adaptive = adaptive_threshold_inv(&blurred, ADAPTIVE_BLOCK_SIGMA, ADAPTIVE_OFFSET);
    let thresh_otsu = threshold_below(&blurred, otsu_level(&blurred));
    let thresh_manual = threshold_below(&blurred, MANUAL_THRESHOLD);

    let mut mask = thresh_adaptive;
    or_assign(&mut mask, &thresh_otsu);
    or_assign(&mut mask, &thresh_manual);

    let kernel = MorphKernel::ellipse(MORPH_KERNEL_SIZE);
    mask = morph_close(&mask, &kernel);
    mask = morph_open(&mask, &kernel);
    let kernel_clean = MorphKernel::ellipse(MORPH_CLEAN_KERNEL_SIZE);
    mask = morph_close(&mask, &kernel_clean);

    Preprocessed {
        gray: equalized,
        mask,
        blurred,
    }
}

/// Contrast-limited adaptive histogram equalization over a square tile grid.
/// Histogram mass above the clip level is redistributed across all bins
/// before the per-tile remap, which keeps flat paper regions from exploding
/// into noise.
pub fn clahe(img: &GrayImage, clip_limit: f64, grid: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    let tile_w = (width + grid - 1) / grid;
    let tile_h = (height + grid - 1) / grid;

    for tile_y in (0..height).step_by(tile_h.max(1) as usize) {
        for tile_x in (0..width).step_by(tile_w.max(1) as usize) {
            let end_x = (tile_x + tile_w).min(width);
            let end_y = (tile_y + tile_h).min(height);

            let mut histogram = [0u32; 256];
            for y in tile_y..end_y {
                for x in tile_x..end_x {
                    histogram[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let pixel_count = ((end_x - tile_x) * (end_y - tile_y)) as f64;

            let clip = (clip_limit * pixel_count / 256.0).max(1.0) as u32;
            let mut excess = 0u32;
            for bin in histogram.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bonus = excess / 256;
            let mut residual = excess % 256;
            for bin in histogram.iter_mut() {
                *bin += bonus;
                if residual > 0 {
                    *bin += 1;
                    residual -= 1;
                }
            }

            let mut lut = [0u8; 256];
            let mut cdf = 0u32;
            for (value, bin) in histogram.iter().enumerate() {
                cdf += bin;
                lut[value] = ((cdf as f64 / pixel_count) * 255.0).round().min(255.0) as u8;
            }

            for y in tile_y..end_y {
                for x in tile_x..end_x {
                    let value = img.get_pixel(x, y)[0] as usize;
                    out.put_pixel(x, y, Luma([lut[value]]));
                }
            }
        }
    }

    out
}

/// Edge-preserving denoise: each output pixel is the average of its window
/// weighted by both spatial distance and intensity difference. Rows are
/// processed in parallel.
pub fn bilateral_filter(
    img: &GrayImage,
    radius: i32,
    sigma_spatial: f64,
    sigma_color: f64,
) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    let window = (2 * radius + 1) as usize;
    let mut spatial = vec![0.0f64; window * window];
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let idx = ((dy + radius) as usize) * window + (dx + radius) as usize;
            let d2 = (dx * dx + dy * dy) as f64;
            spatial[idx] = (-d2 / (2.0 * sigma_spatial * sigma_spatial)).exp();
        }
    }
    let mut color = [0.0f64; 256];
    for (delta, weight) in color.iter_mut().enumerate() {
        let d = delta as f64;
        *weight = (-(d * d) / (2.0 * sigma_color * sigma_color)).exp();
    }

    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(row, out_row)| {
            let y = row as i32;
            for x in 0..width as i32 {
                let center = img.get_pixel(x as u32, y as u32)[0];
                let mut weight_sum = 0.0;
                let mut value_sum = 0.0;
                for dy in -radius..=radius {
                    let ny = y + dy;
                    if ny < 0 || ny >= height as i32 {
                        continue;
                    }
                    for dx in -radius..=radius {
                        let nx = x + dx;
                        if nx < 0 || nx >= width as i32 {
                            continue;
                        }
                        let neighbor = img.get_pixel(nx as u32, ny as u32)[0];
                        let idx = ((dy + radius) as usize) * window + (dx + radius) as usize;
                        let w = spatial[idx] * color[center.abs_diff(neighbor) as usize];
                        weight_sum += w;
                        value_sum += w * neighbor as f64;
                    }
                }
                out_row[x as usize] = (value_sum / weight_sum).round() as u8;
            }
        });

    out
}

/// Inverted adaptive threshold: foreground where the pixel sits below its
/// Gaussian-weighted local mean by more than `offset`.
pub fn adaptive_threshold_inv(img: &GrayImage, block_sigma: f32, offset: i16) -> GrayImage {
    let local_mean = gaussian_blur_f32(img, block_sigma);
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    for ((src, mean), dst) in img
        .pixels()
        .zip(local_mean.pixels())
        .zip(out.pixels_mut())
    {
        let fg = (src[0] as i16) <= (mean[0] as i16) - offset;
        dst[0] = if fg { 255 } else { 0 };
    }
    out
}

/// Inverted binary threshold: foreground where the pixel is at or below
/// `level`.
pub fn threshold_below(img: &GrayImage, level: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    for (src, dst) in img.pixels().zip(out.pixels_mut()) {
        dst[0] = if src[0] <= level { 255 } else { 0 };
    }
    out
}

/// Pixel-wise OR of two binary masks, in place.
pub fn or_assign(mask: &mut GrayImage, other: &GrayImage) {
    for (dst, src) in mask.pixels_mut().zip(other.pixels()) {
        dst[0] = dst[0].max(src[0]);
    }
}

/// Structuring element as a set of anchor-relative offsets.
#[derive(Debug, Clone)]
pub struct MorphKernel {
    offsets: Vec<(i32, i32)>,
}

impl MorphKernel {
    /// Elliptical kernel of the given square size. Sizes of 2 or less
    /// degenerate to a full square, matching the usual structuring-element
    /// construction.
    pub fn ellipse(size: u32) -> Self {
        let size = size.max(1) as i32;
        let anchor = size / 2;
        let mut offsets = Vec::new();
        if size <= 2 {
            for cy in 0..size {
                for cx in 0..size {
                    offsets.push((cx - anchor, cy - anchor));
                }
            }
        } else {
            let r = (size - 1) as f64 / 2.0;
            for cy in 0..size {
                for cx in 0..size {
                    let dx = cx as f64 - r;
                    let dy = cy as f64 - r;
                    if (dx / r).powi(2) + (dy / r).powi(2) <= 1.0 {
                        offsets.push((cx - anchor, cy - anchor));
                    }
                }
            }
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn morph_apply<F>(img: &GrayImage, kernel: &MorphKernel, seed: u8, fold: F) -> GrayImage
where
    F: Fn(u8, u8) -> u8,
{
    let (width, height) = img.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut acc = seed;
            for &(dx, dy) in &kernel.offsets {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                acc = fold(acc, img.get_pixel(nx as u32, ny as u32)[0]);
            }
            out.put_pixel(x as u32, y as u32, Luma([acc]));
        }
    }
    out
}

pub fn morph_dilate(img: &GrayImage, kernel: &MorphKernel) -> GrayImage {
    morph_apply(img, kernel, 0, u8::max)
}

pub fn morph_erode(img: &GrayImage, kernel: &MorphKernel) -> GrayImage {
    morph_apply(img, kernel, 255, u8::min)
}

/// CLOSE fills pinholes and rejoins slightly broken outlines.
pub fn morph_close(img: &GrayImage, kernel: &MorphKernel) -> GrayImage {
    morph_erode(&morph_dilate(img, kernel), kernel)
}

/// OPEN removes isolated speckle.
pub fn morph_open(img: &GrayImage, kernel: &MorphKernel) -> GrayImage {
    morph_dilate(&morph_erode(img, kernel), kernel)
}
