// fill.rs - 🚀 Blazingly Fast Fill Analysis with Memory Safety 🚀
//
// Decides how strongly a single bubble is marked by combining three
// independent darkness estimators over the pixels inside its contour.

use image::{imageops, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::drawing::draw_polygon_mut;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use imageproc::point::Point;

use crate::config::FillParams;
use crate::detect::Candidate;

const CANNY_LOW: f32 = 30.0;
const CANNY_HIGH: f32 = 100.0;
/// In-mask edge density above which the mark is probed for line segments.
const EDGE_DENSITY_LIMIT: f64 = 0.4;
/// More line segments than this means text or a strikethrough, not a fill.
const MAX_LINE_SEGMENTS: usize = 3;
const HOUGH_OPTIONS: LineDetectionOptions = LineDetectionOptions {
    vote_threshold: 5,
    suppression_radius: 2,
};

/// Classification of a single bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleState {
    Blank,
    Filled,
    Partial,
    Invalid,
}

/// Classify one bubble and report its fill ratio in `[0, 1]`.
///
/// The grayscale is sampled only inside the contour; the immediate
/// surround inside the bounding box serves as the paper reference.
pub fn analyze_fill(gray: &GrayImage, candidate: &Candidate, params: &FillParams) -> (BubbleState, f64) {
    let (width, height) = gray.dimensions();
    let bbox = &candidate.bbox;
    if candidate.points.len() < 3 || bbox.x < 0 || bbox.y < 0 {
        return (BubbleState::Invalid, 0.0);
    }
    let x = bbox.x as u32;
    let y = bbox.y as u32;
    let w = (bbox.w as u32).min(width.saturating_sub(x));
    let h = (bbox.h as u32).min(height.saturating_sub(y));
    if w == 0 || h == 0 {
        return (BubbleState::Invalid, 0.0);
    }

    let region = imageops::crop_imm(gray, x, y, w, h).to_image();
    let mask = contour_mask(&candidate.points, bbox.x, bbox.y, w, h);

    let inside: Vec<u8> = region
        .pixels()
        .zip(mask.pixels())
        .filter(|(_, m)| m[0] > 0)
        .map(|(p, _)| p[0])
        .collect();
    if inside.is_empty() {
        return (BubbleState::Invalid, 0.0);
    }

    let fill_ratio = calculate_fill_ratio(&region, &mask, &inside);

    if !is_valid_fill_pattern(&region, &mask) {
        return (BubbleState::Invalid, fill_ratio);
    }

    if fill_ratio > params.fill_threshold {
        (BubbleState::Filled, fill_ratio)
    } else if fill_ratio > params.partial_fill_threshold {
        (BubbleState::Partial, fill_ratio)
    } else {
        (BubbleState::Blank, fill_ratio)
    }
}

/// Filled polygon of the contour, translated into bounding-box coordinates.
fn contour_mask(points: &[Point<i32>], offset_x: i32, offset_y: i32, w: u32, h: u32) -> GrayImage {
    let mut mask = GrayImage::new(w, h);
    let local: Vec<Point<i32>> = points
        .iter()
        .map(|p| Point::new(p.x - offset_x, p.y - offset_y))
        .collect();
    draw_polygon_mut(&mut mask, &local, Luma([255]));
    mask
}

/// Weighted combination of three darkness estimators:
/// how much darker the inside is than the surround, how much of it sits
/// below a per-bubble threshold, and how much Otsu calls ink.
fn calculate_fill_ratio(region: &GrayImage, mask: &GrayImage, inside: &[u8]) -> f64 {
    let n = inside.len() as f64;
    let mean_inside = inside.iter().map(|&v| v as f64).sum::<f64>() / n;

    let outside: Vec<f64> = region
        .pixels()
        .zip(mask.pixels())
        .filter(|(_, m)| m[0] == 0)
        .map(|(p, _)| p[0] as f64)
        .collect();
    let background = if outside.is_empty() {
        255.0
    } else {
        outside.iter().sum::<f64>() / outside.len() as f64
    };

    let intensity_ratio = (1.0 - mean_inside / background.max(1.0)).clamp(0.0, 1.0);

    let variance = inside
        .iter()
        .map(|&v| (v as f64 - mean_inside).powi(2))
        .sum::<f64>()
        / n;
    let threshold = (mean_inside - variance.sqrt()).max(percentile(inside, 25.0));
    let dark = inside.iter().filter(|&&v| (v as f64) < threshold).count();
    let threshold_ratio = dark as f64 / n;

    let mut whitened = region.clone();
    for (dst, m) in whitened.pixels_mut().zip(mask.pixels()) {
        if m[0] == 0 {
            dst[0] = 255;
        }
    }
    let level = otsu_level(&whitened);
    let otsu_dark = inside.iter().filter(|&&v| v <= level).count();
    let otsu_ratio = otsu_dark as f64 / n;

    (0.4 * intensity_ratio + 0.3 * threshold_ratio + 0.3 * otsu_ratio).clamp(0.0, 1.0)
}

/// Linear-interpolated percentile of the sample, matching the usual
/// statistics convention.
fn percentile(values: &[u8], p: f64) -> f64 {
    let mut sorted: Vec<u8> = values.to_vec();
    sorted.sort_unstable();
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    let fraction = rank - low as f64;
    sorted[low] as f64 + (sorted[high] as f64 - sorted[low] as f64) * fraction
}

/// A plausible pencil fill is smooth inside: a mark that is mostly edges
/// resolving into several straight segments is text or a strikethrough.
fn is_valid_fill_pattern(region: &GrayImage, mask: &GrayImage) -> bool {
    let edges = canny(region, CANNY_LOW, CANNY_HIGH);

    let mut inside_count = 0usize;
    let mut edge_count = 0usize;
    for (e, m) in edges.pixels().zip(mask.pixels()) {
        if m[0] > 0 {
            inside_count += 1;
            if e[0] > 0 {
                edge_count += 1;
            }
        }
    }
    if inside_count == 0 {
        return true;
    }

    let edge_ratio = edge_count as f64 / inside_count as f64;
    if edge_ratio > EDGE_DENSITY_LIMIT {
        let lines = detect_lines(&edges, HOUGH_OPTIONS);
        if lines.len() > MAX_LINE_SEGMENTS {
            return false;
        }
    }
    true
}
