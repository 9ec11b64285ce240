// detect.rs - 🚀 Blazingly Fast Bubble Detection with Memory Safety 🚀

use image::imageops;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::point::Point;
use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::geometry::{self, BoundingBox};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Fraction of edge pixels in a crop above which it reads as text or a line.
const EDGE_DENSITY_LIMIT: f64 = 0.3;
/// Vertical band (fractions of page height) where answer bubbles live.
const BUBBLE_BAND_TOP: f64 = 0.35;
const BUBBLE_BAND_BOTTOM: f64 = 0.95;
/// Below this many pixels on a side a contour cannot be a bubble.
const MIN_BUBBLE_SIDE: i32 = 10;
/// Solidity floor for the convex-hull fallback of shape validation.
const MIN_SOLIDITY: f64 = 0.6;
/// Accepted window for contour area vs fitted-ellipse area.
const ELLIPSE_RATIO_RANGE: (f64, f64) = (0.4, 1.6);

/// One surviving bubble contour with its cached geometry.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub points: Vec<Point<i32>>,
    pub bbox: BoundingBox,
    pub area: f64,
    pub perimeter: f64,
}

impl Candidate {
    pub fn center_x(&self) -> i32 {
        self.bbox.center_x()
    }

    pub fn center_y(&self) -> i32 {
        self.bbox.center_y()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.bbox.w as f64 / self.bbox.h as f64
    }

    pub fn circularity(&self) -> f64 {
        geometry::circularity(self.area, self.perimeter)
    }
}

/// Extract candidate bubble contours from the binary mask.
///
/// The area window is the intersection of the absolute bounds with bounds
/// relative to the page area, so the same configuration works across scan
/// resolutions. The header and footer of the sheet are excluded outright.
pub fn detect_bubbles(
    mask: &GrayImage,
    gray: &GrayImage,
    config: &DetectionConfig,
) -> Vec<Candidate> {
    info!("Detecting bubble contours in scanned image");

    let (width, height) = mask.dimensions();
    let page_area = (width * height) as f64;
    let filter = &config.bubble_filter;
    let min_area = filter.min_bubble_area.max(page_area * filter.relative_min_area);
    let max_area = filter.max_bubble_area.min(page_area * filter.relative_max_area);
    info!("Using area range: {:.0} - {:.0}", min_area, max_area);

    let header_boundary = (height as f64 * config.sheet.header_fraction) as i32;
    let footer_boundary = (height as f64 * config.sheet.footer_fraction) as i32;

    let mut candidates = Vec::new();
    for contour in find_contours::<i32>(mask) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let points = contour.points;
        let area = geometry::contour_area(&points);
        if area <= min_area || area >= max_area {
            continue;
        }

        let bbox = BoundingBox::of(&points);
        if bbox.y < header_boundary || bbox.y > footer_boundary {
            continue;
        }

        let aspect_ratio = bbox.w as f64 / bbox.h as f64;
        if aspect_ratio <= filter.min_aspect_ratio || aspect_ratio >= filter.max_aspect_ratio {
            continue;
        }

        let perimeter = geometry::perimeter(&points);
        if perimeter <= 0.0 {
            continue;
        }
        if geometry::circularity(area, perimeter) <= filter.circularity_threshold {
            continue;
        }

        if !is_valid_bubble(&points, area, filter.min_contour_points) {
            continue;
        }
        if is_text_or_line(&bbox, gray) {
            continue;
        }

        candidates.push(Candidate {
            points,
            bbox,
            area,
            perimeter,
        });
    }

    info!("Found {} potential bubble contours", candidates.len());
    candidates
}

/// Shape validation: the contour should fill its fitted ellipse about as
/// well as a drawn circle does. Degenerate fits fall back to convex-hull
/// solidity.
fn is_valid_bubble(points: &[Point<i32>], area: f64, min_points: usize) -> bool {
    if points.len() < min_points {
        return false;
    }

    if let Some(ellipse_area) = geometry::fitted_ellipse_area(points) {
        let ratio = area / ellipse_area;
        return ratio > ELLIPSE_RATIO_RANGE.0 && ratio < ELLIPSE_RATIO_RANGE.1;
    }

    let hull_area = geometry::convex_hull_area(points);
    if hull_area > 0.0 {
        return area / hull_area > MIN_SOLIDITY;
    }
    false
}

/// Reject crops that look like printed text or rule lines rather than a
/// bubble: too small, too elongated, too edge-dense, or outside the
/// vertical band where the answer grid sits.
fn is_text_or_line(bbox: &BoundingBox, gray: &GrayImage) -> bool {
    if bbox.w < MIN_BUBBLE_SIDE || bbox.h < MIN_BUBBLE_SIDE {
        return true;
    }
    if bbox.w > bbox.h * 3 || bbox.h > bbox.w * 3 {
        return true;
    }

    let (width, height) = gray.dimensions();
    if bbox.x < 0 || bbox.y < 0 {
        return true;
    }
    let x = bbox.x as u32;
    let y = bbox.y as u32;
    let w = (bbox.w as u32).min(width.saturating_sub(x));
    let h = (bbox.h as u32).min(height.saturating_sub(y));
    if w == 0 || h == 0 {
        return true;
    }

    let region = imageops::crop_imm(gray, x, y, w, h).to_image();
    let edges = canny(&region, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
    let edge_ratio = edge_pixels as f64 / (w * h) as f64;
    if edge_ratio > EDGE_DENSITY_LIMIT {
        debug!("Rejecting edge-dense region at ({}, {})", bbox.x, bbox.y);
        return true;
    }

    let relative_y = bbox.y as f64 / height as f64;
    relative_y < BUBBLE_BAND_TOP || relative_y > BUBBLE_BAND_BOTTOM
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
    use imageproc::rect::Rect;

    /// Mask with a filled disk (candidate ink) and a matching grayscale
    /// sheet with the printed bubble outline.
    fn sheet_with_ring(size: u32, cx: i32, cy: i32, r: i32) -> (GrayImage, GrayImage) {
        let mut mask = GrayImage::new(size, size);
        draw_filled_circle_mut(&mut mask, (cx, cy), r, Luma([255]));
        let mut gray = GrayImage::from_pixel(size, size, Luma([255]));
        draw_hollow_circle_mut(&mut gray, (cx, cy), r, Luma([0]));
        draw_hollow_circle_mut(&mut gray, (cx, cy), r - 1, Luma([0]));
        (mask, gray)
    }

    #[test]
    fn accepts_a_ring_in_the_answer_band() {
        let (mask, gray) = sheet_with_ring(600, 300, 300, 12);
        let candidates = detect_bubbles(&mask, &gray, &DetectionConfig::default());
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert!((c.center_x() - 300).abs() <= 2);
        assert!((c.center_y() - 300).abs() <= 2);
        assert!(c.circularity() > 0.8);
    }

    #[test]
    fn rejects_bubbles_in_the_header() {
        let (mask, gray) = sheet_with_ring(600, 300, 100, 12);
        let candidates = detect_bubbles(&mask, &gray, &DetectionConfig::default());
        assert!(candidates.is_empty());
    }

    #[test]
    fn rejects_elongated_marks() {
        let mut mask = GrayImage::new(600, 600);
        draw_filled_rect_mut(&mut mask, Rect::at(280, 300).of_size(48, 8), Luma([255]));
        let gray = GrayImage::from_pixel(600, 600, Luma([255]));
        let candidates = detect_bubbles(&mask, &gray, &DetectionConfig::default());
        assert!(candidates.is_empty());
    }

    #[test]
    fn rejects_speckle_below_minimum_area() {
        let (mask, gray) = sheet_with_ring(600, 300, 300, 4);
        let candidates = detect_bubbles(&mask, &gray, &DetectionConfig::default());
        assert!(candidates.is_empty());
    }
}
