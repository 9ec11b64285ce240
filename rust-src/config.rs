// config.rs - 🚀 Blazingly Fast Configuration Management 🚀

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Detection configuration with defaults tuned for scanned answer sheets 🚀
///
/// The default values are part of the observable contract: changing them
/// changes which contours survive filtering and how fills are classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub sheet: SheetLayout,
    pub bubble_filter: BubbleFilterParams,
    pub grouping: GroupingParams,
    pub fill: FillParams,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sheet: SheetLayout::default(),
            bubble_filter: BubbleFilterParams::default(),
            grouping: GroupingParams::default(),
            fill: FillParams::default(),
        }
    }
}

impl DetectionConfig {
    /// Load a configuration override from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config YAML: {}", path.as_ref().display()))?;
        Ok(config)
    }
}

/// Physical layout of the answer sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetLayout {
    /// Choices per question (bubbles per row, lettered from 'A').
    pub num_choices: usize,
    /// Vertical stacks of question rows across the page.
    pub num_columns: usize,
    /// Fraction of the page height above which contours belong to the header.
    pub header_fraction: f64,
    /// Fraction of the page height below which contours belong to the footer.
    pub footer_fraction: f64,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            num_choices: 5,
            num_columns: 4,
            header_fraction: 0.40,
            footer_fraction: 0.95,
        }
    }
}

/// Geometric filters applied to candidate contours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleFilterParams {
    pub min_bubble_area: f64,
    pub max_bubble_area: f64,
    /// Relative area bounds as fractions of W·H, intersected with the
    /// absolute bounds above.
    pub relative_min_area: f64,
    pub relative_max_area: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub circularity_threshold: f64,
    pub min_contour_points: usize,
}

impl Default for BubbleFilterParams {
    fn default() -> Self {
        Self {
            min_bubble_area: 80.0,
            max_bubble_area: 1600.0,
            relative_min_area: 0.00005,
            relative_max_area: 0.002,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.0,
            circularity_threshold: 0.8,
            min_contour_points: 5,
        }
    }
}

/// Spatial clustering tolerances for the question lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingParams {
    pub row_tolerance: f64,
    pub column_tolerance: f64,
    /// Bounding-box overlap fraction above which two bubbles in one row are
    /// considered duplicates.
    pub overlap_fraction: f64,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            row_tolerance: 50.0,
            column_tolerance: 150.0,
            overlap_fraction: 0.3,
        }
    }
}

/// Fill-ratio classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillParams {
    pub fill_threshold: f64,
    pub partial_fill_threshold: f64,
}

impl Default for FillParams {
    fn default() -> Self {
        Self {
            fill_threshold: 0.60,
            partial_fill_threshold: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_contract_constants() {
        let config = DetectionConfig::default();
        assert_eq!(config.sheet.num_choices, 5);
        assert_eq!(config.sheet.num_columns, 4);
        assert_eq!(config.bubble_filter.min_bubble_area, 80.0);
        assert_eq!(config.bubble_filter.max_bubble_area, 1600.0);
        assert_eq!(config.grouping.row_tolerance, 50.0);
        assert_eq!(config.grouping.column_tolerance, 150.0);
        assert_eq!(config.fill.fill_threshold, 0.60);
        assert_eq!(config.fill.partial_fill_threshold, 0.25);
    }

    #[test]
    fn partial_yaml_override_keeps_defaults() {
        let config: DetectionConfig =
            serde_yaml::from_str("grouping:\n  row_tolerance: 60\n").unwrap();
        assert_eq!(config.grouping.row_tolerance, 60.0);
        assert_eq!(config.grouping.column_tolerance, 150.0);
        assert_eq!(config.sheet.num_choices, 5);
    }
}
