//! Tunable constants of every pipeline component.
//!
//! All thresholds here are fixed configuration, not statistics derived from
//! the data. Defaults reproduce the reference behaviour of the extractors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{LesionError, Result};
use crate::schema::FeatureGroup;

/// Lesion segmentation (circular prior + colour clustering)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Side of the square working raster every image is resized to
    pub working_size: u32,
    /// Prior radius is `min(width, height) / radius_divisor`
    pub radius_divisor: f32,
    /// Number of colour clusters
    pub clusters: usize,
    /// Seed for k-means++ initialisation
    pub seed: u64,
    pub max_iterations: usize,
    /// Stop when no centroid moves further than this (in 8-bit colour units)
    pub tolerance: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            working_size: 256,
            radius_divisor: 3.0,
            clusters: 2,
            seed: 0,
            max_iterations: 300,
            tolerance: 1e-4,
        }
    }
}

/// Weights of the combined asymmetry score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AsymmetryConfig {
    pub basic_weight: f64,
    pub pca_weight: f64,
    pub boundary_weight: f64,
}

impl Default for AsymmetryConfig {
    fn default() -> Self {
        Self {
            basic_weight: 0.4,
            pca_weight: 0.3,
            boundary_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BorderConfig {
    /// Contours with fewer points are treated as degenerate
    pub min_contour_points: usize,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self { min_contour_points: 3 }
    }
}

/// Closed interval on one HSV channel, all channels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelRange {
    pub min: f32,
    pub max: f32,
}

impl ChannelRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min) || !(0.0..=1.0).contains(&self.max) || self.min > self.max {
            return Err(LesionError::InvalidConfig(format!(
                "{name} range [{}, {}] must satisfy 0 <= min <= max <= 1",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// HSV box classifying a lesion pixel as blue veil
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BlueVeilConfig {
    /// Cyan-blue (~187°) to blue-magenta (~270°)
    pub hue: ChannelRange,
    /// Excludes near-gray and over-saturated pixels
    pub saturation: ChannelRange,
    /// Excludes near-black and near-white pixels
    pub value: ChannelRange,
    /// Report RGB mean/std divided by 255
    pub normalize_colors: bool,
}

impl Default for BlueVeilConfig {
    fn default() -> Self {
        Self {
            hue: ChannelRange::new(0.52, 0.75),
            saturation: ChannelRange::new(0.10, 0.75),
            value: ChannelRange::new(0.30, 0.95),
            normalize_colors: true,
        }
    }
}

/// Hair detection and inpainting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HairRemovalConfig {
    /// Side of the square blackhat structuring element (odd)
    pub blackhat_kernel: u8,
    /// Blackhat response above this is hair
    pub threshold: u8,
    /// Side of the square dilation element (odd)
    pub dilation_kernel: u8,
    pub dilation_iterations: u8,
    /// Neighbourhood radius used when inpainting a pixel
    pub inpaint_radius: u8,
    /// Fewer significant segments than this leaves the image untouched
    pub min_hair_segments: usize,
    /// Segments must be larger than this many pixels to count
    pub min_segment_area: usize,
}

impl Default for HairRemovalConfig {
    fn default() -> Self {
        Self {
            blackhat_kernel: 15,
            threshold: 18,
            dilation_kernel: 3,
            dilation_iterations: 2,
            inpaint_radius: 5,
            min_hair_segments: 1,
            min_segment_area: 5,
        }
    }
}

/// Full extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LesionConfig {
    /// Run hair removal before segmentation and emit `hr_*` columns
    pub remove_hair: bool,
    /// Extractors to run, in column order
    pub feature_groups: Vec<FeatureGroup>,
    pub segmenter: SegmenterConfig,
    pub asymmetry: AsymmetryConfig,
    pub border: BorderConfig,
    pub blue_veil: BlueVeilConfig,
    pub hair: HairRemovalConfig,
}

impl Default for LesionConfig {
    fn default() -> Self {
        Self {
            remove_hair: false,
            feature_groups: FeatureGroup::defaults(),
            segmenter: SegmenterConfig::default(),
            asymmetry: AsymmetryConfig::default(),
            border: BorderConfig::default(),
            blue_veil: BlueVeilConfig::default(),
            hair: HairRemovalConfig::default(),
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.working_size < 3 {
            return Err(LesionError::InvalidConfig("working_size must be at least 3".into()));
        }
        if !(self.radius_divisor.is_finite() && self.radius_divisor > 0.0) {
            return Err(LesionError::InvalidConfig("radius_divisor must be positive".into()));
        }
        if self.clusters < 2 {
            return Err(LesionError::InvalidConfig("clusters must be at least 2".into()));
        }
        if self.max_iterations == 0 {
            return Err(LesionError::InvalidConfig("max_iterations must be positive".into()));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(LesionError::InvalidConfig("tolerance must be non-negative".into()));
        }
        Ok(())
    }
}

impl HairRemovalConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("blackhat_kernel", self.blackhat_kernel),
            ("dilation_kernel", self.dilation_kernel),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(LesionError::InvalidConfig(format!("{name} must be an odd size, got {size}")));
            }
        }
        if self.inpaint_radius == 0 {
            return Err(LesionError::InvalidConfig("inpaint_radius must be positive".into()));
        }
        Ok(())
    }

    /// Chebyshev radius equivalent to `dilation_iterations` passes of the square kernel
    pub fn dilation_radius(&self) -> u8 {
        (self.dilation_kernel / 2).saturating_mul(self.dilation_iterations)
    }
}

impl LesionConfig {
    pub fn validate(&self) -> Result<()> {
        self.segmenter.validate()?;
        self.hair.validate()?;
        self.blue_veil.hue.validate("hue")?;
        self.blue_veil.saturation.validate("saturation")?;
        self.blue_veil.value.validate("value")?;

        let weights = [
            self.asymmetry.basic_weight,
            self.asymmetry.pca_weight,
            self.asymmetry.boundary_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(LesionError::InvalidConfig("asymmetry weights must be non-negative".into()));
        }
        if self.feature_groups.contains(&FeatureGroup::Hair) {
            return Err(LesionError::InvalidConfig(
                "hair columns are enabled with `remove_hair`, not as a feature group".into(),
            ));
        }
        if self.feature_groups.is_empty() && !self.remove_hair {
            return Err(LesionError::InvalidConfig("no feature groups enabled".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        LesionConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn test_even_kernel_is_rejected() {
        let mut config = LesionConfig::default();
        config.hair.blackhat_kernel = 14;
        assert!(matches!(config.validate(), Err(LesionError::InvalidConfig(_))));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let mut config = LesionConfig::default();
        config.blue_veil.hue = ChannelRange::new(0.8, 0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: LesionConfig =
            serde_json::from_str(r#"{ "remove_hair": true, "segmenter": { "seed": 42 } }"#)
                .expect("partial config parses");
        assert!(config.remove_hair);
        assert_eq!(config.segmenter.seed, 42);
        assert_eq!(config.segmenter.working_size, 256);
        assert_eq!(config.feature_groups, FeatureGroup::defaults());
    }

    #[test]
    fn test_dilation_radius() {
        assert_eq!(HairRemovalConfig::default().dilation_radius(), 2);
    }
}
