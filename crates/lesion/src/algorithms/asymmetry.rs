//! Asymmetry of a binary lesion mask.
//!
//! Three estimators with different blind spots:
//!
//! - **basic**: mirror difference of the largest region's bounding box,
//!   sensitive to translation inside the box
//! - **pca**: mirror difference after rotating the principal axis onto the
//!   x-axis, independent of lesion orientation
//! - **boundary**: mirror difference weighted by distance to the lesion
//!   boundary
//!
//! The combined score is their weighted sum clamped to 1.0.

use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::{euclidean_squared_distance_transform, Norm},
    geometric_transformations::{rotate_about_center, Interpolation},
    morphology::erode,
};
use tracing::debug;

use crate::{
    config::AsymmetryConfig,
    error::Result,
    schema::{FeatureGroup, GroupFeatures},
    traits::FeatureExtractor,
    types::{ExtractionInput, LesionMask},
};

/// Score reported when there is no lesion to measure
pub const MAX_ASYMMETRY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsymmetryFeatures {
    pub basic: f64,
    pub pca: f64,
    pub boundary: f64,
    pub combined: f64,
}

impl AsymmetryFeatures {
    pub fn to_group(&self) -> Result<GroupFeatures> {
        GroupFeatures::new(
            FeatureGroup::Asymmetry,
            vec![self.basic, self.pca, self.boundary, self.combined],
        )
    }
}

/// Mirror asymmetry of the largest connected region's bounding box.
///
/// Returns [`MAX_ASYMMETRY`] for an empty mask.
pub fn basic_asymmetry(mask: &LesionMask) -> f64 {
    let Some(region) = mask.largest_region() else {
        return MAX_ASYMMETRY;
    };
    if region.area == 0 {
        return MAX_ASYMMETRY;
    }

    let crop = mask.crop(region.min_x, region.min_y, region.width(), region.height());
    let left_right = crop.horizontal_mirror_difference();
    let top_bottom = crop.vertical_mirror_difference();

    (left_right + top_bottom) as f64 / (2.0 * region.area as f64)
}

/// Angle in radians of the first principal axis of the foreground pixel
/// coordinates, or `None` when the covariance is degenerate.
pub fn principal_angle(mask: &LesionMask) -> Option<f64> {
    let n = mask.count();
    if n < 2 {
        return None;
    }

    let (sum_x, sum_y) = mask
        .foreground()
        .fold((0.0f64, 0.0f64), |(sx, sy), (x, y)| (sx + x as f64, sy + y as f64));
    let mean_x = sum_x / n as f64;
    let mean_y = sum_y / n as f64;

    let (mut xx, mut xy, mut yy) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in mask.foreground() {
        let dx = x as f64 - mean_x;
        let dy = y as f64 - mean_y;
        xx += dx * dx;
        xy += dx * dy;
        yy += dy * dy;
    }
    let denom = (n - 1) as f64;
    xx /= denom;
    xy /= denom;
    yy /= denom;

    if xx + yy <= f64::EPSILON {
        return None;
    }

    let half_trace = (xx + yy) / 2.0;
    let spread = (((xx - yy) / 2.0).powi(2) + xy * xy).sqrt();
    let lambda = half_trace + spread;

    // Pick the eigenvector form that avoids cancellation
    let (vx, vy) = if xx >= yy {
        (lambda - yy, xy)
    } else {
        (xy, lambda - xx)
    };

    let angle = vy.atan2(vx);
    angle.is_finite().then_some(angle)
}

/// Rotate by `theta` radians on a canvas large enough that nothing is
/// clipped. Nearest-neighbour sampling keeps the mask binary.
fn rotate_unclipped(mask: &LesionMask, theta: f64) -> LesionMask {
    let (width, height) = mask.dimensions();
    let diagonal = ((width as f64).hypot(height as f64)).ceil() as u32 + 2;
    let pad_x = (diagonal.saturating_sub(width) + 1) / 2;
    let pad_y = (diagonal.saturating_sub(height) + 1) / 2;

    let mut canvas = GrayImage::new(width + 2 * pad_x, height + 2 * pad_y);
    image::imageops::replace(&mut canvas, &mask.to_luma(), pad_x as i64, pad_y as i64);

    let rotated = rotate_about_center(&canvas, theta as f32, Interpolation::Nearest, Luma([0u8]));
    LesionMask::from_luma(&rotated)
}

/// Mirror asymmetry after aligning the principal axis with the x-axis.
///
/// Falls back to [`basic_asymmetry`] for fewer than two pixels or a
/// degenerate covariance.
pub fn pca_asymmetry(mask: &LesionMask) -> f64 {
    let count = mask.count();
    if count < 2 {
        return basic_asymmetry(mask);
    }
    let Some(angle) = principal_angle(mask) else {
        debug!("degenerate principal axis, using basic asymmetry");
        return basic_asymmetry(mask);
    };

    let rotated = rotate_unclipped(mask, -angle);
    rotated.horizontal_mirror_difference() as f64 / (2.0 * count as f64)
}

/// Left-right mirror difference weighted by each pixel's distance to the
/// nearest boundary pixel, normalised by the total weight (at least 1).
pub fn boundary_asymmetry(mask: &LesionMask) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }

    let luma = mask.to_luma();
    let eroded = erode(&luma, Norm::L1, 1);
    let boundary = GrayImage::from_fn(luma.width(), luma.height(), |x, y| {
        if luma.get_pixel(x, y)[0] > 0 && eroded.get_pixel(x, y)[0] == 0 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    if boundary.pixels().all(|p| p[0] == 0) {
        // Mask covers the whole raster, which is symmetric
        return 0.0;
    }

    let distances = euclidean_squared_distance_transform(&boundary);
    let flipped = mask.flip_horizontal();

    let mut weighted_diff = 0.0f64;
    let mut total_weight = 0.0f64;
    for (x, y, d) in distances.enumerate_pixels() {
        let weight = d[0].sqrt();
        total_weight += weight;
        if mask.get(x, y) != flipped.get(x, y) {
            weighted_diff += weight;
        }
    }

    weighted_diff / total_weight.max(1.0)
}

#[derive(Debug, Clone, Default)]
pub struct AsymmetryExtractor {
    pub config: AsymmetryConfig,
}

impl AsymmetryExtractor {
    pub fn new(config: AsymmetryConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, mask: &LesionMask) -> AsymmetryFeatures {
        let basic = basic_asymmetry(mask);
        let pca = pca_asymmetry(mask);
        let boundary = boundary_asymmetry(mask);
        let combined = self.config.basic_weight * basic
            + self.config.pca_weight * pca
            + self.config.boundary_weight * boundary;

        AsymmetryFeatures {
            basic,
            pca,
            boundary,
            combined: combined.min(1.0),
        }
    }
}

impl FeatureExtractor for AsymmetryExtractor {
    fn group(&self) -> FeatureGroup {
        FeatureGroup::Asymmetry
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<GroupFeatures> {
        self.compute(input.mask).to_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse(width: u32, height: u32, rx: f64, ry: f64) -> LesionMask {
        let cx = (width as f64 - 1.0) / 2.0;
        let cy = (height as f64 - 1.0) / 2.0;
        LesionMask::from_fn(width, height, |x, y| {
            let dx = (x as f64 - cx) / rx;
            let dy = (y as f64 - cy) / ry;
            dx * dx + dy * dy <= 1.0
        })
    }

    /// Ellipse whose long axis is turned `tilt` radians from the x-axis
    fn tilted_ellipse(size: u32, rx: f64, ry: f64, tilt: f64) -> LesionMask {
        let c = (size as f64 - 1.0) / 2.0;
        let (sin, cos) = tilt.sin_cos();
        LesionMask::from_fn(size, size, |x, y| {
            let dx = x as f64 - c;
            let dy = y as f64 - c;
            let u = (dx * cos + dy * sin) / rx;
            let v = (-dx * sin + dy * cos) / ry;
            u * u + v * v <= 1.0
        })
    }

    fn l_shape() -> LesionMask {
        LesionMask::from_fn(40, 40, |x, y| {
            (5..35).contains(&y) && (5..12).contains(&x) || (28..35).contains(&y) && (5..35).contains(&x)
        })
    }

    #[test]
    fn test_symmetric_mask_has_zero_basic_asymmetry() {
        let mask = ellipse(41, 31, 15.0, 9.0);
        assert_eq!(basic_asymmetry(&mask), 0.0);
    }

    #[test]
    fn test_empty_mask_uses_sentinel() {
        let mask = LesionMask::new(16, 16);
        let features = AsymmetryExtractor::default().compute(&mask);
        assert_eq!(features.basic, MAX_ASYMMETRY);
        assert_eq!(features.pca, MAX_ASYMMETRY);
        assert_eq!(features.boundary, 0.0);
        assert!(features.combined <= 1.0);
    }

    #[test]
    fn test_single_pixel_falls_back_to_basic() {
        let mut mask = LesionMask::new(9, 9);
        mask.set(4, 4, true);
        assert_eq!(pca_asymmetry(&mask), basic_asymmetry(&mask));
        assert_eq!(basic_asymmetry(&mask), 0.0);
    }

    #[test]
    fn test_principal_angle_follows_long_axis() {
        let horizontal = ellipse(61, 61, 25.0, 6.0);
        let angle = principal_angle(&horizontal).expect("well defined axis");
        assert!(angle.sin().abs() < 1e-6, "angle {angle}");

        let vertical = ellipse(61, 61, 6.0, 25.0);
        let angle = principal_angle(&vertical).expect("well defined axis");
        assert!(angle.cos().abs() < 1e-6, "angle {angle}");
    }

    #[test]
    fn test_pca_asymmetry_low_for_aligned_ellipse() {
        let mask = ellipse(61, 61, 25.0, 10.0);
        assert!(pca_asymmetry(&mask) < 0.05);
    }

    #[test]
    fn test_pca_aligns_tilted_ellipse() {
        let mask = tilted_ellipse(91, 32.0, 11.0, 30f64.to_radians());
        let pca = pca_asymmetry(&mask);
        let basic = basic_asymmetry(&mask);
        assert!(pca < 0.05, "pca {pca}");
        assert!(basic > 3.0 * pca && basic > 0.1, "basic {basic} vs pca {pca}");
    }

    #[test]
    fn test_rotation_undoes_principal_angle() {
        let mask = tilted_ellipse(91, 32.0, 11.0, 30f64.to_radians());
        let angle = principal_angle(&mask).expect("well defined axis");

        let aligned = rotate_unclipped(&mask, -angle);
        let turned_further = rotate_unclipped(&mask, angle);
        assert!(
            2 * aligned.horizontal_mirror_difference() < turned_further.horizontal_mirror_difference(),
            "aligned {} vs turned {}",
            aligned.horizontal_mirror_difference(),
            turned_further.horizontal_mirror_difference()
        );
        // Aligned long axis lies along x: wider than tall
        let region = aligned.largest_region().expect("rotated mask keeps its pixels");
        assert!(region.width() > 2 * region.height());
    }

    #[test]
    fn test_irregular_shape_scores_higher() {
        let extractor = AsymmetryExtractor::default();
        let regular = extractor.compute(&ellipse(41, 41, 15.0, 15.0));
        let irregular = extractor.compute(&l_shape());
        assert!(irregular.basic > regular.basic);
        assert!(irregular.boundary > regular.boundary);
        assert!(irregular.combined > regular.combined);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let extractor = AsymmetryExtractor::default();
        for mask in [l_shape(), ellipse(30, 20, 12.0, 4.0), LesionMask::new(5, 5)] {
            let f = extractor.compute(&mask);
            for score in [f.basic, f.pca, f.boundary] {
                assert!((0.0..=1.5).contains(&score), "score {score}");
            }
            assert!(f.boundary <= 1.0);
            assert!(f.combined <= 1.0);
        }
    }

    #[test]
    fn test_full_mask_boundary_is_zero() {
        let mask = LesionMask::from_fn(10, 10, |_, _| true);
        assert_eq!(boundary_asymmetry(&mask), 0.0);
    }
}
