use geo::{Area, Centroid, ConvexHull, EuclideanLength};
use geo_types::{Coord, LineString, Polygon};
use imageproc::contours::{find_contours, BorderType};

use crate::{
    config::BorderConfig,
    error::Result,
    schema::{FeatureGroup, GroupFeatures},
    traits::FeatureExtractor,
    types::{ExtractionInput, LesionMask},
};

/// Shape descriptors of the lesion's outer contour. All zero when no usable
/// contour exists.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BorderFeatures {
    /// perimeter² / (4π · area), 1 for a disk
    pub compactness: f64,
    /// area / convex hull area
    pub solidity: f64,
    /// perimeter / convex hull perimeter
    pub roughness: f64,
    /// Coefficient of variation of centroid-to-contour distances
    pub radial_cv: f64,
}

impl BorderFeatures {
    pub fn to_group(&self) -> Result<GroupFeatures> {
        GroupFeatures::new(
            FeatureGroup::Border,
            vec![self.compactness, self.solidity, self.roughness, self.radial_cv],
        )
    }
}

/// Largest outer contour of the mask as a polygon
pub fn lesion_outline(mask: &LesionMask, min_points: usize) -> Option<Polygon<f64>> {
    if mask.is_empty() {
        return None;
    }

    find_contours::<i32>(&mask.to_luma())
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter(|contour| contour.points.len() >= min_points.max(3))
        .map(|contour| {
            let coords: Vec<Coord<f64>> = contour
                .points
                .iter()
                .map(|p| Coord { x: p.x as f64, y: p.y as f64 })
                .collect();
            Polygon::new(LineString::new(coords), vec![])
        })
        .filter(|polygon| polygon.unsigned_area() > 0.0)
        .max_by(|a, b| {
            a.unsigned_area()
                .partial_cmp(&b.unsigned_area())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Coefficient of variation of the centroid-to-vertex distances of the
/// outline. Each vertex counts once.
pub fn radial_cv(outline: &Polygon<f64>) -> f64 {
    let Some(center) = outline.centroid() else {
        return 0.0;
    };
    // The exterior ring repeats its first coordinate at the end
    let distances: Vec<f64> = outline
        .exterior()
        .coords()
        .skip(1)
        .map(|c| (c.x - center.x()).hypot(c.y - center.y()))
        .collect();
    if distances.is_empty() {
        return 0.0;
    }

    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

#[derive(Debug, Clone, Default)]
pub struct BorderExtractor {
    pub config: BorderConfig,
}

impl BorderExtractor {
    pub fn new(config: BorderConfig) -> Self {
        Self { config }
    }

    pub fn compute(&self, mask: &LesionMask) -> BorderFeatures {
        let Some(outline) = lesion_outline(mask, self.config.min_contour_points) else {
            return BorderFeatures::default();
        };

        let area = outline.unsigned_area();
        let perimeter = outline.exterior().euclidean_length();
        let hull = outline.convex_hull();
        let hull_area = hull.unsigned_area();
        let hull_perimeter = hull.exterior().euclidean_length();

        let compactness = perimeter * perimeter / (4.0 * std::f64::consts::PI * area);
        let solidity = if hull_area > 0.0 { (area / hull_area).min(1.0) } else { 0.0 };
        let roughness = if hull_perimeter > 0.0 { perimeter / hull_perimeter } else { 0.0 };

        let radial_cv = radial_cv(&outline);

        BorderFeatures {
            compactness,
            solidity,
            roughness,
            radial_cv,
        }
    }
}

impl FeatureExtractor for BorderExtractor {
    fn group(&self) -> FeatureGroup {
        FeatureGroup::Border
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<GroupFeatures> {
        self.compute(input.mask).to_group()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(size: u32, radius: f64) -> LesionMask {
        let c = size as f64 / 2.0;
        LesionMask::from_fn(size, size, |x, y| (x as f64 - c).hypot(y as f64 - c) <= radius)
    }

    fn star(size: u32) -> LesionMask {
        let c = size as f64 / 2.0;
        LesionMask::from_fn(size, size, |x, y| {
            let dx = x as f64 - c;
            let dy = y as f64 - c;
            let theta = dy.atan2(dx);
            let r = 12.0 + 8.0 * (5.0 * theta).cos();
            dx.hypot(dy) <= r
        })
    }

    #[test]
    fn test_disk_is_compact_and_convex() {
        let features = BorderExtractor::default().compute(&disk(64, 20.0));
        assert!(features.compactness > 0.8 && features.compactness < 1.3, "{features:?}");
        assert!(features.solidity > 0.95);
        assert!(features.roughness >= 1.0 && features.roughness < 1.1);
        assert!(features.radial_cv < 0.05);
    }

    #[test]
    fn test_star_is_irregular() {
        let extractor = BorderExtractor::default();
        let round = extractor.compute(&disk(64, 20.0));
        let spiky = extractor.compute(&star(64));
        assert!(spiky.compactness > round.compactness);
        assert!(spiky.solidity < round.solidity);
        assert!(spiky.roughness > round.roughness);
        assert!(spiky.radial_cv > round.radial_cv);
    }

    #[test]
    fn test_radial_cv_counts_each_vertex_once() {
        let kite = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, -1.0), (6.0, 0.0), (2.0, 1.0)]),
            vec![],
        );
        // Centroid of the kite is (8/3, 0)
        let distances = [8.0 / 3.0, (4.0f64 / 9.0 + 1.0).sqrt(), (4.0f64 / 9.0 + 1.0).sqrt(), 10.0 / 3.0];
        let mean = distances.iter().sum::<f64>() / 4.0;
        let std = (distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / 4.0).sqrt();
        assert!((radial_cv(&kite) - std / mean).abs() < 1e-12, "{}", radial_cv(&kite));
    }

    #[test]
    fn test_degenerate_masks_give_zeros() {
        let extractor = BorderExtractor::default();
        assert_eq!(extractor.compute(&LesionMask::new(10, 10)), BorderFeatures::default());

        let mut single = LesionMask::new(10, 10);
        single.set(5, 5, true);
        assert_eq!(extractor.compute(&single), BorderFeatures::default());
    }

    #[test]
    fn test_group_has_border_columns() {
        let group = BorderExtractor::default().compute(&disk(32, 10.0)).to_group().expect("arity");
        assert_eq!(group.group(), FeatureGroup::Border);
        assert!(group.get("b_solidity").is_some());
    }
}
