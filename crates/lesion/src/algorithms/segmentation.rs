use image::RgbImage;
use tracing::debug;

use crate::{
    algorithms::kmeans::{ColorVector, KMeans},
    config::SegmenterConfig,
    error::{LesionError, Result},
    io::resize_rgb,
    traits::LesionSegmenter,
    types::{LesionMask, Segmentation},
};

/// Disk of radius `min(width, height) / divisor` around the image centre.
///
/// Lesions are assumed to be roughly centred in dermoscopic captures.
pub fn circular_prior(width: u32, height: u32, divisor: f32) -> LesionMask {
    let center_x = (width / 2) as f32;
    let center_y = (height / 2) as f32;
    let radius = (width.min(height) as f32 / divisor).floor();
    let radius_sq = radius * radius;

    LesionMask::from_fn(width, height, |x, y| {
        let dx = x as f32 - center_x;
        let dy = y as f32 - center_y;
        dx * dx + dy * dy <= radius_sq
    })
}

/// Circular prior intersected with the colour cluster found at the image centre
#[derive(Debug, Clone, Default)]
pub struct KMeansSegmenter {
    pub config: SegmenterConfig,
}

impl KMeansSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }
}

impl LesionSegmenter for KMeansSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<Segmentation> {
        if image.width() == 0 || image.height() == 0 {
            return Err(LesionError::Segmentation("image has no pixels".into()));
        }

        let size = self.config.working_size;
        let raster = resize_rgb(image, size, size);
        let (width, height) = raster.dimensions();

        let points: Vec<ColorVector> = raster
            .pixels()
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect();
        let fit = KMeans::from_config(&self.config).fit(&points)?;

        let center = (height / 2) as usize * width as usize + (width / 2) as usize;
        let lesion_label = fit.labels[center];
        let prior = circular_prior(width, height, self.config.radius_divisor);

        let mask = LesionMask::from_fn(width, height, |x, y| {
            prior.get(x, y) && fit.labels[y as usize * width as usize + x as usize] == lesion_label
        });

        debug!(
            iterations = fit.iterations,
            lesion_pixels = mask.count(),
            "segmented {}x{} raster",
            width,
            height
        );

        Ok(Segmentation { raster, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn disk_image(size: u32, radius: f32, inside: Rgb<u8>, outside: Rgb<u8>) -> RgbImage {
        let c = size as f32 / 2.0;
        RgbImage::from_fn(size, size, |x, y| {
            let dx = x as f32 - c;
            let dy = y as f32 - c;
            if dx * dx + dy * dy <= radius * radius { inside } else { outside }
        })
    }

    #[test]
    fn test_circular_prior_radius() {
        let prior = circular_prior(9, 9, 3.0);
        assert!(prior.get(4, 4));
        assert!(prior.get(7, 4));
        assert!(!prior.get(8, 4));
        assert!(!prior.get(0, 0));
    }

    #[test]
    fn test_segments_centered_dark_disk() {
        let image = disk_image(64, 15.0, Rgb([60, 40, 30]), Rgb([220, 190, 170]));
        let segmenter = KMeansSegmenter::new(SegmenterConfig { working_size: 64, ..Default::default() });
        let segmentation = segmenter.segment(&image).expect("segmentation succeeds");

        let mask = &segmentation.mask;
        assert_eq!(mask.dimensions(), (64, 64));
        assert!(mask.get(32, 32));
        assert!(!mask.get(2, 2));
        let area = mask.count() as f32;
        let expected = std::f32::consts::PI * 15.0 * 15.0;
        assert!((area - expected).abs() / expected < 0.15, "area {area} vs {expected}");
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let image = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, ((x + y) * 3) as u8]));
        let segmenter = KMeansSegmenter::new(SegmenterConfig { working_size: 32, ..Default::default() });
        let first = segmenter.segment(&image).expect("segmentation succeeds");
        let second = segmenter.segment(&image).expect("segmentation succeeds");
        assert_eq!(first.mask, second.mask);
    }

    #[test]
    fn test_uniform_image_gives_prior() {
        let image = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let segmenter = KMeansSegmenter::new(SegmenterConfig { working_size: 32, ..Default::default() });
        let segmentation = segmenter.segment(&image).expect("uniform image segments");
        assert_eq!(segmentation.mask, circular_prior(32, 32, 3.0));
    }
}
