use image::{Rgb, RgbImage};
use palette::{FromColor, Hsv, Srgb};
use tracing::debug;

use crate::{
    config::BlueVeilConfig,
    error::{LesionError, Result},
    schema::{FeatureGroup, GroupFeatures},
    traits::FeatureExtractor,
    types::{ExtractionInput, LesionMask},
};

/// HSV triple with every channel in [0, 1]; hue is the angle divided by 360.
pub type HsvPixel = [f32; 3];

pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> HsvPixel {
    let srgb = Srgb::new(pixel[0], pixel[1], pixel[2]).into_format::<f32>();
    let hsv: Hsv = Hsv::from_color(srgb);
    let hue = hsv.hue.into_positive_degrees() / 360.0;
    // 360° wraps to 0
    let hue = if hue >= 1.0 { 0.0 } else { hue };
    [hue, hsv.saturation, hsv.value]
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlueVeilFeatures {
    pub present: bool,
    pub pixel_count: usize,
    pub area_ratio: f64,
    pub mean_rgb: [f64; 3],
    pub std_rgb: [f64; 3],
    pub mean_hsv: [f64; 3],
}

impl BlueVeilFeatures {
    /// No blue-veil pixels, every statistic zero
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn to_group(&self) -> Result<GroupFeatures> {
        let mut values = Vec::with_capacity(12);
        values.push(if self.present { 1.0 } else { 0.0 });
        values.push(self.pixel_count as f64);
        values.push(self.area_ratio);
        values.extend(self.mean_rgb);
        values.extend(self.std_rgb);
        values.extend(self.mean_hsv);
        GroupFeatures::new(FeatureGroup::BlueVeil, values)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlueVeilExtractor {
    pub config: BlueVeilConfig,
}

impl BlueVeilExtractor {
    pub fn new(config: BlueVeilConfig) -> Self {
        Self { config }
    }

    fn is_blue_veil(&self, hsv: &HsvPixel) -> bool {
        self.config.hue.contains(hsv[0])
            && self.config.saturation.contains(hsv[1])
            && self.config.value.contains(hsv[2])
    }

    pub fn compute(&self, raster: &RgbImage, mask: &LesionMask) -> Result<BlueVeilFeatures> {
        if raster.dimensions() != mask.dimensions() {
            return Err(LesionError::dimension_mismatch(raster.dimensions(), mask.dimensions()));
        }

        let lesion_pixels = mask.count();
        if lesion_pixels == 0 {
            debug!("empty lesion mask, blue veil absent");
            return Ok(BlueVeilFeatures::absent());
        }

        let matched: Vec<(Rgb<u8>, HsvPixel)> = mask
            .foreground()
            .map(|(x, y)| *raster.get_pixel(x, y))
            .map(|pixel| (pixel, rgb_to_hsv(&pixel)))
            .filter(|(_, hsv)| self.is_blue_veil(hsv))
            .collect();

        if matched.is_empty() {
            return Ok(BlueVeilFeatures::absent());
        }

        let n = matched.len() as f64;
        let mut mean_rgb = [0.0f64; 3];
        let mut mean_hsv = [0.0f64; 3];
        for (rgb, hsv) in &matched {
            for c in 0..3 {
                mean_rgb[c] += rgb[c] as f64;
                mean_hsv[c] += hsv[c] as f64;
            }
        }
        mean_rgb.iter_mut().for_each(|v| *v /= n);
        mean_hsv.iter_mut().for_each(|v| *v /= n);

        // Population standard deviation
        let mut std_rgb = [0.0f64; 3];
        for (rgb, _) in &matched {
            for c in 0..3 {
                std_rgb[c] += (rgb[c] as f64 - mean_rgb[c]).powi(2);
            }
        }
        std_rgb.iter_mut().for_each(|v| *v = (*v / n).sqrt());

        if self.config.normalize_colors {
            mean_rgb.iter_mut().for_each(|v| *v /= 255.0);
            std_rgb.iter_mut().for_each(|v| *v /= 255.0);
        }

        Ok(BlueVeilFeatures {
            present: true,
            pixel_count: matched.len(),
            area_ratio: matched.len() as f64 / lesion_pixels as f64,
            mean_rgb,
            std_rgb,
            mean_hsv,
        })
    }
}

impl FeatureExtractor for BlueVeilExtractor {
    fn group(&self) -> FeatureGroup {
        FeatureGroup::BlueVeil
    }

    fn extract(&self, input: &ExtractionInput<'_>) -> Result<GroupFeatures> {
        self.compute(input.raster, input.mask)?.to_group()
    }
}
