//! Hair detection and removal.
//!
//! Hairs are thin dark structures on lighter skin, so a blackhat transform
//! (closing minus original) makes them stand out. The thresholded response is
//! dilated to bridge broken strands and, when enough significant segments are
//! found, inpainted away.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, grayscale_close, Mask},
    region_labelling::{connected_components, Connectivity},
};
use tracing::{debug, info, warn};

use crate::{
    algorithms::inpaint::inpaint_telea,
    config::HairRemovalConfig,
    error::{LesionError, Result},
    io::{list_images, load_image, HAIR_EXTENSIONS},
    maybe_rayon::*,
    schema::{FeatureGroup, GroupFeatures},
};

/// What hair removal did to an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HairDecision {
    /// Too few significant hair segments; the image is passed through
    Unchanged,
    Inpainted { hair_count: usize },
}

impl HairDecision {
    pub fn message(&self) -> String {
        match self {
            Self::Unchanged => "no significant hairs found".to_string(),
            Self::Inpainted { hair_count } => format!("{hair_count} hairs removed"),
        }
    }

    pub fn is_inpainted(&self) -> bool {
        matches!(self, Self::Inpainted { .. })
    }
}

/// Dilated hair mask and its diagnostics
#[derive(Debug, Clone)]
pub struct HairDetection {
    /// 255 marks hair
    pub mask: GrayImage,
    /// Fraction of pixels marked as hair, in [0, 1]
    pub hair_ratio: f64,
    /// Connected segments larger than the minimum segment area
    pub hair_count: usize,
}

#[derive(Debug, Clone)]
pub struct HairRemoval {
    pub hair_ratio: f64,
    pub hair_count: usize,
    /// Cleaned raster, identical to the input when unchanged
    pub image: RgbImage,
    pub hair_mask: GrayImage,
    pub decision: HairDecision,
}

impl HairRemoval {
    /// `hr_ratio` and `hr_count` columns
    pub fn to_group(&self) -> Result<GroupFeatures> {
        GroupFeatures::new(FeatureGroup::Hair, vec![self.hair_ratio, self.hair_count as f64])
    }
}

#[derive(Debug, Clone, Default)]
pub struct HairRemover {
    pub config: HairRemovalConfig,
}

impl HairRemover {
    pub fn new(config: HairRemovalConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, gray: &GrayImage) -> HairDetection {
        let (width, height) = gray.dimensions();
        let total = width as usize * height as usize;
        if total == 0 {
            return HairDetection {
                mask: gray.clone(),
                hair_ratio: 0.0,
                hair_count: 0,
            };
        }

        let closed = grayscale_close(gray, &Mask::square(self.config.blackhat_kernel / 2));
        let binary = GrayImage::from_fn(width, height, |x, y| {
            let response = closed.get_pixel(x, y)[0].saturating_sub(gray.get_pixel(x, y)[0]);
            if response > self.config.threshold { Luma([255u8]) } else { Luma([0u8]) }
        });
        let mask = dilate(&binary, Norm::LInf, self.config.dilation_radius());

        let hair_pixels = mask.pixels().filter(|p| p[0] > 0).count();
        let hair_count = count_segments(&mask, self.config.min_segment_area);

        HairDetection {
            hair_ratio: hair_pixels as f64 / total as f64,
            hair_count,
            mask,
        }
    }

    pub fn remove_hair(&self, image: &RgbImage) -> Result<HairRemoval> {
        let detection = self.detect(&image::imageops::grayscale(image));

        let (image, decision) = if detection.hair_count < self.config.min_hair_segments {
            (image.clone(), HairDecision::Unchanged)
        } else {
            let cleaned = inpaint_telea(image, &detection.mask, self.config.inpaint_radius)?;
            (cleaned, HairDecision::Inpainted { hair_count: detection.hair_count })
        };

        debug!(
            hair_ratio = detection.hair_ratio,
            hair_count = detection.hair_count,
            "{}",
            decision.message()
        );

        Ok(HairRemoval {
            hair_ratio: detection.hair_ratio,
            hair_count: detection.hair_count,
            image,
            hair_mask: detection.mask,
            decision,
        })
    }

    /// Write the cleaned image to `output_dir` under the input's file name.
    ///
    /// Unchanged images are copied byte for byte rather than re-encoded.
    pub fn remove_and_save(&self, input: &Path, output_dir: &Path) -> Result<HairRemoval> {
        let file_name = input
            .file_name()
            .ok_or_else(|| LesionError::UnsupportedFormat(input.display().to_string()))?;
        std::fs::create_dir_all(output_dir)?;
        let output = output_dir.join(file_name);

        let loaded = load_image(input)?;
        let removal = self.remove_hair(&loaded.rgb)?;

        match removal.decision {
            HairDecision::Unchanged => {
                std::fs::copy(input, &output)?;
            }
            HairDecision::Inpainted { .. } => {
                removal.image.save(&output)?;
            }
        }
        Ok(removal)
    }
}

fn count_segments(mask: &GrayImage, min_area: usize) -> usize {
    let labelled = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<usize> = Vec::new();
    for label in labelled.pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if areas.len() < label {
            areas.resize(label, 0);
        }
        areas[label - 1] += 1;
    }
    areas.into_iter().filter(|area| *area > min_area).count()
}

/// Outcome counts of a standalone hair removal run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HairBatchSummary {
    pub total: usize,
    pub inpainted: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Remove hair from every supported image of `input_dir`, writing results to
/// `output_dir`. Per-image failures are counted, not propagated.
pub fn remove_hair_folder(
    input_dir: &Path,
    output_dir: &Path,
    config: &HairRemovalConfig,
) -> Result<HairBatchSummary> {
    config.validate()?;
    let files: Vec<PathBuf> = list_images(input_dir, HAIR_EXTENSIONS)?;
    std::fs::create_dir_all(output_dir)?;

    let remover = HairRemover::new(config.clone());
    let outcomes: Vec<Result<HairDecision>> = files
        .par_iter()
        .map(|path| remover.remove_and_save(path, output_dir).map(|removal| removal.decision))
        .collect();

    let mut summary = HairBatchSummary {
        total: files.len(),
        ..Default::default()
    };
    for (path, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(HairDecision::Unchanged) => summary.unchanged += 1,
            Ok(HairDecision::Inpainted { .. }) => summary.inpainted += 1,
            Err(e) => {
                warn!("hair removal failed for {}: {}", path.display(), e);
                summary.errors += 1;
            }
        }
    }

    info!(
        total = summary.total,
        inpainted = summary.inpainted,
        unchanged = summary.unchanged,
        errors = summary.errors,
        "hair removal finished"
    );
    Ok(summary)
}
