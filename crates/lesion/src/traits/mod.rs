use image::RgbImage;
use crate::{
    error::Result,
    io::FeatureMatrix,
    schema::{FeatureGroup, GroupFeatures},
    types::{ExtractionInput, Segmentation},
};

/// Trait for lesion segmentation algorithms
pub trait LesionSegmenter: Send + Sync {
    /// Resize to the working resolution and mark lesion pixels
    fn segment(&self, image: &RgbImage) -> Result<Segmentation>;
}

/// Trait for feature extractors producing one fixed group of columns
pub trait FeatureExtractor: Send + Sync {
    /// The column group this extractor fills
    fn group(&self) -> FeatureGroup;

    /// Compute the group's values; degenerate masks yield sentinels, not errors
    fn extract(&self, input: &ExtractionInput<'_>) -> Result<GroupFeatures>;
}

/// Seam for the downstream classifier. Implementations live outside this crate.
pub trait ClassifierTrainer {
    type Model;

    /// Fit on `training`, select on `validation`, and return the model with its identifier
    fn train(&self, training: &FeatureMatrix, validation: &FeatureMatrix) -> Result<(Self::Model, String)>;
}
