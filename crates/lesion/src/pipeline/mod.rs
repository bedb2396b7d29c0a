pub mod builder;

use image::RgbImage;
use tracing::debug;

use crate::{
    algorithms::{HairRemoval, HairRemover},
    config::LesionConfig,
    error::{LesionError, Result},
    schema::{FeatureGroup, FeatureSchema, GroupFeatures},
    traits::{FeatureExtractor, LesionSegmenter},
    types::{ExtractionInput, FeatureRecord, LesionMask, LoadedImage, Segmentation},
};

/// Per-image pipeline: optional hair removal, segmentation, then every
/// feature extractor on the shared mask.
pub struct Pipeline {
    hair_remover: Option<HairRemover>,
    segmenter: Box<dyn LesionSegmenter>,
    extractors: Vec<Box<dyn FeatureExtractor>>,
}

/// Everything computed for one image
#[derive(Debug, Clone)]
pub struct Analysis {
    pub hair: Option<HairRemoval>,
    pub segmentation: Segmentation,
    /// One entry per schema group, in schema order
    pub features: Vec<GroupFeatures>,
}

impl Analysis {
    pub fn into_record(self, filename: impl Into<String>, label: i32) -> FeatureRecord {
        FeatureRecord {
            filename: filename.into(),
            label,
            features: self.features,
        }
    }
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(
        hair_remover: Option<HairRemover>,
        segmenter: Box<dyn LesionSegmenter>,
        extractors: Vec<Box<dyn FeatureExtractor>>,
    ) -> Self {
        Self {
            hair_remover,
            segmenter,
            extractors,
        }
    }

    /// Pipeline running the extractors named by `config.feature_groups`
    pub fn from_config(config: &LesionConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder().set_segmenter(crate::algorithms::KMeansSegmenter::new(
            config.segmenter.clone(),
        ));
        for group in &config.feature_groups {
            builder = match group {
                FeatureGroup::Asymmetry => builder.with_asymmetry(config.asymmetry.clone()),
                FeatureGroup::Border => builder.with_border(config.border.clone()),
                FeatureGroup::BlueVeil => builder.with_blue_veil(config.blue_veil.clone()),
                FeatureGroup::Hair => {
                    return Err(LesionError::InvalidConfig(
                        "hair is not an extractor group".into(),
                    ));
                }
            };
        }
        if config.remove_hair {
            builder = builder.with_hair_removal(config.hair.clone());
        }
        Ok(builder.build())
    }

    /// Column layout of the records this pipeline produces
    pub fn schema(&self) -> FeatureSchema {
        let groups = self.extractors.iter().map(|e| e.group());
        if self.hair_remover.is_some() {
            FeatureSchema::new(groups.chain([FeatureGroup::Hair]))
        } else {
            FeatureSchema::new(groups)
        }
    }

    /// Run every stage on `image`.
    ///
    /// `external_mask` replaces the derived mask for the shape groups only;
    /// colour groups always read the derived mask. It is resized to the
    /// working resolution when needed.
    pub fn analyze(&self, image: &RgbImage, external_mask: Option<&LesionMask>) -> Result<Analysis> {
        let hair = match &self.hair_remover {
            Some(remover) => Some(remover.remove_hair(image)?),
            None => None,
        };
        let source = hair.as_ref().map(|h| &h.image).unwrap_or(image);

        let segmentation = self.segmenter.segment(source)?;
        let (width, height) = segmentation.raster.dimensions();
        if segmentation.mask.is_empty() {
            debug!("segmentation produced an empty mask");
        }

        let shape_mask = external_mask.map(|mask| mask.resized(width, height));

        let mut features = Vec::with_capacity(self.extractors.len() + 1);
        for extractor in &self.extractors {
            let mask = match &shape_mask {
                Some(mask) if extractor.group().uses_shape_mask() => mask,
                _ => &segmentation.mask,
            };
            let input = ExtractionInput {
                raster: &segmentation.raster,
                mask,
            };
            features.push(extractor.extract(&input)?);
        }
        if let Some(removal) = &hair {
            features.push(removal.to_group()?);
        }

        Ok(Analysis {
            hair,
            segmentation,
            features,
        })
    }

    /// Feature row for one decoded image
    pub fn process(
        &self,
        filename: &str,
        label: i32,
        image: &LoadedImage,
        external_mask: Option<&LesionMask>,
    ) -> Result<FeatureRecord> {
        Ok(self.analyze(&image.rgb, external_mask)?.into_record(filename, label))
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let groups: Vec<String> = self.extractors.iter().map(|e| e.group().to_string()).collect();
        format!(
            "Pipeline: hair removal {}, {} extractors [{}]",
            if self.hair_remover.is_some() { "on" } else { "off" },
            self.extractors.len(),
            groups.join(", ")
        )
    }
}
