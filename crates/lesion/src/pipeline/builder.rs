use crate::{
    algorithms::{AsymmetryExtractor, BlueVeilExtractor, BorderExtractor, HairRemover, KMeansSegmenter},
    config::{AsymmetryConfig, BlueVeilConfig, BorderConfig, HairRemovalConfig},
    pipeline::Pipeline,
    traits::{FeatureExtractor, LesionSegmenter},
};

/// Builder for creating processing pipelines with a fluent API
pub struct PipelineBuilder {
    hair_remover: Option<HairRemover>,
    segmenter: Option<Box<dyn LesionSegmenter>>,
    extractors: Vec<Box<dyn FeatureExtractor>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            hair_remover: None,
            segmenter: None,
            extractors: Vec::new(),
        }
    }

    /// Remove hair before segmentation and report `hr_*` columns
    pub fn with_hair_removal(mut self, config: HairRemovalConfig) -> Self {
        self.hair_remover = Some(HairRemover::new(config));
        self
    }

    /// Set the segmenter (replaces any existing one)
    pub fn set_segmenter<S>(mut self, segmenter: S) -> Self
    where
        S: LesionSegmenter + 'static,
    {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    /// Add an extractor. One extractor per group; a later one for the same
    /// group replaces the earlier one in place.
    pub fn add_extractor<E>(mut self, extractor: E) -> Self
    where
        E: FeatureExtractor + 'static,
    {
        let group = extractor.group();
        match self.extractors.iter().position(|e| e.group() == group) {
            Some(i) => self.extractors[i] = Box::new(extractor),
            None => self.extractors.push(Box::new(extractor)),
        }
        self
    }

    pub fn with_asymmetry(self, config: AsymmetryConfig) -> Self {
        self.add_extractor(AsymmetryExtractor::new(config))
    }

    pub fn with_border(self, config: BorderConfig) -> Self {
        self.add_extractor(BorderExtractor::new(config))
    }

    pub fn with_blue_veil(self, config: BlueVeilConfig) -> Self {
        self.add_extractor(BlueVeilExtractor::new(config))
    }

    /// Build the pipeline, defaulting to the k-means segmenter
    pub fn build(self) -> Pipeline {
        let segmenter = self
            .segmenter
            .unwrap_or_else(|| Box::new(KMeansSegmenter::default()));

        Pipeline::new(self.hair_remover, segmenter, self.extractors)
    }

    /// Asymmetry, border and blue-veil extractors with default settings
    pub fn build_default() -> Pipeline {
        Self::new()
            .with_asymmetry(AsymmetryConfig::default())
            .with_border(BorderConfig::default())
            .with_blue_veil(BlueVeilConfig::default())
            .build()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
