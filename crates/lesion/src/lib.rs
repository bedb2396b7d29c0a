//! # Lesion Feature Extraction Library
//!
//! Turns dermoscopic lesion photographs into a binary lesion mask and a
//! fixed-length feature row describing asymmetry, border irregularity and
//! blue-veil colouring, optionally after removing hair.
//!
//! ## Core Features
//!
//! - **Trait-based Architecture**: swap the segmenter or add extractors by implementing traits
//! - **Pipeline System**: hair removal, segmentation and extraction composed with a builder
//! - **Fixed Schema**: every extractor declares its columns up front, so rows never change shape
//! - **Incremental Tables**: re-running a batch only processes images missing from the CSV
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lesion::{io::load_image, PipelineBuilder, UNKNOWN_LABEL};
//!
//! // Asymmetry, border and blue-veil extractors with default settings
//! let pipeline = PipelineBuilder::build_default();
//!
//! let image = load_image(std::path::Path::new("ISIC_0000001.jpg"))?;
//! let record = pipeline.process("ISIC_0000001.jpg", UNKNOWN_LABEL, &image, None)?;
//! println!("{:?}", record.get("a_combined"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Batch Extraction
//!
//! ```rust,no_run
//! use lesion::{BatchInputs, FeatureAggregator, LesionConfig};
//!
//! let config = LesionConfig { remove_hair: true, ..Default::default() };
//! let aggregator = FeatureAggregator::from_config(&config)?;
//! let report = aggregator.run(&BatchInputs {
//!     image_dir: "data/images".into(),
//!     output_csv: "data/features.csv".into(),
//!     ..Default::default()
//! })?;
//! println!("{} new rows", report.processed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod schema;
pub mod config;
pub mod traits;
pub mod algorithms;
pub mod pipeline;
pub mod io;
pub mod aggregator;
mod maybe_rayon;

// Re-exports for convenience
pub use error::{LesionError, Result};
pub use types::{ExtractionInput, FeatureRecord, LesionMask, LoadedImage, Segmentation, UNKNOWN_LABEL};
pub use schema::{FeatureGroup, FeatureSchema, GroupFeatures};
pub use config::*;
pub use traits::*;
pub use algorithms::*;
pub use pipeline::{builder::PipelineBuilder, Analysis, Pipeline};
pub use io::{FeatureDataset, FeatureMatrix, Labels};
pub use aggregator::{BatchInputs, BatchReport, FeatureAggregator, Skip};

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn blue_disk(size: u32, radius: f32) -> RgbImage {
        let c = size as f32 / 2.0;
        RgbImage::from_fn(size, size, |x, y| {
            let dx = x as f32 - c;
            let dy = y as f32 - c;
            if dx * dx + dy * dy <= radius * radius { Rgb([50, 70, 180]) } else { Rgb([128, 128, 128]) }
        })
    }

    #[test]
    fn test_default_schema() {
        let pipeline = PipelineBuilder::build_default();
        let columns = pipeline.schema().columns();
        assert_eq!(columns.len(), 2 + 4 + 4 + 12);
        assert_eq!(columns[2], "a_basic");
        assert_eq!(columns[6], "b_compactness");
        assert_eq!(columns[10], "bv_present");
    }

    #[test]
    fn test_hair_columns_follow_remove_hair() {
        let config = LesionConfig { remove_hair: true, ..Default::default() };
        let schema = Pipeline::from_config(&config).expect("valid config").schema();
        assert_eq!(schema.groups().last(), Some(&FeatureGroup::Hair));

        let schema = Pipeline::from_config(&LesionConfig::default()).expect("valid config").schema();
        assert!(!schema.groups().contains(&FeatureGroup::Hair));
    }

    #[test]
    fn test_hair_group_is_rejected_as_extractor() {
        let config = LesionConfig {
            feature_groups: vec![FeatureGroup::Hair],
            ..Default::default()
        };
        assert!(Pipeline::from_config(&config).is_err());
    }

    #[test]
    fn test_record_matches_schema() {
        let pipeline = PipelineBuilder::build_default();
        let image = LoadedImage::from_rgb(blue_disk(100, 30.0));
        let record = pipeline.process("disk.png", 1, &image, None).expect("pipeline runs");
        assert_eq!(record.to_row().len(), pipeline.schema().width());
        assert_eq!(record.get("bv_present"), Some(1.0));
        assert!(record.get("bv_area_ratio").is_some_and(|r| r > 0.9));
    }

    #[test]
    fn test_external_mask_only_reaches_shape_groups() {
        let pipeline = PipelineBuilder::build_default();
        let image = blue_disk(100, 30.0);
        let external = LesionMask::new(50, 50);

        let analysis = pipeline.analyze(&image, Some(&external)).expect("pipeline runs");
        let record = analysis.into_record("disk.png", UNKNOWN_LABEL);
        // Empty external mask: asymmetry sentinel and zero border
        assert_eq!(record.get("a_basic"), Some(1.0));
        assert_eq!(record.get("b_solidity"), Some(0.0));
        // Blue veil still reads the derived mask
        assert_eq!(record.get("bv_present"), Some(1.0));
    }

    #[test]
    fn test_later_extractor_replaces_same_group() {
        let pipeline = Pipeline::builder()
            .with_blue_veil(BlueVeilConfig::default())
            .with_asymmetry(AsymmetryConfig::default())
            .with_blue_veil(BlueVeilConfig { normalize_colors: false, ..Default::default() })
            .build();
        assert_eq!(pipeline.schema().groups(), &[FeatureGroup::BlueVeil, FeatureGroup::Asymmetry]);
    }
}
