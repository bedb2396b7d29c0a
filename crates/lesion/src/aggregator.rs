//! Batch driver building the feature table for a directory of images.
//!
//! Images already present in the persisted table are skipped. Every other
//! image ends in one of three ways: a full row, a default-filled row when its
//! pipeline failed, or no row at all when the file could not be read.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    algorithms::HairDecision,
    config::LesionConfig,
    error::{LesionError, Result},
    io::{list_images, load_image, load_labels, load_mask, FeatureDataset, Labels, FEATURE_EXTENSIONS},
    maybe_rayon::*,
    pipeline::{Analysis, Pipeline},
    types::FeatureRecord,
};

/// Locations read and written by one batch
#[derive(Debug, Clone, Default)]
pub struct BatchInputs {
    pub image_dir: PathBuf,
    /// Masks named like their images; used for the shape groups when present
    pub mask_dir: Option<PathBuf>,
    /// CSV with `filename` and `label` columns
    pub labels: Option<PathBuf>,
    pub output_csv: PathBuf,
    /// Where hair-removed images are written, when hair removal is on
    pub cleaned_dir: Option<PathBuf>,
}

/// Why an image produced no regular row
#[derive(Debug)]
pub enum Skip {
    /// Left out of the table
    Unreadable(LesionError),
    /// Row is filled with default values
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Images that went through the pipeline, failed ones included
    pub processed: usize,
    pub skipped_existing: usize,
    pub unreadable: usize,
    pub failed: usize,
    /// Rows in the table after the batch
    pub total_rows: usize,
}

pub struct FeatureAggregator {
    pipeline: Pipeline,
}

impl FeatureAggregator {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn from_config(config: &LesionConfig) -> Result<Self> {
        Ok(Self::new(Pipeline::from_config(config)?))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run the pipeline on one image file
    pub fn process_file(
        &self,
        path: &Path,
        labels: &Labels,
        inputs: &BatchInputs,
    ) -> std::result::Result<FeatureRecord, Skip> {
        let filename = file_name(path);
        let loaded = load_image(path).map_err(|e| {
            if e.is_unreadable() {
                Skip::Unreadable(e)
            } else {
                Skip::Failed(e.to_string())
            }
        })?;

        let external_mask = inputs.mask_dir.as_ref().and_then(|dir| {
            let mask_path = dir.join(&filename);
            if !mask_path.is_file() {
                return None;
            }
            let (width, height) = loaded.dimensions();
            load_mask(&mask_path, width, height)
                .inspect_err(|e| warn!("ignoring mask {}: {}", mask_path.display(), e))
                .ok()
        });

        let analysis = self
            .pipeline
            .analyze(&loaded.rgb, external_mask.as_ref())
            .map_err(|e| Skip::Failed(e.to_string()))?;

        if let Some(dir) = &inputs.cleaned_dir {
            if let Err(e) = save_cleaned(&analysis, path, dir) {
                warn!("could not write cleaned image for {}: {}", filename, e);
            }
        }

        let label = labels.get(&filename);
        Ok(analysis.into_record(filename, label))
    }

    /// [`process_file`](Self::process_file) with panics turned into `Failed`
    fn process_guarded(
        &self,
        path: &Path,
        labels: &Labels,
        inputs: &BatchInputs,
    ) -> std::result::Result<FeatureRecord, Skip> {
        catch_unwind(AssertUnwindSafe(|| self.process_file(path, labels, inputs)))
            .unwrap_or_else(|payload| Err(Skip::Failed(panic_message(payload.as_ref()))))
    }

    /// Process every image of `inputs.image_dir` missing from the table and
    /// append the new rows to `inputs.output_csv`.
    pub fn run(&self, inputs: &BatchInputs) -> Result<BatchReport> {
        let files = list_images(&inputs.image_dir, FEATURE_EXTENSIONS)?;
        let schema = self.pipeline.schema();
        let mut dataset = FeatureDataset::load(&inputs.output_csv, schema.clone())?;

        let labels = match &inputs.labels {
            Some(path) if path.is_file() => load_labels(path)?,
            Some(path) => {
                warn!("labels file {} not found, every label is unknown", path.display());
                Labels::default()
            }
            None => Labels::default(),
        };

        let (existing, pending): (Vec<PathBuf>, Vec<PathBuf>) = files
            .into_iter()
            .partition(|path| dataset.contains(&file_name(path)));
        info!(
            "{} images to process, {} already in {}",
            pending.len(),
            existing.len(),
            inputs.output_csv.display()
        );
        debug!("{}", self.pipeline.info());

        let outcomes: Vec<std::result::Result<FeatureRecord, Skip>> = pending
            .par_iter()
            .map(|path| self.process_guarded(path, &labels, inputs))
            .collect();

        let mut report = BatchReport {
            skipped_existing: existing.len(),
            ..Default::default()
        };
        let mut records = Vec::with_capacity(outcomes.len());
        for (path, outcome) in pending.iter().zip(outcomes) {
            let filename = file_name(path);
            match outcome {
                Ok(record) => {
                    report.processed += 1;
                    records.push(record);
                }
                Err(Skip::Unreadable(e)) => {
                    warn!("skipping unreadable image {}: {}", filename, e);
                    report.unreadable += 1;
                }
                Err(Skip::Failed(reason)) => {
                    warn!("feature extraction failed for {}: {}, using defaults", filename, reason);
                    report.processed += 1;
                    report.failed += 1;
                    let label = labels.get(&filename);
                    records.push(FeatureRecord::defaults(filename, label, &schema));
                }
            }
        }

        dataset.append(records)?;
        dataset.save(&inputs.output_csv)?;
        report.total_rows = dataset.len();

        info!(
            processed = report.processed,
            skipped_existing = report.skipped_existing,
            unreadable = report.unreadable,
            failed = report.failed,
            total_rows = report.total_rows,
            "feature extraction finished"
        );
        Ok(report)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn save_cleaned(analysis: &Analysis, source: &Path, dir: &Path) -> Result<()> {
    let Some(removal) = &analysis.hair else {
        return Ok(());
    };
    std::fs::create_dir_all(dir)?;
    let output = dir.join(file_name(source));
    match removal.decision {
        HairDecision::Unchanged => {
            std::fs::copy(source, &output)?;
        }
        HairDecision::Inpainted { .. } => removal.image.save(&output)?,
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic".to_string()
    }
}
