use lesion::{BatchInputs, LesionConfig, LesionError};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Invalid(#[from] LesionError),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// Batch extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchConfig {
    /// Directory of lesion images
    pub image_dir: PathBuf,
    /// Optional directory of externally segmented masks, named like the images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_dir: Option<PathBuf>,
    /// Optional CSV with `filename` and `label` columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<PathBuf>,
    /// Feature table, appended to when it already exists
    pub output_csv: PathBuf,
    /// Where hair-removed images are written when `lesion.remove_hair` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_dir: Option<PathBuf>,
    #[serde(default)]
    pub lesion: LesionConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("data/images"),
            mask_dir: None,
            labels: Some(PathBuf::from("data/labels.csv")),
            output_csv: PathBuf::from("data/features.csv"),
            cleaned_dir: None,
            lesion: LesionConfig::default(),
        }
    }
}

enum Format {
    Toml,
    Json,
}

fn format_of(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFileFormat),
    }
}

impl BatchConfig {
    /// Load BatchConfig from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load BatchConfig from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load BatchConfig from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load BatchConfig from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: BatchConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        match format_of(path_ref)? {
            Format::Toml => Self::from_toml_file(path_ref),
            Format::Json => Self::from_json_file(path_ref),
        }
    }

    /// Save BatchConfig to a TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert BatchConfig to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Save BatchConfig to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_json()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert BatchConfig to JSON string
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    /// Save in the format named by the file extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_ref = path.as_ref();
        match format_of(path_ref)? {
            Format::Toml => self.to_toml_file(path_ref),
            Format::Json => self.to_json_file(path_ref),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lesion.validate()?;
        Ok(())
    }

    pub fn batch_inputs(&self) -> BatchInputs {
        BatchInputs {
            image_dir: self.image_dir.clone(),
            mask_dir: self.mask_dir.clone(),
            labels: self.labels.clone(),
            output_csv: self.output_csv.clone(),
            cleaned_dir: self.cleaned_dir.clone(),
        }
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&schemars::schema_for!(BatchConfig))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lesion::FeatureGroup;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = BatchConfig::from_toml(
            r#"
            image_dir = "images"
            output_csv = "out/features.csv"

            [lesion]
            remove_hair = true

            [lesion.hair]
            threshold = 25
            "#,
        )
        .expect("minimal config parses");

        assert_eq!(config.image_dir, PathBuf::from("images"));
        assert!(config.mask_dir.is_none());
        assert!(config.lesion.remove_hair);
        assert_eq!(config.lesion.hair.threshold, 25);
        assert_eq!(config.lesion.hair.blackhat_kernel, 15);
        assert_eq!(config.lesion.feature_groups, FeatureGroup::defaults());
    }

    #[test]
    fn test_default_config_survives_toml_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("batch.toml");
        let config = BatchConfig::default();
        config.to_file(&path).expect("write toml");
        assert_eq!(BatchConfig::from_file(&path).expect("read toml"), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let result = BatchConfig::from_json(
            r#"{ "image_dir": "i", "output_csv": "o.csv", "lesion": { "hair": { "blackhat_kernel": 4 } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            BatchConfig::from_file("batch.yaml"),
            Err(ConfigError::UnsupportedFileFormat)
        ));
    }

    #[test]
    fn test_schema_names_fields() {
        let schema = BatchConfig::json_schema().expect("schema serialises");
        assert!(schema.contains("output_csv"));
        assert!(schema.contains("blackhat_kernel"));
    }
}
