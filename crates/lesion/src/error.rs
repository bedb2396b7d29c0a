use thiserror::Error;

#[derive(Error, Debug)]
pub enum LesionError {
    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Input directory not found: {0}")]
    MissingInputDirectory(String),

    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, found {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Feature extraction error: {0}")]
    Extraction(String),

    #[error("Malformed feature table row: {0}")]
    MalformedRow(String),

    #[error("Feature table schema mismatch: expected columns {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl LesionError {
    /// True when the error means the image itself could not be read, so the
    /// image is left out of the dataset instead of being default-filled.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            Self::ImageLoad(_) | Self::Io(_) | Self::UnsupportedFormat(_)
        )
    }

    pub(crate) fn dimension_mismatch(expected: (u32, u32), found: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            width: found.0,
            height: found.1,
        }
    }
}

pub type Result<T> = std::result::Result<T, LesionError>;
