use std::path::{Path, PathBuf};

use image::{imageops::FilterType, RgbImage};
use tracing::debug;

use crate::{
    error::{LesionError, Result},
    types::{LesionMask, LoadedImage},
};

/// Extensions picked up by feature extraction
pub const FEATURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Extensions picked up by standalone hair removal
pub const HAIR_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Case-insensitive extension check
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, HAIR_EXTENSIONS)
}

/// Image files of `dir` with one of `extensions`, sorted by file name.
///
/// A missing directory is the one fatal input error of a batch.
pub fn list_images(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LesionError::MissingInputDirectory(dir.display().to_string()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    debug!("found {} images in {}", files.len(), dir.display());
    Ok(files)
}

/// Decode an image file into RGB and grayscale rasters
pub fn load_image(path: &Path) -> Result<LoadedImage> {
    if !is_supported_image(path) {
        return Err(LesionError::UnsupportedFormat(path.display().to_string()));
    }
    let rgb = image::open(path)?.to_rgb8();
    Ok(LoadedImage::from_rgb(rgb))
}

/// Load an externally supplied mask, resized to `width`x`height` with
/// nearest-neighbour sampling. Pixels brighter than 127 are lesion.
pub fn load_mask(path: &Path, width: u32, height: u32) -> Result<LesionMask> {
    let luma = image::open(path)?.to_luma8();
    let luma = if luma.dimensions() == (width, height) {
        luma
    } else {
        image::imageops::resize(&luma, width, height, FilterType::Nearest)
    };
    Ok(LesionMask::from_luma_threshold(&luma, 127))
}

/// Bilinear (triangle filter) resize to the working resolution
pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Triangle)
}
