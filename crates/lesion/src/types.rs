use std::collections::BTreeMap;

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::schema::{FeatureGroup, FeatureSchema, GroupFeatures};

/// Sentinel label for images missing from the labels table
pub const UNKNOWN_LABEL: i32 = -1;

/// A decoded image: RGB raster plus its grayscale rendition, same dimensions.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub rgb: RgbImage,
    pub gray: GrayImage,
}

impl LoadedImage {
    pub fn from_rgb(rgb: RgbImage) -> Self {
        let gray = image::imageops::grayscale(&rgb);
        Self { rgb, gray }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }
}

/// Boolean lesion map; `true` marks lesion pixels. May be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LesionMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

/// A connected foreground region with its inclusive bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    pub area: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

impl LesionMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> bool,
    {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    /// Any non-zero pixel is lesion
    pub fn from_luma(image: &GrayImage) -> Self {
        Self::from_luma_threshold(image, 0)
    }

    /// Pixels strictly brighter than `threshold` are lesion
    pub fn from_luma_threshold(image: &GrayImage, threshold: u8) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.pixels().map(|p| p[0] > threshold).collect(),
        }
    }

    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.get(x, y) { Luma([255u8]) } else { Luma([0u8]) }
        })
    }

    /// Nearest-neighbour resize, keeps the mask binary
    pub fn resized(&self, width: u32, height: u32) -> LesionMask {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let luma = image::imageops::resize(
            &self.to_luma(),
            width,
            height,
            image::imageops::FilterType::Nearest,
        );
        Self::from_luma(&luma)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|v| *v)
    }

    /// Coordinates of every lesion pixel in row-major order
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v)
            .map(move |(i, _)| ((i as u32) % width, (i as u32) / width))
    }

    /// Mirror left-right
    pub fn flip_horizontal(&self) -> LesionMask {
        Self::from_fn(self.width, self.height, |x, y| self.get(self.width - 1 - x, y))
    }

    /// Mirror top-bottom
    pub fn flip_vertical(&self) -> LesionMask {
        Self::from_fn(self.width, self.height, |x, y| self.get(x, self.height - 1 - y))
    }

    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> LesionMask {
        let width = width.min(self.width.saturating_sub(x));
        let height = height.min(self.height.saturating_sub(y));
        Self::from_fn(width, height, |cx, cy| self.get(x + cx, y + cy))
    }

    /// Pixels that differ from their left-right mirror image
    pub fn horizontal_mirror_difference(&self) -> usize {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.get(x, y) != self.get(self.width - 1 - x, y))
            .count()
    }

    /// Pixels that differ from their top-bottom mirror image
    pub fn vertical_mirror_difference(&self) -> usize {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&(x, y)| self.get(x, y) != self.get(x, self.height - 1 - y))
            .count()
    }

    /// Largest 8-connected region by pixel area. Ties keep the region that
    /// appears first in raster order.
    pub fn largest_region(&self) -> Option<Region> {
        if self.is_empty() {
            return None;
        }

        let labelled = connected_components(&self.to_luma(), Connectivity::Eight, Luma([0u8]));
        let mut regions: BTreeMap<u32, Region> = BTreeMap::new();

        for (x, y, label) in labelled.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            regions
                .entry(label)
                .and_modify(|region| {
                    region.area += 1;
                    region.min_x = region.min_x.min(x);
                    region.min_y = region.min_y.min(y);
                    region.max_x = region.max_x.max(x);
                    region.max_y = region.max_y.max(y);
                })
                .or_insert(Region {
                    label,
                    area: 1,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                });
        }

        let mut largest: Option<Region> = None;
        for region in regions.into_values() {
            if largest.is_none_or(|best| region.area > best.area) {
                largest = Some(region);
            }
        }
        largest
    }
}

/// Output of a segmenter: the working-resolution raster and its lesion mask.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub raster: RgbImage,
    pub mask: LesionMask,
}

/// What a feature extractor sees for one image
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub raster: &'a RgbImage,
    pub mask: &'a LesionMask,
}

/// One row of the feature table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub filename: String,
    pub label: i32,
    pub features: Vec<GroupFeatures>,
}

impl FeatureRecord {
    /// Record filled with the zero/absent sentinels of every group in `schema`
    pub fn defaults(filename: impl Into<String>, label: i32, schema: &FeatureSchema) -> Self {
        Self {
            filename: filename.into(),
            label,
            features: schema
                .groups()
                .iter()
                .map(|group| GroupFeatures::defaults(*group))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.features.iter().find_map(|group| group.get(column))
    }

    pub fn group(&self, group: FeatureGroup) -> Option<&GroupFeatures> {
        self.features.iter().find(|g| g.group() == group)
    }

    /// Cells in schema column order
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(2 + self.features.iter().map(|g| g.values().len()).sum::<usize>());
        row.push(self.filename.clone());
        row.push(self.label.to_string());
        for group in &self.features {
            row.extend(group.values().iter().map(|v| v.to_string()));
        }
        row
    }
}
