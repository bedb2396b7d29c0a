use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{LesionError, Result};

pub const FILENAME_COLUMN: &str = "filename";
pub const LABEL_COLUMN: &str = "label";

pub const ASYMMETRY_COLUMNS: &[&str] = &["a_basic", "a_pca", "a_boundary", "a_combined"];

pub const BORDER_COLUMNS: &[&str] = &["b_compactness", "b_solidity", "b_roughness", "b_radial_cv"];

pub const BLUE_VEIL_COLUMNS: &[&str] = &[
    "bv_present",
    "bv_pixel_count",
    "bv_area_ratio",
    "bv_mean_R",
    "bv_mean_G",
    "bv_mean_B",
    "bv_std_R",
    "bv_std_G",
    "bv_std_B",
    "bv_mean_H",
    "bv_mean_S",
    "bv_mean_V",
];

pub const HAIR_COLUMNS: &[&str] = &["hr_ratio", "hr_count"];

/// A named group of feature columns produced by one extractor.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureGroup {
    /// Mirror, PCA-aligned and boundary-weighted asymmetry
    Asymmetry,
    /// Contour compactness, solidity and radial irregularity
    Border,
    /// Blue-veil colour statistics inside the lesion
    BlueVeil,
    /// Hair-removal diagnostics
    Hair,
}

impl FeatureGroup {
    /// Column name prefix shared by every column of the group
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Asymmetry => "a_",
            Self::Border => "b_",
            Self::BlueVeil => "bv_",
            Self::Hair => "hr_",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Asymmetry => ASYMMETRY_COLUMNS,
            Self::Border => BORDER_COLUMNS,
            Self::BlueVeil => BLUE_VEIL_COLUMNS,
            Self::Hair => HAIR_COLUMNS,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Asymmetry => "Asymmetry of the lesion mask (basic mirror, PCA-aligned, boundary-weighted, combined)",
            Self::Border => "Border irregularity of the largest lesion contour",
            Self::BlueVeil => "Presence, extent and colour statistics of blue-veil pixels",
            Self::Hair => "Fraction of hair pixels and number of hair segments found before inpainting",
        }
    }

    /// Groups that describe lesion shape and may use an externally supplied mask
    pub fn uses_shape_mask(&self) -> bool {
        matches!(self, Self::Asymmetry | Self::Border)
    }

    /// Every group in column order, `Hair` last
    pub fn all() -> impl Iterator<Item = FeatureGroup> {
        Self::iter()
    }

    /// Extractor groups enabled when nothing else is configured
    pub fn defaults() -> Vec<FeatureGroup> {
        vec![Self::Asymmetry, Self::Border, Self::BlueVeil]
    }
}

/// Values for one [`FeatureGroup`], aligned with its column list.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFeatures {
    group: FeatureGroup,
    values: Vec<f64>,
}

impl GroupFeatures {
    pub fn new(group: FeatureGroup, values: Vec<f64>) -> Result<Self> {
        let expected = group.columns().len();
        if values.len() != expected {
            return Err(LesionError::Extraction(format!(
                "{} produced {} values, schema declares {}",
                group,
                values.len(),
                expected
            )));
        }
        Ok(Self { group, values })
    }

    /// Zero/absent sentinel values used when an image's extraction fails
    pub fn defaults(group: FeatureGroup) -> Self {
        Self {
            group,
            values: vec![0.0; group.columns().len()],
        }
    }

    pub fn group(&self) -> FeatureGroup {
        self.group
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.group
            .columns()
            .iter()
            .position(|name| *name == column)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.group.columns().iter().copied().zip(self.values.iter().copied())
    }
}

/// Ordered column layout of a feature table: `filename`, `label`, then the
/// columns of every enabled group in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    groups: Vec<FeatureGroup>,
}

impl FeatureSchema {
    pub fn new(groups: impl IntoIterator<Item = FeatureGroup>) -> Self {
        let mut ordered = Vec::new();
        for group in groups {
            if !ordered.contains(&group) {
                ordered.push(group);
            }
        }
        Self { groups: ordered }
    }

    pub fn groups(&self) -> &[FeatureGroup] {
        &self.groups
    }

    pub fn feature_columns(&self) -> Vec<&'static str> {
        self.groups
            .iter()
            .flat_map(|group| group.columns().iter().copied())
            .collect()
    }

    pub fn columns(&self) -> Vec<String> {
        [FILENAME_COLUMN, LABEL_COLUMN]
            .into_iter()
            .chain(self.feature_columns())
            .map(str::to_string)
            .collect()
    }

    pub fn width(&self) -> usize {
        2 + self.groups.iter().map(|g| g.columns().len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_carry_group_prefix() {
        for group in FeatureGroup::iter() {
            for column in group.columns() {
                assert!(column.starts_with(group.prefix()), "{column} lacks {}", group.prefix());
            }
        }
    }

    #[test]
    fn test_group_features_arity_is_checked() {
        assert!(GroupFeatures::new(FeatureGroup::Asymmetry, vec![0.0; 3]).is_err());
        let features = GroupFeatures::new(FeatureGroup::Asymmetry, vec![0.1, 0.2, 0.3, 0.4])
            .expect("arity matches");
        assert_eq!(features.get("a_pca"), Some(0.2));
        assert_eq!(features.get("bv_present"), None);
    }

    #[test]
    fn test_schema_order_and_dedup() {
        let schema = FeatureSchema::new([
            FeatureGroup::BlueVeil,
            FeatureGroup::Asymmetry,
            FeatureGroup::BlueVeil,
        ]);
        let columns = schema.columns();
        assert_eq!(columns[0], "filename");
        assert_eq!(columns[1], "label");
        assert_eq!(columns[2], "bv_present");
        assert_eq!(columns.len(), schema.width());
        assert_eq!(schema.groups().len(), 2);
    }

    #[test]
    fn test_all_groups_are_described() {
        let groups: Vec<_> = FeatureGroup::all().collect();
        assert_eq!(groups.last(), Some(&FeatureGroup::Hair));
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| !g.description().is_empty()));
    }

    #[test]
    fn test_group_names_round_trip_through_strum() {
        assert_eq!(FeatureGroup::BlueVeil.to_string(), "blue_veil");
        assert_eq!("border".parse::<FeatureGroup>().ok(), Some(FeatureGroup::Border));
    }
}
