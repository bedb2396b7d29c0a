use std::{collections::HashMap, path::Path};

use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::info;

use crate::{error::Result, types::UNKNOWN_LABEL};

#[derive(Debug, Deserialize)]
struct LabelRow {
    filename: String,
    label: i32,
}

/// File name to class label lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    by_filename: HashMap<String, i32>,
}

impl Labels {
    /// Label for `filename`, or [`UNKNOWN_LABEL`] when it is not listed
    pub fn get(&self, filename: &str) -> i32 {
        self.by_filename.get(filename).copied().unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.by_filename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty()
    }
}

impl FromIterator<(String, i32)> for Labels {
    fn from_iter<I: IntoIterator<Item = (String, i32)>>(iter: I) -> Self {
        Self {
            by_filename: iter.into_iter().collect(),
        }
    }
}

/// Read a CSV with `filename` and `label` columns. Extra columns are ignored.
pub fn load_labels(path: &Path) -> Result<Labels> {
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut labels = Labels::default();
    for row in reader.deserialize::<LabelRow>() {
        let row = row?;
        labels.by_filename.insert(row.filename, row.label);
    }
    info!("loaded {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names_get_unknown_label() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "filename,diagnosis,label\na.png,mel,1\nb.png,nev,0\n").expect("write");

        let labels = load_labels(&path).expect("labels parse");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("a.png"), 1);
        assert_eq!(labels.get("b.png"), 0);
        assert_eq!(labels.get("c.png"), UNKNOWN_LABEL);
    }

    #[test]
    fn test_from_iterator() {
        let labels: Labels = [("x.jpg".to_string(), 1)].into_iter().collect();
        assert_eq!(labels.get("x.jpg"), 1);
        assert_eq!(Labels::default().get("x.jpg"), -1);
    }
}
