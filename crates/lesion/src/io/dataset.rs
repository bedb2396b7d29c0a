//! Persisted feature table.
//!
//! One CSV row per image, keyed by file name. Rows already on disk are never
//! rewritten: saving appends the rows added since the table was loaded.

use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, info};

use crate::{
    error::{LesionError, Result},
    schema::{FeatureSchema, GroupFeatures, FILENAME_COLUMN, LABEL_COLUMN},
    types::{FeatureRecord, UNKNOWN_LABEL},
};

#[derive(Debug, Clone)]
pub struct FeatureDataset {
    schema: FeatureSchema,
    persisted: Vec<FeatureRecord>,
    pending: Vec<FeatureRecord>,
    filenames: HashSet<String>,
}

impl FeatureDataset {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            persisted: Vec::new(),
            pending: Vec::new(),
            filenames: HashSet::new(),
        }
    }

    /// Read the table at `path`. A missing or empty file gives an empty
    /// dataset; a header that differs from `schema` is a `SchemaMismatch`.
    pub fn load(path: &Path, schema: FeatureSchema) -> Result<Self> {
        let mut dataset = Self::new(schema);
        if !path.exists() || std::fs::metadata(path)?.len() == 0 {
            debug!("no existing feature table at {}", path.display());
            return Ok(dataset);
        }

        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let expected = dataset.schema.columns();
        if found != expected {
            return Err(LesionError::SchemaMismatch { expected, found });
        }

        for (line, row) in reader.records().enumerate() {
            let record = dataset.parse_row(&row?, line + 2)?;
            if dataset.filenames.insert(record.filename.clone()) {
                dataset.persisted.push(record);
            }
        }

        info!("loaded {} rows from {}", dataset.persisted.len(), path.display());
        Ok(dataset)
    }

    fn parse_row(&self, row: &StringRecord, line: usize) -> Result<FeatureRecord> {
        let malformed = |column: &str, cell: &str| {
            LesionError::MalformedRow(format!("line {line}, column {column}: {cell:?}"))
        };

        let filename = row
            .get(0)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| malformed(FILENAME_COLUMN, ""))?
            .to_string();
        let label_cell = row.get(1).unwrap_or_default();
        let label = label_cell
            .parse::<i32>()
            .map_err(|_| malformed(LABEL_COLUMN, label_cell))?;

        let mut cells = row.iter().skip(2);
        let mut features = Vec::with_capacity(self.schema.groups().len());
        for group in self.schema.groups() {
            let mut values = Vec::with_capacity(group.columns().len());
            for column in group.columns() {
                let cell = cells.next().unwrap_or_default();
                let value = cell.parse::<f64>().map_err(|_| malformed(*column, cell))?;
                values.push(value);
            }
            features.push(GroupFeatures::new(*group, values)?);
        }

        Ok(FeatureRecord {
            filename,
            label,
            features,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.persisted.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.filenames.contains(filename)
    }

    /// All rows, persisted first
    pub fn records(&self) -> impl Iterator<Item = &FeatureRecord> {
        self.persisted.iter().chain(&self.pending)
    }

    /// Rows added since the last load or save
    pub fn pending(&self) -> &[FeatureRecord] {
        &self.pending
    }

    /// Add records whose file name is not present yet. Returns how many were
    /// added.
    pub fn append(&mut self, records: impl IntoIterator<Item = FeatureRecord>) -> Result<usize> {
        let mut added = 0;
        for record in records {
            let width = 2 + record.features.iter().map(|g| g.values().len()).sum::<usize>();
            let groups: Vec<_> = record.features.iter().map(|g| g.group()).collect();
            if groups != self.schema.groups() || width != self.schema.width() {
                return Err(LesionError::SchemaMismatch {
                    expected: self.schema.columns(),
                    found: FeatureSchema::new(groups).columns(),
                });
            }
            if self.filenames.insert(record.filename.clone()) {
                self.pending.push(record);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Append pending rows to `path`, writing the header first if the file is
    /// new. Returns the number of rows written.
    pub fn save(&mut self, path: &Path) -> Result<usize> {
        let existing = path.exists() && std::fs::metadata(path)?.len() > 0;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if existing && !ends_with_newline(path)? {
            file.write_all(b"\n")?;
        }
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        let rows: Vec<&FeatureRecord> = if existing {
            self.pending.iter().collect()
        } else {
            writer.write_record(self.schema.columns())?;
            self.records().collect()
        };
        for record in &rows {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;

        let written = rows.len();
        self.persisted.append(&mut self.pending);
        info!("wrote {} rows to {}", written, path.display());
        Ok(written)
    }

    /// Numeric view of every row for the classifier
    pub fn feature_matrix(&self) -> FeatureMatrix {
        let mut matrix = FeatureMatrix {
            columns: self.schema.feature_columns().into_iter().map(str::to_string).collect(),
            ..Default::default()
        };
        for record in self.records() {
            matrix.filenames.push(record.filename.clone());
            matrix.labels.push(record.label);
            matrix
                .rows
                .push(record.features.iter().flat_map(|g| g.values().iter().copied()).collect());
        }
        matrix
    }
}

/// Whether the last byte of a non-empty file is a line break
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n' || last[0] == b'\r')
}

/// Feature columns and labels in row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub filenames: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<i32>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose label is known
    pub fn labelled(&self) -> FeatureMatrix {
        let mut out = FeatureMatrix {
            columns: self.columns.clone(),
            ..Default::default()
        };
        for i in (0..self.len()).filter(|i| self.labels[*i] != UNKNOWN_LABEL) {
            out.filenames.push(self.filenames[i].clone());
            out.rows.push(self.rows[i].clone());
            out.labels.push(self.labels[i]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureGroup;

    fn schema() -> FeatureSchema {
        FeatureSchema::new([FeatureGroup::Asymmetry])
    }

    fn record(name: &str, label: i32, value: f64) -> FeatureRecord {
        FeatureRecord {
            filename: name.into(),
            label,
            features: vec![
                GroupFeatures::new(FeatureGroup::Asymmetry, vec![value, 0.5, 0.25, 0.125])
                    .expect("arity"),
            ],
        }
    }

    #[test]
    fn test_append_skips_duplicates() {
        let mut dataset = FeatureDataset::new(schema());
        let added = dataset
            .append([record("a.png", 1, 0.1), record("b.png", 0, 0.2), record("a.png", 1, 0.9)])
            .expect("schema matches");
        assert_eq!(added, 2);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.contains("b.png"));
    }

    #[test]
    fn test_save_then_append_keeps_existing_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("features.csv");

        let mut first = FeatureDataset::load(&path, schema()).expect("missing file is empty");
        first.append([record("a.png", 1, 0.1)]).expect("schema matches");
        assert_eq!(first.save(&path).expect("save"), 1);
        let before = std::fs::read_to_string(&path).expect("read back");

        let mut second = FeatureDataset::load(&path, schema()).expect("load");
        assert!(second.contains("a.png"));
        second
            .append([record("a.png", 1, 0.7), record("b.png", -1, 0.3)])
            .expect("schema matches");
        assert_eq!(second.save(&path).expect("save"), 1);

        let after = std::fs::read_to_string(&path).expect("read back");
        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 3);
        assert!(after.lines().next().is_some_and(|h| h.starts_with("filename,label,a_basic")));

        let reloaded = FeatureDataset::load(&path, schema()).expect("load");
        let names: Vec<_> = reloaded.records().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert_eq!(reloaded.records().next().and_then(|r| r.get("a_basic")), Some(0.1));
    }

    #[test]
    fn test_append_after_missing_final_newline() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("features.csv");
        std::fs::write(
            &path,
            "filename,label,a_basic,a_pca,a_boundary,a_combined\na.png,1,0,0,0,0",
        )
        .expect("write");

        let mut dataset = FeatureDataset::load(&path, schema()).expect("load");
        dataset.append([record("b.png", -1, 0.3)]).expect("schema matches");
        assert_eq!(dataset.save(&path).expect("save"), 1);

        let text = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(text.lines().count(), 3);
        let reloaded = FeatureDataset::load(&path, schema()).expect("table stays readable");
        let names: Vec<_> = reloaded.records().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
        assert_eq!(reloaded.records().nth(1).and_then(|r| r.get("a_basic")), Some(0.3));
    }

    #[test]
    fn test_header_mismatch_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("features.csv");
        std::fs::write(&path, "filename,label,feat_A\na.png,1,0.5\n").expect("write");
        let result = FeatureDataset::load(&path, schema());
        assert!(matches!(result, Err(LesionError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_bad_cell_is_malformed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("features.csv");
        std::fs::write(
            &path,
            "filename,label,a_basic,a_pca,a_boundary,a_combined\na.png,1,oops,0,0,0\n",
        )
        .expect("write");
        assert!(matches!(FeatureDataset::load(&path, schema()), Err(LesionError::MalformedRow(_))));
    }

    #[test]
    fn test_wrong_groups_cannot_be_appended() {
        let mut dataset = FeatureDataset::new(FeatureSchema::new([FeatureGroup::Border]));
        assert!(dataset.append([record("a.png", 1, 0.1)]).is_err());
    }

    #[test]
    fn test_feature_matrix_and_labelled_rows() {
        let mut dataset = FeatureDataset::new(schema());
        dataset
            .append([record("a.png", 1, 0.1), record("b.png", UNKNOWN_LABEL, 0.2)])
            .expect("schema matches");
        let matrix = dataset.feature_matrix();
        assert_eq!(matrix.columns, vec!["a_basic", "a_pca", "a_boundary", "a_combined"]);
        assert_eq!(matrix.rows[1], vec![0.2, 0.5, 0.25, 0.125]);

        let labelled = matrix.labelled();
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled.filenames, vec!["a.png"]);
    }
}
