//! Training dataset loading and validation

use radwatch_core::{Error, Label, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

const RADICAL_SYNONYMS: [&str; 7] = ["radikal", "radical", "positif", "positive", "ya", "yes", "true"];

const NON_RADICAL_SYNONYMS: [&str; 12] = [
    "non-radikal",
    "non radikal",
    "nonradikal",
    "non_radikal",
    "tidak radikal",
    "bukan radikal",
    "non-radical",
    "negatif",
    "negative",
    "tidak",
    "no",
    "false",
];

/// Map a raw label cell onto a [`Label`], case-insensitively
pub fn normalize_label(raw: &str) -> Option<Label> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }
    if let Ok(number) = value.parse::<f64>() {
        return if number == 1.0 {
            Some(Label::Radical)
        } else if number == 0.0 {
            Some(Label::NonRadical)
        } else {
            None
        };
    }
    if RADICAL_SYNONYMS.contains(&value.as_str()) {
        Some(Label::Radical)
    } else if NON_RADICAL_SYNONYMS.contains(&value.as_str()) {
        Some(Label::NonRadical)
    } else {
        None
    }
}

/// Resolve `filename` below `datasets_dir`, refusing anything that escapes it
pub fn resolve_dataset_path(datasets_dir: &Path, filename: &str) -> Result<PathBuf> {
    let relative = Path::new(filename);
    let safe = !filename.trim().is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(Error::validation(format!("invalid dataset filename '{}'", filename)));
    }
    let path = datasets_dir.join(relative);
    if !path.is_file() {
        return Err(Error::not_found(format!("dataset file '{}'", filename)));
    }
    Ok(path)
}

/// Raw rows of a dataset file, cells as optional strings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Read a `.csv`, `.json` or `.jsonl` file
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => Self::from_csv(path),
            "json" => {
                let content = std::fs::read_to_string(path)?;
                let records: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
                    Error::validation(format!("dataset is not a JSON array of objects: {}", e))
                })?;
                Self::from_records(records)
            }
            "jsonl" => {
                let reader = BufReader::new(std::fs::File::open(path)?);
                let mut records = Vec::new();
                for (number, line) in reader.lines().enumerate() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let record = serde_json::from_str(&line).map_err(|e| {
                        Error::validation(format!("line {} is not a JSON object: {}", number + 1, e))
                    })?;
                    records.push(record);
                }
                Self::from_records(records)
            }
            other => Err(Error::validation(format!(
                "unsupported dataset format '{}', expected csv, json or jsonl",
                other
            ))),
        }
    }

    fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::validation(format!("cannot read CSV: {}", e)))?;
        let columns = reader
            .headers()
            .map_err(|e| Error::validation(format!("cannot read CSV header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::validation(format!("malformed CSV row: {}", e)))?;
            rows.push(record.iter().map(|cell| Some(cell.to_string())).collect());
        }
        Ok(Self { columns, rows })
    }

    fn from_records(records: Vec<Value>) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            let object = record
                .as_object()
                .ok_or_else(|| Error::validation("dataset rows must be JSON objects"))?;
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).and_then(cell_text))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// First column named `name`; later duplicates are ignored
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Validated training data: non-blank texts with normalized labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub texts: Vec<String>,
    pub labels: Vec<Label>,
    /// Rows dropped for a blank text or label
    pub dropped_blank: usize,
    /// Rows dropped because the label was not recognized
    pub dropped_unrecognized: usize,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Check the table and extract text/label pairs.
    ///
    /// Fails when a column is missing or either class ends up empty.
    pub fn from_table(table: &Table, col_text: &str, col_label: &str) -> Result<Self> {
        let missing: Vec<&str> = [col_text, col_label]
            .into_iter()
            .filter(|c| table.column_index(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }
        let (Some(text_index), Some(label_index)) =
            (table.column_index(col_text), table.column_index(col_label))
        else {
            return Err(Error::internal("column lookup changed during validation"));
        };

        let mut dataset = Self::default();
        for row in &table.rows {
            let cell = |i: usize| {
                row.get(i)
                    .and_then(|c| c.as_deref())
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
            };
            let (Some(text), Some(raw_label)) = (cell(text_index), cell(label_index)) else {
                dataset.dropped_blank += 1;
                continue;
            };
            match normalize_label(raw_label) {
                Some(label) => {
                    dataset.texts.push(text.to_string());
                    dataset.labels.push(label);
                }
                None => {
                    debug!(label = raw_label, "Dropping row with unrecognized label");
                    dataset.dropped_unrecognized += 1;
                }
            }
        }

        let radical = dataset.labels.iter().filter(|l| l.is_positive()).count();
        let non_radical = dataset.labels.len() - radical;
        if radical == 0 || non_radical == 0 {
            return Err(Error::validation(format!(
                "training data needs both classes, found {} radical and {} non-radical rows",
                radical, non_radical
            )));
        }

        info!(
            rows = dataset.len(),
            radical,
            non_radical,
            dropped_blank = dataset.dropped_blank,
            dropped_unrecognized = dataset.dropped_unrecognized,
            "Validated training data"
        );
        Ok(dataset)
    }
}
