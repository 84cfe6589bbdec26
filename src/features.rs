//! Extracted features: per-page candidates and the per-document selection.
//!
//! A feature is one `(key, value, quality)` triple reported by the extractor
//! for one of the four recognised keys. Feature files persist the selected
//! candidate of a document as CSV:
//!
//! ```text
//! key,value,quality
//! id,/scans/2023-04.pdf,1.0
//! Document Date,2023-04-01,0.95
//! Document Type,rechnung,0.9
//! Sender,Stadtwerke,0.8
//! Invoice Number,R-1234,0.7
//! ```
//!
//! The synthetic `id` row carries the absolute path of the source document.
//! The aggregate feature file is the concatenation of all documents' rows
//! under a single header; every `id` row starts a new document.

use crate::error::{ClassifyError, StageError};
use crate::table::{csv_line, Table};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Key of the synthetic identity row.
pub const ID_KEY: &str = "id";

/// Column names of a feature file.
pub const FEATURE_COLUMNS: [&str; 3] = ["key", "value", "quality"];

/// The four fields the extractor is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKey {
    DocumentDate,
    DocumentType,
    Sender,
    InvoiceNumber,
}

impl FeatureKey {
    pub const ALL: [FeatureKey; 4] = [
        FeatureKey::DocumentDate,
        FeatureKey::DocumentType,
        FeatureKey::Sender,
        FeatureKey::InvoiceNumber,
    ];

    /// The label used in prompts, responses and feature files.
    pub fn label(self) -> &'static str {
        match self {
            FeatureKey::DocumentDate => "Document Date",
            FeatureKey::DocumentType => "Document Type",
            FeatureKey::Sender => "Sender",
            FeatureKey::InvoiceNumber => "Invoice Number",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One extracted `(key, value, quality)` triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub key: FeatureKey,
    pub value: Option<String>,
    /// Extractor confidence in `0.0..=1.0`.
    pub quality: f64,
}

impl Feature {
    pub fn new(key: FeatureKey, value: impl Into<String>, quality: f64) -> Self {
        Self {
            key,
            value: Some(value.into()),
            quality,
        }
    }
}

/// Everything the extractor reported for one page.
///
/// May hold fewer than four features; missing keys count as quality 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub features: Vec<Feature>,
}

impl ExtractionCandidate {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// First feature reported for `key`.
    pub fn get(&self, key: FeatureKey) -> Option<&Feature> {
        self.features.iter().find(|f| f.key == key)
    }

    pub fn quality(&self, key: FeatureKey) -> f64 {
        self.get(key).map(|f| f.quality).unwrap_or(0.0)
    }

    /// Mean quality over the four recognised keys.
    pub fn mean_quality(&self) -> f64 {
        let total: f64 = FeatureKey::ALL.iter().map(|&k| self.quality(k)).sum();
        total / FeatureKey::ALL.len() as f64
    }
}

/// The selected candidate of one document plus its source identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFeatures {
    /// Absolute path of the source PDF.
    pub source: PathBuf,
    pub candidate: ExtractionCandidate,
}

impl DocumentFeatures {
    pub fn new(source: impl Into<PathBuf>, candidate: ExtractionCandidate) -> Self {
        Self {
            source: source.into(),
            candidate,
        }
    }

    /// Source identity as stored in records and feature files.
    pub fn id(&self) -> String {
        self.source.to_string_lossy().into_owned()
    }

    /// CSV lines (no header): the identity row first, then the features.
    fn csv_rows(&self) -> String {
        let mut out = csv_line(&[ID_KEY.to_string(), self.id(), format!("{:?}", 1.0f64)]);
        for f in &self.candidate.features {
            out.push_str(&csv_line(&[
                f.key.label().to_string(),
                f.value.clone().unwrap_or_default(),
                format!("{:?}", f.quality),
            ]));
        }
        out
    }
}

/// Render a feature file for one or more documents.
pub fn features_to_csv(documents: &[DocumentFeatures]) -> String {
    let mut out = csv_line(&FEATURE_COLUMNS);
    for doc in documents {
        out.push_str(&doc.csv_rows());
    }
    out
}

/// Write a feature file (per-document or aggregate).
pub fn write_feature_file(path: &Path, documents: &[DocumentFeatures]) -> Result<(), ClassifyError> {
    std::fs::write(path, features_to_csv(documents)).map_err(|e| ClassifyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a feature file; unreadable rows are reported, not fatal.
pub fn read_feature_file(
    path: &Path,
) -> Result<(Vec<DocumentFeatures>, Vec<StageError>), ClassifyError> {
    let table = Table::read(path)?;
    Ok(parse_feature_table(&table, &path.display().to_string()))
}

/// Split a parsed feature table into documents at every `id` row.
pub fn parse_feature_table(table: &Table, source_file: &str) -> (Vec<DocumentFeatures>, Vec<StageError>) {
    let mut documents: Vec<DocumentFeatures> = Vec::new();
    let mut issues = Vec::new();
    let malformed = |line: usize, detail: String| StageError::MalformedRow {
        source_file: source_file.to_string(),
        line,
        detail,
    };

    for row in &table.rows {
        let key = table.cell(row, "key").unwrap_or_default();
        let value = table.cell(row, "value").filter(|v| !v.is_empty());

        if key == ID_KEY {
            match value {
                Some(id) => documents.push(DocumentFeatures::new(id, ExtractionCandidate::default())),
                None => issues.push(malformed(row.line, "identity row without a value".into())),
            }
            continue;
        }

        let Some(feature_key) = FeatureKey::from_label(key) else {
            issues.push(malformed(row.line, format!("unknown feature key '{key}'")));
            continue;
        };
        let quality = match table.cell(row, "quality").map(str::parse::<f64>) {
            Some(Ok(q)) => q,
            _ => {
                issues.push(malformed(row.line, format!("invalid quality for '{key}'")));
                continue;
            }
        };
        let Some(current) = documents.last_mut() else {
            issues.push(malformed(row.line, "feature row before any identity row".into()));
            continue;
        };
        current.candidate.features.push(Feature {
            key: feature_key,
            value: value.map(str::to_string),
            quality,
        });
    }

    (documents, issues)
}
