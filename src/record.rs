//! Classification records: the seven filename fields of one document.
//!
//! Records come from two places:
//!
//! * [`FileRecord::from_features`]: fresh extraction. Low-confidence values
//!   carry a `[quality]` suffix and every field is filled, so the record is
//!   always complete.
//! * [`load_records`]: a previously written results table. Values are taken
//!   as final; rows lacking a field are rejected.
//!
//! Either way the record is only turned into a path through
//! [`FileRecord::target_path`], which refuses incomplete records.

use crate::error::{ClassifyError, StageError};
use crate::features::{DocumentFeatures, FeatureKey};
use crate::sanitize::FilenameSanitizer;
use crate::table::{csv_line, Table, TableRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The seven filename fields, in filename and results-table order.
pub const FIELD_KEYS: [&str; 7] = [
    "docdate",
    "doctype",
    "sendername",
    "docid",
    "receivername",
    "dateoffile",
    "extension",
];

/// Identity column written to results tables.
pub const ID_COLUMN: &str = "id";

/// Identity column of older results tables.
pub const LEGACY_ID_COLUMN: &str = "scanfile";

/// Values with a quality below this get a `[quality]` suffix.
pub const CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Stand-in for a missing or blank extracted value.
pub const UNKNOWN_VALUE: &str = "unknown";

pub const DEFAULT_EXTENSION: &str = "pdf";

/// One document's classification.
///
/// Fields never change after construction; [`FileRecord::sanitized`] builds
/// a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    id: String,
    docdate: Option<String>,
    doctype: Option<String>,
    sendername: Option<String>,
    docid: Option<String>,
    receivername: Option<String>,
    dateoffile: Option<String>,
    extension: Option<String>,
}

impl FileRecord {
    /// Build a record from its identity and the fields in [`FIELD_KEYS`] order.
    pub fn from_fields(id: impl Into<String>, fields: [Option<String>; 7]) -> Self {
        let [docdate, doctype, sendername, docid, receivername, dateoffile, extension] = fields;
        Self {
            id: id.into(),
            docdate,
            doctype,
            sendername,
            docid,
            receivername,
            dateoffile,
            extension,
        }
    }

    /// Build the record of a freshly extracted document.
    pub fn from_features(features: &DocumentFeatures) -> Self {
        let annotated = |key: FeatureKey| -> Option<String> {
            let feature = features.candidate.get(key);
            let value = feature
                .and_then(|f| f.value.as_deref())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(UNKNOWN_VALUE);
            let quality = feature.map(|f| f.quality).unwrap_or(0.0);
            if quality < CONFIDENCE_THRESHOLD {
                Some(format!("{value}[{quality:?}]"))
            } else {
                Some(value.to_string())
            }
        };

        Self {
            id: features.id(),
            docdate: annotated(FeatureKey::DocumentDate),
            doctype: annotated(FeatureKey::DocumentType),
            sendername: annotated(FeatureKey::Sender),
            docid: annotated(FeatureKey::InvoiceNumber),
            receivername: Some(String::new()),
            dateoffile: Some(String::new()),
            extension: Some(DEFAULT_EXTENSION.to_string()),
        }
    }

    /// Source identity (the document's path).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn docdate(&self) -> Option<&str> {
        self.docdate.as_deref()
    }

    pub fn doctype(&self) -> Option<&str> {
        self.doctype.as_deref()
    }

    pub fn sendername(&self) -> Option<&str> {
        self.sendername.as_deref()
    }

    pub fn docid(&self) -> Option<&str> {
        self.docid.as_deref()
    }

    pub fn receivername(&self) -> Option<&str> {
        self.receivername.as_deref()
    }

    pub fn dateoffile(&self) -> Option<&str> {
        self.dateoffile.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// The seven fields paired with their names, in [`FIELD_KEYS`] order.
    pub fn fields(&self) -> [(&'static str, Option<&str>); 7] {
        [
            (FIELD_KEYS[0], self.docdate()),
            (FIELD_KEYS[1], self.doctype()),
            (FIELD_KEYS[2], self.sendername()),
            (FIELD_KEYS[3], self.docid()),
            (FIELD_KEYS[4], self.receivername()),
            (FIELD_KEYS[5], self.dateoffile()),
            (FIELD_KEYS[6], self.extension()),
        ]
    }

    /// True iff all seven fields are present.
    pub fn is_complete(&self) -> bool {
        self.fields().iter().all(|(_, v)| v.is_some())
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect()
    }

    /// A copy with every present field sanitized. The identity is kept as is.
    pub fn sanitized(&self, sanitizer: &FilenameSanitizer) -> Self {
        let clean = |v: &Option<String>| v.as_deref().map(|s| sanitizer.sanitize(s));
        Self {
            id: self.id.clone(),
            docdate: clean(&self.docdate),
            doctype: clean(&self.doctype),
            sendername: clean(&self.sendername),
            docid: clean(&self.docid),
            receivername: clean(&self.receivername),
            dateoffile: clean(&self.dateoffile),
            extension: clean(&self.extension),
        }
    }

    /// `<docdate>_<doctype>_<sendername>_<docid>_<receivername>_<dateoffile>.<extension>`,
    /// sanitized as a whole. `None` for incomplete records.
    pub fn file_name(&self, sanitizer: &FilenameSanitizer) -> Option<String> {
        let raw = format!(
            "{}_{}_{}_{}_{}_{}.{}",
            self.docdate()?,
            self.doctype()?,
            self.sendername()?,
            self.docid()?,
            self.receivername()?,
            self.dateoffile()?,
            self.extension()?,
        );
        Some(sanitizer.sanitize(raw))
    }

    /// Where the document should end up: in `out_dir`, or next to the
    /// source when no directory is given. `None` for incomplete records.
    pub fn target_path(&self, out_dir: Option<&Path>, sanitizer: &FilenameSanitizer) -> Option<PathBuf> {
        let name = self.file_name(sanitizer)?;
        let dir = match out_dir {
            Some(dir) => dir.to_path_buf(),
            None => Path::new(&self.id)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        Some(dir.join(name))
    }
}

/// Records reloaded from a results table, keyed by identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub records: BTreeMap<String, FileRecord>,
    /// Incomplete or unidentifiable rows.
    pub rejected: Vec<StageError>,
}

impl RecordSet {
    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load a results table, keeping only complete rows.
pub fn load_records(path: &Path) -> Result<RecordSet, ClassifyError> {
    let table = Table::read(path)?;
    Ok(parse_records(&table, &path.display().to_string()))
}

/// Interpret a parsed results table.
///
/// A field is missing when its column does not exist or the row is shorter
/// than the header; an empty cell is a present, empty value. Later rows with
/// the same identity replace earlier ones.
pub fn parse_records(table: &Table, source_file: &str) -> RecordSet {
    let mut set = RecordSet::default();
    let id_column = if table.column(LEGACY_ID_COLUMN).is_some() {
        LEGACY_ID_COLUMN
    } else {
        ID_COLUMN
    };

    for row in &table.rows {
        match record_from_row(table, row, id_column) {
            Some(record) if record.is_complete() => {
                set.records.insert(record.id.clone(), record);
            }
            Some(record) => {
                let issue = StageError::IncompleteRecord {
                    id: record.id.clone(),
                    missing: record.missing_fields().into_iter().map(String::from).collect(),
                };
                warn!("{issue}");
                set.rejected.push(issue);
            }
            None => {
                let issue = StageError::MalformedRow {
                    source_file: source_file.to_string(),
                    line: row.line,
                    detail: format!("no value in identity column '{id_column}'"),
                };
                warn!("{issue}");
                set.rejected.push(issue);
            }
        }
    }
    set
}

fn record_from_row(table: &Table, row: &TableRow, id_column: &str) -> Option<FileRecord> {
    let id = table.cell(row, id_column).filter(|id| !id.is_empty())?;
    let fields = FIELD_KEYS.map(|key| table.cell(row, key).map(str::to_string));
    Some(FileRecord::from_fields(id, fields))
}

/// Render the results table: the seven fields, then `id`. Absent fields are
/// written as empty cells.
pub fn results_to_csv<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> String {
    let mut header: Vec<&str> = FIELD_KEYS.to_vec();
    header.push(ID_COLUMN);
    let mut out = csv_line(&header);
    for record in records {
        let mut cells: Vec<&str> = record
            .fields()
            .iter()
            .map(|(_, v)| v.unwrap_or_default())
            .collect();
        cells.push(record.id());
        out.push_str(&csv_line(&cells));
    }
    out
}

/// Write the results table to `path`.
pub fn write_results<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a FileRecord>,
) -> Result<(), ClassifyError> {
    std::fs::write(path, results_to_csv(records)).map_err(|e| ClassifyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ExtractionCandidate, Feature};

    fn some(values: [&str; 7]) -> [Option<String>; 7] {
        values.map(|v| Some(v.to_string()))
    }

    fn sample(id: &str) -> FileRecord {
        FileRecord::from_fields(
            id,
            some([
                "2023-10-27",
                "invoice",
                "Test Sender",
                "123",
                "Test Receiver",
                "2023-10-28",
                "pdf",
            ]),
        )
    }

    fn features(values: [Option<&str>; 4], qualities: [f64; 4]) -> DocumentFeatures {
        let candidate = ExtractionCandidate::new(
            FeatureKey::ALL
                .iter()
                .zip(values.iter().zip(qualities))
                .map(|(&key, (value, quality))| Feature {
                    key,
                    value: value.map(str::to_string),
                    quality,
                })
                .collect(),
        );
        DocumentFeatures::new("test.pdf", candidate)
    }

    #[test]
    fn from_features_annotates_low_confidence() {
        let r = FileRecord::from_features(&features(
            [Some("2023-01-01"), Some("invoice"), Some("Test Sender"), Some("123")],
            [0.9, 0.8, 0.95, 0.7],
        ));
        assert_eq!(r.id(), "test.pdf");
        assert_eq!(r.docdate(), Some("2023-01-01"));
        assert_eq!(r.doctype(), Some("invoice[0.8]"));
        assert_eq!(r.sendername(), Some("Test Sender"));
        assert_eq!(r.docid(), Some("123[0.7]"));
        assert_eq!(r.receivername(), Some(""));
        assert_eq!(r.dateoffile(), Some(""));
        assert_eq!(r.extension(), Some("pdf"));
        assert!(r.is_complete());
    }

    #[test]
    fn from_features_defaults_missing_values_to_unknown() {
        let r = FileRecord::from_features(&features([None, None, Some("  "), None], [0.9, 0.8, 0.95, 0.7]));
        assert_eq!(r.docdate(), Some("unknown"));
        assert_eq!(r.doctype(), Some("unknown[0.8]"));
        assert_eq!(r.sendername(), Some("unknown"));
        assert_eq!(r.docid(), Some("unknown[0.7]"));
    }

    #[test]
    fn from_features_absent_key_counts_as_zero_quality() {
        let doc = DocumentFeatures::new(
            "/scans/a.pdf",
            ExtractionCandidate::new(vec![Feature::new(FeatureKey::Sender, "ACME", 1.0)]),
        );
        let r = FileRecord::from_features(&doc);
        assert_eq!(r.docdate(), Some("unknown[0.0]"));
        assert_eq!(r.sendername(), Some("ACME"));
    }

    #[test]
    fn sanitized_keeps_identity_and_absence() {
        let mut fields = some(["27.10.2023", "a/b", "Test/Sender", "1", "x", "y", "pdf"]);
        fields[4] = None;
        let r = FileRecord::from_fields("/in/a:b.pdf", fields);
        let s = r.sanitized(&FilenameSanitizer::default());
        assert_eq!(s.id(), "/in/a:b.pdf");
        assert_eq!(s.docdate(), Some("2023-10-27"));
        assert_eq!(s.sendername(), Some("Test-Sender"));
        assert_eq!(s.receivername(), None);
        assert!(!s.is_complete());
    }

    #[test]
    fn target_path_in_out_dir() {
        let p = sample("/scans/test.pdf")
            .target_path(Some(Path::new("/out")), &FilenameSanitizer::default())
            .unwrap();
        assert_eq!(
            p,
            PathBuf::from("/out/2023-10-27_invoice_Test Sender_123_Test Receiver_2023-10-28.pdf")
        );
    }

    #[test]
    fn target_path_next_to_source() {
        let p = sample("/scans/test.pdf")
            .target_path(None, &FilenameSanitizer::default())
            .unwrap();
        assert_eq!(p.parent(), Some(Path::new("/scans")));
    }

    #[test]
    fn incomplete_record_has_no_target() {
        let mut fields = some(["a", "b", "c", "d", "e", "f", "pdf"]);
        fields[4] = None;
        let r = FileRecord::from_fields("test.pdf", fields);
        assert_eq!(r.missing_fields(), vec!["receivername"]);
        assert!(r.target_path(Some(Path::new("/out")), &FilenameSanitizer::default()).is_none());
    }

    #[test]
    fn extracted_record_file_name() {
        let r = FileRecord::from_features(&features(
            [Some("2023-04-01"), Some("rechnung"), Some("Stadtwerke"), Some("R/1234")],
            [0.95, 0.9, 0.8, 0.9],
        ))
        .sanitized(&FilenameSanitizer::default());
        assert_eq!(
            r.file_name(&FilenameSanitizer::default()).unwrap(),
            "2023-04-01_rechnung_Stadtwerke[0.8]_R-1234__.pdf"
        );
    }

    #[test]
    fn reload_legacy_table() {
        let table = Table::parse(
            "scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension\n\
             test.pdf,2023-01-01,invoice,Test Sender,123,Test Receiver,2023-01-02,pdf\n",
        );
        let set = parse_records(&table, "results.csv");
        assert_eq!(set.len(), 1);
        let r = set.get("test.pdf").unwrap();
        assert_eq!(r.sendername(), Some("Test Sender"));
        assert_eq!(r.dateoffile(), Some("2023-01-02"));
    }

    #[test]
    fn reload_rejects_missing_columns_and_short_rows() {
        let table = Table::parse(
            "id,docdate,doctype,sendername,docid,dateoffile,extension\n\
             a.pdf,2023-01-01,invoice,S,1,2023-01-02,pdf\n",
        );
        let set = parse_records(&table, "results.csv");
        assert!(set.is_empty());
        assert!(matches!(
            &set.rejected[0],
            StageError::IncompleteRecord { id, missing } if id == "a.pdf" && missing == &vec!["receivername".to_string()]
        ));

        let table = Table::parse(
            "scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension\n\
             b.pdf,2023-01-01\n\
             ,2023-01-01,invoice,S,1,R,2023-01-02,pdf\n",
        );
        let set = parse_records(&table, "results.csv");
        assert!(set.is_empty());
        assert!(matches!(
            &set.rejected[0],
            StageError::IncompleteRecord { missing, .. } if missing.len() == 6
        ));
        assert!(matches!(set.rejected[1], StageError::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn reload_keeps_exactly_the_complete_rows() {
        let table = Table::parse(
            "id,docdate,doctype,sendername,docid,dateoffile,extension,receivername\n\
             a.pdf,2023-01-01,invoice,S,1,2023-01-02,pdf,R\n\
             short.pdf,2023-01-01,invoice,S,2,2023-01-02,pdf\n\
             b.pdf,2023-02-01,letter,T,3,2023-02-02,pdf,R\n\
             c.pdf,2023-03-01,invoice,U,4,2023-03-02,pdf,\n",
        );
        let set = parse_records(&table, "results.csv");
        let ids: Vec<&str> = set.records.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(set.get("b.pdf").unwrap().doctype(), Some("letter"));
        assert_eq!(set.get("c.pdf").unwrap().receivername(), Some(""));
        assert_eq!(
            set.rejected,
            vec![StageError::IncompleteRecord {
                id: "short.pdf".into(),
                missing: vec!["receivername".into()],
            }]
        );
    }

    #[test]
    fn reloaded_record_target_path() {
        let table = Table::parse(
            "scanfile,docdate,doctype,sendername,docid,receivername,dateoffile,extension\n\
             /scans/test.pdf,2023-01-01,invoice,Test Sender,123,Test Receiver,2023-01-02,pdf\n",
        );
        let set = parse_records(&table, "results.csv");
        let p = set
            .get("/scans/test.pdf")
            .unwrap()
            .target_path(Some(Path::new("/out")), &FilenameSanitizer::default())
            .unwrap();
        assert_eq!(
            p,
            PathBuf::from("/out/2023-01-01_invoice_Test Sender_123_Test Receiver_2023-01-02.pdf")
        );
    }

    #[test]
    fn empty_cells_are_present_values() {
        let records = [FileRecord::from_fields(
            "/scans/a.pdf",
            some(["2023-01-01", "x", "y", "z", "", "", "pdf"]),
        )];
        let set = parse_records(&Table::parse(&results_to_csv(&records)), "results.csv");
        assert_eq!(set.get("/scans/a.pdf"), Some(&records[0]));
    }

    #[test]
    fn results_column_order_is_fixed() {
        let csv = results_to_csv(&[sample("/scans/a, b.pdf")]);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("docdate,doctype,sendername,docid,receivername,dateoffile,extension,id")
        );
        assert_eq!(
            lines.next(),
            Some("2023-10-27,invoice,Test Sender,123,Test Receiver,2023-10-28,pdf,\"/scans/a, b.pdf\"")
        );
    }

    #[test]
    fn write_and_load_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        write_results(&path, &[sample("/scans/a.pdf"), sample("/scans/b.pdf")]).unwrap();
        let set = load_records(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.rejected.is_empty());
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let err = load_records(Path::new("/definitely/not/results.csv")).unwrap_err();
        assert!(matches!(err, ClassifyError::FileNotFound { .. }));
    }
}
