//! OCR: page image → tesseract layout table.
//!
//! Tesseract's `tsv` output keeps the page, block, line and word position of
//! every recognised word next to its text. The extractor prompt forwards the
//! text column; the layout columns are persisted alongside so the table can
//! be re-read without running OCR again.

use crate::error::CollaboratorError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Name of the column holding the recognised words.
pub const TEXT_COLUMN: &str = "text";

/// A tab-delimited, header-bearing OCR result for one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OcrTable {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// A single-column table with one row per line of `lines`.
    pub fn from_text_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        Self {
            header: vec![TEXT_COLUMN.to_string()],
            rows: lines.iter().map(|l| vec![l.as_ref().to_string()]).collect(),
        }
    }

    /// Parse tesseract TSV. Tesseract never quotes, so cells are split on tabs.
    pub fn parse_tsv(text: &str) -> Self {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty());
        let header = lines
            .next()
            .map(|h| h.split('\t').map(str::to_string).collect())
            .unwrap_or_default();
        let rows = lines
            .map(|l| l.split('\t').map(str::to_string).collect())
            .collect();
        Self { header, rows }
    }

    pub fn to_tsv(&self) -> String {
        let mut out = self.header.join("\t");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse_tsv(&std::fs::read_to_string(path)?))
    }

    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_tsv())
    }

    /// True if OCR produced no rows at all.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-blank cells of the text column, one per line.
    pub fn text(&self) -> String {
        let Some(idx) = self.header.iter().position(|h| h == TEXT_COLUMN) else {
            return String::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Recognises the text of one page image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<OcrTable, CollaboratorError>;
}

/// Runs the `tesseract` command-line tool in TSV mode.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn new(language: impl Into<String>, dpi: u32) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: language.into(),
            dpi,
        }
    }

    /// Use a tesseract binary other than the one on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check that the tesseract binary can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary).arg("--version").output().is_ok()
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &Path) -> Result<OcrTable, CollaboratorError> {
        debug!("Running tesseract on {}", image.display());
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| CollaboratorError::new("tesseract", format!("failed to start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::new(
                "tesseract",
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(OcrTable::parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}
