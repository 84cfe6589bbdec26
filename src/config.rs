//! Configuration types for PDF classification.
//!
//! All classification behaviour is controlled through [`ClassifyConfig`],
//! built via its [`ClassifyConfigBuilder`]. One struct holds every knob so a
//! config can be shared across tasks and logged as a whole.

use crate::error::ClassifyError;
use crate::progress::ProgressCallback;
use crate::sanitize::{FilenameSanitizer, DEFAULT_REPLACE_CHAR, INVALID_FILENAME_CHARS};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

/// Placeholder substituted by the PDF file name in
/// [`ClassifyConfig::features_name_fmt`].
pub const PDF_NAME_PLACEHOLDER: &str = "{pdf_name}";

/// Name of the aggregate feature file in the output directory.
pub const ALL_FEATURES_NAME: &str = "all-features.csv";

/// Configuration for a classification run.
///
/// Built via [`ClassifyConfig::builder()`] or using
/// [`ClassifyConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfclassify::ClassifyConfig;
///
/// let config = ClassifyConfig::builder()
///     .output_dir("/srv/scans/out")
///     .ocr_language("deu+eng")
///     .throttle_ms(4000)
///     .build()
///     .unwrap();
/// assert!(config.staging_dir().ends_with("work.d"));
/// ```
#[derive(Clone)]
pub struct ClassifyConfig {
    /// Directory receiving feature files and, by default, the staging area.
    /// Default: `./out`.
    pub output_dir: PathBuf,

    /// Root of the per-document workspaces. Default: `<output_dir>/work.d`.
    pub staging_dir: Option<PathBuf>,

    /// Recompute every cached artifact regardless of timestamps. Default: false.
    pub force: bool,

    /// Rendering DPI for page images, also passed to tesseract. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// Tesseract language(s), e.g. "deu" or "deu+eng". Default: "deu".
    pub ocr_language: String,

    /// Replacement for characters that are invalid in file names. Default: '-'.
    pub replace_char: char,

    /// Minimum spacing between two LLM calls in milliseconds. Default: 2000.
    ///
    /// Free-tier Gemini keys allow about 30 requests per minute. 0 disables
    /// spacing.
    pub throttle_ms: u64,

    /// Number of documents processed at once. Default: 1.
    ///
    /// Rendering and OCR of several documents overlap; LLM calls are still
    /// issued one at a time.
    pub concurrency: usize,

    /// LLM model identifier. If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per page. Default: 512.
    ///
    /// The answer is four short lines.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Write a feature file per document. Default: true.
    ///
    /// Without it every run re-extracts every document.
    pub write_features: bool,

    /// File name of per-document feature files. Must contain `{pdf_name}`.
    /// Default: `{pdf_name}-feature.csv`.
    pub features_name_fmt: String,

    /// Write the results table into the input folder. Default: true.
    pub write_results: bool,

    /// File name of the results table. Default: `results.csv`.
    pub results_name: String,

    /// Progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            staging_dir: None,
            force: false,
            dpi: 200,
            max_rendered_pixels: 3000,
            ocr_language: "deu".to_string(),
            replace_char: DEFAULT_REPLACE_CHAR,
            throttle_ms: 2000,
            concurrency: 1,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 512,
            system_prompt: None,
            write_features: true,
            features_name_fmt: format!("{PDF_NAME_PLACEHOLDER}-feature.csv"),
            write_results: true,
            results_name: "results.csv".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClassifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifyConfig")
            .field("output_dir", &self.output_dir)
            .field("staging_dir", &self.staging_dir)
            .field("force", &self.force)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr_language", &self.ocr_language)
            .field("replace_char", &self.replace_char)
            .field("throttle_ms", &self.throttle_ms)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("write_features", &self.write_features)
            .field("features_name_fmt", &self.features_name_fmt)
            .field("write_results", &self.write_results)
            .field("results_name", &self.results_name)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ClassifyConfig {
    /// Create a new builder for `ClassifyConfig`.
    pub fn builder() -> ClassifyConfigBuilder {
        ClassifyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Root of the per-document workspaces.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("work.d"))
    }

    /// Path of the feature file for the PDF named `pdf_name`.
    pub fn feature_file_path(&self, pdf_name: &str) -> PathBuf {
        self.output_dir
            .join(self.features_name_fmt.replace(PDF_NAME_PLACEHOLDER, pdf_name))
    }

    /// Path of the aggregate feature file.
    pub fn all_features_path(&self) -> PathBuf {
        self.output_dir.join(ALL_FEATURES_NAME)
    }

    /// Sanitizer using the configured replacement character.
    pub fn sanitizer(&self) -> FilenameSanitizer {
        FilenameSanitizer::new(self.replace_char)
    }

    /// Path of the results table for the input folder `pdf_in`.
    pub fn results_path(&self, pdf_in: &Path) -> PathBuf {
        pdf_in.join(&self.results_name)
    }
}

/// Builder for [`ClassifyConfig`].
#[derive(Debug)]
pub struct ClassifyConfigBuilder {
    config: ClassifyConfig,
}

impl ClassifyConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn replace_char(mut self, c: char) -> Self {
        self.config.replace_char = c;
        self
    }

    pub fn throttle_ms(mut self, ms: u64) -> Self {
        self.config.throttle_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn write_features(mut self, v: bool) -> Self {
        self.config.write_features = v;
        self
    }

    pub fn features_name_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.config.features_name_fmt = fmt.into();
        self
    }

    pub fn write_results(mut self, v: bool) -> Self {
        self.config.write_results = v;
        self
    }

    pub fn results_name(mut self, name: impl Into<String>) -> Self {
        self.config.results_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifyConfig, ClassifyError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(ClassifyError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(ClassifyError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if INVALID_FILENAME_CHARS.contains(&c.replace_char) || matches!(c.replace_char, ' ' | '.') {
            return Err(ClassifyError::InvalidConfig(format!(
                "Replacement character {:?} is not allowed",
                c.replace_char
            )));
        }
        if !c.features_name_fmt.contains(PDF_NAME_PLACEHOLDER) {
            return Err(ClassifyError::InvalidConfig(format!(
                "Feature file name '{}' must contain {PDF_NAME_PLACEHOLDER}",
                c.features_name_fmt
            )));
        }
        if c.results_name.is_empty() {
            return Err(ClassifyError::InvalidConfig("Results file name is empty".into()));
        }
        if c.ocr_language.is_empty() {
            return Err(ClassifyError::InvalidConfig("OCR language is empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ClassifyConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.ocr_language, "deu");
        assert_eq!(c.replace_char, '-');
        assert_eq!(c.throttle_ms, 2000);
        assert_eq!(c.concurrency, 1);
        assert!(c.write_features && c.write_results);
    }

    #[test]
    fn derived_paths() {
        let c = ClassifyConfig::builder().output_dir("/out").build().unwrap();
        assert_eq!(c.staging_dir(), PathBuf::from("/out/work.d"));
        assert_eq!(
            c.feature_file_path("scan.pdf"),
            PathBuf::from("/out/scan.pdf-feature.csv")
        );
        assert_eq!(c.all_features_path(), PathBuf::from("/out/all-features.csv"));
        assert_eq!(c.results_path(Path::new("/in")), PathBuf::from("/in/results.csv"));

        let c = ClassifyConfig::builder()
            .output_dir("/out")
            .staging_dir("/tmp/stage")
            .features_name_fmt("features/{pdf_name}.csv")
            .build()
            .unwrap();
        assert_eq!(c.staging_dir(), PathBuf::from("/tmp/stage"));
        assert_eq!(c.feature_file_path("a.pdf"), PathBuf::from("/out/features/a.pdf.csv"));
    }

    #[test]
    fn rejects_out_of_range_dpi() {
        assert!(ClassifyConfig::builder().dpi(50).build().is_err());
        assert!(ClassifyConfig::builder().dpi(600).build().is_err());
        assert!(ClassifyConfig::builder().dpi(300).build().is_ok());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = ClassifyConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_invalid_replace_char() {
        for c in ['/', ':', ' ', '.'] {
            assert!(ClassifyConfig::builder().replace_char(c).build().is_err(), "{c:?}");
        }
        assert!(ClassifyConfig::builder().replace_char('_').build().is_ok());
    }

    #[test]
    fn features_name_needs_placeholder() {
        assert!(ClassifyConfig::builder()
            .features_name_fmt("features.csv")
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ClassifyConfig::default());
        assert!(s.contains("ClassifyConfig"));
        assert!(s.contains("provider: None"));
    }
}
