//! CLI binary for edgequake-pdfclassify.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ClassifyConfig`, prints one line per document and applies the
//! requested file action.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_pdfclassify::{
    apply_file_action, classify_records, find_pdfs, load_records, Classification, Classifier,
    ClassifyConfig, ClassifyProgressCallback, FileAction, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per document.
/// Documents may finish out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document wall-clock start times, keyed by index.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` tells us how many PDFs there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Classifying");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ClassifyProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Classifying {total} documents…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, _total: usize, name: &str, reused: bool) {
        let elapsed = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            name,
            dim(if reused { "cached " } else { "new    " }),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, index: usize, _total: usize, name: &str, reason: &str) {
        let elapsed = self.elapsed_secs(index);

        let msg = if reason.chars().count() > 80 {
            let head: String = reason.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            reason.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, classified: usize) {
        let failed = total.saturating_sub(classified);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!("{} {} documents classified", green("✔"), bold(&classified.to_string()));
        } else {
            eprintln!(
                "{} {}/{} documents classified  ({} without features)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&classified.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify a folder, write results.csv, touch nothing else
  pdfclassify --pdf-in scans --pdf-out sorted

  # Preview the new names
  pdfclassify --pdf-in scans --pdf-out sorted --copy --dry-run

  # Move documents to their canonical names
  pdfclassify --pdf-in scans --pdf-out sorted --move

  # Re-apply an edited results table without calling the LLM
  pdfclassify --from-results scans/results.csv --pdf-out sorted --copy

  # Ignore every cached artifact
  pdfclassify --pdf-in scans --pdf-out sorted --force

OUTPUT LAYOUT:
  <pdf-out>/<pdf>-feature.csv   selected features per document
  <pdf-out>/all-features.csv    every document's features
  <pdf-out>/work.d/<pdf>/       page images and OCR tables
  <pdf-in>/results.csv          one record per document

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID

SETUP:
  1. Install tesseract with the language data you need (default: deu).
  2. Place libpdfium next to the binary or on the library path.
  3. Set an API key:  export GEMINI_API_KEY=...
"#;

/// Rename scanned PDFs from OCR text and LLM-extracted metadata.
#[derive(Parser, Debug)]
#[command(
    name = "pdfclassify",
    version,
    about = "Rename scanned PDFs from OCR text and LLM-extracted metadata",
    long_about = "Render each page of every PDF in a folder, OCR it with tesseract, ask an LLM \
for the document date, type, sender and number, and derive a sortable file name from the \
most confident page. Every stage is cached on file timestamps.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder of PDFs to classify.
    #[arg(long, env = "PDFCLASSIFY_PDF_IN", required_unless_present = "from_results")]
    pdf_in: Option<PathBuf>,

    /// Folder for feature files, the staging area and renamed documents.
    #[arg(long, env = "PDFCLASSIFY_PDF_OUT", default_value = "out")]
    pdf_out: PathBuf,

    /// Move each document to its canonical name.
    #[arg(long = "move", conflicts_with = "copy")]
    move_files: bool,

    /// Copy each document to its canonical name.
    #[arg(long)]
    copy: bool,

    /// Log what --move/--copy would do without touching any file.
    #[arg(long)]
    dry_run: bool,

    /// Recompute every cached artifact.
    #[arg(long, env = "PDFCLASSIFY_FORCE")]
    force: bool,

    /// Do not write the results table.
    #[arg(long)]
    no_results: bool,

    /// File name of the results table inside --pdf-in.
    #[arg(long, env = "PDFCLASSIFY_RESULTS_NAME", default_value = "results.csv")]
    results_name: String,

    /// Do not write feature files (every run re-extracts).
    #[arg(long)]
    no_features: bool,

    /// File name of per-document feature files; must contain {pdf_name}.
    #[arg(long, env = "PDFCLASSIFY_FEATURES_NAME_FMT", default_value = "{pdf_name}-feature.csv")]
    features_name_fmt: String,

    /// Classify from an existing results table instead of extracting.
    #[arg(long, conflicts_with = "pdf_in")]
    from_results: Option<PathBuf>,

    /// LLM model ID (default: gemini-2.0-flash-lite).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          GEMINI_API_KEY is preferred when several keys are present."
    )]
    provider: Option<String>,

    /// Tesseract language(s), e.g. deu or deu+eng.
    #[arg(long, env = "PDFCLASSIFY_LANGUAGE", default_value = "deu")]
    language: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFCLASSIFY_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Minimum spacing between LLM calls in milliseconds; 0 disables it.
    #[arg(long, env = "PDFCLASSIFY_THROTTLE_MS", default_value_t = 2000)]
    throttle_ms: u64,

    /// Documents processed at once.
    #[arg(short, long, env = "PDFCLASSIFY_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Replacement for characters not allowed in file names.
    #[arg(long, default_value_t = '-')]
    replace_char: char,

    /// Print the classification output as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFCLASSIFY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFCLASSIFY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFCLASSIFY_QUIET")]
    quiet: bool,
}

impl Cli {
    fn file_action(&self) -> FileAction {
        if self.move_files {
            FileAction::Move
        } else if self.copy {
            FileAction::Copy
        } else {
            FileAction::None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && cli.from_results.is_none();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ClassifyProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let action = cli.file_action();

    // ── Reload path ──────────────────────────────────────────────────────
    if let Some(ref results) = cli.from_results {
        let records = load_records(results)
            .with_context(|| format!("Failed to load records from {}", results.display()))?;
        if !cli.quiet && !records.rejected.is_empty() {
            eprintln!("{} {} rows skipped", cyan("⚠"), records.rejected.len());
        }
        let classifications = classify_records(&records, Some(&config.output_dir), &config.sanitizer());
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&classifications)
                    .context("Failed to serialise output")?
            );
        }
        for c in &classifications {
            report(c, &cli);
            act(c, action, &cli)?;
        }
        return Ok(());
    }

    // ── Extraction path ──────────────────────────────────────────────────
    let Some(ref pdf_in) = cli.pdf_in else {
        bail!("--pdf-in is required unless --from-results is given");
    };
    let pdfs = find_pdfs(pdf_in).context("Failed to list input folder")?;
    let classifier = Classifier::new(config).context("Failed to set up classifier")?;
    let output = classifier
        .classify_folder(pdf_in)
        .await
        .context("Classification failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    }

    for pdf in &pdfs {
        match output.get(pdf) {
            Some(c) => {
                report(c, &cli);
                act(c, action, &cli)?;
            }
            None => not_found(pdf, &cli),
        }
    }

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "Classified {}/{} documents in {}ms ({} reused, {} extractor calls)",
            output.stats.classified,
            output.stats.total_documents,
            output.stats.duration_ms,
            output.stats.reused,
            output.stats.extractor_calls,
        );
    }

    Ok(())
}

fn report(c: &Classification, cli: &Cli) {
    match c.target_name() {
        Some(name) if !cli.json && !cli.quiet => {
            println!("Classified: {} -> {}", c.source.display(), name)
        }
        Some(_) => {}
        None => not_found(&c.source, cli),
    }
}

fn act(c: &Classification, action: FileAction, cli: &Cli) -> Result<()> {
    let dest = apply_file_action(c, action, cli.dry_run)
        .with_context(|| format!("Failed to {action} {}", c.source.display()))?;
    if let (Some(dest), true) = (dest, cli.dry_run && !cli.quiet) {
        eprintln!("  {} {action} -> {}", dim("(dry run)"), dest.display());
    }
    Ok(())
}

fn not_found(source: &Path, cli: &Cli) {
    if !cli.json && !cli.quiet {
        println!("No classification data found for: {}", source.display());
    }
}

/// Map CLI args to `ClassifyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClassifyConfig> {
    let mut builder = ClassifyConfig::builder()
        .output_dir(&cli.pdf_out)
        .force(cli.force)
        .dpi(cli.dpi)
        .ocr_language(&cli.language)
        .replace_char(cli.replace_char)
        .throttle_ms(cli.throttle_ms)
        .concurrency(cli.concurrency)
        .write_features(!cli.no_features)
        .features_name_fmt(&cli.features_name_fmt)
        .write_results(!cli.no_results)
        .results_name(&cli.results_name);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
