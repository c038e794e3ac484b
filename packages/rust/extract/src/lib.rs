//! Per-file text extraction for tender bundles.
//!
//! Dispatches on the file extension into a closed [`FileKind`], runs the
//! matching decoder, then the normalization pass. Nothing here returns an
//! error to the caller: the worst outcome is an [`Extraction`] with no text and
//! a recorded [`ExtractFailure`].

mod cleanup;
mod office;
mod ocr;
mod pdf;
mod sheet;
mod text;

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use tenderflow_shared::ExtractionConfig;

pub use cleanup::{normalize, normalize_paginated};
pub use ocr::{OcrEngine, TesseractOcr};
pub use text::decode_bytes;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Closed set of formats the extractor understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    /// Legacy binary Word document.
    Doc,
    Csv,
    /// xls, xlsx, xlsm, ods
    Spreadsheet,
    Text,
    /// Anything else, with the lower-cased extension (empty when none).
    Unsupported(String),
}

impl FileKind {
    /// Classify a path by its lower-cased extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "csv" => Self::Csv,
            "xls" | "xlsx" | "xlsm" | "ods" => Self::Spreadsheet,
            "txt" => Self::Text,
            _ => Self::Unsupported(ext),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => f.write_str("pdf"),
            Self::Docx => f.write_str("docx"),
            Self::Doc => f.write_str("doc"),
            Self::Csv => f.write_str("csv"),
            Self::Spreadsheet => f.write_str("spreadsheet"),
            Self::Text => f.write_str("text"),
            Self::Unsupported(ext) => write!(f, "unsupported({ext})"),
        }
    }
}

/// Why a file produced no text. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractFailure {
    #[error("unsupported file type {0:?}")]
    Unsupported(String),

    #[error("could not read file: {0}")]
    Read(String),

    #[error("PDF text layer unreadable: {0}")]
    Pdf(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("docx parse failed: {0}")]
    Docx(String),

    #[error("spreadsheet parse failed: {0}")]
    Spreadsheet(String),

    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("extractor panicked: {0}")]
    Panic(String),
}

/// Outcome of extracting one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub path: PathBuf,
    pub kind: FileKind,
    /// The file name matched the denylist and was never opened.
    pub skipped: bool,
    /// Normalized text; `None` when nothing usable came out.
    pub text: Option<String>,
    pub failure: Option<ExtractFailure>,
}

impl Extraction {
    /// A file left out on purpose.
    pub fn skipped(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: FileKind::from_path(path),
            skipped: true,
            text: None,
            failure: None,
        }
    }

    /// File name for display and fragment tagging.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Extracted text, or the empty string.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Decodes files into plain text.
pub struct Extractor {
    config: ExtractionConfig,
    ocr: Arc<dyn OcrEngine>,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    /// Extractor using the external `pdftoppm` + `tesseract` OCR toolchain.
    pub fn new(config: ExtractionConfig) -> Self {
        let ocr = Arc::new(TesseractOcr::from_config(&config));
        Self { config, ocr }
    }

    /// Extractor with a caller-supplied OCR engine.
    pub fn with_ocr(config: ExtractionConfig, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { config, ocr }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract normalized text from one file. Never panics.
    #[instrument(skip_all, fields(file = %path.display()))]
    pub fn extract(&self, path: &Path) -> Extraction {
        let start = Instant::now();
        let kind = FileKind::from_path(path);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch(&kind, path)))
            .unwrap_or_else(|payload| Err(ExtractFailure::Panic(panic_message(payload.as_ref()))));

        let (text, failure) = match outcome {
            Ok(raw) => {
                let cleaned = match kind {
                    FileKind::Pdf => cleanup::normalize_paginated(&raw),
                    _ => cleanup::normalize(&raw),
                };
                if cleaned.is_empty() {
                    (None, None)
                } else {
                    (Some(cleaned), None)
                }
            }
            Err(failure) => {
                warn!(%kind, error = %failure, "extraction degraded to empty text");
                (None, Some(failure))
            }
        };

        debug!(
            %kind,
            chars = text.as_ref().map_or(0, |t| t.chars().count()),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "file extracted"
        );

        Extraction {
            path: path.to_path_buf(),
            kind,
            skipped: false,
            text,
            failure,
        }
    }

    fn dispatch(&self, kind: &FileKind, path: &Path) -> Result<String, ExtractFailure> {
        match kind {
            FileKind::Pdf => pdf::extract(path, &self.config, self.ocr.as_ref()),
            FileKind::Docx => office::extract_docx(path),
            FileKind::Doc => office::extract_doc(path, &self.config.antiword_cmd),
            FileKind::Spreadsheet => sheet::extract_workbook(path),
            FileKind::Csv => sheet::extract_csv(path),
            FileKind::Text => text::read_text_file(path),
            FileKind::Unsupported(ext) => Err(ExtractFailure::Unsupported(ext.clone())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
