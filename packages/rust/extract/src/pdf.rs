//! PDF text: read the text layer, fall back to OCR when it is too thin.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use lopdf::Document;
use tracing::{debug, info};

use tenderflow_shared::ExtractionConfig;

use crate::ExtractFailure;
use crate::ocr::OcrEngine;

pub(crate) fn extract(
    path: &Path,
    config: &ExtractionConfig,
    ocr: &dyn OcrEngine,
) -> Result<String, ExtractFailure> {
    let layer = match catch_unwind(AssertUnwindSafe(|| read_text_layer(path, config.pdf_page_limit))) {
        Ok(Ok(text)) => text,
        Ok(Err(failure)) => {
            debug!(error = %failure, "text layer unavailable, trying OCR");
            String::new()
        }
        Err(_) => {
            debug!("PDF parser panicked, trying OCR");
            String::new()
        }
    };

    choose_text(layer, config.ocr_min_text_chars, || {
        info!(file = %path.display(), "sparse text layer, running OCR");
        ocr.recognize_pdf(path, config.pdf_page_limit, &config.ocr_languages)
    })
}

/// Keep the text layer when it has at least `min_chars` characters, otherwise
/// replace it with whatever `run_ocr` returns.
pub(crate) fn choose_text(
    layer: String,
    min_chars: usize,
    run_ocr: impl FnOnce() -> Result<String, ExtractFailure>,
) -> Result<String, ExtractFailure> {
    let trimmed = layer.trim();
    if trimmed.chars().count() >= min_chars {
        return Ok(trimmed.to_string());
    }

    run_ocr().map(|text| text.trim().to_string())
}

/// Text of the first `page_limit` pages, one block per page.
///
/// An error here is not final: the caller treats an unparseable file as an
/// empty layer and sends it to OCR.
fn read_text_layer(path: &Path, page_limit: u32) -> Result<String, ExtractFailure> {
    let document = Document::load(path).map_err(|e| ExtractFailure::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page_number in document.get_pages().into_keys().take(page_limit as usize) {
        match document.extract_text(&[page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => debug!(page = page_number, error = %e, "page text unreadable"),
        }
    }

    Ok(text)
}
