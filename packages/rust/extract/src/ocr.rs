//! OCR for scanned PDFs.
//!
//! The default engine shells out to `pdftoppm` to rasterize pages and to
//! `tesseract` to read them. Both run inside a scoped temp dir.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use tenderflow_shared::ExtractionConfig;

use crate::ExtractFailure;

/// Reads text out of a PDF's rendered pages.
pub trait OcrEngine: Send + Sync {
    /// OCR pages `1..=page_limit` of `pdf`, in page order, joined by newlines.
    fn recognize_pdf(
        &self,
        pdf: &Path,
        page_limit: u32,
        languages: &str,
    ) -> Result<String, ExtractFailure>;
}

/// `pdftoppm` + `tesseract` command-line engine.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pdftoppm_cmd: String,
    tesseract_cmd: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            pdftoppm_cmd: config.pdftoppm_cmd.clone(),
            tesseract_cmd: config.tesseract_cmd.clone(),
            dpi: config.ocr_dpi,
        }
    }

    fn render_pages(&self, pdf: &Path, page_limit: u32, out_dir: &Path) -> Result<Vec<PathBuf>, ExtractFailure> {
        let prefix = out_dir.join("page");
        let output = Command::new(&self.pdftoppm_cmd)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(page_limit.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| command_failure(&self.pdftoppm_cmd, e.to_string()))?;

        if !output.status.success() {
            return Err(command_failure(
                &self.pdftoppm_cmd,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // pdftoppm zero-pads page numbers to a common width, so name order is page order.
        let mut pages: Vec<PathBuf> = std::fs::read_dir(out_dir)
            .map_err(|e| ExtractFailure::Ocr(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        pages.sort();

        Ok(pages)
    }

    fn read_page(&self, image: &Path, languages: &str) -> Result<String, ExtractFailure> {
        let output = Command::new(&self.tesseract_cmd)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .output()
            .map_err(|e| command_failure(&self.tesseract_cmd, e.to_string()))?;

        if !output.status.success() {
            return Err(command_failure(
                &self.tesseract_cmd,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractOcr {
    #[instrument(skip_all, fields(pdf = %pdf.display(), page_limit, languages))]
    fn recognize_pdf(
        &self,
        pdf: &Path,
        page_limit: u32,
        languages: &str,
    ) -> Result<String, ExtractFailure> {
        let scratch = tempfile::tempdir().map_err(|e| ExtractFailure::Ocr(e.to_string()))?;
        let pages = self.render_pages(pdf, page_limit, scratch.path())?;

        if pages.is_empty() {
            return Err(ExtractFailure::Ocr("no pages rendered".into()));
        }

        let mut texts = Vec::with_capacity(pages.len());
        for page in &pages {
            texts.push(self.read_page(page, languages)?);
        }

        debug!(pages = pages.len(), "ocr complete");
        Ok(texts.join("\n"))
    }
}

fn command_failure(command: &str, message: String) -> ExtractFailure {
    ExtractFailure::Command {
        command: command.to_string(),
        message,
    }
}
