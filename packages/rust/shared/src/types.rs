//! Core domain types: tenders, their processing records, and the emitted payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderflowError};

/// `merged_text` of a record whose bundle never arrived.
pub const DOWNLOAD_FAILED_TEXT: &str = "Error: Document download failed.";

/// `merged_text` of a record whose bundle yielded no text at all.
pub const EXTRACTION_EMPTY_TEXT: &str = "No relevant text could be extracted.";

// ---------------------------------------------------------------------------
// Tender
// ---------------------------------------------------------------------------

/// Opaque reference the source uses to fetch a tender's document bundle.
///
/// Either a URL or a local path, depending on the source. It never leaves the
/// process: not serialized into sink payloads or run artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleHandle(pub String);

impl BundleHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BundleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One procurement opportunity as listed by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    /// Source-assigned identifier; the natural key within one run.
    pub reference: String,
    /// Free-text description, used for keyword filtering.
    pub subject: String,
    #[serde(default)]
    pub buyer: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub deadline: String,
    /// How to retrieve the document bundle.
    pub bundle_handle: BundleHandle,
}

// ---------------------------------------------------------------------------
// TenderStatus
// ---------------------------------------------------------------------------

/// Processing status of a tender record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Pending,
    Downloaded,
    DownloadFailed,
    Extracted,
    ExtractionEmpty,
}

impl TenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::DownloadFailed => "download_failed",
            Self::Extracted => "extracted",
            Self::ExtractionEmpty => "extraction_empty",
        }
    }

    /// Terminal statuses are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed | Self::Extracted | Self::ExtractionEmpty
        )
    }

    /// Whether the lifecycle allows `self -> next`.
    pub fn can_advance_to(&self, next: TenderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Downloaded)
                | (Self::Pending, Self::DownloadFailed)
                | (Self::Downloaded, Self::Extracted)
                | (Self::Downloaded, Self::ExtractionEmpty)
        )
    }
}

impl std::fmt::Display for TenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TenderRecord
// ---------------------------------------------------------------------------

/// A tender going through (or done with) the ingestion pipeline.
///
/// `merged_text` only grows while the record is `Downloaded`, and the status
/// only moves forward along `pending -> downloaded|download_failed ->
/// extracted|extraction_empty`.
#[derive(Debug, Clone, PartialEq)]
pub struct TenderRecord {
    tender: Tender,
    merged_text: String,
    status: TenderStatus,
}

impl TenderRecord {
    /// Start a record for a freshly scraped tender.
    pub fn new(tender: Tender) -> Self {
        Self {
            tender,
            merged_text: String::new(),
            status: TenderStatus::Pending,
        }
    }

    pub fn tender(&self) -> &Tender {
        &self.tender
    }

    pub fn reference(&self) -> &str {
        &self.tender.reference
    }

    pub fn merged_text(&self) -> &str {
        &self.merged_text
    }

    pub fn status(&self) -> TenderStatus {
        self.status
    }

    /// The bundle landed on disk.
    pub fn mark_downloaded(&mut self) -> Result<()> {
        self.advance(TenderStatus::Downloaded)
    }

    /// No bundle arrived. Sets the sentinel text; nothing else happens to this record.
    pub fn mark_download_failed(&mut self) -> Result<()> {
        self.advance(TenderStatus::DownloadFailed)?;
        self.merged_text = DOWNLOAD_FAILED_TEXT.to_string();
        Ok(())
    }

    /// Append the text of one bundle file, tagged with its file name.
    pub fn append_fragment(&mut self, file_name: &str, text: &str) -> Result<()> {
        if self.status != TenderStatus::Downloaded {
            return Err(self.lifecycle_error("append text"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if !self.merged_text.is_empty() {
            self.merged_text.push_str("\n\n");
        }
        self.merged_text
            .push_str(&format!("--- Content from file: {file_name} ---\n{text}"));
        Ok(())
    }

    /// Close assembly: `extracted` if any fragment was appended, else `extraction_empty`.
    pub fn finish_extraction(&mut self) -> Result<()> {
        if self.merged_text.is_empty() {
            self.advance(TenderStatus::ExtractionEmpty)?;
            self.merged_text = EXTRACTION_EMPTY_TEXT.to_string();
        } else {
            self.advance(TenderStatus::Extracted)?;
        }
        Ok(())
    }

    /// Build the payload handed to the sink and the run artifact.
    pub fn to_emitted(&self, timestamp: DateTime<Utc>) -> EmittedRecord {
        EmittedRecord {
            reference: self.tender.reference.clone(),
            subject: self.tender.subject.clone(),
            buyer: self.tender.buyer.clone(),
            location: self.tender.location.clone(),
            deadline: self.tender.deadline.clone(),
            merged_text: self.merged_text.clone(),
            status: self.status,
            timestamp,
        }
    }

    fn advance(&mut self, next: TenderStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(self.lifecycle_error(next.as_str()));
        }
        self.status = next;
        Ok(())
    }

    fn lifecycle_error(&self, to: &str) -> TenderflowError {
        TenderflowError::Lifecycle {
            reference: self.tender.reference.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// EmittedRecord
// ---------------------------------------------------------------------------

/// The JSON object delivered to the sink and written to the run artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedRecord {
    pub reference: String,
    pub subject: String,
    pub buyer: String,
    pub location: String,
    pub deadline: String,
    pub merged_text: String,
    pub status: TenderStatus,
    pub timestamp: DateTime<Utc>,
}
