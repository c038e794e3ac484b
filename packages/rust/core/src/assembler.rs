//! Tender record assembly.
//!
//! Turns an acquired bundle into a finished [`TenderRecord`]: unpack, skip
//! denylisted files, extract each remaining file in archive order and merge
//! the non-empty texts into the record.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use tenderflow_bundle::{Acquisition, UnpackFailure, Unpacker};
use tenderflow_extract::{Extraction, Extractor};
use tenderflow_shared::{Tender, TenderRecord};

/// A finished record plus what happened to each file on the way.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub record: TenderRecord,
    /// One entry per unpacked file, in archive order, skipped ones included.
    pub files: Vec<Extraction>,
    pub unpack_failure: Option<UnpackFailure>,
}

/// Turns a tender and what was acquired for it into a finished record.
///
/// Runs on a blocking worker; a panic there drops the tender.
pub trait RecordAssembler: Send + Sync {
    fn assemble(&self, tender: Tender, acquisition: &Acquisition) -> TenderRecord;
}

/// Builds tender records from acquired bundles.
#[derive(Debug)]
pub struct Assembler {
    unpacker: Unpacker,
    extractor: Extractor,
    /// Lowercased file-name substrings never extracted.
    file_denylist: Vec<String>,
}

impl Assembler {
    pub fn new<I, S>(extractor: Extractor, file_denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unpacker = Unpacker::new(extractor.config().max_archive_depth);
        let file_denylist = file_denylist
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            unpacker,
            extractor,
            file_denylist,
        }
    }

    /// Whether the file name contains a denylisted substring.
    pub fn is_denied(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.file_denylist.iter().any(|d| name.contains(d.as_str()))
    }

    /// Assemble the record for `tender`, keeping per-file outcomes. Never fails.
    #[instrument(skip_all, fields(reference = %tender.reference))]
    pub fn assemble_detailed(&self, tender: Tender, acquisition: &Acquisition) -> Assembly {
        let start = Instant::now();
        let mut record = TenderRecord::new(tender);

        let bundle = match acquisition {
            Acquisition::Ready(path) => path,
            Acquisition::Failed(failed) => {
                if let Err(e) = record.mark_download_failed() {
                    warn!(error = %e, "record already past download");
                }
                info!(reason = %failed, "no bundle, download_failed recorded");
                return Assembly {
                    record,
                    files: Vec::new(),
                    unpack_failure: None,
                };
            }
        };

        if let Err(e) = record.mark_downloaded() {
            warn!(error = %e, "record already past download");
            return Assembly {
                record,
                files: Vec::new(),
                unpack_failure: None,
            };
        }

        let unpacked = self.unpacker.unpack(bundle);
        let mut files = Vec::with_capacity(unpacked.files.len());

        for path in &unpacked.files {
            if self.is_denied(path) {
                debug!(file = %path.display(), "skipped by file denylist");
                files.push(Extraction::skipped(path));
                continue;
            }

            let extraction = self.extractor.extract(path);
            if let Some(text) = &extraction.text {
                if let Err(e) = record.append_fragment(&extraction.file_name(), text) {
                    warn!(error = %e, "fragment not appended");
                }
            }
            files.push(extraction);
        }

        if let Err(e) = record.finish_extraction() {
            warn!(error = %e, "record could not be closed");
        }

        info!(
            status = %record.status(),
            files = files.len(),
            contributing = files.iter().filter(|f| f.text.is_some()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "record assembled"
        );

        Assembly {
            record,
            files,
            unpack_failure: unpacked.failure,
        }
    }
}

impl RecordAssembler for Assembler {
    fn assemble(&self, tender: Tender, acquisition: &Acquisition) -> TenderRecord {
        self.assemble_detailed(tender, acquisition).record
    }
}
