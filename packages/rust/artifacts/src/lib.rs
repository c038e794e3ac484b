//! Durable run artifacts.
//!
//! The CSV summary is the run's record of what was processed. It is written
//! once at the end of a run, even when nothing was accumulated, so downstream
//! tooling always finds a file with the expected header.
//!
//! Files are written atomically: the bytes go to a hidden temp file next to
//! the target, which is then renamed over it.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use tenderflow_shared::{EmittedRecord, Result, TenderflowError};

/// Column order of the summary CSV.
pub const SUMMARY_HEADER: [&str; 8] = [
    "reference",
    "subject",
    "buyer",
    "location",
    "deadline",
    "merged_text",
    "status",
    "timestamp",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Metadata for one written artifact file.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
    pub records: usize,
}

/// Everything written at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunArtifacts {
    pub summary: ArtifactMeta,
    pub json: Option<ArtifactMeta>,
}

/// The JSON dump's path: the summary path with a `.json` extension.
pub fn json_sibling(summary_path: &Path) -> PathBuf {
    summary_path.with_extension("json")
}

/// Write the summary CSV and, when asked, the JSON dump next to it.
#[instrument(skip_all, fields(path = %summary_path.display(), records = records.len()))]
pub fn write_run_artifacts(
    summary_path: &Path,
    records: &[EmittedRecord],
    with_json: bool,
) -> Result<RunArtifacts> {
    let summary = write_summary(summary_path, records)?;
    let json = if with_json {
        Some(write_json_dump(&json_sibling(summary_path), records)?)
    } else {
        None
    };

    info!(
        path = %summary.path.display(),
        records = summary.records,
        sha256 = %summary.sha256,
        "run artifacts written"
    );
    Ok(RunArtifacts { summary, json })
}

/// Write `records` as a BOM-prefixed UTF-8 CSV with [`SUMMARY_HEADER`].
pub fn write_summary(path: &Path, records: &[EmittedRecord]) -> Result<ArtifactMeta> {
    let bytes = render_summary(records)?;
    write_atomic(path, &bytes)?;
    Ok(meta(path, &bytes, records.len()))
}

/// Write `records` as a pretty-printed JSON array.
pub fn write_json_dump(path: &Path, records: &[EmittedRecord]) -> Result<ArtifactMeta> {
    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| TenderflowError::Artifact(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &json)?;
    Ok(meta(path, &json, records.len()))
}

/// Render the summary CSV in memory.
pub fn render_summary(records: &[EmittedRecord]) -> Result<Vec<u8>> {
    let mut buf = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        writer.write_record(SUMMARY_HEADER).map_err(csv_error)?;

        for record in records {
            let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
            writer
                .write_record([
                    record.reference.as_str(),
                    record.subject.as_str(),
                    record.buyer.as_str(),
                    record.location.as_str(),
                    record.deadline.as_str(),
                    record.merged_text.as_str(),
                    record.status.as_str(),
                    timestamp.as_str(),
                ])
                .map_err(csv_error)?;
        }

        writer
            .flush()
            .map_err(|e| TenderflowError::Artifact(format!("CSV flush failed: {e}")))?;
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn csv_error(e: csv::Error) -> TenderflowError {
    TenderflowError::Artifact(format!("CSV encoding failed: {e}"))
}

/// Write to `.<name>.tmp` beside `target`, then rename over it.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| TenderflowError::io(&parent, e))?;

    let file_name = target
        .file_name()
        .ok_or_else(|| TenderflowError::Artifact(format!("{} has no file name", target.display())))?
        .to_string_lossy();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| TenderflowError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(TenderflowError::io(target, e));
    }

    debug!(file = %target.display(), size = bytes.len(), "wrote artifact");
    Ok(())
}

fn meta(path: &Path, bytes: &[u8], records: usize) -> ArtifactMeta {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ArtifactMeta {
        path: path.to_path_buf(),
        sha256: format!("{:x}", hasher.finalize()),
        size_bytes: bytes.len(),
        records,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
