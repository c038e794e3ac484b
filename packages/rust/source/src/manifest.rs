//! Tenders listed in a JSON manifest, for offline runs and replays.
//!
//! ```json
//! [
//!   { "reference": "AO-1", "subject": "Audit", "bundle_handle": "bundles/ao1.zip",
//!     "published": "2026-03-11" }
//! ]
//! ```
//!
//! Relative local handles resolve against the manifest's directory. Entries
//! without `published` are listed for every date.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use tenderflow_shared::{BundleHandle, Result, Tender, TenderflowError};

use crate::TenderSource;
use crate::download::{PARTIAL_SUFFIX, fetch_into};

#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    #[serde(flatten)]
    tender: Tender,
    #[serde(default)]
    published: Option<NaiveDate>,
}

/// Tender source reading a JSON manifest file.
#[derive(Debug)]
pub struct ManifestSource {
    path: PathBuf,
    base_dir: PathBuf,
    entries: Vec<ManifestEntry>,
    client: Client,
}

impl ManifestSource {
    /// Load and validate the manifest at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TenderflowError::io(path, e))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&content).map_err(|e| {
            TenderflowError::validation(format!("invalid manifest {}: {e}", path.display()))
        })?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            path: path.to_path_buf(),
            base_dir,
            entries,
            client: Client::new(),
        })
    }

    fn resolve_local(&self, handle: &str) -> PathBuf {
        let candidate = Path::new(handle);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

#[async_trait]
impl TenderSource for ManifestSource {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn connect(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(TenderflowError::Source(format!(
                "manifest {} disappeared",
                self.path.display()
            )));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(manifest = %self.path.display(), date = %date))]
    async fn list_tenders(&self, date: NaiveDate) -> Result<Vec<Tender>> {
        let tenders: Vec<Tender> = self
            .entries
            .iter()
            .filter(|e| e.published.is_none_or(|d| d == date))
            .map(|e| e.tender.clone())
            .collect();

        info!(count = tenders.len(), total = self.entries.len(), "tenders listed");
        Ok(tenders)
    }

    #[instrument(skip_all, fields(handle = %handle))]
    async fn trigger_download(&self, handle: &BundleHandle, landing_dir: &Path) -> Result<()> {
        let raw = handle.as_str();

        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw)
                .map_err(|e| TenderflowError::validation(format!("bad bundle URL {raw}: {e}")))?;
            fetch_into(&self.client, &url, landing_dir).await?;
            return Ok(());
        }

        let source = self.resolve_local(raw);
        let name = source
            .file_name()
            .ok_or_else(|| TenderflowError::validation(format!("bundle handle {raw} has no file name")))?
            .to_string_lossy()
            .into_owned();

        let partial = landing_dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        let target = landing_dir.join(&name);

        tokio::fs::copy(&source, &partial)
            .await
            .map_err(|e| TenderflowError::io(&source, e))?;
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| TenderflowError::io(&target, e))?;

        debug!(file = %name, "bundle copied");
        Ok(())
    }
}
