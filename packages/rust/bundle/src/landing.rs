//! Per-acquisition scratch directories.

use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use tenderflow_shared::{Result, TenderflowError};

/// A fresh directory under the landing root, owned by one acquisition.
///
/// Everything written into it (the bundle, unpacked files) is deleted when the
/// zone is dropped, so one tender's files never leak into the next.
#[derive(Debug)]
pub struct LandingZone {
    dir: TempDir,
}

impl LandingZone {
    /// Create a zone under `root`, named after `label` for easier debugging.
    pub fn create(root: &Path, label: &str) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| TenderflowError::io(root, e))?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize_label(label)))
            .tempdir_in(root)
            .map_err(|e| TenderflowError::io(root, e))?;

        debug!(zone = %dir.path().display(), "landing zone created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(48)
        .collect();

    if cleaned.is_empty() { "tender".into() } else { cleaned }
}
