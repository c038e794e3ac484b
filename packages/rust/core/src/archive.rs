//! Optional copy of each raw bundle before it is unpacked.

use std::path::{Path, PathBuf};

use tracing::debug;

use tenderflow_shared::{Result, TenderflowError};

/// Keeps a copy of a downloaded bundle somewhere durable.
pub trait BundleArchiver: Send + Sync {
    /// Archive `bundle` for tender `reference`; returns where it went.
    fn archive(&self, reference: &str, bundle: &Path) -> Result<Option<PathBuf>>;
}

/// Archiving disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

impl BundleArchiver for NoArchive {
    fn archive(&self, _reference: &str, _bundle: &Path) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Copies bundles to `<root>/<reference>/<file name>`.
#[derive(Debug, Clone)]
pub struct DirectoryArchiver {
    root: PathBuf,
}

impl DirectoryArchiver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BundleArchiver for DirectoryArchiver {
    fn archive(&self, reference: &str, bundle: &Path) -> Result<Option<PathBuf>> {
        let file_name = bundle.file_name().ok_or_else(|| {
            TenderflowError::validation(format!("bundle {} has no file name", bundle.display()))
        })?;

        let dir = self.root.join(reference_dir_name(reference));
        std::fs::create_dir_all(&dir).map_err(|e| TenderflowError::io(&dir, e))?;

        let target = dir.join(file_name);
        std::fs::copy(bundle, &target).map_err(|e| TenderflowError::io(&target, e))?;

        debug!(reference, target = %target.display(), "bundle archived");
        Ok(Some(target))
    }
}

/// References contain `/` (e.g. `AO-12/2026`); keep them one path component.
fn reference_dir_name(reference: &str) -> String {
    let name: String = reference
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match name.as_str() {
        "" | "." | ".." => "unreferenced".into(),
        _ => name,
    }
}
