//! Zip bundle expansion.
//!
//! A bundle that is not an archive passes through as a single file. A zip is
//! extracted next to itself and replaced by its regular files, in archive
//! order. Inner zips are expanded the same way up to a depth bound.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use zip::ZipArchive;

/// Why a bundle could not be expanded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UnpackFailure {
    #[error("not a readable zip archive: {0}")]
    Corrupt(String),

    #[error("extraction failed: {0}")]
    Extract(String),
}

/// Result of unpacking a bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unpacked {
    /// Files to extract text from, in archive order.
    pub files: Vec<PathBuf>,
    /// Set when the bundle was an archive that could not be expanded.
    pub failure: Option<UnpackFailure>,
}

/// Case-insensitive `.zip` extension check.
pub fn is_zip_name(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Expands bundles, recursing into inner archives up to `max_depth` levels.
#[derive(Debug, Clone)]
pub struct Unpacker {
    max_depth: u32,
}

impl Default for Unpacker {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Unpacker {
    /// `max_depth` counts archive levels; the bundle itself is level 1.
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    #[instrument(skip_all, fields(bundle = %bundle.display()))]
    pub fn unpack(&self, bundle: &Path) -> Unpacked {
        if !is_zip_name(bundle) {
            return Unpacked {
                files: vec![bundle.to_path_buf()],
                failure: None,
            };
        }

        match self.expand(bundle, 1) {
            Ok(files) => {
                debug!(files = files.len(), "bundle unpacked");
                Unpacked {
                    files,
                    failure: None,
                }
            }
            Err(failure) => {
                warn!(error = %failure, "bundle could not be unpacked");
                Unpacked {
                    files: Vec::new(),
                    failure: Some(failure),
                }
            }
        }
    }

    fn expand(&self, archive_path: &Path, level: u32) -> Result<Vec<PathBuf>, UnpackFailure> {
        let dest = fresh_sibling_dir(archive_path)
            .map_err(|e| UnpackFailure::Extract(format!("cannot create output dir: {e}")))?;

        let extracted = match extract_zip(archive_path, &dest) {
            Ok(files) => files,
            Err(failure) => {
                // Partial output is never handed on.
                let _ = fs::remove_dir_all(&dest);
                return Err(failure);
            }
        };

        let mut files = Vec::with_capacity(extracted.len());
        for file in extracted {
            if is_zip_name(&file) && level < self.max_depth {
                match self.expand(&file, level + 1) {
                    Ok(inner) => {
                        files.extend(inner);
                        continue;
                    }
                    Err(failure) => {
                        debug!(inner = %file.display(), error = %failure, "inner archive left as-is");
                    }
                }
            }
            files.push(file);
        }

        Ok(files)
    }
}

/// Extract every entry of `archive_path` into `dest`; return regular files in order.
fn extract_zip(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>, UnpackFailure> {
    let file = File::open(archive_path).map_err(|e| UnpackFailure::Corrupt(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| UnpackFailure::Corrupt(e.to_string()))?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| UnpackFailure::Extract(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping entry escaping the bundle directory");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| UnpackFailure::Extract(e.to_string()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| UnpackFailure::Extract(e.to_string()))?;
        }
        let mut out = File::create(&out_path).map_err(|e| UnpackFailure::Extract(e.to_string()))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| UnpackFailure::Extract(format!("{}: {e}", entry.name())))?;

        if seen.insert(out_path.clone()) {
            files.push(out_path);
        }
    }

    Ok(files)
}

/// `<dir>/<stem>`, or `<stem>-1`, `<stem>-2`, ... when taken.
fn fresh_sibling_dir(archive_path: &Path) -> io::Result<PathBuf> {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "bundle".into());

    let mut candidate = parent.join(&stem);
    let mut n = 0;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = parent.join(format!("{stem}-{n}"));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    use super::*;

    /// Zip bytes from `(name, contents)` pairs; names ending in `/` are directories.
    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(name.trim_end_matches('/'), opts).unwrap();
            } else {
                zip.start_file(*name, opts).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    fn names(files: &[PathBuf], root: &Path) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn plain_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("avis.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let out = Unpacker::default().unpack(&pdf);
        assert_eq!(out.files, vec![pdf]);
        assert_eq!(out.failure, None);
    }

    #[test]
    fn zip_entries_in_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("DCE.ZIP");
        fs::write(
            &bundle,
            zip_bytes(&[
                ("RC.pdf", b"rc"),
                ("pieces/", b""),
                ("pieces/CPS.docx", b"cps"),
                ("pieces/BPU.xlsx", b"bpu"),
                ("avis.txt", b"avis"),
            ]),
        )
        .unwrap();

        let out = Unpacker::default().unpack(&bundle);
        assert_eq!(out.failure, None);
        assert_eq!(
            names(&out.files, dir.path()),
            vec!["DCE/RC.pdf", "DCE/pieces/CPS.docx", "DCE/pieces/BPU.xlsx", "DCE/avis.txt"]
        );
        assert_eq!(fs::read(dir.path().join("DCE/avis.txt")).unwrap(), b"avis");
    }

    #[test]
    fn output_dir_tolerates_collisions() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("dce")).unwrap();
        let bundle = dir.path().join("dce.zip");
        fs::write(&bundle, zip_bytes(&[("a.txt", b"a")])).unwrap();

        let out = Unpacker::default().unpack(&bundle);
        assert_eq!(names(&out.files, dir.path()), vec!["dce-1/a.txt"]);
    }

    #[test]
    fn corrupt_zip_yields_failure_and_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("broken.zip");
        fs::write(&bundle, b"PK not really").unwrap();

        let out = Unpacker::default().unpack(&bundle);
        assert!(out.files.is_empty());
        assert!(matches!(out.failure, Some(UnpackFailure::Corrupt(_))));
        assert!(!dir.path().join("broken").exists());
    }

    #[test]
    fn nested_zip_is_expanded_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let inner = zip_bytes(&[("annexe.txt", b"annexe")]);
        let bundle = dir.path().join("outer.zip");
        fs::write(
            &bundle,
            zip_bytes(&[("rc.txt", b"rc"), ("lot1.zip", &inner), ("z.txt", b"z")]),
        )
        .unwrap();

        let out = Unpacker::new(2).unpack(&bundle);
        assert_eq!(
            names(&out.files, dir.path()),
            vec!["outer/rc.txt", "outer/lot1/annexe.txt", "outer/z.txt"]
        );
    }

    #[test]
    fn nesting_beyond_bound_is_left_as_file() {
        let dir = tempfile::tempdir().unwrap();
        let innermost = zip_bytes(&[("deep.txt", b"deep")]);
        let middle = zip_bytes(&[("inner.zip", &innermost)]);
        let bundle = dir.path().join("outer.zip");
        fs::write(&bundle, zip_bytes(&[("middle.zip", &middle)])).unwrap();

        let out = Unpacker::new(2).unpack(&bundle);
        assert_eq!(names(&out.files, dir.path()), vec!["outer/middle/inner.zip"]);

        let flat = Unpacker::new(1).unpack(&bundle);
        assert_eq!(flat.files.len(), 1);
        assert!(flat.files[0].ends_with("middle.zip"));
    }

    #[test]
    fn corrupt_inner_archive_is_kept_as_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("outer.zip");
        fs::write(&bundle, zip_bytes(&[("bad.zip", b"garbage"), ("ok.txt", b"ok")])).unwrap();

        let out = Unpacker::default().unpack(&bundle);
        assert_eq!(out.failure, None);
        assert_eq!(names(&out.files, dir.path()), vec!["outer/bad.zip", "outer/ok.txt"]);
    }

    #[test]
    fn zip_name_check_is_case_insensitive() {
        assert!(is_zip_name(Path::new("a/B.Zip")));
        assert!(!is_zip_name(Path::new("a/zip")));
        assert!(!is_zip_name(Path::new("a.zipx")));
    }
}
