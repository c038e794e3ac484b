//! Bundle acquisition: trigger the download, then wait for a finished file.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use tenderflow_shared::{BundleHandle, DownloadConfig, Result, TenderflowError};
use tenderflow_source::TenderSource;

use crate::landing::LandingZone;

/// No completed bundle could be obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadFailed {
    pub waited: Duration,
    /// Why the transfer failed, when the source said so. `None` is a timeout.
    pub reason: Option<String>,
}

impl DownloadFailed {
    pub fn timed_out(waited: Duration) -> Self {
        Self {
            waited,
            reason: None,
        }
    }
}

impl fmt::Display for DownloadFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "download failed after {}s: {reason}", self.waited.as_secs()),
            None => write!(f, "no completed download after {}s", self.waited.as_secs()),
        }
    }
}

impl std::error::Error for DownloadFailed {}

/// What the acquirer got for a tender.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    /// A completed file inside the landing zone.
    Ready(PathBuf),
    Failed(DownloadFailed),
}

/// Polling knobs.
#[derive(Debug, Clone)]
pub struct AcquireSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Name suffixes of files still being written.
    pub partial_suffixes: Vec<String>,
    /// Name prefixes of files still being written (hidden files included).
    pub partial_prefixes: Vec<String>,
}

impl From<&DownloadConfig> for AcquireSettings {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            partial_suffixes: config.partial_suffixes.clone(),
            partial_prefixes: config.partial_prefixes.clone(),
        }
    }
}

impl AcquireSettings {
    fn is_in_progress(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.partial_suffixes
            .iter()
            .any(|s| lower.ends_with(&s.to_lowercase()))
            || self.partial_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    path: PathBuf,
    size: u64,
}

/// Triggers bundle downloads and waits for them to land.
#[derive(Debug, Clone)]
pub struct Acquirer {
    settings: AcquireSettings,
}

impl Acquirer {
    pub fn new(settings: AcquireSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AcquireSettings {
        &self.settings
    }

    /// Ask `source` for the bundle behind `handle` and wait for it in `zone`.
    ///
    /// The timeout runs from the moment the trigger returns. A failed transfer
    /// ([`TenderflowError::Download`]) and a timeout both become
    /// [`Acquisition::Failed`]; any other trigger error propagates.
    ///
    /// A file is taken once it keeps the same path and size over two polls.
    /// A finished file that is present when the deadline passes is taken as is.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn acquire(
        &self,
        source: &dyn TenderSource,
        handle: &BundleHandle,
        zone: &LandingZone,
    ) -> Result<Acquisition> {
        let triggered = Instant::now();
        match source.trigger_download(handle, zone.path()).await {
            Ok(()) => {}
            Err(TenderflowError::Download(reason)) => {
                let waited = triggered.elapsed();
                warn!(reason = %reason, "bundle transfer failed");
                return Ok(Acquisition::Failed(DownloadFailed {
                    waited,
                    reason: Some(reason),
                }));
            }
            Err(e) => return Err(e),
        }

        let started = Instant::now();
        let deadline = started + self.settings.timeout;
        let mut previous: Option<Candidate> = None;

        loop {
            let current = newest_complete(zone.path(), &self.settings)
                .map_err(|e| TenderflowError::io(zone.path(), e))?;
            let expired = Instant::now() >= deadline;

            let settled = current
                .as_ref()
                .filter(|cur| expired || previous.as_ref() == Some(*cur));
            if let Some(cur) = settled {
                info!(
                    file = %cur.path.display(),
                    bytes = cur.size,
                    stable = previous.as_ref() == Some(cur),
                    trigger_ms = (started - triggered).as_millis() as u64,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "download complete"
                );
                return Ok(Acquisition::Ready(cur.path.clone()));
            }

            if expired {
                let waited = started.elapsed();
                warn!(waited_secs = waited.as_secs(), "download timed out");
                return Ok(Acquisition::Failed(DownloadFailed::timed_out(waited)));
            }

            previous = current;
            sleep(self.settings.poll_interval).await;
        }
    }
}

/// The most recently modified finished file, ties broken by name.
fn newest_complete(dir: &Path, settings: &AcquireSettings) -> io::Result<Option<Candidate>> {
    let mut best: Option<(SystemTime, String, Candidate)> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if settings.is_in_progress(&name) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            // Renamed away between listing and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        let better = match &best {
            None => true,
            Some((best_time, best_name, _)) => {
                modified > *best_time || (modified == *best_time && name < *best_name)
            }
        };
        if better {
            let candidate = Candidate {
                path: entry.path(),
                size: meta.len(),
            };
            best = Some((modified, name, candidate));
        }
    }

    if let Some((_, name, candidate)) = &best {
        debug!(file = %name, bytes = candidate.size, "candidate bundle");
    }
    Ok(best.map(|(_, _, candidate)| candidate))
}
