//! Tender sources: where tender metadata and document bundles come from.
//!
//! A [`TenderSource`] authenticates, lists the tenders published on a day,
//! and drops a tender's bundle into a landing directory on request. Two
//! implementations ship:
//! - [`PortalSource`]: the procurement portal over HTTP (login form, search
//!   form, results table)
//! - [`ManifestSource`]: a JSON manifest of tenders with local or remote bundles

mod download;
mod manifest;
mod portal;

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;

use tenderflow_shared::{BundleHandle, Result, Tender};

pub use download::{PARTIAL_SUFFIX, fetch_into, file_name_for};
pub use manifest::ManifestSource;
pub use portal::{PortalSource, parse_results};

/// Date format the portal uses in its search form and listings.
pub const PORTAL_DATE_FORMAT: &str = "%d/%m/%Y";

/// Contract every tender source fulfils.
#[async_trait]
pub trait TenderSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Authenticate / open the source. Called (and retried) before listing.
    async fn connect(&self) -> Result<()>;

    /// Tenders published on `date`, in source order.
    async fn list_tenders(&self, date: NaiveDate) -> Result<Vec<Tender>>;

    /// Start fetching a bundle into `landing_dir`.
    ///
    /// The file must carry an in-progress marker (e.g. a `.part` suffix) until
    /// it is complete, so a concurrent poller never picks up a half-written file.
    async fn trigger_download(&self, handle: &BundleHandle, landing_dir: &Path) -> Result<()>;
}

/// Parse a `dd/mm/YYYY` date.
pub fn parse_portal_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), PORTAL_DATE_FORMAT).map_err(|e| {
        tenderflow_shared::TenderflowError::validation(format!(
            "invalid date {raw:?} (expected DD/MM/YYYY): {e}"
        ))
    })
}
