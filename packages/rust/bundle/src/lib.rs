//! Getting a tender's bundle onto disk and opening it up.
//!
//! - [`LandingZone`]: a scratch directory per acquisition, removed on drop
//! - [`Acquirer`]: triggers a download and waits for a completed file
//! - [`Unpacker`]: expands zip bundles into a flat, ordered file list

mod acquire;
mod landing;
mod unpack;

pub use acquire::{AcquireSettings, Acquirer, Acquisition, DownloadFailed};
pub use landing::LandingZone;
pub use unpack::{UnpackFailure, Unpacked, Unpacker, is_zip_name};
