//! Shared types, error model, and configuration for tenderflow.
//!
//! This crate is the foundation depended on by all other tenderflow crates.
//! It provides:
//! - [`TenderflowError`]: the unified error type
//! - Domain types ([`Tender`], [`TenderRecord`], [`TenderStatus`], [`EmittedRecord`])
//! - Configuration ([`AppConfig`], env overrides, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, DownloadConfig, ExtractionConfig, FilterConfig, OutputConfig, SinkConfig,
    SourceConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_credentials,
};
pub use error::{Result, TenderflowError};
pub use types::{
    BundleHandle, DOWNLOAD_FAILED_TEXT, EXTRACTION_EMPTY_TEXT, EmittedRecord, Tender,
    TenderRecord, TenderStatus,
};
