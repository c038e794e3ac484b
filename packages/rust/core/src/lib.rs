//! Core pipeline orchestration for tenderflow.
//!
//! Ties the tender source, bundle acquisition, unpacking and text extraction
//! into one run that emits a record per relevant tender.

pub mod archive;
pub mod assembler;
pub mod filter;
pub mod pipeline;
pub mod sink;

pub use archive::{BundleArchiver, DirectoryArchiver, NoArchive};
pub use assembler::{Assembler, Assembly, RecordAssembler};
pub use filter::SubjectFilter;
pub use pipeline::{
    DroppedTender, Pipeline, PipelineConfig, ProgressReporter, RunReport, SilentProgress,
};
pub use sink::{NullSink, RecordSink, SinkDeliveryFailed, WebhookSink, sink_from_config};
