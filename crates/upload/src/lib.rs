//! Bulk upload of an application package directory to a content store.
//!
//! # Pipeline
//!
//! 1. **Scan**: recursively walk the package directory
//! 2. **Upload**: send every file through a bounded worker pool, each
//!    transfer retried on transient transport faults
//! 3. **Markers**: once every file has succeeded, write the directory
//!    markers a flat store needs to render the hierarchy
//!
//! The first permanent failure in either phase stops the run.

pub mod error;
pub mod markers;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod types;

// Re-export primary types for convenience.
pub use error::UploadError;
pub use markers::{markers_for, plan_directory_markers};
pub use pipeline::UploadPipeline;
pub use progress::ProgressSink;
pub use scanner::scan_files_for_upload;
pub use types::{
    DEFAULT_MAX_CONCURRENCY, PipelineConfig, ProgressEvent, UploadSummary, UploadTask,
};
