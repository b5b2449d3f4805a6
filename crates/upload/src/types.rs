//! Data types for the upload pipeline.

use std::path::PathBuf;

use storepush_protocol::StorePath;

/// Default number of concurrent upload workers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// One file to upload. Consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub source_path: PathBuf,
    pub target_path: StorePath,
    pub size_bytes: u64,
}

/// Emitted once per completed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub file_name: String,
    /// 1-based count of files finished so far in this run.
    pub completed: usize,
    pub total: usize,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub files: usize,
    pub markers: usize,
    pub bytes: u64,
}

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Upper bound on simultaneously running upload workers.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}
