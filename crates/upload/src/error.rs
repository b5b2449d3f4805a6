//! Upload error types.

use std::path::PathBuf;

use storepush_protocol::ProtocolError;
use storepush_transfer::StoreError;

/// Errors produced while uploading a tree.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file name is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("invalid target path: {0}")]
    InvalidTarget(#[from] ProtocolError),

    #[error("failed to upload to store: {path}")]
    Upload {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to upload directory marker to store: {path}")]
    Marker {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("upload worker failed: {0}")]
    Worker(String),
}
