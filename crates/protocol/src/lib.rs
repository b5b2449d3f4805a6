//! Wire protocol for the content-store upload gateway.
//!
//! The gateway exposes a flat key-value namespace under `/store`. Objects are
//! addressed by `/`-separated logical paths whose segments are percent-encoded
//! one at a time. Large payloads go through an upload session: a series of
//! range-tagged chunk writes followed by an explicit commit.

pub mod constants;
pub mod path;
pub mod range;
pub mod routes;

// Re-export primary types for convenience.
pub use constants::{
    DEFAULT_API_VERSION, DIRECTORY_MARKER_NAME, SESSION_CHUNK_SIZE, SINGLE_SHOT_THRESHOLD,
};
pub use path::StorePath;
pub use range::ContentRange;
pub use routes::{Route, RouteMethod};

/// Errors produced when parsing protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid store path: {0}")]
    InvalidPath(String),

    #[error("invalid content range: {0}")]
    InvalidRange(String),
}
