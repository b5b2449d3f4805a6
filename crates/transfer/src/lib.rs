//! Object transfer to a content store.
//!
//! Payloads up to [`SINGLE_SHOT_THRESHOLD`] go out in one write. Larger
//! payloads are split into [`SESSION_CHUNK_SIZE`] pieces and sent through an
//! upload session that is committed at the end, or deleted if anything fails.

mod chunked;
mod gateway;
mod session_id;
mod types;
mod uploader;

pub use chunked::{TransferMode, split_chunks};
pub use gateway::{StoreBackend, StoreFuture, StoreGateway};
pub use session_id::{SequentialSessionIds, SessionIdGenerator, UuidSessionIds};
pub use storepush_protocol::{SESSION_CHUNK_SIZE, SINGLE_SHOT_THRESHOLD};
pub use types::{Chunk, UploadSession};
pub use uploader::ChunkedBlobUploader;

use storepush_protocol::ProtocolError;
use storepush_resilience::Fault;

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("gateway request failed: {0}")]
    Gateway(#[from] Fault),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("circuit breaker {0} is open")]
    CircuitOpen(String),

    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
