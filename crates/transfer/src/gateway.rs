//! Store gateway trait.
//!
//! `StoreGateway` is implemented by each backend (HTTP gateway, mounted
//! file share, test mocks). Using a trait keeps transfer logic decoupled
//! from transport.

use std::future::Future;
use std::pin::Pin;

use storepush_protocol::{ContentRange, StorePath};

use crate::StoreError;

/// Boxed future returned by gateway operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Kind of storage behind a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Flat key-value namespace reached through the HTTP gateway. Needs
    /// directory markers to render a hierarchy.
    Gateway,
    /// A real filesystem mount; directories exist on their own.
    FileShare,
}

impl StoreBackend {
    /// Whether directory marker objects must be written for this backend.
    pub fn needs_directory_markers(self) -> bool {
        matches!(self, Self::Gateway)
    }
}

/// Wire operations of the content store.
pub trait StoreGateway: Send + Sync {
    /// Writes a whole object in one request.
    fn put_object<'a>(&'a self, path: &'a StorePath, data: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Writes one range-tagged chunk of an upload session. The first chunk
    /// creates the session.
    fn put_chunk<'a>(
        &'a self,
        path: &'a StorePath,
        session_id: &'a str,
        range: ContentRange,
        data: &'a [u8],
    ) -> StoreFuture<'a, ()>;

    /// Finalizes a session once every chunk has been acknowledged.
    fn commit_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()>;

    /// Discards a session and any chunks it holds.
    fn delete_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()>;

    /// Writes the zero-byte marker object for directory `dir`.
    fn put_marker<'a>(&'a self, dir: &'a StorePath) -> StoreFuture<'a, ()>;

    /// Storage kind behind this gateway.
    fn backend(&self) -> StoreBackend;
}
