use storepush_protocol::{ContentRange, StorePath};

use crate::chunked::split_chunks;

/// One piece of a session upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Zero-based position within the session.
    pub index: usize,
    /// Closed byte interval this chunk covers.
    pub range: ContentRange,
    /// Raw chunk data.
    pub data: &'a [u8],
}

/// An upload session for one object above the single-shot threshold.
///
/// Lives for one upload only: created by the first chunk write, ended by
/// commit or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub target: StorePath,
    pub total_bytes: u64,
    pub chunk_size: usize,
}

impl UploadSession {
    pub fn new(
        session_id: String,
        target: StorePath,
        total_bytes: u64,
        chunk_size: usize,
    ) -> Self {
        Self {
            session_id,
            target,
            total_bytes,
            chunk_size,
        }
    }

    /// Number of chunks the payload splits into.
    pub fn chunk_count(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        (self.total_bytes as usize).div_ceil(self.chunk_size)
    }

    /// Chunks of `data` in upload order.
    pub fn chunks<'a>(&self, data: &'a [u8]) -> impl Iterator<Item = Chunk<'a>> + use<'a> {
        split_chunks(data, self.chunk_size)
    }
}
