use storepush_protocol::ContentRange;

use crate::types::Chunk;

/// How a payload of a given size is transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// One write carrying the whole payload.
    SingleShot,
    /// An upload session of `chunks` range-tagged writes plus a commit.
    Session { chunks: usize },
}

impl TransferMode {
    /// Picks the mode for `len` bytes. `len == threshold` is still single-shot.
    pub fn for_len(len: usize, threshold: usize, chunk_size: usize) -> Self {
        if len <= threshold {
            Self::SingleShot
        } else {
            Self::Session {
                chunks: len.div_ceil(chunk_size.max(1)),
            }
        }
    }
}

/// Splits `data` into consecutive chunks of `chunk_size` bytes (the last may
/// be shorter), each tagged with its closed byte range.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> impl Iterator<Item = Chunk<'_>> {
    let total = data.len() as u64;
    data.chunks(chunk_size.max(1))
        .enumerate()
        .scan(0u64, move |offset, (index, piece)| {
            let start = *offset;
            *offset += piece.len() as u64;
            Some(Chunk {
                index,
                range: ContentRange {
                    start,
                    end: *offset - 1,
                    total,
                },
                data: piece,
            })
        })
}
