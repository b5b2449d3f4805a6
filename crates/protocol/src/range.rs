//! `Content-Range` descriptors for session chunk writes.

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// A closed byte interval `[start, end]` within a payload of `total` bytes.
///
/// Rendered as `bytes {start}-{end}/{total}` so the receiver can place the
/// chunk without relying on arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Builds the range for `len` bytes starting at `start`.
    pub fn for_chunk(start: u64, len: u64, total: u64) -> Result<Self, ProtocolError> {
        if len == 0 {
            return Err(ProtocolError::InvalidRange("empty chunk".into()));
        }
        let range = Self {
            start,
            end: start + len - 1,
            total,
        };
        range.validate()?;
        Ok(range)
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this range ends at the last byte of the payload.
    pub fn is_last(&self) -> bool {
        self.end + 1 == self.total
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.end < self.start {
            return Err(ProtocolError::InvalidRange(format!(
                "end {} before start {}",
                self.end, self.start
            )));
        }
        if self.end >= self.total {
            return Err(ProtocolError::InvalidRange(format!(
                "end {} beyond total {}",
                self.end, self.total
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

impl FromStr for ContentRange {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidRange(s.to_string());

        let body = s.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
        let (span, total) = body.split_once('/').ok_or_else(invalid)?;
        let (start, end) = span.split_once('-').ok_or_else(invalid)?;

        let range = Self {
            start: start.trim().parse().map_err(|_| invalid())?,
            end: end.trim().parse().map_err(|_| invalid())?,
            total: total.trim().parse().map_err(|_| invalid())?,
        };
        range.validate()?;
        Ok(range)
    }
}
