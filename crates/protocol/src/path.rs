//! Store-relative object paths.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::constants::DIRECTORY_MARKER_NAME;

/// Characters left unescaped in a path segment (RFC 3986 unreserved set).
pub(crate) const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A relative path inside the content store.
///
/// Held as a list of logical segments so that each one can be
/// percent-encoded on its own. A segment may legally contain `/` or spaces;
/// encoding keeps them inside that segment on the wire.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parses a `/`-separated path (backslashes are accepted as separators).
    ///
    /// Empty and `.` segments are dropped. Rejects empty paths, absolute
    /// paths, drive prefixes and `..` traversal.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.is_empty() {
            return Err(ProtocolError::InvalidPath("empty path".into()));
        }
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(ProtocolError::InvalidPath(format!(
                "absolute path not allowed: {raw}"
            )));
        }

        let segments: Vec<String> = raw
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();

        if let Some(first) = segments.first()
            && first.len() == 2
            && first.ends_with(':')
        {
            return Err(ProtocolError::InvalidPath(format!(
                "path prefix not allowed: {raw}"
            )));
        }

        Self::from_segments(segments)
    }

    /// Builds a path from already-split logical segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ProtocolError::InvalidPath("empty path".into()));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(ProtocolError::InvalidPath("empty segment".into()));
            }
            if segment == ".." {
                return Err(ProtocolError::InvalidPath(
                    "parent directory traversal not allowed".into(),
                ));
            }
            if segment == "." {
                return Err(ProtocolError::InvalidPath("current directory segment".into()));
            }
            if is_absolute_segment(segment) {
                return Err(ProtocolError::InvalidPath(format!(
                    "absolute segment not allowed: {segment}"
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Logical segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment.
    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Appends one logical segment.
    pub fn join(&self, segment: impl Into<String>) -> Result<Self, ProtocolError> {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::from_segments(segments)
    }

    /// Appends every segment of `other`.
    pub fn join_path(&self, other: &StorePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Parent directory, or `None` for a top-level path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Every proper ancestor, shortest first. `A/B/c` yields `A`, `A/B`.
    pub fn ancestors(&self) -> impl Iterator<Item = StorePath> + '_ {
        (1..self.segments.len()).map(|len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Path of the zero-byte marker object for this directory.
    pub fn marker(&self) -> Self {
        let mut segments = self.segments.clone();
        segments.push(DIRECTORY_MARKER_NAME.to_string());
        Self { segments }
    }

    /// Wire form: each segment percent-encoded, joined with `/`.
    pub fn encoded(&self) -> String {
        self.segments
            .iter()
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn is_absolute_segment(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    segment.starts_with(['/', '\\'])
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl TryFrom<String> for StorePath {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.to_string()
    }
}

impl std::str::FromStr for StorePath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
