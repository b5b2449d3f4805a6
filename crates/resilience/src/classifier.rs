//! Transient transport fault classification.
//!
//! Errors reach the retry layer wrapped in any number of application
//! layers. The classifier walks the `source()` chain looking for a fault
//! code at each level; an [`io::Error`] is unwrapped through its inner
//! error as well, since its `source()` skips that level.

use std::error::Error;
use std::io;

use crate::fault::{Fault, FaultCode};

/// How many causes below the top-level error are inspected.
pub const MAX_CAUSE_DEPTH: usize = 8;

/// Marker matched case-insensitively in messages that carry no code.
const BAD_DECRYPT_MARKER: &str = "bad_decrypt";

/// Returns true if `err`, or one of its causes, is a transient transport fault.
///
/// At each level: a fault code decides by membership in the transient set;
/// a level without a code is matched against the `BAD_DECRYPT` marker in its
/// message. Neither matching moves on to the cause.
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|level| match fault_code(level) {
        Some(code) => code.is_transient(),
        None => level
            .to_string()
            .to_ascii_lowercase()
            .contains(BAD_DECRYPT_MARKER),
    })
}

/// Fault code carried directly by `err` (not its causes).
pub fn fault_code(err: &(dyn Error + 'static)) -> Option<FaultCode> {
    if let Some(fault) = err.downcast_ref::<Fault>() {
        return fault.code().cloned();
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return FaultCode::from_io_kind(io_err.kind());
    }
    None
}

/// First HTTP status found along the cause chain of `err`.
pub fn http_status(err: &(dyn Error + 'static)) -> Option<u16> {
    chain(err).find_map(|level| level.downcast_ref::<Fault>().and_then(Fault::status))
}

/// Iterates `err` and its causes, bounded by [`MAX_CAUSE_DEPTH`].
fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |level| cause(*level)).take(MAX_CAUSE_DEPTH + 1)
}

fn cause<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    if let Some(io_err) = err.downcast_ref::<io::Error>()
        && let Some(inner) = io_err.get_ref()
    {
        return Some(inner as &(dyn Error + 'static));
    }
    err.source()
}
