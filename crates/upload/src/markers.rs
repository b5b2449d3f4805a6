//! Directory marker planning.
//!
//! A flat key-value store has no directories. Writing one zero-byte marker
//! per directory level lets it render the uploaded tree as a hierarchy.

use std::collections::BTreeSet;

use storepush_protocol::StorePath;
use storepush_transfer::StoreBackend;

/// Every proper ancestor directory of every target path, deduplicated.
///
/// A single-segment path has no ancestors and contributes nothing.
pub fn plan_directory_markers<'a, I>(targets: I) -> BTreeSet<StorePath>
where
    I: IntoIterator<Item = &'a StorePath>,
{
    targets
        .into_iter()
        .flat_map(|target| target.ancestors())
        .collect()
}

/// Markers required on `backend`; always empty for a file share.
pub fn markers_for<'a, I>(backend: StoreBackend, targets: I) -> BTreeSet<StorePath>
where
    I: IntoIterator<Item = &'a StorePath>,
{
    if backend.needs_directory_markers() {
        plan_directory_markers(targets)
    } else {
        BTreeSet::new()
    }
}
