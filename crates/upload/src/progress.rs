//! Progress reporting.

use crate::types::ProgressEvent;

/// Receives one event per completed file.
///
/// Called from worker tasks, possibly concurrently.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}
