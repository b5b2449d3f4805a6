//! Upload session id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Produces unique upload session ids.
pub trait SessionIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 session ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIds;

impl SessionIdGenerator for UuidSessionIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `{prefix}-{n}` ids, counting from 1.
#[derive(Debug, Default)]
pub struct SequentialSessionIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialSessionIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl SessionIdGenerator for SequentialSessionIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
