//! Content store backed by a mounted directory.
//!
//! Session chunks are written at their range offset into a staging file under
//! [`STAGING_DIR`]; commit moves the staging file into place.

use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use storepush_protocol::{ContentRange, ProtocolError, StorePath};
use storepush_transfer::{StoreBackend, StoreError, StoreFuture, StoreGateway};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

/// Directory below the root holding in-progress session data.
pub const STAGING_DIR: &str = ".storepush-sessions";

#[derive(Debug, Clone)]
struct StagedSession {
    target: StorePath,
    staging: PathBuf,
    total: u64,
    /// Written ranges, keyed by start offset, holding the inclusive end.
    ranges: BTreeMap<u64, u64>,
}

impl StagedSession {
    /// Number of distinct bytes covered by the written ranges.
    fn covered(&self) -> u64 {
        let mut covered = 0;
        let mut next = 0;
        for (&start, &end) in &self.ranges {
            let from = start.max(next);
            if end >= from {
                covered += end - from + 1;
                next = end + 1;
            }
        }
        covered
    }
}

/// [`StoreGateway`] writing objects as files below a root directory.
#[derive(Debug)]
pub struct FileShareStore {
    root: PathBuf,
    sessions: Mutex<HashMap<String, StagedSession>>,
}

impl FileShareStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of `path`.
    ///
    /// Each segment must be a single plain file name, so a resolved path
    /// never leaves the root.
    pub fn resolve(&self, path: &StorePath) -> Result<PathBuf, StoreError> {
        let mut full = self.root.clone();
        for segment in path.segments() {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => full.push(name),
                _ => {
                    return Err(ProtocolError::InvalidPath(format!(
                        "segment {segment:?} of {path} is not a plain file name"
                    ))
                    .into());
                }
            }
        }
        Ok(full)
    }

    fn staging_path(&self, session_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(format!("{session_id}.part"))
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, StagedSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn write_object(&self, path: &StorePath, data: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;
        debug!(path = %full.display(), bytes = data.len(), "wrote object");
        Ok(())
    }

    async fn write_chunk(
        &self,
        path: &StorePath,
        session_id: &str,
        range: ContentRange,
        data: &[u8],
    ) -> Result<(), StoreError> {
        if range.len() != data.len() as u64 {
            return Err(StoreError::UnexpectedResponse(format!(
                "chunk {range} carries {} bytes",
                data.len()
            )));
        }

        self.resolve(path)?;
        let staging = {
            let mut sessions = self.sessions();
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| StagedSession {
                    target: path.clone(),
                    staging: self.staging_path(session_id),
                    total: range.total,
                    ranges: BTreeMap::new(),
                });
            if session.target != *path || session.total != range.total {
                return Err(StoreError::UnexpectedResponse(format!(
                    "chunk for {path} does not belong to session {session_id}"
                )));
            }
            session.staging.clone()
        };

        if let Some(parent) = staging.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&staging)
            .await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        file.write_all(data).await?;
        file.flush().await?;

        if let Some(session) = self.sessions().get_mut(session_id) {
            let end = session.ranges.entry(range.start).or_insert(range.end);
            *end = (*end).max(range.end);
        }
        Ok(())
    }

    async fn commit(&self, session_id: &str) -> Result<(), StoreError> {
        let session = self
            .sessions()
            .remove(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        let covered = session.covered();
        if covered != session.total {
            let _ = tokio::fs::remove_file(&session.staging).await;
            return Err(StoreError::UnexpectedResponse(format!(
                "session {session_id} covers {covered} of {} bytes",
                session.total
            )));
        }

        let full = self.resolve(&session.target)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&session.staging, &full).await?;
        debug!(session_id, path = %full.display(), "committed session");
        Ok(())
    }

    async fn discard(&self, session_id: &str) -> Result<(), StoreError> {
        let removed = self.sessions().remove(session_id);
        let Some(session) = removed else {
            debug!(session_id, "no staged data to delete");
            return Ok(());
        };
        match tokio::fs::remove_file(&session.staging).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl StoreGateway for FileShareStore {
    fn put_object<'a>(&'a self, path: &'a StorePath, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(self.write_object(path, data))
    }

    fn put_chunk<'a>(
        &'a self,
        path: &'a StorePath,
        session_id: &'a str,
        range: ContentRange,
        data: &'a [u8],
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.write_chunk(path, session_id, range, data))
    }

    fn commit_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.commit(session_id))
    }

    fn delete_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.discard(session_id))
    }

    fn put_marker<'a>(&'a self, dir: &'a StorePath) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(self.resolve(dir)?).await?;
            Ok(())
        })
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::FileShare
    }
}
