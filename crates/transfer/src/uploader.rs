//! Single-shot or session-chunked upload of one object.

use std::sync::Arc;

use storepush_protocol::{SESSION_CHUNK_SIZE, SINGLE_SHOT_THRESHOLD, StorePath};
use tracing::{debug, warn};

use crate::StoreError;
use crate::chunked::TransferMode;
use crate::gateway::StoreGateway;
use crate::session_id::{SessionIdGenerator, UuidSessionIds};
use crate::types::UploadSession;

/// Uploads objects to a [`StoreGateway`], choosing single-shot or chunked
/// transfer by payload size.
pub struct ChunkedBlobUploader {
    gateway: Arc<dyn StoreGateway>,
    ids: Arc<dyn SessionIdGenerator>,
    threshold: usize,
    chunk_size: usize,
}

impl ChunkedBlobUploader {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self {
            gateway,
            ids: Arc::new(UuidSessionIds),
            threshold: SINGLE_SHOT_THRESHOLD,
            chunk_size: SESSION_CHUNK_SIZE,
        }
    }

    pub fn with_session_ids(mut self, ids: Arc<dyn SessionIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Overrides the single-shot threshold and session chunk size.
    pub fn with_limits(mut self, threshold: usize, chunk_size: usize) -> Self {
        self.threshold = threshold;
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn StoreGateway> {
        &self.gateway
    }

    /// Uploads `data` to `target`.
    ///
    /// A failed session is deleted before the error is returned; a failure of
    /// that cleanup is logged and does not replace the original error.
    pub async fn upload(&self, target: &StorePath, data: &[u8]) -> Result<(), StoreError> {
        match TransferMode::for_len(data.len(), self.threshold, self.chunk_size) {
            TransferMode::SingleShot => {
                debug!(path = %target, bytes = data.len(), "single-shot upload");
                self.gateway.put_object(target, data).await
            }
            TransferMode::Session { .. } => {
                let session = UploadSession::new(
                    self.ids.next_id(),
                    target.clone(),
                    data.len() as u64,
                    self.chunk_size,
                );
                match self.run_session(&session, data).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        self.discard(&session).await;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Writes the directory marker for `dir`.
    pub async fn upload_marker(&self, dir: &StorePath) -> Result<(), StoreError> {
        debug!(dir = %dir, "writing directory marker");
        self.gateway.put_marker(dir).await
    }

    async fn run_session(&self, session: &UploadSession, data: &[u8]) -> Result<(), StoreError> {
        let total_chunks = session.chunk_count();
        debug!(
            path = %session.target,
            session_id = %session.session_id,
            bytes = session.total_bytes,
            chunks = total_chunks,
            "starting upload session"
        );

        for chunk in session.chunks(data) {
            debug!(
                session_id = %session.session_id,
                chunk = chunk.index + 1,
                of = total_chunks,
                range = %chunk.range,
                "uploading chunk"
            );
            self.gateway
                .put_chunk(&session.target, &session.session_id, chunk.range, chunk.data)
                .await?;
        }

        self.gateway.commit_session(&session.session_id).await?;
        debug!(session_id = %session.session_id, "upload session committed");
        Ok(())
    }

    async fn discard(&self, session: &UploadSession) {
        if let Err(err) = self.gateway.delete_session(&session.session_id).await {
            warn!(
                session_id = %session.session_id,
                path = %session.target,
                error = %err,
                "failed to delete upload session"
            );
        }
    }
}
