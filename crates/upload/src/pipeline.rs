//! Bounded-concurrency upload of a directory tree.
//!
//! Files are uploaded by a fixed pool of workers draining a shared queue,
//! each upload wrapped in the upload retry policy. The first permanent
//! failure stops dispatch: workers finish the item they hold, nothing new is
//! started, and the run returns that first error once the pool has drained.
//! Directory markers are written by a second pool, only after every file
//! succeeded.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use storepush_protocol::StorePath;
use storepush_resilience::{RetryExecutor, RetryPolicy};
use storepush_transfer::{ChunkedBlobUploader, StoreGateway};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::markers::markers_for;
use crate::progress::ProgressSink;
use crate::scanner::scan_files_for_upload;
use crate::types::{PipelineConfig, ProgressEvent, UploadSummary, UploadTask};

/// Uploads a directory tree to a content store.
pub struct UploadPipeline {
    uploader: Arc<ChunkedBlobUploader>,
    retry: RetryExecutor,
    config: PipelineConfig,
}

impl UploadPipeline {
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self::with_uploader(ChunkedBlobUploader::new(gateway))
    }

    pub fn with_uploader(uploader: ChunkedBlobUploader) -> Self {
        Self {
            uploader: Arc::new(uploader),
            retry: RetryExecutor::new(RetryPolicy::upload()),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the per-file retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Uploads every file below `root_dir` to `target_root`, then writes the
    /// directory markers the store needs.
    pub async fn run(
        &self,
        root_dir: &Path,
        target_root: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadSummary, UploadError> {
        let target_root = StorePath::parse(target_root)?;
        let tasks = scan_files_for_upload(root_dir, &target_root)?;
        info!(
            root = %root_dir.display(),
            target = %target_root,
            files = tasks.len(),
            "scanned upload tree"
        );
        self.run_tasks(tasks, progress).await
    }

    /// Uploads an already scanned task list.
    pub async fn run_tasks(
        &self,
        tasks: Vec<UploadTask>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<UploadSummary, UploadError> {
        let total = tasks.len();
        let bytes: u64 = tasks.iter().map(|t| t.size_bytes).sum();
        let markers = markers_for(
            self.uploader.gateway().backend(),
            tasks.iter().map(|t| &t.target_path),
        );
        let max_concurrency = self.config.max_concurrency;

        info!(files = total, bytes, max_concurrency, "uploading files");
        let completed = Arc::new(AtomicUsize::new(0));
        let uploader = self.uploader.clone();
        let retry = self.retry.clone();
        run_pool(tasks, max_concurrency, move |task: UploadTask| {
            let uploader = uploader.clone();
            let retry = retry.clone();
            let completed = completed.clone();
            let progress = progress.clone();
            async move {
                upload_file(&uploader, &retry, task, total, &completed, progress.as_ref()).await
            }
        })
        .await?;

        let marker_count = markers.len();
        if marker_count > 0 {
            info!(markers = marker_count, "uploading directory markers");
            let uploader = self.uploader.clone();
            let retry = self.retry.clone();
            run_pool(
                markers.into_iter().collect(),
                max_concurrency,
                move |dir: StorePath| {
                    let uploader = uploader.clone();
                    let retry = retry.clone();
                    async move { upload_marker(&uploader, &retry, dir).await }
                },
            )
            .await?;
        }

        let summary = UploadSummary {
            files: total,
            markers: marker_count,
            bytes,
        };
        info!(
            files = summary.files,
            markers = summary.markers,
            bytes = summary.bytes,
            "upload complete"
        );
        Ok(summary)
    }
}

async fn upload_file(
    uploader: &ChunkedBlobUploader,
    retry: &RetryExecutor,
    task: UploadTask,
    total: usize,
    completed: &AtomicUsize,
    progress: &dyn ProgressSink,
) -> Result<(), UploadError> {
    let data = tokio::fs::read(&task.source_path)
        .await
        .map_err(|source| UploadError::Read {
            path: task.source_path.clone(),
            source,
        })?;

    let label = task.target_path.to_string();
    retry
        .execute(&label, || uploader.upload(&task.target_path, &data))
        .await
        .map_err(|source| UploadError::Upload {
            path: label.clone(),
            source,
        })?;

    let completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(path = %label, bytes = data.len(), completed, total, "file uploaded");
    progress.on_progress(ProgressEvent {
        file_name: label,
        completed,
        total,
    });
    Ok(())
}

async fn upload_marker(
    uploader: &ChunkedBlobUploader,
    retry: &RetryExecutor,
    dir: StorePath,
) -> Result<(), UploadError> {
    let label = dir.marker().to_string();
    retry
        .execute(&label, || uploader.upload_marker(&dir))
        .await
        .map_err(|source| UploadError::Marker {
            path: dir.to_string(),
            source,
        })
}

/// Runs `work` over `items` on at most `max_concurrency` workers.
///
/// Returns the first error recorded; later errors from in-flight items are
/// logged by the retry layer and dropped.
async fn run_pool<T, F, Fut>(
    items: Vec<T>,
    max_concurrency: usize,
    work: F,
) -> Result<(), UploadError>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UploadError>> + Send + 'static,
{
    if items.is_empty() {
        return Ok(());
    }

    let workers = max_concurrency.max(1).min(items.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let failed = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<UploadError>>> = Arc::new(Mutex::new(None));
    let work = Arc::new(work);

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let queue = queue.clone();
        let failed = failed.clone();
        let first_error = first_error.clone();
        let work = work.clone();

        set.spawn(async move {
            loop {
                if failed.load(Ordering::SeqCst) {
                    break;
                }
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(item) = next else {
                    break;
                };

                if let Err(err) = work(item).await {
                    if !failed.swap(true, Ordering::SeqCst) {
                        warn!(worker, error = %err, "upload failed, no further tasks dispatched");
                        *first_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                    }
                    break;
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(join_err) = joined {
            failed.store(true, Ordering::SeqCst);
            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(UploadError::Worker(join_err.to_string()));
            }
        }
    }

    let err = first_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap, HashSet};
    use std::error::Error as _;
    use std::time::Duration;
    use storepush_protocol::ContentRange;
    use storepush_resilience::{Fault, FaultCode, http_status};
    use storepush_transfer::{StoreBackend, StoreError, StoreFuture};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Copy)]
    enum Failure {
        /// HTTP 400 on every attempt.
        Permanent,
        /// ECONNRESET on the first attempt only.
        ResetOnce,
        /// ENOTFOUND on every attempt.
        HostNotFound,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Object(String),
        Marker(String),
    }

    /// Gateway with fixed latency that tracks in-flight writes.
    struct MockGateway {
        backend: StoreBackend,
        latency: Duration,
        failures: HashMap<String, Failure>,
        attempts: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<Call>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockGateway {
        fn new(latency: Duration) -> Self {
            Self {
                backend: StoreBackend::Gateway,
                latency,
                failures: HashMap::new(),
                attempts: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, path: &str, failure: Failure) -> Self {
            self.failures.insert(path.to_string(), failure);
            self
        }

        fn total_attempts(&self) -> usize {
            self.attempts.lock().unwrap().values().sum()
        }

        fn attempts_for(&self, path: &str) -> usize {
            self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn markers(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Marker(p) => Some(p),
                    Call::Object(_) => None,
                })
                .collect()
        }
    }

    impl StoreGateway for MockGateway {
        fn put_object<'a>(&'a self, path: &'a StorePath, _data: &'a [u8]) -> StoreFuture<'a, ()> {
            let key = path.to_string();
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = attempts.entry(key.clone()).or_insert(0);
                *n += 1;
                *n
            };

            Box::pin(async move {
                match (self.failures.get(&key), attempt) {
                    (Some(Failure::Permanent), _) => {
                        return Err(StoreError::Gateway(Fault::from_status(400, "bad request")));
                    }
                    (Some(Failure::HostNotFound), _) => {
                        return Err(StoreError::Gateway(Fault::from_code(FaultCode::HostNotFound)));
                    }
                    (Some(Failure::ResetOnce), 1) => {
                        return Err(StoreError::Gateway(Fault::from_code(FaultCode::ConnectionReset)));
                    }
                    _ => {}
                }

                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.latency).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                self.calls.lock().unwrap().push(Call::Object(key));
                Ok(())
            })
        }

        fn put_chunk<'a>(
            &'a self,
            _path: &'a StorePath,
            _session_id: &'a str,
            _range: ContentRange,
            _data: &'a [u8],
        ) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(StoreError::UnexpectedResponse("no sessions".into())) })
        }

        fn commit_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
            Box::pin(async move { Err(StoreError::SessionNotFound(session_id.into())) })
        }

        fn delete_session<'a>(&'a self, _session_id: &'a str) -> StoreFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn put_marker<'a>(&'a self, dir: &'a StorePath) -> StoreFuture<'a, ()> {
            let key = dir.to_string();
            Box::pin(async move {
                if matches!(self.failures.get(&key), Some(Failure::Permanent)) {
                    return Err(StoreError::Gateway(Fault::from_status(403, "marker denied")));
                }
                self.calls.lock().unwrap().push(Call::Marker(key));
                Ok(())
            })
        }

        fn backend(&self) -> StoreBackend {
            self.backend
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryPolicy::upload()
        }
    }

    fn pipeline(gateway: Arc<MockGateway>, max_concurrency: usize) -> UploadPipeline {
        UploadPipeline::new(gateway)
            .with_config(PipelineConfig { max_concurrency })
            .with_retry_policy(fast_retry())
    }

    /// Writes `count` small files named `file00.bin`, `file01.bin`, ...
    fn flat_tree(count: usize) -> TempDir {
        let dir = TempDir::new().unwrap();
        for i in 0..count {
            std::fs::write(dir.path().join(format!("file{i:02}.bin")), [i as u8; 16]).unwrap();
        }
        dir
    }

    fn no_progress() -> Arc<dyn ProgressSink> {
        Arc::new(|_event: ProgressEvent| {})
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_cap() {
        let dir = flat_tree(32);
        let gateway = Arc::new(MockGateway::new(Duration::from_millis(50)));

        let summary = pipeline(gateway.clone(), 8)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap();

        assert_eq!(summary.files, 32);
        assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn fewer_files_still_run_concurrently() {
        let dir = flat_tree(16);
        let gateway = Arc::new(MockGateway::new(Duration::from_millis(50)));

        pipeline(gateway.clone(), 8)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap();

        let max = gateway.max_in_flight.load(Ordering::SeqCst);
        assert!(max > 1 && max <= 8, "max in flight was {max}");
    }

    #[tokio::test]
    async fn first_failure_stops_dispatch() {
        let dir = flat_tree(16);
        let gateway = Arc::new(
            MockGateway::new(Duration::from_millis(20))
                .failing("pkg/file02.bin", Failure::Permanent),
        );

        let err = pipeline(gateway.clone(), 4)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap_err();

        assert!(gateway.total_attempts() < 16);
        assert_eq!(gateway.attempts_for("pkg/file02.bin"), 1);
        assert!(gateway.markers().is_empty());

        match &err {
            UploadError::Upload { path, .. } => assert_eq!(path, "pkg/file02.bin"),
            other => panic!("expected upload error, got {other:?}"),
        }
        assert_eq!(err.to_string(), "failed to upload to store: pkg/file02.bin");
        let cause = err.source().unwrap();
        assert!(cause.downcast_ref::<StoreError>().is_some());
        assert_eq!(http_status(&err), Some(400));
    }

    #[tokio::test]
    async fn progress_counts_cover_every_file_once() {
        let dir = flat_tree(10);
        let gateway = Arc::new(MockGateway::new(Duration::from_millis(5)));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        pipeline(gateway, 3)
            .run(
                dir.path(),
                "pkg",
                Arc::new(move |event: ProgressEvent| sink.lock().unwrap().push(event)),
            )
            .await
            .unwrap();

        let events = events.lock().unwrap();
        let mut counts: Vec<usize> = events.iter().map(|e| e.completed).collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=10).collect::<Vec<_>>());
        assert!(events.iter().all(|e| e.total == 10));

        let names: HashSet<&str> = events.iter().map(|e| e.file_name.as_str()).collect();
        assert_eq!(names.len(), 10);
        assert!(names.contains("pkg/file00.bin"));
    }

    #[tokio::test]
    async fn markers_follow_all_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("manifest.xml"), b"<m/>").unwrap();
        std::fs::create_dir_all(dir.path().join("Pkg").join("Code")).unwrap();
        std::fs::write(dir.path().join("Pkg").join("svc.xml"), b"<s/>").unwrap();
        std::fs::write(dir.path().join("Pkg").join("Code").join("a.dll"), b"MZ").unwrap();

        let gateway = Arc::new(MockGateway::new(Duration::from_millis(5)));
        let summary = pipeline(gateway.clone(), 8)
            .run(dir.path(), "App", no_progress())
            .await
            .unwrap();

        assert_eq!(
            summary,
            UploadSummary {
                files: 3,
                markers: 3,
                bytes: 10,
            }
        );

        let calls = gateway.calls();
        let first_marker = calls
            .iter()
            .position(|c| matches!(c, Call::Marker(_)))
            .unwrap();
        assert!(
            calls[first_marker..]
                .iter()
                .all(|c| matches!(c, Call::Marker(_)))
        );

        let markers: BTreeSet<String> = gateway.markers().into_iter().collect();
        let expected: BTreeSet<String> = ["App", "App/Pkg", "App/Pkg/Code"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(markers, expected);
    }

    #[tokio::test]
    async fn marker_failure_keeps_written_markers() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Pkg").join("Code")).unwrap();
        std::fs::write(dir.path().join("Pkg").join("Code").join("a.dll"), b"MZ").unwrap();

        let gateway = Arc::new(
            MockGateway::new(Duration::from_millis(1)).failing("App/Pkg/Code", Failure::Permanent),
        );
        let err = pipeline(gateway.clone(), 1)
            .run(dir.path(), "App", no_progress())
            .await
            .unwrap_err();

        match &err {
            UploadError::Marker { path, .. } => assert_eq!(path, "App/Pkg/Code"),
            other => panic!("expected marker error, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "failed to upload directory marker to store: App/Pkg/Code"
        );
        let cause = err.source().unwrap().downcast_ref::<StoreError>().unwrap();
        assert!(matches!(cause, StoreError::Gateway(f) if f.status() == Some(403)));

        assert_eq!(gateway.markers(), ["App", "App/Pkg"]);
        assert_eq!(gateway.calls()[0], Call::Object("App/Pkg/Code/a.dll".into()));
    }

    #[tokio::test]
    async fn file_share_backend_skips_markers() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Pkg")).unwrap();
        std::fs::write(dir.path().join("Pkg").join("a.bin"), b"A").unwrap();

        let mut mock = MockGateway::new(Duration::ZERO);
        mock.backend = StoreBackend::FileShare;
        let gateway = Arc::new(mock);

        let summary = pipeline(gateway.clone(), 8)
            .run(dir.path(), "App", no_progress())
            .await
            .unwrap();

        assert_eq!(summary.markers, 0);
        assert!(gateway.markers().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let dir = flat_tree(3);
        let gateway = Arc::new(
            MockGateway::new(Duration::ZERO).failing("pkg/file01.bin", Failure::ResetOnce),
        );

        let summary = pipeline(gateway.clone(), 2)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(gateway.attempts_for("pkg/file01.bin"), 2);
    }

    #[tokio::test]
    async fn non_transient_fault_is_not_retried() {
        let dir = flat_tree(1);
        let gateway = Arc::new(
            MockGateway::new(Duration::ZERO).failing("pkg/file00.bin", Failure::HostNotFound),
        );

        let err = pipeline(gateway.clone(), 2)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Upload { .. }));
        assert_eq!(gateway.attempts_for("pkg/file00.bin"), 1);
    }

    #[tokio::test]
    async fn invalid_target_root_is_rejected() {
        let dir = flat_tree(1);
        let gateway = Arc::new(MockGateway::new(Duration::ZERO));

        let err = pipeline(gateway.clone(), 2)
            .run(dir.path(), "../escape", no_progress())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InvalidTarget(_)));
        assert_eq!(gateway.total_attempts(), 0);
    }

    #[tokio::test]
    async fn empty_tree_uploads_nothing() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(MockGateway::new(Duration::ZERO));

        let summary = pipeline(gateway.clone(), 8)
            .run(dir.path(), "pkg", no_progress())
            .await
            .unwrap();

        assert_eq!(summary, UploadSummary::default());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn uploads_tree_into_file_share() {
        use storepush_store::FileShareStore;

        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("Pkg")).unwrap();
        let big: Vec<u8> = (0..100u8).collect();
        std::fs::write(src.path().join("Pkg").join("code.zip"), &big).unwrap();
        std::fs::write(src.path().join("manifest.xml"), b"<m/>").unwrap();

        let dest = TempDir::new().unwrap();
        let store = Arc::new(FileShareStore::new(dest.path()));
        let uploader = ChunkedBlobUploader::new(store).with_limits(16, 32);

        let summary = UploadPipeline::with_uploader(uploader)
            .with_retry_policy(fast_retry())
            .run(src.path(), "App", no_progress())
            .await
            .unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.markers, 0);
        assert_eq!(
            std::fs::read(dest.path().join("App").join("Pkg").join("code.zip")).unwrap(),
            big
        );
        assert_eq!(
            std::fs::read(dest.path().join("App").join("manifest.xml")).unwrap(),
            b"<m/>"
        );
    }
}
