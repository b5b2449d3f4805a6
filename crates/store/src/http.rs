//! Content store reached through the HTTP upload gateway.
//!
//! Transport failures become [`Fault`]s carrying the socket-level code found
//! in the reqwest cause chain, so the retry layer can classify them. Non-2xx
//! responses become status faults with the response body as message. Every
//! request passes through one [`CircuitBreaker`].

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use storepush_protocol::constants::OCTET_STREAM;
use storepush_protocol::{ContentRange, DEFAULT_API_VERSION, Route, RouteMethod, StorePath};
use storepush_resilience::{
    BreakerConfig, BreakerError, CircuitBreaker, Fault, FaultCode, RetryExecutor, RetryPolicy,
};
use storepush_transfer::{StoreBackend, StoreError, StoreFuture, StoreGateway};
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreOptions {
    /// Gateway base URL, e.g. `http://localhost:19080`.
    pub endpoint: String,
    pub api_version: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub breaker: BreakerConfig,
}

impl HttpStoreOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            breaker: BreakerConfig::default(),
        }
    }
}

/// [`StoreGateway`] over the HTTP upload gateway.
pub struct HttpStore {
    http: reqwest::Client,
    endpoint: String,
    api_version: String,
    breaker: CircuitBreaker,
}

impl HttpStore {
    pub fn new(options: HttpStoreOptions) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|err| Fault::new("failed to build HTTP client").with_source(err))?;

        Ok(Self {
            http,
            endpoint: options.endpoint,
            api_version: options.api_version,
            breaker: CircuitBreaker::new("store-gateway", options.breaker),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Checks that the gateway answers, retrying under the API policy.
    pub async fn probe(&self) -> Result<(), StoreError> {
        let retry = RetryExecutor::new(RetryPolicy::api());
        retry
            .execute("probe", || self.send(Route::probe(), None, None))
            .await?;
        info!(endpoint = %self.endpoint, "gateway reachable");
        Ok(())
    }

    /// Sends one request through the breaker.
    async fn send(
        &self,
        route: Route,
        body: Option<Vec<u8>>,
        range: Option<ContentRange>,
    ) -> Result<(), StoreError> {
        let url = route.url(&self.endpoint, &self.api_version);
        let method = http_method(route.method);
        debug!(%method, %url, "sending gateway request");

        let outcome = self
            .breaker
            .call(|| async {
                let mut request = self.http.request(method.clone(), &url);
                if let Some(range) = range {
                    request = request.header(CONTENT_RANGE, range.to_string());
                }
                if let Some(body) = body {
                    request = request.header(CONTENT_TYPE, OCTET_STREAM).body(body);
                }

                let response = request.send().await.map_err(transport_fault)?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(status_fault(status, body));
                }
                Ok::<(), Fault>(())
            })
            .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(BreakerError::Open) => Err(StoreError::CircuitOpen(self.breaker.name().into())),
            Err(BreakerError::Inner(fault)) => Err(fault.into()),
        }
    }
}

impl StoreGateway for HttpStore {
    fn put_object<'a>(&'a self, path: &'a StorePath, data: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(self.send(Route::put_object(path), Some(data.to_vec()), None))
    }

    fn put_chunk<'a>(
        &'a self,
        path: &'a StorePath,
        session_id: &'a str,
        range: ContentRange,
        data: &'a [u8],
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.send(
            Route::upload_chunk(path, session_id),
            Some(data.to_vec()),
            Some(range),
        ))
    }

    fn commit_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.send(Route::commit_session(session_id), None, None))
    }

    fn delete_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.send(Route::delete_session(session_id), None, None))
    }

    fn put_marker<'a>(&'a self, dir: &'a StorePath) -> StoreFuture<'a, ()> {
        Box::pin(self.send(Route::put_marker(dir), Some(Vec::new()), None))
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Gateway
    }
}

fn http_method(method: RouteMethod) -> Method {
    match method {
        RouteMethod::Get => Method::GET,
        RouteMethod::Put => Method::PUT,
        RouteMethod::Post => Method::POST,
        RouteMethod::Delete => Method::DELETE,
    }
}

fn status_fault(status: StatusCode, body: String) -> Fault {
    Fault::from_status(status.as_u16(), body)
}

/// Maps a reqwest transport error onto a coded fault. The message joins the
/// whole cause chain so TLS alerts without a code stay recognisable.
fn transport_fault(err: reqwest::Error) -> Fault {
    let code = if err.is_timeout() {
        Some(FaultCode::TimedOut)
    } else {
        io_kind(&err).and_then(FaultCode::from_io_kind)
    };

    let mut message = err.to_string();
    let mut level = err.source();
    while let Some(cause) = level {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        level = cause.source();
    }

    let mut fault = Fault::new(message);
    if let Some(code) = code {
        fault = fault.with_code(code);
    }
    fault.with_source(err)
}

fn io_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut level = err.source();
    while let Some(cause) = level {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        level = cause.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storepush_resilience::{CircuitState, http_status, is_transient};
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpStore {
        HttpStore::new(HttpStoreOptions::new(server.uri())).unwrap()
    }

    fn store_path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn put_object_sends_octet_stream() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/store/My%20App/manifest.xml"))
            .and(query_param("api-version", "6.0"))
            .and(header("content-type", OCTET_STREAM))
            .and(body_bytes(b"<xml/>".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put_object(&store_path("My App/manifest.xml"), b"<xml/>")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn chunk_carries_session_and_range() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/store/A/code.zip/$/uploadChunk"))
            .and(query_param("session-id", "s-1"))
            .and(header("content-range", "bytes 4-7/10"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let range = ContentRange {
            start: 4,
            end: 7,
            total: 10,
        };
        store(&server)
            .put_chunk(&store_path("A/code.zip"), "s-1", range, b"CCDD")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn session_commit_and_delete_routes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/store/$/commitUploadSession"))
            .and(query_param("session-id", "s-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/store/$/deleteUploadSession"))
            .and(query_param("session-id", "s-2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server);
        store.commit_session("s-1").await.unwrap();
        store.delete_session("s-2").await.unwrap();
    }

    #[tokio::test]
    async fn marker_is_empty_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/store/A/Pkg/_marker"))
            .and(body_bytes(Vec::new()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .put_marker(&store_path("A/Pkg"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_becomes_status_fault() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exists"))
            .mount(&server)
            .await;

        let err = store(&server)
            .put_object(&store_path("A/x"), b"x")
            .await
            .unwrap_err();

        assert_eq!(http_status(&err), Some(409));
        assert!(err.to_string().contains("HTTP 409: exists"));
        assert!(!is_transient(&err));
    }

    #[tokio::test]
    async fn refused_connection_is_coded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = HttpStore::new(HttpStoreOptions::new(format!("http://{addr}"))).unwrap();
        let err = store
            .put_object(&store_path("A/x"), b"x")
            .await
            .unwrap_err();

        match err {
            StoreError::Gateway(fault) => {
                assert_eq!(fault.code(), Some(&FaultCode::ConnectionRefused));
            }
            other => panic!("expected gateway fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_retries_server_errors() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        Mock::given(method("GET"))
            .and(path("/store"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                if attempts_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .mount(&server)
            .await;

        store(&server).probe().await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn probe_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = store(&server).probe().await.unwrap_err();
        assert_eq!(http_status(&err), Some(404));
    }

    #[tokio::test]
    async fn breaker_opens_after_repeated_failures() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let mut options = HttpStoreOptions::new(server.uri());
        options.breaker = BreakerConfig {
            threshold: 2,
            reset_timeout: Duration::from_secs(60),
            half_open_successes: 1,
        };
        let store = HttpStore::new(options).unwrap();
        let target = store_path("A/x");

        assert!(store.put_object(&target, b"x").await.is_err());
        assert!(store.put_object(&target, b"x").await.is_err());
        assert_eq!(store.breaker().state(), CircuitState::Open);

        let err = store.put_object(&target, b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::CircuitOpen(ref name) if name == "store-gateway"));
    }
}
