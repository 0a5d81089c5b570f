//! HttpRemoteStore against an in-process ODFS API server.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use odfs_core::{
    BlobId, ContainerId, FileId, HttpRemoteStore, OdfsConfig, OdfsError, OdfsOperations,
    RemoteStore, RetryingStore, StreamingKey,
};
use secrecy::SecretString;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

const TOKEN: &str = "test-token";
const KEY: &str = "stream key/1";

fn blob() -> Vec<u8> {
    (0..=255u8).cycle().take(1000).collect()
}

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    range: Option<String>,
    authorization: Option<String>,
    body: String,
}

#[derive(Default)]
struct ServerState {
    requests: Mutex<Vec<Recorded>>,
    flaky_failures: AtomicUsize,
}

struct TestServer {
    runtime: Runtime,
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let state = Arc::new(ServerState::default());
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server_state = Arc::clone(&state);
        runtime.spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(Arc::clone(&state), req));
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            runtime,
            addr,
            state,
        }
    }

    fn config(&self, extra: &str) -> OdfsConfig {
        self.config_with_secret("s3cret", extra)
    }

    fn config_with_secret(&self, secret: &str, extra: &str) -> OdfsConfig {
        let yaml = format!(
            "tokenEndpoint: http://{addr}/token\n\
             clientId: odfs-test\n\
             clientSecret: {secret}\n\
             odfsEndpoint: http://{addr}/api/\n\
             retryBackoff: 1ms\n{extra}",
            addr = self.addr
        );
        OdfsConfig::from_yaml(&yaml).unwrap()
    }

    fn store(&self) -> HttpRemoteStore {
        HttpRemoteStore::with_token(
            &self.config(""),
            SecretString::from(TOKEN),
            self.runtime.handle().clone(),
        )
        .unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    fn last(&self) -> Recorded {
        self.requests().pop().unwrap()
    }
}

fn json(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn parse_range(header: &str) -> (usize, usize) {
    let bounds = header.strip_prefix("bytes=").unwrap();
    let (start, end) = bounds.split_once('-').unwrap();
    (start.parse().unwrap(), end.parse().unwrap())
}

async fn handle(
    state: Arc<ServerState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let url = reqwest::Url::parse(&format!("http://localhost{}", req.uri())).unwrap();
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let range = header("range");
    let authorization = header("authorization");
    let body = req.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&body).into_owned();

    state.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        range: range.clone(),
        authorization: authorization.clone(),
        body: body.clone(),
    });

    if path == "/token" {
        return Ok(if body.contains("client_secret=s3cret") {
            json(
                StatusCode::OK,
                &format!(r#"{{"access_token":"{TOKEN}","token_type":"Bearer","expires_in":3600}}"#),
            )
        } else {
            json(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#)
        });
    }

    if authorization.as_deref() != Some(&format!("Bearer {TOKEN}")) {
        return Ok(empty(StatusCode::UNAUTHORIZED));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/api/containers") => json(
            StatusCode::OK,
            r#"[{"id":1,"name":"Data"},{"id":2,"name":"Other"}]"#,
        ),
        (Method::GET, "/api/containers/1/files") => match query.get("dirPath").map(String::as_str) {
            Some("/") => json(StatusCode::OK, r#"{"dirs":["my docs"],"files":[]}"#),
            Some("/my docs") => json(
                StatusCode::OK,
                r#"{"dirs":[],"files":[{"id":11,"filePath":"/my docs/readme.txt","mediaType":"text/plain"}]}"#,
            ),
            _ => json(StatusCode::OK, r#"{"dirs":[],"files":[]}"#),
        },
        (Method::GET, "/api/containers/7/files") => {
            if state.flaky_failures.load(Ordering::SeqCst) > 0 {
                state.flaky_failures.fetch_sub(1, Ordering::SeqCst);
                empty(StatusCode::SERVICE_UNAVAILABLE)
            } else {
                json(StatusCode::OK, r#"{"dirs":["ok"],"files":[]}"#)
            }
        }
        (Method::GET, "/api/containers/8/files") => empty(StatusCode::BAD_REQUEST),
        (Method::GET, "/api/files/11/meta-file-manager") => json(
            StatusCode::OK,
            r#"{"blobId":77,"size":1000,"creationTime":"2024-01-02T03:04:05.000Z","lastModifiedTime":"2024-01-03T03:04:05.000Z","lastAccessedTime":1704337445000}"#,
        ),
        (Method::GET, "/api/files/12/meta-file-manager") => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            empty(StatusCode::OK)
        }
        (Method::GET, "/api/files/13/meta-file-manager") => {
            json(StatusCode::OK, r#"{"blobId":"oops"}"#)
        }
        (Method::POST, "/api/files/11/stream") => json(
            StatusCode::OK,
            &format!(r#"{{"streamingKey":"{KEY}","options":{{}}}}"#),
        ),
        (Method::GET, "/api/stream") => {
            if query.get("streamingKey").map(String::as_str) != Some(KEY) {
                empty(StatusCode::FORBIDDEN)
            } else if query.get("blobId").map(String::as_str) == Some("78") {
                // Ignores the range like a plain file server.
                Response::new(Full::new(Bytes::from(blob())))
            } else {
                let data = blob();
                let (start, end) = parse_range(range.as_deref().unwrap_or("bytes=0-999"));
                if start >= data.len() {
                    empty(StatusCode::RANGE_NOT_SATISFIABLE)
                } else {
                    let end = end.min(data.len() - 1);
                    Response::builder()
                        .status(StatusCode::PARTIAL_CONTENT)
                        .header("content-range", format!("bytes {start}-{end}/{}", data.len()))
                        .body(Full::new(Bytes::copy_from_slice(&data[start..=end])))
                        .unwrap()
                }
            }
        }
        _ => empty(StatusCode::NOT_FOUND),
    };
    Ok(response)
}

#[test]
fn test_connect_acquires_token() {
    let server = TestServer::start();
    let store = HttpRemoteStore::connect(&server.config("")).unwrap();

    let requests = server.requests();
    let token_request = &requests[0];
    assert_eq!(token_request.method, Method::POST);
    assert_eq!(token_request.path, "/token");
    assert!(token_request.body.contains("grant_type=client_credentials"));
    assert!(token_request.body.contains("client_id=odfs-test"));
    assert!(token_request.body.contains("scope=Files.Read"));

    store.list_containers().unwrap();
    assert_eq!(
        server.last().authorization.as_deref(),
        Some("Bearer test-token")
    );
}

#[test]
fn test_connect_with_bad_credentials_fails() {
    let server = TestServer::start();
    let config = server.config_with_secret("wrong", "");
    let err = HttpRemoteStore::connect(&config).unwrap_err();
    assert!(matches!(err, OdfsError::RemoteAuth(_)), "got {err:?}");
}

#[test]
fn test_list_containers() {
    let server = TestServer::start();
    let containers = server.store().list_containers().unwrap();
    let names: Vec<_> = containers.iter().map(|c| (c.id, c.name.as_str())).collect();
    assert_eq!(names, vec![(ContainerId(1), "Data"), (ContainerId(2), "Other")]);
}

#[test]
fn test_list_directory_encodes_path() {
    let server = TestServer::start();
    let listing = server
        .store()
        .list_directory(ContainerId(1), "/my docs")
        .unwrap();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].id, FileId(11));
    assert_eq!(listing.files[0].name(), "readme.txt");

    let request = server.last();
    assert_eq!(request.path, "/api/containers/1/files");
    assert_eq!(request.query.get("dirPath").map(String::as_str), Some("/my docs"));
}

#[test]
fn test_file_attributes_normalized() {
    let server = TestServer::start();
    let attrs = server.store().get_file_attributes(FileId(11)).unwrap();
    assert_eq!(attrs.blob_id, BlobId(77));
    assert_eq!(attrs.size, 1000);
    let secs = |t: std::time::SystemTime| {
        t.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs()
    };
    assert_eq!(secs(attrs.creation_time), 1_704_164_645);
    assert_eq!(secs(attrs.last_modified_time), 1_704_251_045);
    assert_eq!(secs(attrs.last_accessed_time), 1_704_337_445);
}

#[test]
fn test_status_mapping() {
    let server = TestServer::start();
    let store = server.store();

    let err = store.get_file_attributes(FileId(404)).unwrap_err();
    assert!(matches!(err, OdfsError::NotFound(_)), "got {err:?}");

    let err = store.list_directory(ContainerId(8), "/").unwrap_err();
    assert!(
        matches!(err, OdfsError::RemoteRejected { status: 400, .. }),
        "got {err:?}"
    );

    let err = store.get_file_attributes(FileId(13)).unwrap_err();
    assert!(matches!(err, OdfsError::InvalidResponse(_)), "got {err:?}");
}

#[test]
fn test_rejected_token_is_auth_error() {
    let server = TestServer::start();
    let store = HttpRemoteStore::with_token(
        &server.config(""),
        SecretString::from("expired"),
        server.runtime.handle().clone(),
    )
    .unwrap();
    let err = store.list_containers().unwrap_err();
    assert!(matches!(err, OdfsError::RemoteAuth(_)), "got {err:?}");
    assert_eq!(err.to_errno(), libc::EIO);
}

#[test]
fn test_streaming_key_and_range() {
    let server = TestServer::start();
    let store = server.store();

    let key = store.create_streaming_key(FileId(11)).unwrap();
    assert_eq!(key.as_str(), KEY);
    assert_eq!(server.last().method, Method::POST);

    let data = store.download_range(BlobId(77), &key, 0, 50).unwrap();
    assert_eq!(&data[..], &blob()[..50]);

    let request = server.last();
    assert_eq!(request.range.as_deref(), Some("bytes=0-49"));
    assert_eq!(request.query.get("blobId").map(String::as_str), Some("77"));
    assert_eq!(request.query.get("streamingKey").map(String::as_str), Some(KEY));
}

#[test]
fn test_download_short_at_end() {
    let server = TestServer::start();
    let store = server.store();
    let key = StreamingKey::new(KEY);

    let data = store.download_range(BlobId(77), &key, 990, 50).unwrap();
    assert_eq!(&data[..], &blob()[990..]);

    assert!(store.download_range(BlobId(77), &key, 5000, 10).unwrap().is_empty());
}

#[test]
fn test_zero_length_download_skips_request() {
    let server = TestServer::start();
    let store = server.store();
    let data = store
        .download_range(BlobId(77), &StreamingKey::new(KEY), 10, 0)
        .unwrap();
    assert!(data.is_empty());
    assert!(server.requests().is_empty());
}

#[test]
fn test_full_body_is_sliced() {
    let server = TestServer::start();
    let data = server
        .store()
        .download_range(BlobId(78), &StreamingKey::new(KEY), 100, 10)
        .unwrap();
    assert_eq!(&data[..], &blob()[100..110]);
}

#[test]
fn test_wrong_streaming_key_is_auth_error() {
    let server = TestServer::start();
    let err = server
        .store()
        .download_range(BlobId(77), &StreamingKey::new("stale"), 0, 10)
        .unwrap_err();
    assert!(matches!(err, OdfsError::RemoteAuth(_)), "got {err:?}");
}

#[test]
fn test_operation_timeout() {
    let server = TestServer::start();
    let store = HttpRemoteStore::with_token(
        &server.config("operationTimeout: 200ms\n"),
        SecretString::from(TOKEN),
        server.runtime.handle().clone(),
    )
    .unwrap();

    let err = store.get_file_attributes(FileId(12)).unwrap_err();
    assert!(matches!(err, OdfsError::RemoteUnavailable(_)), "got {err:?}");
    let summary = store.stats().summary();
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.completed, 0);
}

#[test]
fn test_server_errors_are_retried() {
    let server = TestServer::start();
    server.state.flaky_failures.store(2, Ordering::SeqCst);
    let store = RetryingStore::new(server.store(), 2, Duration::from_millis(1));

    let listing = store.list_directory(ContainerId(7), "/").unwrap();
    assert_eq!(listing.dirs, vec!["ok"]);
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn test_mount_flow_over_http() {
    let server = TestServer::start();
    let remote = RetryingStore::new(server.store(), 2, Duration::from_millis(1));
    let fs = OdfsOperations::new(Arc::new(remote));

    assert_eq!(fs.readdir("/").unwrap(), vec![".", "..", "Data", "Other"]);
    assert_eq!(fs.readdir("/Data").unwrap(), vec![".", "..", "my docs"]);

    let path = "/Data/my docs/readme.txt";
    assert_eq!(fs.getattr(path).unwrap().size, 1000);

    let h = fs.open(path, libc::O_RDONLY).unwrap();
    let data = fs.read(path, 50, 100, h).unwrap();
    assert_eq!(&data[..], &blob()[100..150]);
    assert_eq!(server.last().range.as_deref(), Some("bytes=100-149"));
    fs.release(path, h).unwrap();
}
