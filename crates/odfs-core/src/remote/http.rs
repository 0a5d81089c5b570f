//! HTTP implementation of [`RemoteStore`] on reqwest.

use super::{
    BlobId, ContainerId, ContainerInfo, DirectoryListing, FileAttributes, FileId, RemoteStore,
    StreamingKey, range_header, request_access_token,
};
use crate::bridge::{self, BridgeStats};
use crate::config::OdfsConfig;
use crate::error::{OdfsError, OdfsResult};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, trace};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    streaming_key: StreamingKey,
}

/// Remote store speaking the ODFS HTTP API.
///
/// Calls block the current thread; they must not be made from inside the
/// runtime the store spawns its requests on.
#[derive(Debug)]
pub struct HttpRemoteStore {
    client: Client,
    base: String,
    token: Arc<SecretString>,
    handle: Handle,
    operation_timeout: Duration,
    stats: Arc<BridgeStats>,
    /// Keeps the runtime alive when the store created it.
    _owned_runtime: Option<Runtime>,
}

impl HttpRemoteStore {
    /// Starts a private runtime, acquires an access token and returns a ready store.
    ///
    /// Failing to obtain the token is an error; nothing is mounted without one.
    pub fn connect(config: &OdfsConfig) -> OdfsResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("odfs-http")
            .build()
            .map_err(|e| OdfsError::Config(format!("cannot start async runtime: {e}")))?;
        let client = build_client(config)?;

        let token = runtime
            .block_on(tokio::time::timeout(
                config.operation_timeout,
                request_access_token(&client, config),
            ))
            .map_err(|_| OdfsError::RemoteUnavailable("token request timed out".into()))??;

        let handle = runtime.handle().clone();
        let store = Self::from_parts(config, client, token.token, handle, Some(runtime));
        info!(endpoint = %store.base, "Connected to ODFS");
        Ok(store)
    }

    /// Creates a store around an existing token and runtime handle.
    pub fn with_token(config: &OdfsConfig, token: SecretString, handle: Handle) -> OdfsResult<Self> {
        let client = build_client(config)?;
        Ok(Self::from_parts(config, client, token, handle, None))
    }

    fn from_parts(
        config: &OdfsConfig,
        client: Client,
        token: SecretString,
        handle: Handle,
        owned_runtime: Option<Runtime>,
    ) -> Self {
        Self {
            client,
            base: config.api_base().to_string(),
            token: Arc::new(token),
            handle,
            operation_timeout: config.operation_timeout,
            stats: BridgeStats::new(),
            _owned_runtime: owned_runtime,
        }
    }

    /// Shared counters for requests issued by this store. They outlive the
    /// store, so a summary can still be logged after unmounting.
    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{endpoint}", self.base))
            .bearer_auth(self.token.expose_secret())
    }

    fn run<T, F>(&self, future: F) -> OdfsResult<T>
    where
        F: Future<Output = OdfsResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        bridge::execute(
            &self.handle,
            self.operation_timeout,
            Some(&self.stats),
            future,
        )
        .unwrap_or_else(|e| Err(e.into()))
    }

    fn get_json<T>(&self, endpoint: String, query: Vec<(&'static str, String)>) -> OdfsResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.request(reqwest::Method::GET, &endpoint).query(&query);
        self.run(async move {
            let response = request
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, &e))?;
            let response = check_status(&endpoint, response)?;
            response
                .json::<T>()
                .await
                .map_err(|e| OdfsError::InvalidResponse(format!("{endpoint}: {e}")))
        })
    }
}

fn build_client(config: &OdfsConfig) -> OdfsResult<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .user_agent(concat!("odfs-mount/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OdfsError::Config(format!("cannot build HTTP client: {e}")))
}

fn transport_error(endpoint: &str, e: &reqwest::Error) -> OdfsError {
    if e.is_timeout() {
        OdfsError::RemoteUnavailable(format!("{endpoint}: request timed out"))
    } else {
        OdfsError::RemoteUnavailable(format!("{endpoint}: {e}"))
    }
}

fn check_status(endpoint: &str, response: Response) -> OdfsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            OdfsError::RemoteAuth(format!("{status} from {endpoint}"))
        }
        StatusCode::NOT_FOUND => OdfsError::NotFound(endpoint.to_string()),
        StatusCode::TOO_MANY_REQUESTS => {
            OdfsError::RemoteUnavailable(format!("{status} from {endpoint}"))
        }
        s if s.is_server_error() => OdfsError::RemoteUnavailable(format!("{s} from {endpoint}")),
        s => OdfsError::RemoteRejected {
            status: s.as_u16(),
            endpoint: endpoint.to_string(),
        },
    })
}

/// Trims a body to the requested window.
///
/// A `206` body already starts at `offset`; a `200` carries the whole blob.
fn slice_body(body: Bytes, partial: bool, offset: u64, length: u64) -> Bytes {
    let start = if partial {
        0
    } else {
        usize::try_from(offset).unwrap_or(usize::MAX).min(body.len())
    };
    let end = usize::try_from(length)
        .map_or(usize::MAX, |len| start.saturating_add(len))
        .min(body.len());
    body.slice(start..end)
}

impl RemoteStore for HttpRemoteStore {
    fn list_containers(&self) -> OdfsResult<Vec<ContainerInfo>> {
        debug!("Listing containers");
        self.get_json("/containers".to_string(), Vec::new())
    }

    fn list_directory(&self, container: ContainerId, path: &str) -> OdfsResult<DirectoryListing> {
        debug!(container = %container, path = path, "Listing directory");
        self.get_json(
            format!("/containers/{container}/files"),
            vec![("dirPath", path.to_string())],
        )
    }

    fn get_file_attributes(&self, file: FileId) -> OdfsResult<FileAttributes> {
        debug!(file = %file, "Fetching file attributes");
        self.get_json(format!("/files/{file}/meta-file-manager"), Vec::new())
    }

    fn create_streaming_key(&self, file: FileId) -> OdfsResult<StreamingKey> {
        debug!(file = %file, "Creating streaming key");
        let endpoint = format!("/files/{file}/stream");
        let request = self.request(reqwest::Method::POST, &endpoint);
        self.run(async move {
            let response = request
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, &e))?;
            let response = check_status(&endpoint, response)?;
            let body: StreamResponse = response
                .json()
                .await
                .map_err(|e| OdfsError::InvalidResponse(format!("{endpoint}: {e}")))?;
            Ok(body.streaming_key)
        })
    }

    fn download_range(
        &self,
        blob: BlobId,
        key: &StreamingKey,
        offset: u64,
        length: u64,
    ) -> OdfsResult<Bytes> {
        let Some(range) = range_header(offset, length) else {
            return Ok(Bytes::new());
        };
        trace!(blob = %blob, range = %range, "Downloading range");

        let endpoint = "/stream".to_string();
        let request = self
            .request(reqwest::Method::GET, &endpoint)
            .query(&[
                ("blobId", blob.to_string()),
                ("streamingKey", key.as_str().to_string()),
            ])
            .header(header::RANGE, range);
        self.run(async move {
            let response = request
                .send()
                .await
                .map_err(|e| transport_error(&endpoint, &e))?;
            if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                return Ok(Bytes::new());
            }
            let response = check_status(&endpoint, response)?;
            let partial = response.status() == StatusCode::PARTIAL_CONTENT;
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(&endpoint, &e))?;
            Ok(slice_body(body, partial, offset, length))
        })
    }
}
