//! HTTP transport with the status-driven retry policy of the manager API.
//!
//! A request marked retryable is repeated with a fixed wait while the
//! response status is outside [`NON_RETRYABLE_STATUSES`] or the connection
//! fails, up to `max_retries` repetitions. Whatever comes back last is handed
//! to the caller for interpretation; 400 in particular is a domain answer,
//! not a transport fault.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::config::{RetryConfig, ServerConfig};
use crate::error::{CephError, CephResult};
use crate::logging::Logger;
use crate::task::Exception;

pub const CEPH_MIME_TYPE: &str = "application/vnd.ceph.api.v1.0+json";
pub const JSON_MIME_TYPE: &str = "application/json";

/// Statuses returned to the caller without retrying.
pub const NON_RETRYABLE_STATUSES: [u16; 6] = [200, 201, 202, 204, 400, 404];

pub fn is_retryable_status(status: u16) -> bool {
    !NON_RETRYABLE_STATUSES.contains(&status)
}

/// One request against the API root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path segments below the API root, each percent-encoded on its own
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Apply the transport retry policy
    pub retry: bool,
}

impl ApiRequest {
    pub fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
            retry: false,
        }
    }

    pub fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    pub fn post(segments: &[&str], body: Value) -> Self {
        Self::new(Method::POST, segments).with_body(body)
    }

    pub fn put(segments: &[&str], body: Value) -> Self {
        Self::new(Method::PUT, segments).with_body(body)
    }

    pub fn delete(segments: &[&str]) -> Self {
        Self::new(Method::DELETE, segments)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retry = true;
        self
    }

    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}

/// Status, headers and raw body of a completed exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> CephResult<T> {
        serde_json::from_str(&self.body).map_err(CephError::from)
    }

    /// The body as a Ceph exception document, if it is one.
    pub fn exception(&self) -> Option<Exception> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// Executes requests against the manager API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> CephResult<ApiResponse>;
}

/// `reqwest` backed transport bound to one manager.
///
/// The retry policy is fixed at construction and never mutated per call, so
/// one instance can serve concurrent call chains.
pub struct HttpTransport {
    client: Client,
    server: RwLock<ServerConfig>,
    token: RwLock<Option<String>>,
    retry: RetryConfig,
    log: Logger,
}

impl HttpTransport {
    pub fn new(
        server: ServerConfig,
        retry: RetryConfig,
        timeout: Duration,
        log: Logger,
    ) -> CephResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ceph-rest-sdk/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(server.insecure_skip_verify)
            .build()?;

        Ok(Self {
            client,
            server: RwLock::new(server),
            token: RwLock::new(None),
            retry,
            log: log.scoped("ceph_rest_sdk::transport"),
        })
    }

    pub async fn server(&self) -> ServerConfig {
        self.server.read().await.clone()
    }

    pub async fn set_token(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Point the transport at the scheme, host and port of `location`.
    pub async fn retarget(&self, location: &str) -> CephResult<()> {
        let url = Url::parse(location).map_err(|e| {
            CephError::Configuration(format!("invalid redirect location {}: {}", location, e))
        })?;
        let host = url.host_str().ok_or_else(|| {
            CephError::Configuration(format!("redirect location {} has no host", location))
        })?;
        let port = url.port_or_known_default().ok_or_else(|| {
            CephError::Configuration(format!("redirect location {} has no port", location))
        })?;

        let mut server = self.server.write().await;
        server.address = host.to_string();
        server.port = port;
        server.protocol = url.scheme().to_string();
        self.log.info(format_args!("manager redirected to {}", server.base_url()));
        Ok(())
    }

    pub(crate) async fn url_for(&self, request: &ApiRequest) -> CephResult<Url> {
        let base = self.server.read().await.base_url();
        let mut url = Url::parse(&base)
            .map_err(|e| CephError::Configuration(format!("invalid server url {}: {}", base, e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                CephError::Configuration(format!("server url {} can not carry a path", base))
            })?;
            segments.pop_if_empty();
            for segment in &request.segments {
                segments.push(segment);
            }
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }

    async fn send_once(&self, request: &ApiRequest) -> CephResult<ApiResponse> {
        let url = self.url_for(request).await?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, CEPH_MIME_TYPE);

        if let Some(token) = self.token.read().await.as_ref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.header(CONTENT_TYPE, JSON_MIME_TYPE).json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse { status, headers, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> CephResult<ApiResponse> {
        let max_attempts = if request.retry {
            self.retry.max_attempts()
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let exhausted = attempt >= max_attempts;

            match self.send_once(&request).await {
                Ok(response) => {
                    if !request.retry || !is_retryable_status(response.status) {
                        self.log.debug(format_args!(
                            "http status: {} --> no retry for {}",
                            response.status, request
                        ));
                        return Ok(response);
                    }
                    if exhausted {
                        self.log.warn(format_args!(
                            "http status: {} for {} after {} attempts, giving up",
                            response.status, request, attempt
                        ));
                        return Ok(response);
                    }
                    self.log.debug(format_args!(
                        "http status: {} --> retry for {} needed",
                        response.status, request
                    ));
                }
                Err(err) => {
                    if exhausted || !err.is_retryable() {
                        return Err(err);
                    }
                    self.log.warn(format_args!(
                        "{} failed on attempt {}/{}: {}",
                        request, attempt, max_attempts, err
                    ));
                }
            }

            sleep(self.retry.wait()).await;
        }
    }
}
