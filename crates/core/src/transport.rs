//! HTTP exchange with the clinical data repository.
//!
//! Every repository call goes through [`dispatch`], which applies the per-call deadline and
//! cancellation signal around a [`Transport`]. The production transport is [`HttpTransport`]
//! (reqwest); tests substitute their own implementations of the trait.
//!
//! Status handling:
//! - 2xx: the body is parsed as JSON. An empty body is `None`, not an error.
//! - anything else: [`VitalsError::Transport`] with the status code and reason phrase. The body is
//!   never assumed to be parseable.
//!
//! No retries happen here.

use crate::config::{CoreConfig, Credentials};
use crate::error::Operation;
use crate::{VitalsError, VitalsResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One request against the repository, relative to its base URL.
///
/// Path segments are kept unencoded and are percent-encoded when the URL is built.
#[derive(Clone, Debug, PartialEq)]
pub struct RepositoryRequest {
    pub operation: Operation,
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    /// Identifiers involved, for error context.
    pub target: String,
}

impl RepositoryRequest {
    pub fn new<I, S>(operation: Operation, method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let target = segments.join("/");
        Self {
            operation,
            method,
            segments,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            target,
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn accept(self, content_type: &str) -> Self {
        self.header("Accept", content_type)
    }

    /// Attach a JSON body sent with the given content type.
    pub fn body(self, content_type: &str, body: Value) -> Self {
        let mut request = self.header("Content-Type", content_type);
        request.body = Some(body);
        request
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryResponse {
    pub status: u16,
    pub body: Option<Value>,
    pub etag: Option<String>,
    pub location: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange. Implementations map non-2xx statuses to
    /// [`VitalsError::Transport`].
    async fn send(&self, request: RepositoryRequest) -> VitalsResult<RepositoryResponse>;
}

/// The cancelling half of a [`cancel_pair`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Abandon every call watching the paired signal. Calls started afterwards fail at once.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// The observing half of a [`cancel_pair`]. Cheap to clone.
///
/// Dropping the [`CancelHandle`] without cancelling leaves the signal pending forever.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the paired handle cancels.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

/// Per-call deadline and cancellation.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub cancel: CancelSignal,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Send `request` through `transport`, honouring the deadline and cancellation in `options`.
///
/// A cancelled or timed-out call drops the in-flight request future.
pub async fn dispatch(
    transport: &dyn Transport,
    request: RepositoryRequest,
    options: &CallOptions,
) -> VitalsResult<RepositoryResponse> {
    let operation = request.operation;
    let target = request.target.clone();

    if options.cancel.is_cancelled() {
        return Err(VitalsError::Cancelled { operation, target });
    }

    let send = transport.send(request);
    let deadline = async {
        match options.timeout {
            Some(after) => match tokio::time::timeout(after, send).await {
                Ok(result) => result,
                Err(_) => Err(VitalsError::Timeout {
                    operation,
                    target: target.clone(),
                    after,
                }),
            },
            None => send.await,
        }
    };

    tokio::select! {
        biased;
        _ = options.cancel.cancelled() => {
            debug!(%operation, %target, "repository call cancelled");
            Err(VitalsError::Cancelled { operation, target: target.clone() })
        }
        result = deadline => result,
    }
}

/// reqwest-backed [`Transport`].
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(config: &CoreConfig) -> VitalsResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("clinic-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VitalsError::InvalidInput(format!("could not build HTTP client: {e}")))?;
        Ok(Self::with_client(
            client,
            config.base_url().clone(),
            config.credentials().cloned(),
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            client,
            base_url,
            credentials,
        }
    }

    pub fn url_for(&self, request: &RepositoryRequest) -> VitalsResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                VitalsError::InvalidInput(format!("base URL {} cannot carry paths", self.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(&request.segments);
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

fn header_text(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RepositoryRequest) -> VitalsResult<RepositoryResponse> {
        let url = self.url_for(&request)?;
        let operation = request.operation;
        let target = request.target.clone();

        debug!(%operation, method = ?request.method, %url, "sending repository request");

        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                VitalsError::InvalidInput(format!("request body could not be encoded: {e}"))
            })?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(|source| VitalsError::Network {
            operation,
            target: target.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            warn!(%operation, %target, status = status.as_u16(), %reason, "repository rejected request");
            return Err(VitalsError::Transport {
                operation,
                target,
                status: status.as_u16(),
                reason,
            });
        }

        let etag = header_text(response.headers(), reqwest::header::ETAG);
        let location = header_text(response.headers(), reqwest::header::LOCATION);
        let bytes = response.bytes().await.map_err(|source| VitalsError::Network {
            operation,
            target: target.clone(),
            source,
        })?;

        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let value = serde_json::from_slice(&bytes).map_err(|e| VitalsError::MalformedResponse {
                operation,
                target: target.clone(),
                detail: format!("response body is not JSON: {e}"),
            })?;
            Some(value)
        };

        Ok(RepositoryResponse {
            status: status.as_u16(),
            body,
            etag,
            location,
        })
    }
}
