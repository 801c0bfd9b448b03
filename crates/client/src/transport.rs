//! How the client reaches the server.
//!
//! [`HttpTransport`] talks to a remote server over `reqwest`;
//! [`TowerTransport`] drives any `tower` service in-process, such as the
//! server's axum router.

use std::fmt::{self, Display};

use arbor_wire::{CONTENT_TYPE, ServerPayload};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use http_body_util::{BodyDataStream, Full};
use tower::{Service, ServiceExt};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};

/// Header naming the server function a call invokes.
pub const ACTION_HEADER: &str = "psc-action";

/// An outgoing request. `url` is origin-relative (`/products/42.data`).
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(CONTENT_TYPE));
        Self {
            method,
            url: url.into(),
            headers,
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    /// # Errors
    ///
    /// Fails if `value` is not a valid header value.
    pub fn header(mut self, name: &'static str, value: &str) -> Result<Self> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::transport(format!("header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

/// A response whose body has not been read yet.
pub struct TransportResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Decode the body as a payload.
    ///
    /// Error statuses still carry a payload (a 404 render, say) when the
    /// server sent one; anything else becomes [`ClientError::Status`].
    ///
    /// # Errors
    ///
    /// A non-payload response, or a body that fails to decode.
    pub async fn payload(self) -> Result<ServerPayload> {
        let is_payload = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with(CONTENT_TYPE));
        if is_payload {
            return Ok(ServerPayload::decode(self.body).await?);
        }

        let status = self.status.as_u16();
        let chunks: Vec<Bytes> = self
            .body
            .filter_map(|chunk| async move { chunk.ok() })
            .collect()
            .await;
        let body = chunks
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect::<String>();
        Err(ClientError::Status { status, body })
    }
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Transport over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(base: Url) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = self
            .base
            .join(&request.url)
            .map_err(|e| ClientError::invalid_url(&request.url, e.to_string()))?;
        debug!(method = %request.method, %url, "sending request");

        let response = self
            .client
            .request(request.method, url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        Ok(TransportResponse {
            status: response.status(),
            content_type: content_type(response.headers()),
            body: response.bytes_stream().map(|chunk| chunk.map_err(ClientError::from)).boxed(),
        })
    }
}

/// Transport that calls a `tower` service directly.
#[derive(Debug, Clone)]
pub struct TowerTransport<S> {
    service: S,
}

impl<S> TowerTransport<S> {
    pub const fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S, B> Transport for TowerTransport<S>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<B>> + Clone + Send + Sync + 'static,
    S::Error: Display,
    S::Future: Send,
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Display,
{
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        debug!(method = %request.method, url = %request.url, "dispatching in-process request");
        let mut outgoing = http::Request::builder()
            .method(request.method)
            .uri(&request.url)
            .body(Full::new(request.body))
            .map_err(|e| ClientError::invalid_url(&request.url, e.to_string()))?;
        *outgoing.headers_mut() = request.headers;

        let response = self
            .service
            .clone()
            .oneshot(outgoing)
            .await
            .map_err(|e| ClientError::transport(e.to_string()))?;
        let (parts, body) = response.into_parts();

        Ok(TransportResponse {
            status: parts.status,
            content_type: content_type(&parts.headers),
            body: BodyDataStream::new(body)
                .map(|chunk| chunk.map_err(|e| ClientError::transport(e.to_string())))
                .boxed(),
        })
    }
}
