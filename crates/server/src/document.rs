//! Hook for full-document responses.

use arbor_wire::CodecResult;
use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures::stream::BoxStream;
use http::StatusCode;

use crate::error::Result;

/// Assembles an HTML document around an encoded payload.
///
/// Document requests are handed to the shell together with the payload
/// stream; the shell owns the markup. Without a shell the payload itself is
/// returned.
#[async_trait]
pub trait DocumentShell: Send + Sync {
    async fn render(
        &self,
        url: &str,
        status: StatusCode,
        payload: BoxStream<'static, CodecResult<Bytes>>,
    ) -> Result<Response<Body>>;
}
