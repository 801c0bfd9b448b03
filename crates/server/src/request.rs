//! Inbound request normalisation.
//!
//! Turns a raw HTTP request into what the payload builder needs: the
//! pathname the router sees, fetcher and server-reference targets, and
//! whether the caller wants a payload or a document.

use std::collections::BTreeMap;

use arbor_core::RouteId;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri, header};
use serde::de::DeserializeOwned;

use crate::error::{Result, ServerError};

/// Suffix that asks for the payload instead of a document.
pub const DATA_SUFFIX: &str = ".data";
/// Query parameter naming the single route a fetcher request targets.
pub const ROUTE_PARAM: &str = "_route";
/// Header naming the server function a POST invokes.
pub const ACTION_HEADER: &str = "psc-action";

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// The encoded payload itself.
    Payload,
    /// A full document built around the payload.
    Document,
}

/// A request as the router sees it.
#[derive(Debug, Clone)]
pub struct PayloadRequest {
    pub method: Method,
    /// Pathname with any `.data` suffix removed.
    pub pathname: String,
    /// Query string with the fetcher parameter removed.
    pub search: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set for fetcher requests.
    pub target_route: Option<RouteId>,
    /// Set for server-function calls.
    pub action_id: Option<String>,
    pub kind: ResponseKind,
}

impl PayloadRequest {
    /// Normalise a request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] if the URI has no path.
    pub fn from_parts(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Result<Self> {
        let raw_path = uri.path();
        if !raw_path.starts_with('/') {
            return Err(ServerError::invalid_request(format!("path {raw_path:?} is not absolute")));
        }

        let (pathname, is_data) = strip_data_suffix(raw_path);
        let (search, target_route) = split_route_param(uri.query());
        let action_id = headers
            .get(ACTION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let accepts_payload = headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|accept| accept.contains(arbor_wire::CONTENT_TYPE));
        let kind = if is_data || accepts_payload || action_id.is_some() {
            ResponseKind::Payload
        } else {
            ResponseKind::Document
        };

        Ok(Self {
            method,
            pathname,
            search,
            headers,
            body,
            target_route,
            action_id,
            kind,
        })
    }

    /// Shorthand for tests and in-process callers.
    ///
    /// # Errors
    ///
    /// See [`PayloadRequest::from_parts`].
    pub fn get(uri: &str) -> Result<Self> {
        let uri: Uri = uri
            .parse()
            .map_err(|e| ServerError::invalid_request(format!("{uri}: {e}")))?;
        Self::from_parts(Method::GET, &uri, HeaderMap::new(), Bytes::new())
    }

    /// Non-idempotent requests run actions instead of loaders.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD)
    }

    /// Pathname plus query string.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.search {
            Some(search) => format!("{}?{search}", self.pathname),
            None => self.pathname.clone(),
        }
    }

    /// The same URL read with GET, as rendered after a server-function call.
    #[must_use]
    pub fn as_read(&self) -> Self {
        Self {
            method: Method::GET,
            body: Bytes::new(),
            target_route: None,
            action_id: None,
            ..self.clone()
        }
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn form(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// Decode a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ServerError::invalid_request(format!("invalid JSON body: {e}")))
    }
}

/// `/products/42.data` -> `/products/42`, `/.data` -> `/`.
fn strip_data_suffix(path: &str) -> (String, bool) {
    match path.strip_suffix(DATA_SUFFIX) {
        Some(rest) => {
            let rest = rest.strip_suffix('/').unwrap_or(rest);
            let pathname = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
            (pathname, true)
        }
        None => (path.to_string(), false),
    }
}

fn split_route_param(query: Option<&str>) -> (Option<String>, Option<RouteId>) {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return (None, None);
    };

    let mut target = None;
    let mut kept = url::form_urlencoded::Serializer::new(String::new());
    let mut any_kept = false;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == ROUTE_PARAM {
            target = Some(RouteId::from(value.into_owned()));
        } else {
            kept.append_pair(&key, &value);
            any_kept = true;
        }
    }

    let search = any_kept.then(|| kept.finish());
    (search, target)
}
