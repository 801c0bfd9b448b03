//! Route modules: the code behind a route id.
//!
//! A module is a set of optional exports. Which ones are present decides the
//! route's [`Capabilities`], computed once when the module is resolved.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use arbor_core::{Capabilities, Params, RouteError, RouteId};
use arbor_wire::{ClientReference, Node};
use futures::future::{BoxFuture, FutureExt};
use http::{HeaderMap, HeaderValue, header};

use crate::request::PayloadRequest;

/// Arguments passed to loaders and actions.
#[derive(Debug, Clone)]
pub struct DataArgs {
    pub request: Arc<PayloadRequest>,
    pub params: Params,
}

impl DataArgs {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A response thrown (or returned) by a data function instead of data.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrownResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ThrownResponse {
    /// The `Location` header, if present and readable.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }

    /// A 3xx status or a `Location` header marks a redirect attempt.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) || self.headers.contains_key(header::LOCATION)
    }

    fn into_route_error(self) -> RouteError {
        let mut error = RouteError::response(self.status, self.message);
        error.data = self.data;
        error
    }
}

/// Why a data function did not produce data.
#[derive(Debug, Clone, PartialEq)]
pub enum Thrown {
    /// An explicit response: a redirect, or an error response with a status.
    Response(ThrownResponse),
    /// An unexpected failure.
    Error(RouteError),
}

impl Thrown {
    /// A 302 redirect.
    pub fn redirect(location: impl AsRef<str>) -> Self {
        Self::redirect_with(302, location)
    }

    pub fn redirect_with(status: u16, location: impl AsRef<str>) -> Self {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(location.as_ref()) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(_) => {
                tracing::warn!(location = location.as_ref(), "redirect location is not a valid header value");
            }
        }
        Self::Response(ThrownResponse {
            status,
            headers,
            message: String::new(),
            data: None,
        })
    }

    /// An error response such as a 404 for a missing record.
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        Self::Response(ThrownResponse {
            status,
            headers: HeaderMap::new(),
            message: message.into(),
            data: None,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(RouteError::new(message))
    }

    /// Route error carried by a non-redirect outcome.
    #[must_use]
    pub fn into_route_error(self) -> RouteError {
        match self {
            Self::Response(response) => response.into_route_error(),
            Self::Error(error) => error,
        }
    }
}

impl From<RouteError> for Thrown {
    fn from(error: RouteError) -> Self {
        if error.is_response {
            Self::Response(ThrownResponse {
                status: error.status,
                headers: HeaderMap::new(),
                message: error.message,
                data: error.data,
            })
        } else {
            Self::Error(error)
        }
    }
}

/// Data for one rendered match, as passed to route components.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    pub id: RouteId,
    pub pathname: String,
    pub params: Params,
    pub data: Node,
}

/// Props for a route's default component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentProps {
    pub params: Params,
    pub loader_data: Node,
    pub action_data: Option<Node>,
    pub matches: Vec<MatchData>,
}

/// Props for a route's error boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorProps {
    pub error: RouteError,
    pub params: Params,
}

pub type DataFn = Arc<dyn Fn(DataArgs) -> BoxFuture<'static, Result<Node, Thrown>> + Send + Sync>;
pub type ComponentFn = Arc<dyn Fn(&ComponentProps) -> Node + Send + Sync>;
pub type LayoutFn = Arc<dyn Fn(Node) -> Node + Send + Sync>;
pub type ErrorBoundaryFn = Arc<dyn Fn(&ErrorProps) -> Node + Send + Sync>;
pub type HydrateFallbackFn = Arc<dyn Fn(&Params) -> Node + Send + Sync>;

/// The exports of one route module.
#[derive(Clone, Default)]
pub struct RouteModule {
    pub loader: Option<DataFn>,
    pub action: Option<DataFn>,
    pub component: Option<ComponentFn>,
    pub layout: Option<LayoutFn>,
    pub error_boundary: Option<ErrorBoundaryFn>,
    pub hydrate_fallback: Option<HydrateFallbackFn>,
    pub client_loader: Option<ClientReference>,
    pub client_action: Option<ClientReference>,
    pub should_revalidate: Option<ClientReference>,
    /// Bundle files this route needs, for the assets manifest.
    pub imports: Vec<String>,
}

fn data_fn<F, Fut>(f: F) -> DataFn
where
    F: Fn(DataArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Node, Thrown>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

impl RouteModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn loader<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node, Thrown>> + Send + 'static,
    {
        self.loader = Some(data_fn(f));
        self
    }

    #[must_use]
    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DataArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node, Thrown>> + Send + 'static,
    {
        self.action = Some(data_fn(f));
        self
    }

    #[must_use]
    pub fn component(mut self, f: impl Fn(&ComponentProps) -> Node + Send + Sync + 'static) -> Self {
        self.component = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn layout(mut self, f: impl Fn(Node) -> Node + Send + Sync + 'static) -> Self {
        self.layout = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn error_boundary(mut self, f: impl Fn(&ErrorProps) -> Node + Send + Sync + 'static) -> Self {
        self.error_boundary = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn hydrate_fallback(mut self, f: impl Fn(&Params) -> Node + Send + Sync + 'static) -> Self {
        self.hydrate_fallback = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn client_loader(mut self, reference: ClientReference) -> Self {
        self.client_loader = Some(reference);
        self
    }

    #[must_use]
    pub fn client_action(mut self, reference: ClientReference) -> Self {
        self.client_action = Some(reference);
        self
    }

    #[must_use]
    pub fn should_revalidate(mut self, reference: ClientReference) -> Self {
        self.should_revalidate = Some(reference);
        self
    }

    #[must_use]
    pub fn imports(mut self, imports: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Capability flags derived from which exports are present.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_loader: self.loader.is_some(),
            has_action: self.action.is_some(),
            has_client_loader: self.client_loader.is_some(),
            has_client_action: self.client_action.is_some(),
            has_error_boundary: self.error_boundary.is_some(),
            has_should_revalidate: self.should_revalidate.is_some(),
        }
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModule")
            .field("capabilities", &self.capabilities())
            .field("component", &self.component.is_some())
            .field("layout", &self.layout.is_some())
            .field("hydrate_fallback", &self.hydrate_fallback.is_some())
            .field("imports", &self.imports)
            .finish()
    }
}
