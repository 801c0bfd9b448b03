//! The application: route tree, modules, server functions and config.
//!
//! [`App::build_payload`] is the payload builder: match, resolve modules
//! leaf to root, query, then render. [`App::handle`] wraps it with request
//! normalisation and encoding, and [`App::router`] mounts it on axum.

use std::future::Future;
use std::sync::Arc;

use arbor_core::{RouteDescriptor, RouteError, RouteId, RouteMatch, match_or_root};
use arbor_wire::{
    ActionPayload, Deferred, EncodeOptions, FetcherPayload, RenderPayload, ServerPayload, decode_str,
};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{StatusCode, header};
use http_body_util::{BodyExt, Limited};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, error, info_span, warn};
use ulid::Ulid;

use crate::config::ServerConfig;
use crate::document::DocumentShell;
use crate::error::{Result, ServerError};
use crate::module::{DataArgs, RouteModule, Thrown};
use crate::query::{QueryOutcome, ResolvedMatch, query};
use crate::registry::{ModuleRegistry, RegistryBuilder};
use crate::render::{build_manifest, render_routes};
use crate::request::{PayloadRequest, ResponseKind};
use crate::server_functions::{ServerFunctions, call_arguments};

/// Largest request body the HTTP handler reads.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

struct AppInner {
    registry: ModuleRegistry,
    functions: ServerFunctions,
    config: ServerConfig,
    shell: Option<Arc<dyn DocumentShell>>,
}

/// A configured application. Cheap to clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    registry: RegistryBuilder,
    functions: ServerFunctions,
    config: ServerConfig,
    shell: Option<Arc<dyn DocumentShell>>,
}

impl AppBuilder {
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteDescriptor>) -> Self {
        self.registry = self.registry.routes(routes);
        self
    }

    #[must_use]
    pub fn module(mut self, id: impl Into<RouteId>, module: RouteModule) -> Self {
        self.registry = self.registry.module(id, module);
        self
    }

    #[must_use]
    pub fn lazy_module<F, Fut>(mut self, id: impl Into<RouteId>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<RouteModule, String>> + Send + 'static,
    {
        self.registry = self.registry.lazy_module(id, factory);
        self
    }

    /// Use an existing registry, so route modules can embed references to
    /// functions registered on it.
    #[must_use]
    pub fn server_functions(mut self, functions: ServerFunctions) -> Self {
        self.functions = functions;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn document_shell(mut self, shell: impl DocumentShell + 'static) -> Self {
        self.shell = Some(Arc::new(shell));
        self
    }

    /// Validate the route tree and build.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::build`].
    pub fn build(self) -> Result<App> {
        let registry = self.registry.build(self.config.module_cache_capacity)?;
        Ok(App {
            inner: Arc::new(AppInner {
                registry,
                functions: self.functions,
                config: self.config,
                shell: self.shell,
            }),
        })
    }
}

impl App {
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn server_functions(&self) -> &ServerFunctions {
        &self.inner.functions
    }

    #[must_use]
    pub fn routes(&self) -> &[RouteDescriptor] {
        self.inner.registry.routes()
    }

    fn encode_options(&self) -> EncodeOptions {
        EncodeOptions::redacted(self.inner.config.redact_errors.clone())
    }

    /// Build the payload for a request.
    ///
    /// Fetcher requests produce a `fetcher` payload, server-function calls an
    /// `action` payload, everything else a `render` or `redirect` payload.
    ///
    /// # Errors
    ///
    /// Any [`ServerError`]; route-data errors are not errors here, they are
    /// part of the rendered payload.
    pub async fn build_payload(&self, request: PayloadRequest) -> Result<ServerPayload> {
        let request = Arc::new(request);
        if let Some(target) = request.target_route.clone() {
            return self.fetcher(&request, target).await;
        }
        if request.method == http::Method::POST {
            if let Some(id) = request.action_id.clone() {
                return self.call_server_function(&request, &id).await;
            }
        }
        self.run_router(&request).await
    }

    fn match_request(&self, request: &PayloadRequest) -> arbor_core::Matched {
        match_or_root(
            self.routes(),
            &request.pathname,
            self.inner.config.basename.as_deref(),
        )
    }

    /// Resolve modules leaf to root and widen each match's capabilities.
    async fn resolve_matches(&self, matches: Vec<RouteMatch>) -> Result<Vec<ResolvedMatch>> {
        let mut resolved = Vec::with_capacity(matches.len());
        for mut route in matches.into_iter().rev() {
            let module = self.inner.registry.resolve(&route.id).await?;
            route.capabilities = route.capabilities.merge(module.capabilities());
            resolved.push(ResolvedMatch { route, module });
        }
        resolved.reverse();
        Ok(resolved)
    }

    async fn run_router(&self, request: &Arc<PayloadRequest>) -> Result<ServerPayload> {
        let matched = self.match_request(request);
        if matched.matches.is_empty() {
            return Err(ServerError::NoRoutes);
        }
        let matches = self.resolve_matches(matched.matches).await?;

        match query(request, &matches).await? {
            QueryOutcome::Redirect(redirect) => {
                debug!(location = %redirect.location, "route redirected");
                Ok(ServerPayload::Redirect(redirect))
            }
            QueryOutcome::Render(context) => {
                let rendered = render_routes(&matches, &context);
                let mut manifest = build_manifest(&matches, &self.inner.config);
                manifest.url = request.url();

                Ok(ServerPayload::Render(RenderPayload {
                    matches: matches.iter().map(|m| m.route.id.clone()).collect(),
                    rendered,
                    loader_data: context.loader_data,
                    action_data: context.action_data,
                    errors: context.errors,
                    manifest,
                    status: matched.status.max(context.status),
                    url: request.url(),
                }))
            }
        }
    }

    async fn fetcher(&self, request: &Arc<PayloadRequest>, target: RouteId) -> Result<ServerPayload> {
        let route = self
            .match_request(request)
            .matches
            .into_iter()
            .find(|m| m.id == target)
            .ok_or_else(|| ServerError::UnknownFetcherRoute(target.clone()))?;
        let module = self.inner.registry.resolve(&route.id).await?;

        let (function, export) = if request.is_mutation() {
            (module.action.clone(), "action")
        } else {
            (module.loader.clone(), "loader")
        };
        let result = match function {
            Some(function) => {
                let pending = function(DataArgs {
                    request: Arc::clone(request),
                    params: route.params.clone(),
                });
                Deferred::new(async move { pending.await.map_err(fetcher_error) })
            }
            None => Deferred::rejected(RouteError::method_not_allowed(format!(
                "route '{}' has no {export}",
                route.id
            ))),
        };

        debug!(route_id = %route.id, export, "fetcher request");
        Ok(ServerPayload::Fetcher(FetcherPayload {
            route_id: route.id,
            result,
            url: request.url(),
        }))
    }

    async fn call_server_function(&self, request: &Arc<PayloadRequest>, id: &str) -> Result<ServerPayload> {
        // A route action for the same URL takes precedence.
        let matched = self.match_request(request);
        if let Some(leaf) = matched.matches.last() {
            if self.inner.registry.resolve(&leaf.id).await?.action.is_some() {
                warn!(function = id, route_id = %leaf.id, "request names both a route action and a server function; running the route action");
                return self.run_router(request).await;
            }
        }

        let body = std::str::from_utf8(&request.body)
            .map_err(|e| ServerError::invalid_request(format!("call body is not utf-8: {e}")))?;
        let args = if body.trim().is_empty() {
            Vec::new()
        } else {
            call_arguments(decode_str(body).await?)
        };

        let result = self.inner.functions.invoke(id, args)?;
        // Settle the call before re-rendering so the page reflects its effects.
        if let Err(e) = result.resolve().await {
            debug!(function = id, error = %e, "server function failed");
        }

        let page = self.run_router(&Arc::new(request.as_read())).await?;
        Ok(ServerPayload::Action(ActionPayload {
            result,
            page: Box::new(page),
            url: request.url(),
        }))
    }

    /// Handle a request with a buffered body. Never fails: errors become
    /// error responses.
    pub async fn handle(&self, request: http::Request<Bytes>) -> Response {
        let (parts, body) = request.into_parts();
        let result = match PayloadRequest::from_parts(parts.method, &parts.uri, parts.headers, body) {
            Ok(request) => self.respond(request).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| self.error_response(&e))
    }

    async fn respond(&self, request: PayloadRequest) -> Result<Response> {
        let kind = request.kind;
        let url = request.url();
        let payload = self.build_payload(request).await?;
        let status = StatusCode::from_u16(payload.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let stream = payload.encode(self.encode_options());

        match (&self.inner.shell, kind) {
            (Some(shell), ResponseKind::Document) => shell.render(&url, status, stream).await,
            _ => Ok(Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, arbor_wire::CONTENT_TYPE)
                .body(Body::from_stream(stream))?),
        }
    }

    fn error_response(&self, e: &ServerError) -> Response {
        let status = e.status_code();
        error!(error = %e, status = status.as_u16(), "request failed");
        let message = if status.is_server_error() && self.inner.config.redact_errors.is_enabled() {
            status.canonical_reason().unwrap_or("Error").to_string()
        } else {
            e.to_string()
        };
        (status, message).into_response()
    }

    /// Mount the app on an axum router. Every path is handled by the app.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(serve)
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }
}

/// Redirects from a fetcher cannot navigate; they surface as an error
/// response carrying the location.
fn fetcher_error(thrown: Thrown) -> RouteError {
    match thrown {
        Thrown::Response(response) if response.is_redirect() => {
            let location = response.location().unwrap_or_default().to_string();
            RouteError::response(response.status, format!("redirect to {location}"))
                .with_data(json!({ "location": location }))
        }
        other => other.into_route_error(),
    }
}

async fn serve(State(app): State<App>, request: Request) -> Response {
    let span = info_span!(
        "request",
        request_id = %Ulid::new(),
        method = %request.method(),
        uri = %request.uri(),
    );

    async move {
        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                return ServerError::invalid_request(format!("failed to read body: {e}")).into_response();
            }
        };
        app.handle(http::Request::from_parts(parts, body)).await
    }
    .instrument(span)
    .await
}
