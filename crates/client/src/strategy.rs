//! Per-event decision of where each matched route's data comes from.
//!
//! For every route of a navigation, submission or fetch the strategy picks
//! one of: reuse the cached value, run the route's client hook (which may ask
//! the server), or take the server's value. All routes of one event share a
//! single lazily started [`ServerCall`], so an event sends at most one
//! request no matter how many routes need the server.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arbor_core::{RouteError, RouteId, RouteMatch};
use arbor_wire::{Node, RenderPayload, ServerPayload};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CachedRoute, RouteCache};
use crate::error::{ClientError, Result};
use crate::hooks::{
    ClientActionArgs, ClientActionFn, ClientLoaderArgs, ClientModules, ShouldRevalidateArgs, ServerValue, Submission,
    pick_action_data, pick_fetcher_result, pick_loader_data,
};
use crate::location::Location;
use crate::server_call::{EventId, InFlight, ServerCall};
use crate::transport::{Transport, TransportRequest};

/// Options for [`DataStrategy::read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Where the router is now, for revalidation decisions.
    pub current: Option<Location>,
    /// Ignore the cache.
    pub force: bool,
    /// A payload already fetched for this location.
    pub prefetched: Option<Arc<ServerPayload>>,
}

/// Values resolved for a read.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub loader_data: BTreeMap<RouteId, Node>,
    pub errors: BTreeMap<RouteId, RouteError>,
    /// Routes whose value did not come from the cache.
    pub refreshed: Vec<RouteId>,
    /// The server's payload, if the shared call was made.
    pub payload: Option<Arc<ServerPayload>>,
    pub status: u16,
}

/// Values resolved for a submission.
#[derive(Debug, Clone)]
pub struct MutateOutcome {
    pub action_data: BTreeMap<RouteId, Node>,
    pub errors: BTreeMap<RouteId, RouteError>,
    pub payload: Option<Arc<ServerPayload>>,
}

/// Result of a single-route fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub route_id: RouteId,
    pub result: std::result::Result<Node, RouteError>,
    pub reached_server: bool,
}

enum Plan {
    Reuse(CachedRoute),
    Refresh,
}

/// Shared by every navigation, submission and fetcher of a session.
#[derive(Clone)]
pub struct DataStrategy {
    transport: Arc<dyn Transport>,
    cache: RouteCache,
    modules: ClientModules,
    in_flight: InFlight,
}

impl DataStrategy {
    pub fn new(transport: Arc<dyn Transport>, cache: RouteCache, modules: ClientModules, in_flight: InFlight) -> Self {
        Self {
            transport,
            cache,
            modules,
            in_flight,
        }
    }

    fn call(&self, event: EventId, make: impl FnOnce(Arc<dyn Transport>) -> ServerCall) -> ServerCall {
        self.in_flight.call(event, || make(Arc::clone(&self.transport)))
    }

    fn should_revalidate(&self, route: &RouteMatch, current: Option<&Location>, next: &Location) -> bool {
        let default_should_revalidate = current.is_some_and(|current| current.search != next.search);
        let hooks = self.cache.hooks(&route.id);
        match self.modules.revalidator(hooks.should_revalidate.as_ref()) {
            Some(hook) => hook(&ShouldRevalidateArgs {
                route_id: route.id.clone(),
                current: current.cloned().unwrap_or_else(|| next.clone()),
                next: next.clone(),
                default_should_revalidate,
            }),
            None => default_should_revalidate,
        }
    }

    fn plan(&self, route: &RouteMatch, location: &Location, options: &ReadOptions) -> Plan {
        if options.force || options.prefetched.is_some() {
            return Plan::Refresh;
        }
        match self.cache.lookup(&route.id, &route.pathname).fresh() {
            Some(cached) if !self.should_revalidate(route, options.current.as_ref(), location) => Plan::Reuse(cached),
            _ => Plan::Refresh,
        }
    }

    /// Resolve loader data for every match of a navigation.
    ///
    /// Cached routes are reused; the rest run their client loader or take
    /// the server's value from one shared request for the whole path.
    ///
    /// # Errors
    ///
    /// Transport and decode failures of the shared request. Route errors
    /// are part of the outcome.
    pub async fn read(
        &self,
        event: EventId,
        location: &Location,
        matches: &[RouteMatch],
        options: ReadOptions,
    ) -> Result<ReadOutcome> {
        let plans: Vec<Plan> = matches.iter().map(|m| self.plan(m, location, &options)).collect();
        let data_url = location.data_url();
        let call = match options.prefetched.clone() {
            Some(payload) => self.call(event, |_| ServerCall::settled(event, &data_url, payload)),
            None => self.call(event, |transport| ServerCall::new(event, transport, TransportRequest::get(&data_url))),
        };

        let resolutions = matches.iter().zip(&plans).map(|(route, plan)| {
            let call = call.clone();
            async move {
                match plan {
                    Plan::Reuse(cached) => match &cached.error {
                        Some(error) => Err(error.clone()),
                        None => Ok(cached.loader_data.clone().unwrap_or_default()),
                    },
                    Plan::Refresh => self.load_route(route, location, call).await,
                }
            }
        });
        let results = join_all(resolutions).await;
        let payload = settled_payload(&call)?;

        let mut outcome = ReadOutcome {
            loader_data: BTreeMap::new(),
            errors: BTreeMap::new(),
            refreshed: Vec::new(),
            status: payload.as_deref().map_or(200, ServerPayload::status),
            payload,
        };
        for (index, ((route, plan), result)) in matches.iter().zip(&plans).zip(results).enumerate() {
            if matches!(plan, Plan::Refresh) {
                outcome.refreshed.push(route.id.clone());
            }
            match result {
                Ok(value) => {
                    outcome.loader_data.insert(route.id.clone(), value);
                }
                Err(error) => attach_error(&mut outcome.errors, matches, index, error),
            }
        }
        // Nothing below a caught error renders.
        let below_error: Vec<RouteId> = matches
            .iter()
            .skip_while(|m| !outcome.errors.contains_key(&m.id))
            .skip(1)
            .map(|m| m.id.clone())
            .collect();
        for id in &below_error {
            outcome.loader_data.remove(id);
        }

        debug!(
            %event,
            url = %location,
            reused = matches.len().saturating_sub(outcome.refreshed.len()),
            refreshed = outcome.refreshed.len(),
            reached_server = call.started(),
            "resolved navigation data"
        );
        Ok(outcome)
    }

    async fn load_route(
        &self,
        route: &RouteMatch,
        location: &Location,
        call: ServerCall,
    ) -> std::result::Result<Node, RouteError> {
        if route.capabilities.has_client_loader {
            let hooks = self.cache.hooks(&route.id);
            match self.modules.loader(hooks.client_loader.as_ref()) {
                Some(hook) => {
                    return hook(ClientLoaderArgs {
                        route_id: route.id.clone(),
                        params: route.params.clone(),
                        location: location.clone(),
                        server: ServerValue::loader_data(call, route.id.clone()),
                    })
                    .await;
                }
                None => warn!(route_id = %route.id, "client loader declared but not registered"),
            }
        }
        let payload = call.payload().await.map_err(|e| RouteError::new(e.to_string()))?;
        pick_loader_data(&payload, &route.id).await
    }

    /// Run a submission against the deepest matched route.
    ///
    /// A client action gets the shared server call as a callback and may
    /// never start it. Without one the route takes the server's answer,
    /// which is a method-not-allowed error when the route has no action.
    ///
    /// # Errors
    ///
    /// Transport and decode failures of the shared request.
    pub async fn mutate(
        &self,
        event: EventId,
        location: &Location,
        matches: &[RouteMatch],
        submission: Submission,
    ) -> Result<MutateOutcome> {
        let mut outcome = MutateOutcome {
            action_data: BTreeMap::new(),
            errors: BTreeMap::new(),
            payload: None,
        };
        // The form is addressed to the deepest match; ancestors' actions
        // never run for it.
        let Some((index, route)) = matches.iter().enumerate().next_back() else {
            return Ok(outcome);
        };

        let call = self.call(event, |transport| {
            let request = TransportRequest::new(submission.method.clone(), location.data_url())
                .body(submission.content_type, submission.body.clone());
            ServerCall::new(event, transport, request)
        });

        let result = match self.client_action(route) {
            Some(hook) => {
                hook(ClientActionArgs {
                    route_id: route.id.clone(),
                    params: route.params.clone(),
                    location: location.clone(),
                    submission,
                    server: ServerValue::action_data(call.clone(), route.id.clone()),
                })
                .await
            }
            None => match call.payload().await {
                Ok(payload) => pick_action_data(&payload, &route.id).await,
                Err(e) => Err(RouteError::new(e.to_string())),
            },
        };
        outcome.payload = settled_payload(&call)?;

        match result {
            Ok(value) => {
                outcome.action_data.insert(route.id.clone(), value);
            }
            Err(error) => attach_error(&mut outcome.errors, matches, index, error),
        }
        debug!(%event, url = %location, route_id = %route.id, reached_server = call.started(), "submission settled");
        Ok(outcome)
    }

    fn client_action(&self, route: &RouteMatch) -> Option<ClientActionFn> {
        if !route.capabilities.has_client_action {
            return None;
        }
        let hooks = self.cache.hooks(&route.id);
        let hook = self.modules.action(hooks.client_action.as_ref());
        if hook.is_none() {
            warn!(route_id = %route.id, "client action declared but not registered");
        }
        hook
    }

    /// Resolve one route out of band, without navigating.
    ///
    /// # Errors
    ///
    /// [`ClientError::FetcherUnsupported`] for a mutating fetch on a route
    /// without a client action, and transport or decode failures.
    pub async fn fetch(
        &self,
        event: EventId,
        location: &Location,
        target: &RouteMatch,
        submission: Option<Submission>,
    ) -> Result<FetchOutcome> {
        let fetcher_url = location.fetcher_url(&target.id);
        let hooks = self.cache.hooks(&target.id);

        let (result, call) = match submission {
            Some(submission) if submission.is_mutation() => {
                let hook = target
                    .capabilities
                    .has_client_action
                    .then(|| self.modules.action(hooks.client_action.as_ref()))
                    .flatten()
                    .ok_or_else(|| ClientError::FetcherUnsupported {
                        route_id: target.id.clone(),
                        method: submission.method.to_string(),
                    })?;
                let call = self.call(event, |transport| {
                    let request = TransportRequest::new(submission.method.clone(), &fetcher_url)
                        .body(submission.content_type, submission.body.clone());
                    ServerCall::new(event, transport, request)
                });
                let result = hook(ClientActionArgs {
                    route_id: target.id.clone(),
                    params: target.params.clone(),
                    location: location.clone(),
                    submission,
                    server: ServerValue::fetcher_result(call.clone(), target.id.clone()),
                })
                .await;
                (result, call)
            }
            _ => {
                let call = self.call(event, |transport| {
                    ServerCall::new(event, transport, TransportRequest::get(&fetcher_url))
                });
                let cached = self.cache.lookup(&target.id, &target.pathname).fresh();
                let result = match (cached, self.modules.loader(hooks.client_loader.as_ref())) {
                    (Some(cached), _) => match cached.error {
                        Some(error) => Err(error),
                        None => Ok(cached.loader_data.unwrap_or_default()),
                    },
                    (None, Some(hook)) if target.capabilities.has_client_loader => {
                        hook(ClientLoaderArgs {
                            route_id: target.id.clone(),
                            params: target.params.clone(),
                            location: location.clone(),
                            server: ServerValue::fetcher_result(call.clone(), target.id.clone()),
                        })
                        .await
                    }
                    (None, _) => match call.payload().await {
                        Ok(payload) => pick_fetcher_result(&payload, &target.id).await,
                        Err(e) => Err(RouteError::new(e.to_string())),
                    },
                };
                (result, call)
            }
        };

        settled_payload(&call)?;
        debug!(%event, route_id = %target.id, reached_server = call.started(), "fetch settled");
        Ok(FetchOutcome {
            route_id: target.id.clone(),
            result,
            reached_server: call.started(),
        })
    }

    /// Write the routes a read refreshed from the server, with the values
    /// the read resolved for them.
    pub fn commit_read(&self, outcome: &ReadOutcome) -> usize {
        let Some(ServerPayload::Render(render)) = outcome.payload.as_deref() else {
            return 0;
        };
        outcome
            .refreshed
            .iter()
            .filter_map(|id| CachedRoute::from_payload(render, id))
            .map(|mut route| {
                let id = route.rendered.meta.id.clone();
                route.loader_data = outcome.loader_data.get(&id).cloned();
                route.error = outcome.errors.get(&id).cloned();
                self.cache.store(route);
            })
            .count()
    }

    /// After a mutation the server may have changed anything: every entry
    /// outside the new match set goes stale, and the new matches are
    /// recorded fresh.
    pub fn commit_mutation(&self, render: &RenderPayload) -> usize {
        let keep: HashSet<CacheKey> = render
            .matched_routes()
            .map(|route| (route.meta.id.clone(), route.meta.pathname.clone()))
            .collect();
        let invalidated = self.cache.invalidate_except(&keep);
        self.cache.record(render);
        invalidated
    }
}

/// The shared call's payload if it was made. A failed call fails the event
/// even when every hook swallowed the error.
fn settled_payload(call: &ServerCall) -> Result<Option<Arc<ServerPayload>>> {
    match call.peek() {
        Some(Ok(payload)) => Ok(Some(payload)),
        Some(Err(error)) => Err(error),
        None => Ok(None),
    }
}

/// Record `error` from `matches[index]` on the nearest route at or above it
/// with an error boundary, or on the route itself when there is none. The
/// first error per boundary wins.
fn attach_error(errors: &mut BTreeMap<RouteId, RouteError>, matches: &[RouteMatch], index: usize, error: RouteError) {
    let boundary = matches
        .iter()
        .take(index.saturating_add(1))
        .rfind(|m| m.capabilities.has_error_boundary)
        .or_else(|| matches.get(index));
    if let Some(boundary) = boundary {
        errors.entry(boundary.id.clone()).or_insert(error);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use arbor_core::{Capabilities, RouteDescriptor, match_or_root};
    use arbor_server::{App, RouteModule, Thrown};
    use arbor_wire::{ClientReference, Element};
    use async_trait::async_trait;

    use super::*;
    use crate::transport::{TowerTransport, TransportResponse};

    struct Counting {
        inner: TowerTransport<axum::Router>,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Counting {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.inner.send(request).await
        }
    }

    fn hook_ref(name: &str) -> ClientReference {
        ClientReference::new("routes/product.js", name)
    }

    fn routes() -> Vec<RouteDescriptor> {
        vec![RouteDescriptor::new("root").with_path("/").with_children([
            RouteDescriptor::new("products").with_path("products/:id"),
            RouteDescriptor::new("broken").with_path("broken"),
        ])]
    }

    fn server(counter: &Arc<AtomicI64>) -> Arc<Counting> {
        let read = Arc::clone(counter);
        let write = Arc::clone(counter);
        let app = App::builder()
            .routes(routes())
            .module(
                "root",
                RouteModule::new()
                    .loader(|_| async { Ok(Node::from("layout")) })
                    .action(|_| async { Ok(Node::from("root action")) })
                    .error_boundary(|props| Element::new("p").child(props.error.message.clone()).into()),
            )
            .module(
                "products",
                RouteModule::new()
                    .loader(move |_| {
                        let read = Arc::clone(&read);
                        async move { Ok(Node::from(read.load(Ordering::SeqCst))) }
                    })
                    .action(move |_| {
                        let write = Arc::clone(&write);
                        async move { Ok(Node::from(write.fetch_add(1, Ordering::SeqCst) + 1)) }
                    })
                    .client_loader(hook_ref("clientLoader"))
                    .client_action(hook_ref("clientAction")),
            )
            .module("broken", RouteModule::new().loader(|_| async { Err(Thrown::error("no")) }))
            .build()
            .unwrap();
        Arc::new(Counting {
            inner: TowerTransport::new(app.router()),
            sent: AtomicUsize::new(0),
        })
    }

    /// Client matches as the session would compute them once the server
    /// told it the capabilities.
    fn client_matches(pathname: &str, products: Capabilities) -> Vec<RouteMatch> {
        let mut matches = match_or_root(&routes(), pathname, None).matches;
        for m in &mut matches {
            m.capabilities = if m.id.as_str() == "products" {
                products
            } else {
                Capabilities {
                    has_loader: true,
                    has_action: true,
                    has_error_boundary: true,
                    ..Capabilities::default()
                }
            };
        }
        matches
    }

    fn server_only() -> Capabilities {
        Capabilities {
            has_loader: true,
            has_action: true,
            ..Capabilities::default()
        }
    }

    fn strategy(transport: Arc<Counting>, modules: ClientModules) -> (DataStrategy, RouteCache) {
        let cache = RouteCache::new();
        (DataStrategy::new(transport, cache.clone(), modules, InFlight::new()), cache)
    }

    fn location(href: &str) -> Location {
        Location::parse(href).unwrap()
    }

    #[tokio::test]
    async fn test_read_sends_one_request_then_reuses_cache() {
        let counter = Arc::new(AtomicI64::new(4));
        let transport = server(&counter);
        let (strategy, _cache) = strategy(transport.clone(), ClientModules::new());
        let matches = client_matches("/products/1", server_only());
        let here = location("/products/1");

        let first = strategy.read(EventId(1), &here, &matches, ReadOptions::default()).await.unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert_eq!(first.refreshed.len(), 2);
        assert_eq!(first.loader_data[&RouteId::from("products")], Node::from(4_i64));
        assert_eq!(strategy.commit_read(&first), 2);

        let second = strategy
            .read(EventId(2), &here, &matches, ReadOptions { current: Some(here.clone()), ..ReadOptions::default() })
            .await
            .unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert!(second.refreshed.is_empty());
        assert!(second.payload.is_none());
        assert_eq!(second.loader_data, first.loader_data);
    }

    #[tokio::test]
    async fn test_client_loader_that_ignores_server_sends_nothing() {
        let counter = Arc::new(AtomicI64::new(0));
        let transport = server(&counter);
        let modules = ClientModules::new().client_loader(&hook_ref("clientLoader"), |args| async move {
            Ok(Node::from(format!("local {}", args.params["id"])))
        });
        let (strategy, cache) = strategy(transport.clone(), modules);
        let matches = client_matches(
            "/products/9",
            Capabilities {
                has_client_loader: true,
                ..Capabilities::default()
            },
        );
        // Warm the root and learn the products hooks from the server.
        let here = location("/products/9");
        let warm = strategy.read(EventId(1), &here, &matches[..1], ReadOptions::default()).await.unwrap();
        strategy.commit_read(&warm);
        let ServerPayload::Render(render) = warm.payload.as_deref().unwrap() else {
            panic!("expected render");
        };
        cache.learn_hooks(render);
        let sent_before = transport.sent.load(Ordering::SeqCst);

        let outcome = strategy
            .read(EventId(2), &here, &matches, ReadOptions { current: Some(here.clone()), ..ReadOptions::default() })
            .await
            .unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), sent_before);
        assert_eq!(outcome.loader_data[&RouteId::from("products")], Node::from("local 9"));
        assert!(outcome.payload.is_none());
    }

    #[tokio::test]
    async fn test_mutation_runs_only_the_target_action() {
        let counter = Arc::new(AtomicI64::new(0));
        let transport = server(&counter);
        let root_runs = Arc::new(AtomicI64::new(0));
        let modules = {
            let root_runs = Arc::clone(&root_runs);
            ClientModules::new().client_action(&hook_ref("rootAction"), move |_| {
                root_runs.fetch_add(1, Ordering::SeqCst);
                async { Ok(Node::from("root ran")) }
            })
        };
        let (strategy, cache) = strategy(transport.clone(), modules);
        let here = location("/products/1");
        let mut matches = client_matches("/products/1", server_only());
        matches[0].capabilities.has_client_action = true;
        let mut root = arbor_wire::RenderedRoute::new(arbor_wire::RouteMeta::from_match(&matches[0]));
        root.client_action = Some(hook_ref("rootAction"));
        cache.store(CachedRoute {
            rendered: root,
            loader_data: None,
            error: None,
        });

        let outcome = strategy
            .mutate(EventId(3), &here, &matches, Submission::form([("x", "1")]))
            .await
            .unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.action_data[&RouteId::from("products")], Node::from(1_i64));
        assert!(!outcome.action_data.contains_key(&RouteId::from("root")));
        assert_eq!(root_runs.load(Ordering::SeqCst), 0);

        let ServerPayload::Render(render) = outcome.payload.as_deref().unwrap() else {
            panic!("expected render");
        };
        strategy.commit_mutation(render);
        let fresh = cache.lookup(&RouteId::from("products"), "/products/1").fresh().unwrap();
        assert_eq!(fresh.loader_data, Some(Node::from(1_i64)));
    }

    #[tokio::test]
    async fn test_client_action_calls_server_through_callback() {
        let counter = Arc::new(AtomicI64::new(10));
        let transport = server(&counter);
        let modules = ClientModules::new().client_action(&hook_ref("clientAction"), |args| async move {
            let server = args.server.get().await?;
            Ok(Node::from(format!("client saw {}", server.as_i64().unwrap_or_default())))
        });
        let (strategy, cache) = strategy(transport.clone(), modules);
        let mut render = arbor_wire::RenderedRoute::new(arbor_wire::RouteMeta::from_match(
            &client_matches("/products/1", server_only())[1],
        ));
        render.client_action = Some(hook_ref("clientAction"));
        cache.store(CachedRoute {
            rendered: render,
            loader_data: None,
            error: None,
        });

        let matches = client_matches(
            "/products/1",
            Capabilities {
                has_action: true,
                has_client_action: true,
                ..Capabilities::default()
            },
        );
        let outcome = strategy
            .mutate(EventId(4), &location("/products/1"), &matches, Submission::form([]))
            .await
            .unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.action_data[&RouteId::from("products")], Node::from("client saw 11"));
    }

    #[tokio::test]
    async fn test_loader_error_lands_on_boundary() {
        let counter = Arc::new(AtomicI64::new(0));
        let (strategy, _) = strategy(server(&counter), ClientModules::new());
        let mut matches = match_or_root(&routes(), "/broken", None).matches;
        matches[0].capabilities.has_error_boundary = true;

        let outcome = strategy
            .read(EventId(5), &location("/broken"), &matches, ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, 500);
        assert!(outcome.errors.contains_key(&RouteId::from("root")));
        assert!(!outcome.loader_data.contains_key(&RouteId::from("broken")));
    }

    #[tokio::test]
    async fn test_fetcher_read_and_unsupported_mutation() {
        let counter = Arc::new(AtomicI64::new(2));
        let transport = server(&counter);
        let (strategy, _) = strategy(transport.clone(), ClientModules::new());
        let matches = client_matches("/products/1", server_only());

        let outcome = strategy
            .fetch(EventId(6), &location("/products/1"), &matches[1], None)
            .await
            .unwrap();
        assert!(outcome.reached_server);
        assert_eq!(outcome.result.unwrap(), Node::from(2_i64));

        let error = strategy
            .fetch(EventId(7), &location("/products/1"), &matches[1], Some(Submission::form([])))
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::FetcherUnsupported { .. }));
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_error_prefers_nearest_boundary() {
        let mut matches = match_or_root(&routes(), "/products/1", None).matches;
        let mut errors = BTreeMap::new();
        attach_error(&mut errors, &matches, 1, RouteError::new("first"));
        assert!(errors.contains_key(&RouteId::from("products")));

        matches[0].capabilities.has_error_boundary = true;
        let mut errors = BTreeMap::new();
        attach_error(&mut errors, &matches, 1, RouteError::new("first"));
        attach_error(&mut errors, &matches, 0, RouteError::new("second"));
        assert_eq!(errors[&RouteId::from("root")].message, "first");
    }
}
