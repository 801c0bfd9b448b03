//! The client router.
//!
//! A session owns everything the client knows: the route tree, the route
//! cache, the router state and the history stack. Navigations run one at a
//! time; starting a new one aborts the previous one, whose shared server
//! call and patch bookkeeping are released as its future is dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arbor_core::{RouteError, RouteId, RouteMatch};
use arbor_wire::{CONTENT_TYPE, EncodeOptions, Node, RenderPayload, ServerPayload, ServerReference, encode_to_string};
use futures::future::{AbortHandle, Abortable};
use http::Method;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::RouteCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::hooks::{ClientModules, Submission};
use crate::location::Location;
use crate::patcher::{PatchedPaths, RoutePatcher, RouteTree};
use crate::server_call::{EventId, InFlight};
use crate::strategy::{DataStrategy, ReadOptions};
use crate::transport::{ACTION_HEADER, Transport, TransportRequest};
use crate::view::compose_route_view;

/// What the router currently shows.
#[derive(Debug, Clone)]
pub struct RouterState {
    pub location: Location,
    pub matches: Vec<RouteMatch>,
    pub loader_data: BTreeMap<RouteId, Node>,
    pub action_data: Option<BTreeMap<RouteId, Node>>,
    pub errors: BTreeMap<RouteId, RouteError>,
    pub status: u16,
    /// The navigation that produced this state.
    pub event: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryMode {
    Push,
    Pop,
    Revalidate,
}

enum Step {
    Done(Box<RouterState>),
    Redirect(String),
}

#[derive(Debug)]
struct History {
    entries: Vec<Location>,
    index: usize,
}

impl History {
    fn new(initial: Location) -> Self {
        Self {
            entries: vec![initial],
            index: 0,
        }
    }

    fn push(&mut self, location: Location) {
        self.entries.truncate(self.index.saturating_add(1));
        self.entries.push(location);
        self.index = self.entries.len().saturating_sub(1);
    }

    fn replace(&mut self, location: Location) {
        if let Some(entry) = self.entries.get_mut(self.index) {
            *entry = location;
        }
    }

    fn go(&mut self, delta: isize) -> Option<Location> {
        let target = self.index.checked_add_signed(delta)?;
        let location = self.entries.get(target)?.clone();
        self.index = target;
        Some(location)
    }
}

/// The navigation currently allowed to commit.
struct Pending {
    event: EventId,
    handle: AbortHandle,
    mutation: bool,
}

struct SessionInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: RouteCache,
    tree: RouteTree,
    patcher: RoutePatcher,
    strategy: DataStrategy,
    in_flight: InFlight,
    state: RwLock<RouterState>,
    history: Mutex<History>,
    next_event: AtomicU64,
    latest_navigation: AtomicU64,
    pending: Mutex<Option<Pending>>,
}

/// Builds a [`ClientSession`] from the page the client starts on.
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    modules: ClientModules,
    config: ClientConfig,
}

impl SessionBuilder {
    #[must_use]
    pub fn modules(mut self, modules: ClientModules) -> Self {
        self.modules = modules;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from a decoded render payload, typically the one embedded in
    /// the server-rendered document.
    ///
    /// # Errors
    ///
    /// Anything but a render payload, or a payload whose routes do not form
    /// a tree.
    pub fn hydrate(self, payload: ServerPayload) -> Result<ClientSession> {
        let ServerPayload::Render(render) = payload else {
            return Err(ClientError::unexpected_payload("render", payload.kind()));
        };
        let location = Location::parse(&render.url)?;

        let tree = RouteTree::new(self.config.basename.clone());
        tree.merge(&render)?;
        let cache = RouteCache::new();
        cache.record(&render);
        let patched = PatchedPaths::new();
        patched.insert(location.pathname.clone());

        let matches = tree.match_or_root(&location.pathname).matches;
        let state = RouterState {
            location: location.clone(),
            matches,
            loader_data: render.loader_data.clone(),
            action_data: render.action_data.clone(),
            errors: render.errors.clone().unwrap_or_default(),
            status: render.status,
            event: EventId(0),
        };

        let in_flight = InFlight::new();
        let strategy = DataStrategy::new(Arc::clone(&self.transport), cache.clone(), self.modules, in_flight.clone());
        let patcher = RoutePatcher::new(Arc::clone(&self.transport), tree.clone(), patched);
        info!(url = %location, routes = state.matches.len(), "hydrated client session");

        Ok(ClientSession {
            inner: Arc::new(SessionInner {
                config: self.config,
                transport: self.transport,
                cache,
                tree,
                patcher,
                strategy,
                in_flight,
                state: RwLock::new(state),
                history: Mutex::new(History::new(location)),
                next_event: AtomicU64::new(0),
                latest_navigation: AtomicU64::new(0),
                pending: Mutex::new(None),
            }),
        })
    }

    /// Fetch the payload for `href`, following redirects, and hydrate from it.
    ///
    /// # Errors
    ///
    /// Transport failures, too many redirects, or a non-render final payload.
    pub async fn load(self, href: &str) -> Result<ClientSession> {
        let mut location = Location::parse(href)?;
        for _ in 0..=self.config.max_redirects {
            let response = self.transport.send(TransportRequest::get(location.data_url())).await?;
            match response.payload().await? {
                ServerPayload::Redirect(redirect) => {
                    debug!(from = %location, to = %redirect.location, "initial load redirected");
                    location = location.join(&redirect.location)?;
                }
                payload => return self.hydrate(payload),
            }
        }
        Err(ClientError::TooManyRedirects(self.config.max_redirects))
    }
}

/// A client router session. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ClientSession {
    inner: Arc<SessionInner>,
}

impl ClientSession {
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder {
            transport,
            modules: ClientModules::new(),
            config: ClientConfig::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> RouterState {
        self.inner.state.read().clone()
    }

    #[must_use]
    pub fn cache(&self) -> &RouteCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn tree(&self) -> &RouteTree {
        &self.inner.tree
    }

    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.inner.in_flight
    }

    /// Navigate to `href`, resolved against the current location.
    ///
    /// # Errors
    ///
    /// Transport and decode failures, an unmatched path, too many redirects,
    /// or [`ClientError::Aborted`] when a newer navigation took over.
    pub async fn navigate(&self, href: &str) -> Result<RouterState> {
        let location = self.resolve(href)?;
        self.run(location, None, HistoryMode::Push).await
    }

    /// Submit a form to `href`. A `GET` submission navigates with the body
    /// as the query string.
    ///
    /// # Errors
    ///
    /// As for [`ClientSession::navigate`].
    pub async fn submit(&self, href: &str, submission: Submission) -> Result<RouterState> {
        let mut location = self.resolve(href)?;
        if !submission.is_mutation() {
            location.search = Some(String::from_utf8_lossy(&submission.body).into_owned()).filter(|s| !s.is_empty());
            return self.run(location, None, HistoryMode::Push).await;
        }
        self.run(location, Some(submission), HistoryMode::Push).await
    }

    /// Re-read the current location, ignoring the cache.
    ///
    /// # Errors
    ///
    /// As for [`ClientSession::navigate`].
    pub async fn revalidate(&self) -> Result<RouterState> {
        let location = self.state().location;
        self.run(location, None, HistoryMode::Revalidate).await
    }

    /// Go one history entry back. `None` at the start of history.
    ///
    /// # Errors
    ///
    /// As for [`ClientSession::navigate`].
    pub async fn back(&self) -> Result<Option<RouterState>> {
        self.go(-1).await
    }

    /// Go one history entry forward. `None` at the end of history.
    ///
    /// # Errors
    ///
    /// As for [`ClientSession::navigate`].
    pub async fn forward(&self) -> Result<Option<RouterState>> {
        self.go(1).await
    }

    async fn go(&self, delta: isize) -> Result<Option<RouterState>> {
        let Some(location) = self.inner.history.lock().go(delta) else {
            return Ok(None);
        };
        self.run(location, None, HistoryMode::Pop).await.map(Some)
    }

    /// Abort the pending navigation, if any.
    pub fn abort(&self) -> bool {
        let pending = self.inner.pending.lock().take();
        match pending {
            Some(pending) => {
                self.interrupt(pending);
                true
            }
            None => false,
        }
    }

    /// Load or submit one route's data without navigating.
    ///
    /// A mutating fetch that reached the server outdates the whole cache and
    /// revalidates the current page, unless a navigation is underway.
    ///
    /// # Errors
    ///
    /// The outer error is a failure of the fetch itself; the inner one is
    /// the route's own outcome.
    pub async fn fetch(
        &self,
        route_id: &RouteId,
        href: &str,
        submission: Option<Submission>,
    ) -> Result<std::result::Result<Node, RouteError>> {
        let location = self.resolve(href)?;
        let event = self.next_event();
        let _tracked = self.inner.in_flight.track(event);

        self.patch(&location).await?;
        let matches = self
            .inner
            .tree
            .match_path(&location.pathname)
            .ok_or_else(|| ClientError::NoMatch(location.href()))?;
        let target = matches
            .iter()
            .find(|m| &m.id == route_id)
            .ok_or_else(|| ClientError::UnknownRoute {
                route_id: route_id.clone(),
                url: location.href(),
            })?;

        let mutation = submission.as_ref().is_some_and(Submission::is_mutation);
        let outcome = self.inner.strategy.fetch(event, &location, target, submission).await?;
        if mutation && outcome.reached_server {
            self.inner.cache.invalidate_except(&HashSet::new());
            // A pending navigation reads the outdated cache itself.
            let navigating = self.inner.pending.lock().is_some();
            if navigating {
                debug!(%event, "navigation pending, skipping revalidation");
            } else {
                self.revalidate_quietly().await?;
            }
        }
        Ok(outcome.result)
    }

    /// Call a server function with the current URL and commit the page the
    /// server rendered after it ran.
    ///
    /// # Errors
    ///
    /// The outer error is a failure of the call itself; the inner one is the
    /// function's own result.
    pub async fn call_server(
        &self,
        reference: &ServerReference,
        args: Vec<Node>,
    ) -> Result<std::result::Result<Node, RouteError>> {
        let event = self.next_event();
        let latest = self.inner.latest_navigation.load(Ordering::SeqCst);
        let current = self.state().location;

        let body = encode_to_string(Node::Array(args), EncodeOptions::default()).await?;
        let request = TransportRequest::new(Method::POST, current.data_url())
            .header(ACTION_HEADER, &reference.id)?
            .body(CONTENT_TYPE, body);
        info!(%event, function = %reference.id, url = %current, "calling server function");
        let payload = self.inner.transport.send(request).await?.payload().await?;
        let ServerPayload::Action(action) = payload else {
            return Err(ClientError::unexpected_payload("action", payload.kind()));
        };
        let result = action.result.resolve().await;

        match *action.page {
            ServerPayload::Render(render) => {
                self.inner.tree.merge(&render)?;
                self.inner.cache.learn_hooks(&render);
                if self.inner.latest_navigation.load(Ordering::SeqCst) == latest {
                    self.inner.strategy.commit_mutation(&render);
                    let state = self.state_from_render(&current, &render, None, BTreeMap::new(), event);
                    *self.inner.state.write() = state;
                } else {
                    debug!(%event, "page from server function superseded by a navigation");
                    self.inner.cache.invalidate_except(&HashSet::new());
                }
            }
            ServerPayload::Redirect(redirect) => {
                self.inner.cache.invalidate_except(&HashSet::new());
                self.navigate(&redirect.location).await?;
            }
            other => return Err(ClientError::unexpected_payload("render", other.kind())),
        }
        Ok(result)
    }

    /// The current page: each matched route's last known element nested
    /// into its parent's outlet.
    #[must_use]
    pub fn route_view(&self) -> Node {
        let state = self.state();
        let elements: Vec<_> = state
            .matches
            .iter()
            .filter_map(|m| self.inner.cache.lookup(&m.id, &m.pathname).any())
            .filter_map(|cached| cached.rendered.element)
            .collect();
        compose_route_view(&elements)
    }

    fn resolve(&self, href: &str) -> Result<Location> {
        self.inner.state.read().location.join(href)
    }

    fn next_event(&self) -> EventId {
        EventId(self.inner.next_event.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }

    async fn revalidate_quietly(&self) -> Result<()> {
        match self.revalidate().await {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => {
                debug!(error = %e, "revalidation yielded to a navigation");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn begin_navigation(&self, mutation: bool) -> (EventId, futures::future::AbortRegistration) {
        let event = self.next_event();
        self.inner.latest_navigation.store(event.0, Ordering::SeqCst);
        let (handle, registration) = AbortHandle::new_pair();
        let previous = self.inner.pending.lock().replace(Pending {
            event,
            handle,
            mutation,
        });
        if let Some(previous) = previous {
            debug!(previous = %previous.event, %event, "aborting previous navigation");
            self.interrupt(previous);
        }
        (event, registration)
    }

    /// Abort `pending`. A submission already sent may have changed anything
    /// on the server, so the cache is outdated before the next read plans.
    fn interrupt(&self, pending: Pending) {
        pending.handle.abort();
        let sent = pending.mutation
            && self
                .inner
                .in_flight
                .get(pending.event)
                .is_some_and(|call| call.started());
        if sent {
            let invalidated = self.inner.cache.invalidate_except(&HashSet::new());
            info!(event = %pending.event, invalidated, "submission aborted after reaching the server");
        } else {
            info!(event = %pending.event, "navigation aborted");
        }
    }

    fn end_navigation(&self, event: EventId) {
        let mut pending = self.inner.pending.lock();
        if pending.as_ref().is_some_and(|p| p.event == event) {
            *pending = None;
        }
    }

    async fn run(&self, location: Location, submission: Option<Submission>, mode: HistoryMode) -> Result<RouterState> {
        let (event, registration) = self.begin_navigation(submission.is_some());
        info!(%event, url = %location, ?mode, mutation = submission.is_some(), "navigation started");

        let outcome = Abortable::new(self.drive(event, location, submission, mode), registration).await;
        self.end_navigation(event);
        match outcome {
            Ok(Ok(state)) => {
                info!(%event, url = %state.location, status = state.status, "navigation finished");
                Ok(state)
            }
            Ok(Err(e)) => {
                if !e.is_cancelled() {
                    warn!(%event, error = %e, "navigation failed");
                }
                Err(e)
            }
            Err(_aborted) => Err(ClientError::Aborted(event.0)),
        }
    }

    async fn drive(
        &self,
        event: EventId,
        mut location: Location,
        mut submission: Option<Submission>,
        mode: HistoryMode,
    ) -> Result<RouterState> {
        let max_redirects = self.inner.config.max_redirects;
        for hop in 0..=max_redirects {
            // Each hop has its own shared call.
            let hop_event = if hop == 0 { event } else { self.next_event() };
            let tracked = self.inner.in_flight.track(hop_event);

            let step = match submission.take() {
                Some(submission) => match self.submit_step(event, hop_event, &location, submission).await {
                    Ok(step) => step,
                    Err(e) => {
                        // The server may have applied it.
                        if tracked.reached_server() {
                            let invalidated = self.inner.cache.invalidate_except(&HashSet::new());
                            warn!(%event, invalidated, error = %e, "submission failed after reaching the server");
                        }
                        return Err(e);
                    }
                },
                None => self.read_step(event, hop_event, &location, None, mode == HistoryMode::Revalidate).await?,
            };
            match step {
                Step::Done(state) => {
                    self.ensure_current(event)?;
                    self.commit(&state, mode);
                    return Ok(*state);
                }
                Step::Redirect(target) => {
                    let next = location.join(&target)?;
                    info!(%event, from = %location, to = %next, "following redirect");
                    location = next;
                }
            }
        }
        Err(ClientError::TooManyRedirects(max_redirects))
    }

    fn commit(&self, state: &RouterState, mode: HistoryMode) {
        {
            let mut history = self.inner.history.lock();
            match mode {
                HistoryMode::Push => history.push(state.location.clone()),
                HistoryMode::Pop | HistoryMode::Revalidate => history.replace(state.location.clone()),
            }
        }
        *self.inner.state.write() = state.clone();
    }

    fn ensure_current(&self, event: EventId) -> Result<()> {
        let latest = self.inner.latest_navigation.load(Ordering::SeqCst);
        if latest == event.0 {
            Ok(())
        } else {
            Err(ClientError::Superseded { event: event.0, latest })
        }
    }

    /// Patch the tree for `location`. A render fetched by the patch is
    /// returned so the read can reuse it.
    async fn patch(&self, location: &Location) -> Result<Option<ServerPayload>> {
        let payload = self
            .inner
            .patcher
            .ensure(&location.pathname, location.search.as_deref())
            .await?;
        if let Some(ServerPayload::Render(render)) = &payload {
            self.inner.cache.learn_hooks(render);
        }
        Ok(payload)
    }

    async fn read_step(
        &self,
        navigation: EventId,
        event: EventId,
        location: &Location,
        action_data: Option<BTreeMap<RouteId, Node>>,
        force: bool,
    ) -> Result<Step> {
        let prefetched = match self.patch(location).await? {
            Some(ServerPayload::Redirect(redirect)) => return Ok(Step::Redirect(redirect.location)),
            Some(payload @ ServerPayload::Render(_)) => Some(Arc::new(payload)),
            Some(other) => return Err(ClientError::unexpected_payload("render", other.kind())),
            None => None,
        };

        let matched = self.inner.tree.match_or_root(&location.pathname);
        if matched.matches.is_empty() {
            return Err(ClientError::NoMatch(location.href()));
        }
        let options = ReadOptions {
            current: Some(self.state().location),
            force: force || matched.status == 404,
            prefetched,
        };
        let outcome = self.inner.strategy.read(event, location, &matched.matches, options).await?;

        match outcome.payload.as_deref() {
            Some(ServerPayload::Redirect(redirect)) => return Ok(Step::Redirect(redirect.location.clone())),
            Some(ServerPayload::Render(render)) => {
                self.inner.tree.merge(render)?;
                self.inner.cache.learn_hooks(render);
            }
            Some(other) => return Err(ClientError::unexpected_payload("render", other.kind())),
            None => {}
        }
        if let Some(target) = redirect_target(&outcome.errors) {
            return Ok(Step::Redirect(target));
        }

        self.ensure_current(navigation)?;
        self.inner.strategy.commit_read(&outcome);

        let status = match outcome.payload {
            Some(_) => outcome.status,
            None => outcome
                .errors
                .values()
                .map(|error| error.status)
                .max()
                .unwrap_or(matched.status),
        };
        Ok(Step::Done(Box::new(RouterState {
            location: location.clone(),
            matches: self.inner.tree.match_or_root(&location.pathname).matches,
            loader_data: outcome.loader_data,
            action_data,
            errors: outcome.errors,
            status,
            event: navigation,
        })))
    }

    async fn submit_step(
        &self,
        navigation: EventId,
        event: EventId,
        location: &Location,
        submission: Submission,
    ) -> Result<Step> {
        self.patch(location).await?;
        let matches = self
            .inner
            .tree
            .match_path(&location.pathname)
            .ok_or_else(|| ClientError::NoMatch(location.href()))?;
        let outcome = self.inner.strategy.mutate(event, location, &matches, submission).await?;

        match outcome.payload.as_deref() {
            Some(ServerPayload::Render(render)) => {
                self.ensure_current(navigation)?;
                self.inner.tree.merge(render)?;
                self.inner.cache.learn_hooks(render);
                self.inner.strategy.commit_mutation(render);
                if let Some(target) = redirect_target(&outcome.errors) {
                    return Ok(Step::Redirect(target));
                }
                Ok(Step::Done(Box::new(self.state_from_render(
                    location,
                    render,
                    Some(outcome.action_data),
                    outcome.errors,
                    navigation,
                ))))
            }
            Some(ServerPayload::Redirect(redirect)) => {
                self.inner.cache.invalidate_except(&HashSet::new());
                Ok(Step::Redirect(redirect.location.clone()))
            }
            Some(other) => Err(ClientError::unexpected_payload("render", other.kind())),
            None => {
                // Only client actions ran. The server state may still have
                // changed through them, so the matched routes are re-read.
                if let Some(target) = redirect_target(&outcome.errors) {
                    self.inner.cache.invalidate_except(&HashSet::new());
                    return Ok(Step::Redirect(target));
                }
                self.inner.cache.invalidate(matches.iter().map(|m| &m.id));
                let read_event = self.next_event();
                let _tracked = self.inner.in_flight.track(read_event);
                let step = self
                    .read_step(navigation, read_event, location, Some(outcome.action_data), false)
                    .await?;
                Ok(match step {
                    Step::Done(mut state) => {
                        for (id, error) in outcome.errors {
                            state.errors.entry(id).or_insert(error);
                        }
                        Step::Done(state)
                    }
                    redirect @ Step::Redirect(_) => redirect,
                })
            }
        }
    }

    fn state_from_render(
        &self,
        location: &Location,
        render: &RenderPayload,
        action_data: Option<BTreeMap<RouteId, Node>>,
        client_errors: BTreeMap<RouteId, RouteError>,
        event: EventId,
    ) -> RouterState {
        let mut errors = render.errors.clone().unwrap_or_default();
        for (id, error) in client_errors {
            errors.entry(id).or_insert(error);
        }
        RouterState {
            location: location.clone(),
            matches: self.inner.tree.match_or_root(&location.pathname).matches,
            loader_data: render.loader_data.clone(),
            action_data,
            errors,
            status: render.status,
            event,
        }
    }
}

/// A redirect raised through a route hook: a response error in the 3xx
/// range carrying a `location`.
fn redirect_target(errors: &BTreeMap<RouteId, RouteError>) -> Option<String> {
    errors
        .values()
        .filter(|error| error.is_response && (300..400).contains(&error.status))
        .find_map(|error| error.data.as_ref()?.get("location")?.as_str().map(str::to_string))
}
