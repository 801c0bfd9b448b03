//! Last known output of each route, per pathname.
//!
//! Entries are keyed by `(route id, pathname)` where the pathname is the part
//! of the URL the route consumed, so a layout shared by `/products/1` and
//! `/products/2` has one entry. Entries are never removed. A stale entry is
//! marked outdated and stays visible to the view until a fresh copy replaces
//! it in place.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_core::{RouteError, RouteId};
use arbor_wire::{ClientReference, Node, RenderPayload, RenderedRoute};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::{debug, trace};

/// What the cache knows about one route at one pathname.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRoute {
    pub rendered: RenderedRoute,
    pub loader_data: Option<Node>,
    /// The error this route's boundary rendered, if any.
    pub error: Option<RouteError>,
}

impl CachedRoute {
    /// Lift route `id` out of a decoded render payload.
    #[must_use]
    pub fn from_payload(render: &RenderPayload, id: &RouteId) -> Option<Self> {
        let rendered = render.rendered.get(id)?.clone();
        Some(Self {
            rendered,
            loader_data: render.loader_data.get(id).cloned(),
            error: render.errors.as_ref().and_then(|errors| errors.get(id).cloned()),
        })
    }
}

#[derive(Debug)]
struct EntryState {
    route: CachedRoute,
    outdated: bool,
}

/// A cache slot. Refreshing updates it in place, so holders of the `Arc`
/// see the new value.
#[derive(Debug)]
pub struct CacheEntry {
    route_id: RouteId,
    pathname: String,
    state: RwLock<EntryState>,
}

impl CacheEntry {
    #[must_use]
    pub fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    #[must_use]
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    #[must_use]
    pub fn route(&self) -> CachedRoute {
        self.state.read().route.clone()
    }

    #[must_use]
    pub fn is_outdated(&self) -> bool {
        self.state.read().outdated
    }

    fn refresh(&self, route: CachedRoute) {
        let mut state = self.state.write();
        state.outdated = route.error.is_some();
        state.route = route;
    }

    /// Returns `true` if the entry was fresh before.
    fn mark_outdated(&self) -> bool {
        let mut state = self.state.write();
        !std::mem::replace(&mut state.outdated, true)
    }
}

/// Result of [`RouteCache::lookup`].
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Fresh(Arc<CacheEntry>),
    /// Known but stale: usable for display, never as navigation data.
    Outdated(Arc<CacheEntry>),
    Miss,
}

impl CacheLookup {
    /// The cached route if it may satisfy a navigation.
    #[must_use]
    pub fn fresh(&self) -> Option<CachedRoute> {
        match self {
            Self::Fresh(entry) => Some(entry.route()),
            Self::Outdated(_) | Self::Miss => None,
        }
    }

    /// The cached route regardless of staleness.
    #[must_use]
    pub fn any(&self) -> Option<CachedRoute> {
        match self {
            Self::Fresh(entry) | Self::Outdated(entry) => Some(entry.route()),
            Self::Miss => None,
        }
    }
}

/// Client hook references a route declared, learned from rendered routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteHooks {
    pub client_loader: Option<ClientReference>,
    pub client_action: Option<ClientReference>,
    pub should_revalidate: Option<ClientReference>,
}

impl RouteHooks {
    fn of(rendered: &RenderedRoute) -> Self {
        Self {
            client_loader: rendered.client_loader.clone(),
            client_action: rendered.client_action.clone(),
            should_revalidate: rendered.should_revalidate.clone(),
        }
    }
}

pub type CacheKey = (RouteId, String);

/// Route cache shared by every navigation and fetcher of a session.
#[derive(Debug, Clone, Default)]
pub struct RouteCache {
    entries: Arc<DashMap<CacheKey, Arc<CacheEntry>>>,
    hooks: Arc<DashMap<RouteId, RouteHooks>>,
}

impl RouteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh one route. A route that rendered an error is
    /// stored outdated: shown until replaced, never reused.
    pub fn store(&self, route: CachedRoute) -> Arc<CacheEntry> {
        let id = route.rendered.meta.id.clone();
        let pathname = route.rendered.meta.pathname.clone();
        self.hooks.insert(id.clone(), RouteHooks::of(&route.rendered));

        // One shard lock covers the lookup and the write.
        match self.entries.entry((id.clone(), pathname.clone())) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                entry.refresh(route);
                trace!(route_id = %id, pathname, "refreshed cache entry");
                entry
            }
            Entry::Vacant(vacant) => {
                let entry = Arc::new(CacheEntry {
                    route_id: id.clone(),
                    pathname: pathname.clone(),
                    state: RwLock::new(EntryState {
                        outdated: route.error.is_some(),
                        route,
                    }),
                });
                vacant.insert(Arc::clone(&entry));
                trace!(route_id = %id, pathname, "inserted cache entry");
                entry
            }
        }
    }

    /// Insert or refresh every matched route of a render payload. Returns the
    /// keys written.
    pub fn record(&self, render: &RenderPayload) -> Vec<CacheKey> {
        let keys: Vec<CacheKey> = render
            .matches
            .iter()
            .filter_map(|id| CachedRoute::from_payload(render, id))
            .map(|route| {
                let entry = self.store(route);
                (entry.route_id.clone(), entry.pathname.clone())
            })
            .collect();
        debug!(url = %render.url, routes = keys.len(), "recorded render payload");
        keys
    }

    /// Learn the hook references of a payload's routes without caching
    /// their output.
    pub fn learn_hooks(&self, render: &RenderPayload) {
        for route in render.matched_routes() {
            self.hooks.insert(route.id().clone(), RouteHooks::of(route));
        }
    }

    /// Mark every entry for the given routes outdated, at any pathname.
    /// Returns how many entries went stale.
    pub fn invalidate<'a>(&self, route_ids: impl IntoIterator<Item = &'a RouteId>) -> usize {
        let ids: HashSet<&RouteId> = route_ids.into_iter().collect();
        let count = self
            .entries
            .iter()
            .filter(|entry| ids.contains(&entry.key().0))
            .filter(|entry| entry.value().mark_outdated())
            .count();
        debug!(routes = ids.len(), invalidated = count, "invalidated routes");
        count
    }

    /// Mark every entry not in `keep` outdated.
    pub fn invalidate_except(&self, keep: &HashSet<CacheKey>) -> usize {
        let count = self
            .entries
            .iter()
            .filter(|entry| !keep.contains(entry.key()))
            .filter(|entry| entry.value().mark_outdated())
            .count();
        debug!(kept = keep.len(), invalidated = count, "invalidated cache outside keep set");
        count
    }

    #[must_use]
    pub fn lookup(&self, route_id: &RouteId, pathname: &str) -> CacheLookup {
        let key = (route_id.clone(), pathname.to_string());
        match self.entries.get(&key) {
            Some(entry) if entry.is_outdated() => CacheLookup::Outdated(Arc::clone(entry.value())),
            Some(entry) => CacheLookup::Fresh(Arc::clone(entry.value())),
            None => CacheLookup::Miss,
        }
    }

    #[must_use]
    pub fn hooks(&self, route_id: &RouteId) -> RouteHooks {
        self.hooks
            .get(route_id)
            .map(|hooks| hooks.value().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use std::collections::BTreeMap;

    use arbor_core::{RouteDescriptor, match_or_root};
    use arbor_wire::{AssetsManifest, RouteMeta};

    use super::*;

    fn render(pathname: &str, value: i64) -> RenderPayload {
        let routes = vec![
            RouteDescriptor::new("root")
                .with_path("/")
                .with_children([RouteDescriptor::new("products").with_path("products/:id")]),
        ];
        let matched = match_or_root(&routes, pathname, None);
        let rendered: BTreeMap<RouteId, RenderedRoute> = matched
            .matches
            .iter()
            .map(|m| (m.id.clone(), RenderedRoute::new(RouteMeta::from_match(m))))
            .collect();
        RenderPayload {
            matches: matched.matches.iter().map(|m| m.id.clone()).collect(),
            loader_data: rendered.keys().map(|id| (id.clone(), Node::from(value))).collect(),
            rendered,
            action_data: None,
            errors: None,
            manifest: AssetsManifest::default(),
            status: matched.status,
            url: pathname.to_string(),
        }
    }

    fn products() -> RouteId {
        RouteId::from("products")
    }

    #[test]
    fn test_record_and_lookup() {
        let cache = RouteCache::new();
        let keys = cache.record(&render("/products/1", 1));
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&(RouteId::from("root"), "/".to_string())));

        let cached = cache.lookup(&products(), "/products/1").fresh().unwrap();
        assert_eq!(cached.loader_data, Some(Node::from(1_i64)));
        assert!(matches!(cache.lookup(&products(), "/products/2"), CacheLookup::Miss));
    }

    #[test]
    fn test_refresh_keeps_entry_identity_and_clears_outdated() {
        let cache = RouteCache::new();
        cache.record(&render("/products/1", 1));
        let CacheLookup::Fresh(held) = cache.lookup(&products(), "/products/1") else {
            panic!("expected a fresh entry");
        };

        assert_eq!(cache.invalidate([&products()]), 1);
        assert!(held.is_outdated());
        assert!(cache.lookup(&products(), "/products/1").fresh().is_none());

        cache.record(&render("/products/1", 2));
        assert!(!held.is_outdated());
        assert_eq!(held.route().loader_data, Some(Node::from(2_i64)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_except_keeps_current_matches() {
        let cache = RouteCache::new();
        cache.record(&render("/products/1", 1));
        let keep: HashSet<CacheKey> = cache.record(&render("/products/2", 2)).into_iter().collect();

        assert_eq!(cache.invalidate_except(&keep), 1);
        assert!(matches!(cache.lookup(&products(), "/products/1"), CacheLookup::Outdated(_)));
        assert!(cache.lookup(&products(), "/products/2").fresh().is_some());
        assert!(cache.lookup(&RouteId::from("root"), "/").fresh().is_some());
        // Already stale entries are not counted twice.
        assert_eq!(cache.invalidate_except(&keep), 0);
    }

    #[test]
    fn test_concurrent_stores_share_one_entry() {
        let cache = RouteCache::new();
        let stored: Vec<Arc<CacheEntry>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8_i64)
                .map(|value| {
                    let cache = cache.clone();
                    scope.spawn(move || {
                        let payload = render("/products/1", value);
                        let route = CachedRoute::from_payload(&payload, &products()).unwrap();
                        cache.store(route)
                    })
                })
                .collect();
            workers.into_iter().map(|worker| worker.join().unwrap()).collect()
        });

        let CacheLookup::Fresh(entry) = cache.lookup(&products(), "/products/1") else {
            panic!("expected a fresh entry");
        };
        assert!(stored.iter().all(|each| Arc::ptr_eq(each, &entry)));
        assert_eq!(cache.len(), 1);
        let value = entry.route().loader_data.unwrap().as_i64().unwrap();
        assert!((0..8).contains(&value));

        // A later store always lands in the same entry.
        let payload = render("/products/1", 42);
        cache.store(CachedRoute::from_payload(&payload, &products()).unwrap());
        assert_eq!(entry.route().loader_data, Some(Node::from(42_i64)));
    }

    #[test]
    fn test_error_entries_are_never_fresh() {
        let cache = RouteCache::new();
        let mut payload = render("/products/9", 0);
        payload.errors = Some(BTreeMap::from([(RouteId::from("root"), RouteError::response(404, "no product"))]));
        cache.record(&payload);

        let lookup = cache.lookup(&RouteId::from("root"), "/");
        assert!(lookup.fresh().is_none());
        assert_eq!(lookup.any().unwrap().error.unwrap().status, 404);

        cache.record(&render("/products/1", 1));
        assert!(cache.lookup(&RouteId::from("root"), "/").fresh().is_some());
    }

    #[test]
    fn test_outdated_entry_still_visible_for_display() {
        let cache = RouteCache::new();
        cache.record(&render("/products/1", 1));
        cache.invalidate([&products()]);
        let lookup = cache.lookup(&products(), "/products/1");
        assert!(lookup.fresh().is_none());
        assert!(lookup.any().is_some());
    }
}
