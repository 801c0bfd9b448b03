//! Lazily growing client route tree.
//!
//! The client starts out knowing only the routes of the page it hydrated. The
//! first navigation to any other path fetches that path's payload and grafts
//! the matched route chain onto the tree before matching.

use std::collections::HashSet;
use std::sync::Arc;

use arbor_core::{Matched, RouteDescriptor, RouteMatch, insert_route, match_or_root, match_routes};
use arbor_wire::{RenderPayload, ServerPayload};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::location::data_url;
use crate::transport::{Transport, TransportRequest};

/// Paths whose route chain the client has requested.
///
/// A path is inserted before its patch is fetched so concurrent navigations
/// do not fetch it twice, and removed again if the fetch fails or is
/// abandoned.
#[derive(Debug, Clone, Default)]
pub struct PatchedPaths {
    paths: Arc<Mutex<HashSet<String>>>,
}

impl PatchedPaths {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the path was not present.
    pub fn insert(&self, pathname: impl Into<String>) -> bool {
        self.paths.lock().insert(pathname.into())
    }

    pub fn remove(&self, pathname: &str) -> bool {
        self.paths.lock().remove(pathname)
    }

    #[must_use]
    pub fn contains(&self, pathname: &str) -> bool {
        self.paths.lock().contains(pathname)
    }
}

/// The client's copy of the route tree.
#[derive(Debug, Clone, Default)]
pub struct RouteTree {
    routes: Arc<RwLock<Vec<RouteDescriptor>>>,
    basename: Option<String>,
}

impl RouteTree {
    #[must_use]
    pub fn new(basename: Option<String>) -> Self {
        Self {
            routes: Arc::default(),
            basename,
        }
    }

    /// Graft the payload's matched chain onto the tree, root-most first so
    /// every route finds its parent. Returns how many routes were new.
    ///
    /// # Errors
    ///
    /// Fails if a route names a parent that is neither in the tree nor
    /// earlier in the chain.
    pub fn merge(&self, render: &RenderPayload) -> Result<usize> {
        let mut routes = self.routes.write();
        let mut added: usize = 0;
        for route in render.matched_routes() {
            if insert_route(&mut routes, route.meta.descriptor())? {
                debug!(route_id = %route.id(), "patched route into client tree");
                added = added.saturating_add(1);
            }
        }
        Ok(added)
    }

    #[must_use]
    pub fn match_path(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        match_routes(&self.routes.read(), pathname, self.basename.as_deref())
    }

    #[must_use]
    pub fn match_or_root(&self, pathname: &str) -> Matched {
        match_or_root(&self.routes.read(), pathname, self.basename.as_deref())
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<RouteDescriptor> {
        self.routes.read().clone()
    }
}

/// Fetches and merges route patches for unvisited paths.
#[derive(Clone)]
pub struct RoutePatcher {
    transport: Arc<dyn Transport>,
    tree: RouteTree,
    patched: PatchedPaths,
}

impl RoutePatcher {
    pub fn new(transport: Arc<dyn Transport>, tree: RouteTree, patched: PatchedPaths) -> Self {
        Self {
            transport,
            tree,
            patched,
        }
    }

    #[must_use]
    pub const fn patched(&self) -> &PatchedPaths {
        &self.patched
    }

    /// Make sure the tree knows the route chain for `pathname`.
    ///
    /// Returns `None` if the path was patched before. Otherwise returns the
    /// payload fetched for it (already merged when it is a render), which the
    /// caller may use instead of fetching the same URL again.
    ///
    /// # Errors
    ///
    /// Fetch, decode and merge failures. The path is forgotten so the next
    /// navigation retries.
    pub async fn ensure(&self, pathname: &str, search: Option<&str>) -> Result<Option<ServerPayload>> {
        if !self.patched.insert(pathname) {
            return Ok(None);
        }

        let mut pending = PendingPatch {
            patched: &self.patched,
            pathname,
            settled: false,
        };
        info!(pathname, "fetching route patch");
        let payload = self.fetch_and_merge(pathname, search).await.inspect_err(|e| {
            warn!(pathname, error = %e, "route patch failed, will retry on next visit");
        })?;
        pending.settled = true;
        Ok(Some(payload))
    }

    async fn fetch_and_merge(&self, pathname: &str, search: Option<&str>) -> Result<ServerPayload> {
        let request = TransportRequest::get(data_url(pathname, search));
        let payload = self.transport.send(request).await?.payload().await?;
        if let ServerPayload::Render(render) = &payload {
            self.tree.merge(render)?;
        }
        Ok(payload)
    }
}

/// Forgets an unsettled path on drop, including when the navigation that
/// started the patch is aborted mid-fetch.
struct PendingPatch<'a> {
    patched: &'a PatchedPaths,
    pathname: &'a str,
    settled: bool,
}

impl Drop for PendingPatch<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.patched.remove(self.pathname);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use arbor_core::RouteId;
    use arbor_server::{App, RouteModule};
    use arbor_wire::Node;
    use async_trait::async_trait;

    use super::*;
    use crate::error::ClientError;
    use crate::transport::{TowerTransport, TransportResponse};

    struct Flaky {
        inner: TowerTransport<axum::Router>,
        failures_left: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Flaky {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ClientError::transport("connection reset"));
            }
            self.inner.send(request).await
        }
    }

    fn flaky(failures: usize) -> Arc<Flaky> {
        let app = App::builder()
            .routes([RouteDescriptor::new("root").with_path("/").with_children([
                RouteDescriptor::new("shop").with_path("shop").with_children([
                    RouteDescriptor::new("item").with_path(":id"),
                ]),
            ])])
            .module("root", RouteModule::new())
            .module("shop", RouteModule::new())
            .module("item", RouteModule::new().loader(|_| async { Ok(Node::Null) }))
            .build()
            .unwrap();
        Arc::new(Flaky {
            inner: TowerTransport::new(app.router()),
            failures_left: AtomicUsize::new(failures),
            sent: AtomicUsize::new(0),
        })
    }

    fn root_only() -> RouteTree {
        let tree = RouteTree::new(None);
        tree.routes.write().push(RouteDescriptor::new("root").with_path("/"));
        tree
    }

    #[tokio::test]
    async fn test_patch_grafts_chain_under_known_parent() {
        let transport = flaky(0);
        let tree = root_only();
        let patcher = RoutePatcher::new(transport.clone(), tree.clone(), PatchedPaths::new());
        assert!(tree.match_path("/shop/7").is_none());

        let payload = patcher.ensure("/shop/7", None).await.unwrap();
        assert!(matches!(payload, Some(ServerPayload::Render(_))));

        let matches = tree.match_path("/shop/7").unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["root", "shop", "item"]);
        assert!(matches[2].capabilities.has_loader);

        // Patched paths are not fetched again.
        assert!(patcher.ensure("/shop/7", None).await.unwrap().is_none());
        assert_eq!(transport.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_patch_is_retried() {
        let transport = flaky(1);
        let patcher = RoutePatcher::new(transport.clone(), root_only(), PatchedPaths::new());

        assert!(patcher.ensure("/shop/7", None).await.is_err());
        assert!(!patcher.patched().contains("/shop/7"));

        assert!(patcher.ensure("/shop/7", None).await.unwrap().is_some());
        assert!(patcher.patched().contains("/shop/7"));
        assert_eq!(transport.sent.load(Ordering::SeqCst), 2);
    }

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_patch_is_forgotten() {
        let patcher = RoutePatcher::new(Arc::new(Stalled), root_only(), PatchedPaths::new());
        let attempt = tokio::time::timeout(std::time::Duration::from_millis(20), patcher.ensure("/shop/7", None)).await;
        assert!(attempt.is_err());
        assert!(!patcher.patched().contains("/shop/7"));
    }

    #[test]
    fn test_merge_rejects_orphans() {
        let tree = RouteTree::new(None);
        let mut render = RenderPayload {
            matches: vec![RouteId::from("item")],
            rendered: std::collections::BTreeMap::new(),
            loader_data: std::collections::BTreeMap::new(),
            action_data: None,
            errors: None,
            manifest: arbor_wire::AssetsManifest::default(),
            status: 200,
            url: "/shop/7".into(),
        };
        let mut meta = arbor_wire::RouteMeta::from_match(&match_or_root(
            &[RouteDescriptor::new("item").with_path("/shop/:id")],
            "/shop/7",
            None,
        )
        .matches[0]);
        meta.parent_id = Some(RouteId::from("shop"));
        render
            .rendered
            .insert(RouteId::from("item"), arbor_wire::RenderedRoute::new(meta));

        assert!(matches!(tree.merge(&render), Err(ClientError::Route(_))));
    }
}
