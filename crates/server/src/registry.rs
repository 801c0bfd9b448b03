//! Route tree plus the modules behind it.
//!
//! Modules may be registered eagerly or as async factories. Resolution is
//! memoized with moka, so a factory runs at most once per route even when
//! concurrent requests resolve the same route.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use arbor_core::{RouteDescriptor, RouteId, validate_route_ids};
use futures::future::{BoxFuture, FutureExt};
use moka::future::Cache;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::module::RouteModule;

pub type ModuleFactory = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<RouteModule, String>> + Send + Sync>;

#[derive(Clone)]
enum ModuleSource {
    Ready(Arc<RouteModule>),
    Lazy(ModuleFactory),
}

/// Route tree and module lookup.
#[derive(Clone)]
pub struct ModuleRegistry {
    routes: Arc<Vec<RouteDescriptor>>,
    sources: Arc<HashMap<RouteId, ModuleSource>>,
    resolved: Cache<RouteId, Arc<RouteModule>>,
}

/// Collects routes and modules for a [`ModuleRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    routes: Vec<RouteDescriptor>,
    sources: HashMap<RouteId, ModuleSource>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = RouteDescriptor>) -> Self {
        self.routes.extend(routes);
        self
    }

    #[must_use]
    pub fn module(mut self, id: impl Into<RouteId>, module: RouteModule) -> Self {
        self.sources.insert(id.into(), ModuleSource::Ready(Arc::new(module)));
        self
    }

    /// Register a module that is loaded on first use.
    #[must_use]
    pub fn lazy_module<F, Fut>(mut self, id: impl Into<RouteId>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<RouteModule, String>> + Send + 'static,
    {
        let factory: ModuleFactory = Arc::new(move || factory().boxed());
        self.sources.insert(id.into(), ModuleSource::Lazy(factory));
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Fails if the tree is empty, has duplicate ids, or names a route with
    /// no registered module.
    pub fn build(self, cache_capacity: u64) -> Result<ModuleRegistry> {
        if self.routes.is_empty() {
            return Err(ServerError::NoRoutes);
        }
        validate_route_ids(&self.routes)?;
        if let Some(missing) = first_without_module(&self.routes, &self.sources) {
            return Err(ServerError::MissingModule(missing.clone()));
        }

        Ok(ModuleRegistry {
            routes: Arc::new(self.routes),
            sources: Arc::new(self.sources),
            resolved: Cache::builder().max_capacity(cache_capacity).build(),
        })
    }
}

fn first_without_module<'a>(
    routes: &'a [RouteDescriptor],
    sources: &HashMap<RouteId, ModuleSource>,
) -> Option<&'a RouteId> {
    routes.iter().find_map(|route| {
        if sources.contains_key(&route.id) {
            first_without_module(&route.children, sources)
        } else {
            Some(&route.id)
        }
    })
}

impl ModuleRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    #[must_use]
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// Resolve the module for `id`. Idempotent; factories run once.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::MissingModule`] for an unknown id and
    /// [`ServerError::Module`] if the factory fails.
    pub async fn resolve(&self, id: &RouteId) -> Result<Arc<RouteModule>> {
        let source = self
            .sources
            .get(id)
            .ok_or_else(|| ServerError::MissingModule(id.clone()))?;

        match source {
            ModuleSource::Ready(module) => Ok(Arc::clone(module)),
            ModuleSource::Lazy(factory) => {
                let factory = Arc::clone(factory);
                let route_id = id.clone();
                self.resolved
                    .try_get_with(id.clone(), async move {
                        debug!(route_id = %route_id, "loading route module");
                        factory().await.map(Arc::new)
                    })
                    .await
                    .map_err(|reason| ServerError::module(id.clone(), reason.as_str()))
            }
        }
    }
}
