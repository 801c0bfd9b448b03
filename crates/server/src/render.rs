//! Turns query results into rendered routes and the assets manifest.

use std::collections::BTreeMap;

use arbor_core::{RouteError, RouteId};
use arbor_wire::{AssetsManifest, Element, ManifestRoute, Node, RenderedRoute, RouteElement, RouteMeta};

use crate::config::ServerConfig;
use crate::module::{ComponentProps, ErrorProps, MatchData, RouteModule};
use crate::query::{QueryContext, ResolvedMatch};

/// Build the UI fragment for one route.
///
/// A route with a recorded error and an error boundary renders the boundary;
/// anything else renders its component, or an outlet when it has none. The
/// layout, if any, wraps either.
#[must_use]
pub fn compose_route_element(
    module: &RouteModule,
    props: &ComponentProps,
    error: Option<&RouteError>,
) -> RouteElement {
    let wrap = |node: Node| match &module.layout {
        Some(layout) => layout(node),
        None => node,
    };

    if let (Some(error), Some(boundary)) = (error, &module.error_boundary) {
        let boundary = boundary(&ErrorProps {
            error: error.clone(),
            params: props.params.clone(),
        });
        return RouteElement::Error(wrap(boundary));
    }

    let body = match &module.component {
        Some(component) => component(props),
        None => Element::outlet().into(),
    };
    RouteElement::Normal(wrap(body))
}

/// One rendered route per match, keyed by id.
#[must_use]
pub fn render_routes(matches: &[ResolvedMatch], context: &QueryContext) -> BTreeMap<RouteId, RenderedRoute> {
    let summaries: Vec<MatchData> = matches
        .iter()
        .map(|m| MatchData {
            id: m.route.id.clone(),
            pathname: m.route.pathname.clone(),
            params: m.route.params.clone(),
            data: context.loader_data.get(&m.route.id).cloned().unwrap_or_default(),
        })
        .collect();

    matches
        .iter()
        .map(|m| {
            let id = &m.route.id;
            let props = ComponentProps {
                params: m.route.params.clone(),
                loader_data: context.loader_data.get(id).cloned().unwrap_or_default(),
                action_data: context.action_data.as_ref().and_then(|data| data.get(id).cloned()),
                matches: summaries.clone(),
            };
            let error = context.errors.as_ref().and_then(|errors| errors.get(id));
            let module = &m.module;

            let mut rendered = RenderedRoute::new(RouteMeta::from_match(&m.route));
            rendered.element = Some(compose_route_element(module, &props, error));
            rendered.hydrate_fallback = module.hydrate_fallback.as_ref().map(|f| f(&m.route.params));
            rendered.client_loader.clone_from(&module.client_loader);
            rendered.client_action.clone_from(&module.client_action);
            rendered.should_revalidate.clone_from(&module.should_revalidate);
            (id.clone(), rendered)
        })
        .collect()
}

/// Manifest entries for the matched routes.
#[must_use]
pub fn build_manifest(matches: &[ResolvedMatch], config: &ServerConfig) -> AssetsManifest {
    let mut manifest = config.manifest();
    let entry = config.entry_module();
    manifest.routes = matches
        .iter()
        .map(|m| {
            let imports = if m.module.imports.is_empty() {
                config.assets.clone()
            } else {
                m.module.imports.clone()
            };
            let route = ManifestRoute {
                id: m.route.id.clone(),
                parent_id: m.route.parent_id.clone(),
                path: m.route.path.clone(),
                index: m.route.index,
                case_sensitive: m.route.case_sensitive,
                module: entry.clone(),
                imports,
                capabilities: m.route.capabilities,
            };
            (m.route.id.clone(), route)
        })
        .collect();
    manifest
}
