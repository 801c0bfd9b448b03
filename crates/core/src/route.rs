//! Static route tree: descriptors, ids and capability flags.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Stable route identifier, shared by server and client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RouteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RouteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for RouteId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Resolved path parameters (`:id` -> `42`, `*` -> rest of the path).
pub type Params = BTreeMap<String, String>;

/// What a route module is able to do.
///
/// Computed once when the module is resolved and carried on every rendered
/// route, so the client dispatches on flags instead of probing modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub has_loader: bool,
    pub has_action: bool,
    pub has_client_loader: bool,
    pub has_client_action: bool,
    pub has_error_boundary: bool,
    pub has_should_revalidate: bool,
}

impl Capabilities {
    /// Union of two flag sets. Flags are only ever added at runtime.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            has_loader: self.has_loader || other.has_loader,
            has_action: self.has_action || other.has_action,
            has_client_loader: self.has_client_loader || other.has_client_loader,
            has_client_action: self.has_client_action || other.has_client_action,
            has_error_boundary: self.has_error_boundary || other.has_error_boundary,
            has_should_revalidate: self.has_should_revalidate || other.has_should_revalidate,
        }
    }

    /// Whether a read of this route produces any data at all.
    #[must_use]
    pub const fn loads_data(&self) -> bool {
        self.has_loader || self.has_client_loader
    }
}

/// A node of the static route tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteDescriptor>,
}

impl RouteDescriptor {
    pub fn new(id: impl Into<RouteId>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            path: None,
            index: false,
            case_sensitive: false,
            capabilities: Capabilities::default(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn index(mut self) -> Self {
        self.index = true;
        self
    }

    #[must_use]
    pub const fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Attach children, rewriting their `parent_id` to this route.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children = children
            .into_iter()
            .map(|mut child| {
                child.parent_id = Some(self.id.clone());
                child
            })
            .collect();
        self
    }

    /// Copy of this node without its subtree.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            children: Vec::new(),
            ..self.clone()
        }
    }

    /// Path segments of this route relative to its parent.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .as_deref()
            .unwrap_or_default()
            .split('/')
            .filter(|segment| !segment.is_empty())
    }
}

/// Depth-first lookup of a route by id.
#[must_use]
pub fn find_route<'a>(routes: &'a [RouteDescriptor], id: &str) -> Option<&'a RouteDescriptor> {
    routes.iter().find_map(|route| {
        if route.id.as_str() == id {
            Some(route)
        } else {
            find_route(&route.children, id)
        }
    })
}

fn find_route_mut<'a>(
    routes: &'a mut [RouteDescriptor],
    id: &str,
) -> Option<&'a mut RouteDescriptor> {
    for route in routes.iter_mut() {
        if route.id.as_str() == id {
            return Some(route);
        }
        if let Some(found) = find_route_mut(&mut route.children, id) {
            return Some(found);
        }
    }
    None
}

/// Insert `route` (without children) under its `parent_id`, or at the top level.
///
/// A route that already exists keeps its place in the tree; only its
/// capability flags are widened. Returns `true` if the route was new.
///
/// # Errors
///
/// Returns [`Error::UnknownParent`] if `parent_id` names a route that is not
/// in the tree.
pub fn insert_route(routes: &mut Vec<RouteDescriptor>, route: RouteDescriptor) -> Result<bool> {
    if let Some(existing) = find_route_mut(routes, route.id.as_str()) {
        existing.capabilities = existing.capabilities.merge(route.capabilities);
        return Ok(false);
    }

    let route = route.detached();
    match route.parent_id.clone() {
        None => routes.push(route),
        Some(parent) => {
            let anchor = find_route_mut(routes, parent.as_str())
                .ok_or_else(|| Error::unknown_parent(parent.clone(), route.id.clone()))?;
            anchor.children.push(route);
        }
    }
    Ok(true)
}

/// Check that every id in the tree is unique.
///
/// # Errors
///
/// Returns [`Error::DuplicateRouteId`] naming the first repeated id.
pub fn validate_route_ids(routes: &[RouteDescriptor]) -> Result<()> {
    fn walk<'a>(routes: &'a [RouteDescriptor], seen: &mut HashSet<&'a str>) -> Result<()> {
        routes.iter().try_for_each(|route| {
            if seen.insert(route.id.as_str()) {
                walk(&route.children, seen)
            } else {
                Err(Error::DuplicateRouteId(route.id.clone()))
            }
        })
    }

    walk(routes, &mut HashSet::new())
}
