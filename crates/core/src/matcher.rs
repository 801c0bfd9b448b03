//! Path matching against the route tree.
//!
//! The tree is flattened into branches (root-to-leaf chains), each branch is
//! ranked by the specificity of its joined pattern, and the first branch that
//! consumes the whole pathname wins. Static segments outrank dynamic ones,
//! dynamic outrank splats, and index routes outrank their layout parent.

use itertools::Itertools;

use crate::route::{Capabilities, Params, RouteDescriptor, RouteId};

const STATIC_SEGMENT: i64 = 10;
const DYNAMIC_SEGMENT: i64 = 3;
const EMPTY_SEGMENT: i64 = 1;
const INDEX_BONUS: i64 = 2;
const SPLAT_PENALTY: i64 = -2;

/// One matched route with its resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub id: RouteId,
    pub parent_id: Option<RouteId>,
    pub path: Option<String>,
    pub index: bool,
    pub case_sensitive: bool,
    pub capabilities: Capabilities,
    /// Parameters resolved up to and including this route.
    pub params: Params,
    /// The portion of the pathname this route (and its ancestors) consumed.
    pub pathname: String,
}

impl RouteMatch {
    fn new(route: &RouteDescriptor, params: Params, pathname: String) -> Self {
        Self {
            id: route.id.clone(),
            parent_id: route.parent_id.clone(),
            path: route.path.clone(),
            index: route.index,
            case_sensitive: route.case_sensitive,
            capabilities: route.capabilities,
            params,
            pathname,
        }
    }
}

/// Result of [`match_or_root`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    /// Ordered root to leaf.
    pub matches: Vec<RouteMatch>,
    /// 200 for a real match, 404 for the synthetic root match.
    pub status: u16,
}

struct Branch<'a> {
    score: i64,
    chain: Vec<&'a RouteDescriptor>,
}

fn flatten<'a>(
    routes: &'a [RouteDescriptor],
    parents: &[&'a RouteDescriptor],
    out: &mut Vec<Branch<'a>>,
) {
    for route in routes {
        let mut chain = parents.to_vec();
        chain.push(route);

        if !route.children.is_empty() {
            flatten(&route.children, &chain, out);
        }

        // Pathless layouts only match through their children.
        if route.path.is_none() && !route.index {
            continue;
        }

        let segments: Vec<&str> = chain
            .iter()
            .copied()
            .flat_map(RouteDescriptor::segments)
            .collect();
        out.push(Branch {
            score: score(&segments, route.index),
            chain,
        });
    }
}

fn score(segments: &[&str], index: bool) -> i64 {
    // Mirrors splitting "/a/b" on '/', which yields a leading empty segment.
    let parts: Vec<&str> = if segments.is_empty() {
        vec!["", ""]
    } else {
        std::iter::once("").chain(segments.iter().copied()).collect()
    };

    let mut total = i64::try_from(parts.len()).unwrap_or(i64::MAX);
    if parts.iter().any(|s| *s == "*") {
        total = total.saturating_add(SPLAT_PENALTY);
    }
    if index {
        total = total.saturating_add(INDEX_BONUS);
    }

    parts
        .iter()
        .filter(|s| **s != "*")
        .map(|s| {
            if s.starts_with(':') {
                DYNAMIC_SEGMENT
            } else if s.is_empty() {
                EMPTY_SEGMENT
            } else {
                STATIC_SEGMENT
            }
        })
        .fold(total, i64::saturating_add)
}

fn match_branch(branch: &Branch<'_>, path: &[&str], base: &str) -> Option<Vec<RouteMatch>> {
    let mut consumed = 0usize;
    let mut params = Params::new();
    let mut matches = Vec::with_capacity(branch.chain.len());

    for route in &branch.chain {
        for segment in route.segments() {
            if segment == "*" {
                let rest = path.get(consumed..).unwrap_or_default().iter().join("/");
                params.insert("*".to_string(), rest);
                consumed = path.len();
                continue;
            }

            let optional = segment.ends_with('?');
            let segment = segment.trim_end_matches('?');
            let Some(actual) = path.get(consumed) else {
                if optional {
                    continue;
                }
                return None;
            };

            if let Some(name) = segment.strip_prefix(':') {
                params.insert(name.to_string(), (*actual).to_string());
            } else if !segment_eq(segment, actual, route.case_sensitive) {
                if optional {
                    continue;
                }
                return None;
            }
            consumed = consumed.saturating_add(1);
        }

        let pathname = join_pathname(base, path.get(..consumed).unwrap_or_default());
        matches.push(RouteMatch::new(route, params.clone(), pathname));
    }

    (consumed == path.len()).then_some(matches)
}

fn segment_eq(pattern: &str, actual: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        pattern == actual
    } else {
        pattern.eq_ignore_ascii_case(actual)
    }
}

fn join_pathname(base: &str, segments: &[&str]) -> String {
    let base = base.trim_end_matches('/');
    if segments.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}/{}", segments.iter().join("/"))
    }
}

/// Remove `basename` from the front of `pathname`.
///
/// Returns `None` when the pathname lies outside the basename.
#[must_use]
pub fn strip_basename<'a>(pathname: &'a str, basename: Option<&str>) -> Option<&'a str> {
    let basename = match basename.map(|b| b.trim_end_matches('/')) {
        None | Some("") => return Some(pathname),
        Some(b) => b,
    };

    let head = pathname.get(..basename.len())?;
    if !head.eq_ignore_ascii_case(basename) {
        return None;
    }
    let rest = pathname.get(basename.len()..).unwrap_or_default();
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Match `pathname` against the route tree.
///
/// Returns the ordered chain of matches (parents before children), or `None`
/// when no branch consumes the whole pathname.
#[must_use]
pub fn match_routes(
    routes: &[RouteDescriptor],
    pathname: &str,
    basename: Option<&str>,
) -> Option<Vec<RouteMatch>> {
    let relative = strip_basename(pathname, basename)?;
    let path: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let base = basename.unwrap_or_default();

    let mut branches = Vec::new();
    flatten(routes, &[], &mut branches);
    // Stable: equal scores keep definition order.
    branches.sort_by(|a, b| b.score.cmp(&a.score));

    branches
        .iter()
        .find_map(|branch| match_branch(branch, &path, base))
}

/// Match `pathname`, degrading to a single synthetic match against the first
/// top-level route with status 404 when nothing matches.
#[must_use]
pub fn match_or_root(
    routes: &[RouteDescriptor],
    pathname: &str,
    basename: Option<&str>,
) -> Matched {
    if let Some(matches) = match_routes(routes, pathname, basename).filter(|m| !m.is_empty()) {
        return Matched {
            matches,
            status: 200,
        };
    }

    tracing::debug!(pathname, "no route matched, using root with 404");
    let matches = routes
        .first()
        .map(|root| vec![RouteMatch::new(root, Params::new(), pathname.to_string())])
        .unwrap_or_default();

    Matched {
        matches,
        status: 404,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;
    use proptest::prelude::*;

    fn tree() -> Vec<RouteDescriptor> {
        vec![
            RouteDescriptor::new("root").with_path("/").with_children([
                RouteDescriptor::new("home").index(),
                RouteDescriptor::new("products").with_path("products/:id"),
                RouteDescriptor::new("new-product").with_path("products/new"),
                RouteDescriptor::new("docs").with_path("docs/*"),
                RouteDescriptor::new("settings-layout").with_children([
                    RouteDescriptor::new("settings").with_path("Settings").case_sensitive(),
                ]),
            ]),
        ]
    }

    fn ids(matches: &[RouteMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_matches_dynamic_segment() {
        let matches = match_routes(&tree(), "/products/42", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "products"]);
        assert_eq!(matches[1].pathname, "/products/42");
        assert_eq!(matches[1].params.get("id").map(String::as_str), Some("42"));
        assert_eq!(matches[0].pathname, "/");
    }

    #[test]
    fn test_static_segment_outranks_dynamic() {
        let matches = match_routes(&tree(), "/products/new", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "new-product"]);
    }

    #[test]
    fn test_index_route_outranks_layout() {
        let matches = match_routes(&tree(), "/", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "home"]);
        assert_eq!(matches[1].pathname, "/");
    }

    #[test]
    fn test_splat_captures_rest() {
        let matches = match_routes(&tree(), "/docs/guide/intro", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "docs"]);
        assert_eq!(
            matches[1].params.get("*").map(String::as_str),
            Some("guide/intro")
        );
    }

    #[test]
    fn test_pathless_layout_matches_through_child() {
        let matches = match_routes(&tree(), "/Settings", None).unwrap();
        assert_eq!(ids(&matches), vec!["root", "settings-layout", "settings"]);
    }

    #[test]
    fn test_case_sensitive_route_rejects_other_case() {
        assert!(match_routes(&tree(), "/settings", None).is_none());
        assert!(match_routes(&tree(), "/PRODUCTS/1", None).is_some());
    }

    #[test]
    fn test_basename_is_stripped_and_restored() {
        let matches = match_routes(&tree(), "/app/products/7", Some("/app")).unwrap();
        assert_eq!(matches[1].pathname, "/app/products/7");
        assert_eq!(matches[0].pathname, "/app");
        assert!(match_routes(&tree(), "/other/products/7", Some("/app")).is_none());
        assert!(match_routes(&tree(), "/application", Some("/app")).is_none());
    }

    #[test]
    fn test_unmatched_path_synthesizes_root_404() {
        let matched = match_or_root(&tree(), "/nowhere/at/all", None);
        assert_eq!(matched.status, 404);
        assert_eq!(ids(&matched.matches), vec!["root"]);
        assert_eq!(matched.matches[0].pathname, "/nowhere/at/all");
        assert!(matched.matches[0].params.is_empty());
    }

    #[test]
    fn test_real_match_is_200() {
        assert_eq!(match_or_root(&tree(), "/products/1", None).status, 200);
    }

    proptest! {
        #[test]
        fn prop_unknown_prefix_always_synthesizes_root(tail in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}") {
            let pathname = format!("/zz-{tail}");
            let matched = match_or_root(&tree(), &pathname, None);
            prop_assert_eq!(matched.status, 404);
            prop_assert_eq!(matched.matches.len(), 1);
            prop_assert_eq!(matched.matches[0].id.as_str(), "root");
        }

        #[test]
        fn prop_parents_precede_children(id in "[a-z0-9]{1,12}") {
            let matches = match_routes(&tree(), &format!("/products/{id}"), None).unwrap();
            for pair in matches.windows(2) {
                prop_assert_eq!(pair[1].parent_id.as_ref(), Some(&pair[0].id));
            }
        }
    }
}
