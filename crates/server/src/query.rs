//! Runs the data functions for a set of matches.
//!
//! Mutations run the leaf's action first, then loaders run concurrently for
//! every match above any error boundary the action tripped. The first
//! redirect in match order wins; other failures are recorded against the
//! nearest ancestor that declares an error boundary.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_core::{RouteError, RouteId, RouteMatch};
use arbor_wire::{Node, RedirectPayload};
use futures::stream::{FuturesOrdered, StreamExt};
use tracing::{debug, warn};

use crate::error::{Result, ServerError};
use crate::module::{DataArgs, RouteModule, Thrown};
use crate::request::PayloadRequest;

/// Statuses a redirect may use.
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// A match together with its resolved module.
#[derive(Debug, Clone)]
pub struct ResolvedMatch {
    pub route: RouteMatch,
    pub module: Arc<RouteModule>,
}

impl ResolvedMatch {
    fn args(&self, request: &Arc<PayloadRequest>) -> DataArgs {
        DataArgs {
            request: Arc::clone(request),
            params: self.route.params.clone(),
        }
    }
}

/// Data gathered for a render.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    pub loader_data: BTreeMap<RouteId, Node>,
    pub action_data: Option<BTreeMap<RouteId, Node>>,
    pub errors: Option<BTreeMap<RouteId, RouteError>>,
    pub status: u16,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            loader_data: BTreeMap::new(),
            action_data: None,
            errors: None,
            status: 200,
        }
    }
}

impl QueryContext {
    /// Record `error` raised by `raised`, the route at `index`, on the
    /// nearest boundary at or above it. Returns the boundary's index.
    fn record_error(
        &mut self,
        matches: &[ResolvedMatch],
        raised: &ResolvedMatch,
        index: usize,
        error: RouteError,
    ) -> Result<usize> {
        let Some((boundary, boundary_match)) = matches
            .iter()
            .enumerate()
            .take(index.saturating_add(1))
            .rfind(|(_, m)| m.route.capabilities.has_error_boundary)
        else {
            return Err(ServerError::UnhandledRouteError {
                route_id: raised.route.id.clone(),
                error,
            });
        };

        let boundary_id = boundary_match.route.id.clone();
        warn!(route_id = %raised.route.id, boundary = %boundary_id, status = error.status, "route data error");

        let status = if error.is_response { error.status } else { 500 };
        self.status = self.status.max(status);
        self.errors
            .get_or_insert_with(BTreeMap::new)
            .entry(boundary_id)
            .or_insert(error);
        Ok(boundary)
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Redirect(RedirectPayload),
    Render(QueryContext),
}

/// How a data function that did not return data ended.
enum Settled {
    Redirect(RedirectPayload),
    Failed(RouteError),
}

fn settle(thrown: Thrown, request: &PayloadRequest) -> Result<Settled> {
    match thrown {
        Thrown::Response(response) if response.is_redirect() => {
            let location = response.location().map(str::to_string);
            match location {
                Some(location) if REDIRECT_STATUSES.contains(&response.status) => {
                    Ok(Settled::Redirect(RedirectPayload {
                        location,
                        status: response.status,
                        url: request.url(),
                    }))
                }
                location => Err(ServerError::invalid_redirect(response.status, location)),
            }
        }
        other => Ok(Settled::Failed(other.into_route_error())),
    }
}

/// Run actions and loaders for `matches`.
///
/// # Errors
///
/// Fails on a malformed redirect, or on a data error with no error boundary
/// at or above the route that raised it.
pub async fn query(request: &Arc<PayloadRequest>, matches: &[ResolvedMatch]) -> Result<QueryOutcome> {
    let mut context = QueryContext::default();
    let mut loader_limit = matches.len();

    if request.is_mutation() {
        if let Some((index, leaf)) = matches.iter().enumerate().next_back() {
            let outcome = match &leaf.module.action {
                Some(action) => {
                    debug!(route_id = %leaf.route.id, method = %request.method, "running action");
                    action(leaf.args(request)).await
                }
                None => Err(Thrown::from(RouteError::method_not_allowed(format!(
                    "route '{}' has no action for {} {}",
                    leaf.route.id, request.method, request.pathname
                )))),
            };

            match outcome {
                Ok(data) => {
                    context.action_data = Some(BTreeMap::from([(leaf.route.id.clone(), data)]));
                }
                Err(thrown) => match settle(thrown, request)? {
                    Settled::Redirect(redirect) => return Ok(QueryOutcome::Redirect(redirect)),
                    Settled::Failed(error) => {
                        loader_limit = context.record_error(matches, leaf, index, error)?;
                    }
                },
            }
        }
    }

    let mut loaders: FuturesOrdered<_> = matches
        .iter()
        .enumerate()
        .take(loader_limit)
        .filter_map(|(index, m)| {
            let loader = m.module.loader.clone()?;
            let args = m.args(request);
            debug!(route_id = %m.route.id, "running loader");
            Some(async move { (index, m, loader(args).await) })
        })
        .collect();

    while let Some((index, m, outcome)) = loaders.next().await {
        match outcome {
            Ok(data) => {
                context.loader_data.insert(m.route.id.clone(), data);
            }
            Err(thrown) => match settle(thrown, request)? {
                Settled::Redirect(redirect) => return Ok(QueryOutcome::Redirect(redirect)),
                Settled::Failed(error) => {
                    context.record_error(matches, m, index, error)?;
                }
            },
        }
    }

    Ok(QueryOutcome::Render(context))
}
