//! Client-side route hooks.
//!
//! Rendered routes carry client references to their hooks; the application
//! registers the code behind each reference in [`ClientModules`]. A hook that
//! wants the server's value asks its [`ServerValue`], which awaits the
//! navigation's shared server call.

use std::future::Future;
use std::sync::Arc;

use arbor_core::{Params, RouteError, RouteId};
use arbor_wire::{ClientReference, Node, ServerPayload};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use http::Method;
use serde_json::json;

use crate::location::Location;
use crate::server_call::ServerCall;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A form submission or other request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub method: Method,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl Submission {
    /// A url-encoded `POST`.
    pub fn form<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self {
            method: Method::POST,
            content_type: FORM_CONTENT_TYPE,
            body: Bytes::from(body),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    LoaderData,
    ActionData,
    FetcherResult,
}

/// The server's value for one route, fetched on first use.
#[derive(Debug, Clone)]
pub struct ServerValue {
    call: ServerCall,
    route_id: RouteId,
    pick: Pick,
}

impl ServerValue {
    pub(crate) const fn loader_data(call: ServerCall, route_id: RouteId) -> Self {
        Self {
            call,
            route_id,
            pick: Pick::LoaderData,
        }
    }

    pub(crate) const fn action_data(call: ServerCall, route_id: RouteId) -> Self {
        Self {
            call,
            route_id,
            pick: Pick::ActionData,
        }
    }

    pub(crate) const fn fetcher_result(call: ServerCall, route_id: RouteId) -> Self {
        Self {
            call,
            route_id,
            pick: Pick::FetcherResult,
        }
    }

    /// Send the shared request if needed and return this route's part.
    ///
    /// # Errors
    ///
    /// The route's error, a redirect (as a response error carrying its
    /// location), or the transport failure as a plain error. Transport
    /// failures also abort the navigation once every hook has settled.
    pub async fn get(&self) -> Result<Node, RouteError> {
        let payload = self
            .call
            .payload()
            .await
            .map_err(|e| RouteError::new(e.to_string()))?;
        pick(&payload, &self.route_id, self.pick).await
    }
}

/// Extract one route's outcome from a payload.
pub(crate) async fn pick_loader_data(payload: &ServerPayload, route_id: &RouteId) -> Result<Node, RouteError> {
    pick(payload, route_id, Pick::LoaderData).await
}

pub(crate) async fn pick_action_data(payload: &ServerPayload, route_id: &RouteId) -> Result<Node, RouteError> {
    pick(payload, route_id, Pick::ActionData).await
}

pub(crate) async fn pick_fetcher_result(payload: &ServerPayload, route_id: &RouteId) -> Result<Node, RouteError> {
    pick(payload, route_id, Pick::FetcherResult).await
}

async fn pick(payload: &ServerPayload, route_id: &RouteId, pick: Pick) -> Result<Node, RouteError> {
    match (payload, pick) {
        (ServerPayload::Redirect(redirect), _) => Err(RouteError::response(
            redirect.status,
            format!("redirect to {}", redirect.location),
        )
        .with_data(json!({ "location": redirect.location }))),
        (ServerPayload::Render(render), Pick::LoaderData) => {
            if let Some(error) = render.errors.as_ref().and_then(|errors| errors.get(route_id)) {
                return Err(error.clone());
            }
            Ok(render.loader_data.get(route_id).cloned().unwrap_or_default())
        }
        (ServerPayload::Render(render), Pick::ActionData) => {
            if let Some(error) = render.errors.as_ref().and_then(|errors| errors.get(route_id)) {
                return Err(error.clone());
            }
            Ok(render
                .action_data
                .as_ref()
                .and_then(|data| data.get(route_id).cloned())
                .unwrap_or_default())
        }
        (ServerPayload::Fetcher(fetcher), Pick::FetcherResult) if &fetcher.route_id == route_id => {
            fetcher.result.resolve().await
        }
        (other, _) => Err(RouteError::new(format!(
            "unexpected {} payload for route '{route_id}'",
            other.kind()
        ))),
    }
}

pub struct ClientLoaderArgs {
    pub route_id: RouteId,
    pub params: Params,
    pub location: Location,
    pub server: ServerValue,
}

pub struct ClientActionArgs {
    pub route_id: RouteId,
    pub params: Params,
    pub location: Location,
    pub submission: Submission,
    pub server: ServerValue,
}

/// Input to a route's revalidation decision.
#[derive(Debug, Clone)]
pub struct ShouldRevalidateArgs {
    pub route_id: RouteId,
    pub current: Location,
    pub next: Location,
    /// What the router would decide on its own: `false` for a fresh entry.
    pub default_should_revalidate: bool,
}

pub type ClientLoaderFn = Arc<dyn Fn(ClientLoaderArgs) -> BoxFuture<'static, Result<Node, RouteError>> + Send + Sync>;
pub type ClientActionFn = Arc<dyn Fn(ClientActionArgs) -> BoxFuture<'static, Result<Node, RouteError>> + Send + Sync>;
pub type ShouldRevalidateFn = Arc<dyn Fn(&ShouldRevalidateArgs) -> bool + Send + Sync>;

/// The code behind client references, keyed by [`ClientReference::key`].
#[derive(Clone, Default)]
pub struct ClientModules {
    loaders: Arc<DashMap<String, ClientLoaderFn>>,
    actions: Arc<DashMap<String, ClientActionFn>>,
    revalidators: Arc<DashMap<String, ShouldRevalidateFn>>,
}

impl ClientModules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn client_loader<F, Fut>(self, reference: &ClientReference, f: F) -> Self
    where
        F: Fn(ClientLoaderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node, RouteError>> + Send + 'static,
    {
        let hook: ClientLoaderFn = Arc::new(move |args| f(args).boxed());
        self.loaders.insert(reference.key(), hook);
        self
    }

    #[must_use]
    pub fn client_action<F, Fut>(self, reference: &ClientReference, f: F) -> Self
    where
        F: Fn(ClientActionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Node, RouteError>> + Send + 'static,
    {
        let hook: ClientActionFn = Arc::new(move |args| f(args).boxed());
        self.actions.insert(reference.key(), hook);
        self
    }

    #[must_use]
    pub fn should_revalidate(
        self,
        reference: &ClientReference,
        f: impl Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.revalidators.insert(reference.key(), Arc::new(f));
        self
    }

    #[must_use]
    pub fn loader(&self, reference: Option<&ClientReference>) -> Option<ClientLoaderFn> {
        let key = reference?.key();
        self.loaders.get(&key).map(|hook| Arc::clone(hook.value()))
    }

    #[must_use]
    pub fn action(&self, reference: Option<&ClientReference>) -> Option<ClientActionFn> {
        let key = reference?.key();
        self.actions.get(&key).map(|hook| Arc::clone(hook.value()))
    }

    #[must_use]
    pub fn revalidator(&self, reference: Option<&ClientReference>) -> Option<ShouldRevalidateFn> {
        let key = reference?.key();
        self.revalidators.get(&key).map(|hook| Arc::clone(hook.value()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use std::collections::BTreeMap;

    use arbor_wire::{AssetsManifest, Deferred, FetcherPayload, RedirectPayload, RenderPayload};

    use super::*;

    fn render() -> ServerPayload {
        ServerPayload::Render(RenderPayload {
            matches: vec![RouteId::from("root"), RouteId::from("item")],
            rendered: BTreeMap::new(),
            loader_data: BTreeMap::from([(RouteId::from("item"), Node::from(7_i64))]),
            action_data: Some(BTreeMap::from([(RouteId::from("item"), Node::from("saved"))])),
            errors: Some(BTreeMap::from([(RouteId::from("root"), RouteError::not_found("gone"))])),
            manifest: AssetsManifest::default(),
            status: 404,
            url: "/item".into(),
        })
    }

    #[tokio::test]
    async fn test_pick_from_render() {
        let payload = render();
        let item = RouteId::from("item");
        assert_eq!(pick_loader_data(&payload, &item).await.unwrap(), Node::from(7_i64));
        assert_eq!(pick_action_data(&payload, &item).await.unwrap(), Node::from("saved"));
        let error = pick_loader_data(&payload, &RouteId::from("root")).await.unwrap_err();
        assert_eq!(error.status, 404);
    }

    #[tokio::test]
    async fn test_pick_redirect_carries_location() {
        let payload = ServerPayload::Redirect(RedirectPayload {
            location: "/login".into(),
            status: 303,
            url: "/item".into(),
        });
        let error = pick_loader_data(&payload, &RouteId::from("item")).await.unwrap_err();
        assert_eq!(error.status, 303);
        assert_eq!(error.data, Some(json!({"location": "/login"})));
    }

    #[tokio::test]
    async fn test_pick_fetcher_result_checks_route() {
        let payload = ServerPayload::Fetcher(FetcherPayload {
            route_id: RouteId::from("item"),
            result: Deferred::resolved(Node::from(true)),
            url: "/item".into(),
        });
        assert_eq!(
            pick_fetcher_result(&payload, &RouteId::from("item")).await.unwrap(),
            Node::from(true)
        );
        assert!(pick_fetcher_result(&payload, &RouteId::from("root")).await.is_err());
    }

    #[test]
    fn test_registry_keys_by_reference() {
        let reference = ClientReference::new("routes/item.js", "clientLoader");
        let modules = ClientModules::new().client_loader(&reference, |_| async { Ok(Node::Null) });
        assert!(modules.loader(Some(&reference)).is_some());
        assert!(modules.loader(Some(&ClientReference::new("routes/item.js", "other"))).is_none());
        assert!(modules.loader(None).is_none());
    }

    #[test]
    fn test_form_submission() {
        let submission = Submission::form([("by", "2"), ("note", "a b")]);
        assert!(submission.is_mutation());
        assert_eq!(submission.body, Bytes::from("by=2&note=a+b"));
        assert!(!submission.with_method(Method::GET).is_mutation());
    }
}
