//! Payload schema: what the server streams and the client decodes.
//!
//! The root of every stream is a [`ServerPayload`], an object discriminated
//! by its `type` field. Conversion goes through [`Node`] rather than serde
//! because payloads carry elements, references and deferred values.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Display;

use arbor_core::{Capabilities, Params, ResultExt, RouteDescriptor, RouteError, RouteId, RouteMatch};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{self, EncodeOptions};
use crate::deferred::Deferred;
use crate::error::{CodecError, CodecResult};
use crate::node::Node;
use crate::reference::ClientReference;

/// Content type of payload-only responses.
pub const CONTENT_TYPE: &str = "text/x-component";

/// Static description of a matched route as the client needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMeta {
    pub id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    pub pathname: String,
    #[serde(default)]
    pub params: Params,
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

impl RouteMeta {
    #[must_use]
    pub fn from_match(route: &RouteMatch) -> Self {
        Self {
            id: route.id.clone(),
            parent_id: route.parent_id.clone(),
            path: route.path.clone(),
            index: route.index,
            case_sensitive: route.case_sensitive,
            pathname: route.pathname.clone(),
            params: route.params.clone(),
            capabilities: route.capabilities,
        }
    }

    /// The route-tree node this route contributes, without children.
    #[must_use]
    pub fn descriptor(&self) -> RouteDescriptor {
        RouteDescriptor {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            path: self.path.clone(),
            index: self.index,
            case_sensitive: self.case_sensitive,
            capabilities: self.capabilities,
            children: Vec::new(),
        }
    }
}

/// The UI fragment a route rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteElement {
    Normal(Node),
    /// The route's error boundary, rendering an error recorded for it.
    Error(Node),
}

impl RouteElement {
    #[must_use]
    pub const fn node(&self) -> &Node {
        match self {
            Self::Normal(node) | Self::Error(node) => node,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Server-computed unit for one match.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRoute {
    pub meta: RouteMeta,
    pub element: Option<RouteElement>,
    pub hydrate_fallback: Option<Node>,
    pub client_loader: Option<ClientReference>,
    pub client_action: Option<ClientReference>,
    pub should_revalidate: Option<ClientReference>,
}

impl RenderedRoute {
    #[must_use]
    pub const fn new(meta: RouteMeta) -> Self {
        Self {
            meta,
            element: None,
            hydrate_fallback: None,
            client_loader: None,
            client_action: None,
            should_revalidate: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &RouteId {
        &self.meta.id
    }

    fn into_node(self) -> Node {
        let mut fields = match data_node(&self.meta) {
            Node::Object(map) => map,
            _ => BTreeMap::new(),
        };
        match self.element {
            Some(RouteElement::Normal(node)) => {
                fields.insert("element".into(), node);
            }
            Some(RouteElement::Error(node)) => {
                fields.insert("errorElement".into(), node);
            }
            None => {}
        }
        let optional = [
            ("hydrateFallback", self.hydrate_fallback),
            ("clientLoader", self.client_loader.map(Node::from)),
            ("clientAction", self.client_action.map(Node::from)),
            ("shouldRevalidate", self.should_revalidate.map(Node::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                fields.insert(key.into(), value);
            }
        }
        Node::Object(fields)
    }

    fn from_node(node: Node) -> CodecResult<Self> {
        let mut fields = Fields::new(node, "rendered route")?;
        let element = match (fields.take("element"), fields.take("errorElement")) {
            (Some(_), Some(_)) => {
                return Err(CodecError::schema(
                    "rendered route has both element and errorElement",
                ));
            }
            (Some(node), None) => Some(RouteElement::Normal(node)),
            (None, Some(node)) => Some(RouteElement::Error(node)),
            (None, None) => None,
        };
        let hydrate_fallback = fields.take("hydrateFallback");
        let client_loader = fields.client_ref("clientLoader")?;
        let client_action = fields.client_ref("clientAction")?;
        let should_revalidate = fields.client_ref("shouldRevalidate")?;
        let meta = fields.into_data()?;

        Ok(Self {
            meta,
            element,
            hydrate_fallback,
            client_loader,
            client_action,
            should_revalidate,
        })
    }
}

/// Entry module of the client bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAssets {
    pub module: String,
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Per-route entry of the assets manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRoute {
    pub id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RouteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    pub module: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

/// Module-import information for the matched routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsManifest {
    pub entry: EntryAssets,
    #[serde(default)]
    pub routes: BTreeMap<RouteId, ManifestRoute>,
    pub url: String,
    pub version: String,
}

/// A full render: matched routes, their UI and their data.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPayload {
    /// Matched route ids, root to leaf.
    pub matches: Vec<RouteId>,
    pub rendered: BTreeMap<RouteId, RenderedRoute>,
    pub loader_data: BTreeMap<RouteId, Node>,
    pub action_data: Option<BTreeMap<RouteId, Node>>,
    pub errors: Option<BTreeMap<RouteId, RouteError>>,
    pub manifest: AssetsManifest,
    pub status: u16,
    pub url: String,
}

/// One level of the nested view of a render payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTreeNode<'a> {
    pub route: &'a RenderedRoute,
    pub children: Vec<RenderedTreeNode<'a>>,
}

impl RenderPayload {
    /// Rendered routes in match order.
    pub fn matched_routes(&self) -> impl Iterator<Item = &RenderedRoute> {
        self.matches.iter().filter_map(|id| self.rendered.get(id))
    }

    /// The chain of rendered routes from the root down to `id`.
    ///
    /// Empty if `id` is not among the matches.
    #[must_use]
    pub fn ancestor_chain(&self, id: &RouteId) -> Vec<&RenderedRoute> {
        let Some(position) = self.matches.iter().position(|m| m == id) else {
            return Vec::new();
        };
        let mut chain: Vec<&RenderedRoute> = Vec::new();
        let mut next = Some(id);
        for candidate in self.matches.iter().take(position.saturating_add(1)).rev() {
            if next != Some(candidate) {
                continue;
            }
            let Some(route) = self.rendered.get(candidate) else {
                break;
            };
            chain.push(route);
            next = route.meta.parent_id.as_ref();
        }
        chain.reverse();
        chain
    }

    /// Nested view of the matches, following `parent_id` links.
    #[must_use]
    pub fn route_tree(&self) -> Vec<RenderedTreeNode<'_>> {
        let matched: HashSet<&RouteId> = self.matches.iter().collect();
        self.matched_routes()
            .filter(|route| {
                route
                    .meta
                    .parent_id
                    .as_ref()
                    .is_none_or(|parent| !matched.contains(parent))
            })
            .map(|route| self.subtree(route))
            .collect()
    }

    fn subtree<'a>(&'a self, route: &'a RenderedRoute) -> RenderedTreeNode<'a> {
        let children = self
            .matched_routes()
            .filter(|child| child.meta.parent_id.as_ref() == Some(route.id()))
            .map(|child| self.subtree(child))
            .collect();
        RenderedTreeNode { route, children }
    }

    /// Check the structural invariants: every match is rendered and parents
    /// precede their children.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Schema`] describing the first violation.
    pub fn validate(&self) -> CodecResult<()> {
        let mut seen: HashSet<&RouteId> = HashSet::new();
        for id in &self.matches {
            let route = self
                .rendered
                .get(id)
                .ok_or_else(|| CodecError::schema(format!("match '{id}' has no rendered route")))?;
            if let Some(parent) = &route.meta.parent_id {
                if self.matches.contains(parent) && !seen.contains(parent) {
                    return Err(CodecError::schema(format!(
                        "match '{id}' precedes its parent '{parent}'"
                    )));
                }
            }
            seen.insert(id);
        }
        Ok(())
    }

    fn into_node(self) -> Node {
        let mut fields = BTreeMap::new();
        fields.insert("type".to_string(), Node::from("render"));
        fields.insert(
            "matches".into(),
            Node::Array(self.matches.iter().map(|id| Node::from(id.as_str())).collect()),
        );
        fields.insert(
            "rendered".into(),
            keyed(self.rendered.into_iter().map(|(id, route)| (id, route.into_node()))),
        );
        fields.insert("loaderData".into(), keyed(self.loader_data));
        if let Some(action_data) = self.action_data {
            fields.insert("actionData".into(), keyed(action_data));
        }
        if let Some(errors) = self.errors {
            fields.insert(
                "errors".into(),
                keyed(errors.into_iter().map(|(id, e)| (id, Node::Error(e)))),
            );
        }
        fields.insert("manifest".into(), data_node(&self.manifest));
        fields.insert("status".into(), Node::from(u64::from(self.status)));
        fields.insert("url".into(), Node::from(self.url));
        Node::Object(fields)
    }

    fn from_fields(mut fields: Fields) -> CodecResult<Self> {
        let matches = fields.data("matches")?;
        let rendered = fields
            .keyed("rendered")?
            .into_iter()
            .map(|(id, node)| Ok((id, RenderedRoute::from_node(node)?)))
            .collect::<CodecResult<_>>()?;
        let loader_data = fields.keyed("loaderData")?;
        let action_data = fields.optional_keyed("actionData")?;
        let errors = fields
            .optional_keyed("errors")?
            .map(|errors| {
                errors
                    .into_iter()
                    .map(|(id, node)| match node {
                        Node::Error(error) => Ok((id, error)),
                        _ => Err(CodecError::schema(format!("errors['{id}'] is not an error"))),
                    })
                    .collect::<CodecResult<_>>()
            })
            .transpose()?;
        let manifest = fields.data("manifest")?;
        let status = fields.data("status")?;
        let url = fields.data("url")?;

        let payload = Self {
            matches,
            rendered,
            loader_data,
            action_data,
            errors,
            manifest,
            status,
            url,
        };
        payload.validate()?;
        Ok(payload)
    }
}

/// Redirect instruction instead of a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPayload {
    pub location: String,
    pub status: u16,
    pub url: String,
}

/// Result of an out-of-band single-route request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherPayload {
    pub route_id: RouteId,
    pub result: Deferred,
    pub url: String,
}

/// Result of a server-reference call, plus the page re-rendered after it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPayload {
    pub result: Deferred,
    pub page: Box<ServerPayload>,
    pub url: String,
}

/// Root object of every payload stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPayload {
    Render(RenderPayload),
    Redirect(RedirectPayload),
    Fetcher(FetcherPayload),
    Action(ActionPayload),
}

impl ServerPayload {
    /// The `type` discriminant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Redirect(_) => "redirect",
            Self::Fetcher(_) => "fetcher",
            Self::Action(_) => "action",
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Render(render) => &render.url,
            Self::Redirect(redirect) => &redirect.url,
            Self::Fetcher(fetcher) => &fetcher.url,
            Self::Action(action) => &action.url,
        }
    }

    /// HTTP status of the response carrying this payload.
    ///
    /// Redirects travel inside a successful response; the client follows them.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Render(render) => render.status,
            Self::Redirect(_) | Self::Fetcher(_) => 200,
            Self::Action(action) => action.page.status(),
        }
    }

    #[must_use]
    pub fn into_node(self) -> Node {
        match self {
            Self::Render(render) => render.into_node(),
            Self::Redirect(redirect) => {
                let mut node = data_node(&redirect);
                if let Node::Object(fields) = &mut node {
                    fields.insert("type".into(), Node::from("redirect"));
                }
                node
            }
            Self::Fetcher(fetcher) => Node::object([
                ("type", Node::from("fetcher")),
                ("routeId", Node::from(fetcher.route_id.as_str())),
                ("result", Node::from(fetcher.result)),
                ("url", Node::from(fetcher.url)),
            ]),
            Self::Action(action) => Node::object([
                ("type", Node::from("action")),
                ("result", Node::from(action.result)),
                ("page", action.page.into_node()),
                ("url", Node::from(action.url)),
            ]),
        }
    }

    /// Interpret a decoded root node.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Schema`] if the node is not a well-formed payload.
    pub fn from_node(node: Node) -> CodecResult<Self> {
        let mut fields = Fields::new(node, "payload")?;
        let kind: String = fields.data("type")?;
        match kind.as_str() {
            "render" => RenderPayload::from_fields(fields).map(Self::Render),
            "redirect" => fields.into_data().map(Self::Redirect),
            "fetcher" => Ok(Self::Fetcher(FetcherPayload {
                route_id: fields.data("routeId")?,
                result: fields.deferred("result")?,
                url: fields.data("url")?,
            })),
            "action" => Ok(Self::Action(ActionPayload {
                result: fields.deferred("result")?,
                page: Box::new(Self::from_node(fields.required("page")?)?),
                url: fields.data("url")?,
            })),
            other => Err(CodecError::schema(format!("unknown payload type '{other}'"))),
        }
    }

    /// Encode as a row stream.
    #[must_use]
    pub fn encode(self, options: EncodeOptions) -> BoxStream<'static, CodecResult<Bytes>> {
        codec::encode(self.into_node(), options)
    }

    /// Decode a row stream into a payload.
    ///
    /// # Errors
    ///
    /// Any decode or schema error.
    pub async fn decode<S, E>(stream: S) -> CodecResult<Self>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        Self::from_node(codec::decode(stream).await?)
    }
}

fn data_node<T: Serialize>(value: &T) -> Node {
    Node::from_serialize(value).or_default_logged(Node::Null, "serializing payload field")
}

fn keyed(entries: impl IntoIterator<Item = (RouteId, Node)>) -> Node {
    Node::Object(
        entries
            .into_iter()
            .map(|(id, node)| (String::from(id.as_str()), node))
            .collect(),
    )
}

/// Field access over a decoded object node.
struct Fields {
    map: BTreeMap<String, Node>,
    context: &'static str,
}

impl Fields {
    fn new(node: Node, context: &'static str) -> CodecResult<Self> {
        match node {
            Node::Object(map) => Ok(Self { map, context }),
            _ => Err(CodecError::schema(format!("{context} must be an object"))),
        }
    }

    /// Remove a field, treating `null` as absent.
    fn take(&mut self, key: &str) -> Option<Node> {
        self.map.remove(key).filter(|node| !node.is_null())
    }

    fn required(&mut self, key: &str) -> CodecResult<Node> {
        self.take(key)
            .ok_or_else(|| CodecError::schema(format!("{} is missing '{key}'", self.context)))
    }

    fn data<T: DeserializeOwned>(&mut self, key: &str) -> CodecResult<T> {
        self.required(key)?
            .deserialize()
            .map_err(|e| CodecError::schema(format!("{}.{key}: {e}", self.context)))
    }

    fn into_data<T: DeserializeOwned>(self) -> CodecResult<T> {
        let context = self.context;
        Node::Object(self.map)
            .deserialize()
            .map_err(|e| CodecError::schema(format!("{context}: {e}")))
    }

    fn keyed(&mut self, key: &str) -> CodecResult<BTreeMap<RouteId, Node>> {
        Ok(self.optional_keyed(key)?.unwrap_or_default())
    }

    fn optional_keyed(&mut self, key: &str) -> CodecResult<Option<BTreeMap<RouteId, Node>>> {
        match self.take(key) {
            None => Ok(None),
            Some(Node::Object(map)) => Ok(Some(
                map.into_iter().map(|(id, node)| (RouteId::from(id), node)).collect(),
            )),
            Some(_) => Err(CodecError::schema(format!(
                "{}.{key} must be keyed by route id",
                self.context
            ))),
        }
    }

    fn client_ref(&mut self, key: &str) -> CodecResult<Option<ClientReference>> {
        match self.take(key) {
            None => Ok(None),
            Some(Node::ClientRef(reference)) => Ok(Some(reference)),
            Some(_) => Err(CodecError::schema(format!(
                "{}.{key} must be a client reference",
                self.context
            ))),
        }
    }

    /// A result slot; a value that arrived already resolved is accepted too.
    fn deferred(&mut self, key: &str) -> CodecResult<Deferred> {
        Ok(match self.take(key).unwrap_or_default() {
            Node::Deferred(deferred) => deferred,
            Node::Error(error) => Deferred::rejected(error),
            other => Deferred::resolved(other),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use arbor_core::{RouteDescriptor, match_or_root};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;
    use crate::codec::{RedactErrors, decode_str, encode_to_string};
    use crate::node::Element;

    fn routes() -> Vec<RouteDescriptor> {
        vec![
            RouteDescriptor::new("root")
                .with_path("/")
                .with_children([RouteDescriptor::new("products").with_path("products/:id")]),
        ]
    }

    fn render(loader_data: Value, error: Option<RouteError>) -> RenderPayload {
        let matched = match_or_root(&routes(), "/products/42", None);
        let rendered: BTreeMap<_, _> = matched
            .matches
            .iter()
            .map(|m| {
                let mut route = RenderedRoute::new(RouteMeta::from_match(m));
                route.element = Some(RouteElement::Normal(
                    Element::new("section").child(Element::outlet()).into(),
                ));
                (m.id.clone(), route)
            })
            .collect();

        RenderPayload {
            matches: matched.matches.iter().map(|m| m.id.clone()).collect(),
            rendered,
            loader_data: BTreeMap::from([(RouteId::from("products"), Node::from_json(loader_data))]),
            action_data: Some(BTreeMap::from([(RouteId::from("products"), Node::from("saved"))])),
            errors: error.map(|e| BTreeMap::from([(RouteId::from("root"), e)])),
            manifest: AssetsManifest::default(),
            status: matched.status,
            url: "/products/42".into(),
        }
    }

    async fn round_trip(payload: ServerPayload, options: EncodeOptions) -> ServerPayload {
        let text = encode_to_string(payload.into_node(), options).await.unwrap();
        ServerPayload::from_node(decode_str(&text).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_render_payload_round_trip() {
        let payload = render(json!({"name": "Widget", "mutations": 1}), None);
        let decoded = round_trip(ServerPayload::Render(payload.clone()), EncodeOptions::default()).await;
        assert_eq!(decoded, ServerPayload::Render(payload));
    }

    #[tokio::test]
    async fn test_render_payload_shape() {
        let payload = render(json!(42), None);
        let products = &payload.rendered[&RouteId::from("products")];
        assert_eq!(payload.matches, vec![RouteId::from("root"), RouteId::from("products")]);
        assert_eq!(products.meta.pathname, "/products/42");
        assert_eq!(products.meta.params.get("id").map(String::as_str), Some("42"));
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_ancestor_chain_and_tree() {
        let payload = render(json!(null), None);
        let chain: Vec<_> = payload
            .ancestor_chain(&RouteId::from("products"))
            .into_iter()
            .map(|route| route.id().as_str())
            .collect();
        assert_eq!(chain, ["root", "products"]);
        assert!(payload.ancestor_chain(&RouteId::from("missing")).is_empty());

        let tree = payload.route_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].route.id().as_str(), "root");
        assert_eq!(tree[0].children[0].route.id().as_str(), "products");
    }

    #[test]
    fn test_validate_rejects_unrendered_match() {
        let mut payload = render(json!(null), None);
        payload.rendered.remove(&RouteId::from("products"));
        assert!(matches!(payload.validate(), Err(CodecError::Schema(_))));
    }

    #[test]
    fn test_validate_rejects_child_before_parent() {
        let mut payload = render(json!(null), None);
        payload.matches.reverse();
        assert!(payload.validate().is_err());
    }

    #[tokio::test]
    async fn test_redirect_round_trip() {
        let redirect = ServerPayload::Redirect(RedirectPayload {
            location: "/login".into(),
            status: 302,
            url: "/account".into(),
        });
        let decoded = round_trip(redirect.clone(), EncodeOptions::default()).await;
        assert_eq!(decoded.kind(), "redirect");
        assert_eq!(decoded, redirect);
    }

    #[tokio::test]
    async fn test_fetcher_result_is_deferred() {
        let fetcher = ServerPayload::Fetcher(FetcherPayload {
            route_id: RouteId::from("products"),
            result: Deferred::new(async { Ok(Node::from(7_i64)) }),
            url: "/products/42".into(),
        });
        let text = encode_to_string(fetcher.into_node(), EncodeOptions::default()).await.unwrap();
        assert!(text.starts_with("0:{"));
        assert!(text.contains("\"result\":\"$@1\""));

        let ServerPayload::Fetcher(decoded) = ServerPayload::from_node(decode_str(&text).await.unwrap()).unwrap() else {
            panic!("expected fetcher payload");
        };
        assert_eq!(decoded.route_id.as_str(), "products");
        assert_eq!(decoded.result.resolve().await.unwrap(), Node::from(7_i64));
    }

    #[tokio::test]
    async fn test_action_payload_wraps_page() {
        let action = ServerPayload::Action(ActionPayload {
            result: Deferred::resolved(Node::from("ok")),
            page: Box::new(ServerPayload::Render(render(json!(1), None))),
            url: "/products/42".into(),
        });
        let decoded = round_trip(action, EncodeOptions::default()).await;
        let ServerPayload::Action(decoded) = decoded else {
            panic!("expected action payload");
        };
        assert_eq!(decoded.page.kind(), "render");
        assert_eq!(decoded.result.resolve().await.unwrap(), Node::from("ok"));
    }

    #[tokio::test]
    async fn test_errors_are_redacted_on_the_wire() {
        let payload = render(json!(1), Some(RouteError::new("db password wrong").with_stack("x")));
        let text = encode_to_string(ServerPayload::Render(payload).into_node(), EncodeOptions::redacted(RedactErrors::On))
            .await
            .unwrap();
        assert!(!text.contains("db password wrong"));

        let ServerPayload::Render(decoded) = ServerPayload::from_node(decode_str(&text).await.unwrap()).unwrap() else {
            panic!("expected render payload");
        };
        let error = &decoded.errors.unwrap()[&RouteId::from("root")];
        assert_eq!(error.status, 500);
        assert!(error.stack.is_none());
        assert!(error.digest.is_some());
    }

    #[tokio::test]
    async fn test_unknown_type_is_schema_error() {
        let node = decode_str("0:{\"type\":\"teleport\"}\n").await.unwrap();
        assert!(matches!(ServerPayload::from_node(node), Err(CodecError::Schema(_))));
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "\\$?[a-z@$]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("\\$?[a-z]{1,4}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_data_survives_decode_encode_decode(data in json_value(), failing in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let error = failing.then(|| RouteError::not_found("no such product").with_data(json!({"id": 42})));
            let payload = ServerPayload::Render(render(data, error));

            let (first, second) = runtime.block_on(async {
                let first = round_trip(payload, EncodeOptions::default()).await;
                let second = round_trip(first.clone(), EncodeOptions::default()).await;
                (first, second)
            });

            let (ServerPayload::Render(first), ServerPayload::Render(second)) = (first, second) else {
                panic!("expected render payloads");
            };
            prop_assert_eq!(&first.loader_data, &second.loader_data);
            prop_assert_eq!(&first.action_data, &second.action_data);
            prop_assert_eq!(&first.errors, &second.errors);
            prop_assert_eq!(first.rendered.len(), second.rendered.len());
        }
    }
}
