//! The value graph carried by payloads.

use std::collections::BTreeMap;

use arbor_core::RouteError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::deferred::Deferred;
use crate::error::{CodecError, CodecResult};
use crate::reference::{ClientReference, ServerReference};

/// A node of the payload graph.
///
/// Plain data (`Null` through `Object`) round-trips losslessly. Elements,
/// references, deferred values and errors are the extensions a payload needs
/// on top of JSON.
#[derive(Debug, Clone, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Node>),
    Object(BTreeMap<String, Node>),
    Element(Box<Element>),
    ClientRef(ClientReference),
    ServerRef(ServerReference),
    Deferred(Deferred),
    Error(RouteError),
}

/// What an element renders as.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// A host element such as `div`.
    Intrinsic(String),
    /// A client component loaded through its reference.
    Component(ClientReference),
    Fragment,
    /// Placeholder where a child route renders.
    Outlet,
}

/// A UI fragment: kind, optional key, props and children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<String>,
    pub props: BTreeMap<String, Node>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self::of_kind(ElementKind::Intrinsic(tag.into()))
    }

    pub fn component(reference: ClientReference) -> Self {
        Self::of_kind(ElementKind::Component(reference))
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::of_kind(ElementKind::Fragment).children(children)
    }

    pub fn outlet() -> Self {
        Self::of_kind(ElementKind::Outlet)
    }

    const fn of_kind(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Node>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Depth-first search for an outlet placeholder.
    #[must_use]
    pub fn contains_outlet(&self) -> bool {
        self.kind == ElementKind::Outlet
            || self.children.iter().any(|child| match child {
                Node::Element(element) => element.contains_outlet(),
                _ => false,
            })
    }
}

impl Node {
    /// Build an object node from key/value pairs.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert plain JSON into a node.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert back to plain JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotData`] if the graph holds an element,
    /// reference, deferred value or error anywhere.
    pub fn to_json(&self) -> CodecResult<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => {
                Value::Array(items.iter().map(Self::to_json).collect::<CodecResult<_>>()?)
            }
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<CodecResult<Map<_, _>>>()?,
            ),
            Self::Element(_) => return Err(CodecError::NotData("element".into())),
            Self::ClientRef(r) => return Err(CodecError::NotData(format!("client reference {}", r.id))),
            Self::ServerRef(r) => return Err(CodecError::NotData(format!("server reference {}", r.id))),
            Self::Deferred(_) => return Err(CodecError::NotData("deferred value".into())),
            Self::Error(e) => return Err(CodecError::NotData(format!("error {e}"))),
        })
    }

    /// Serialize any value into a node.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if `value` cannot be represented as JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> CodecResult<Self> {
        serde_json::to_value(value)
            .map(Self::from_json)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Deserialize a plain-data node into `T`.
    ///
    /// # Errors
    ///
    /// Fails if the node is not plain data or does not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> CodecResult<T> {
        serde_json::from_value(self.to_json()?).map_err(|e| CodecError::schema(e.to_string()))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(element),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Self::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Element(a), Self::Element(b)) => a == b,
            (Self::ClientRef(a), Self::ClientRef(b)) => a == b,
            (Self::ServerRef(a), Self::ServerRef(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(Box::new(element))
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for Node {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<Vec<Self>> for Node {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<ClientReference> for Node {
    fn from(value: ClientReference) -> Self {
        Self::ClientRef(value)
    }
}

impl From<ServerReference> for Node {
    fn from(value: ServerReference) -> Self {
        Self::ServerRef(value)
    }
}

impl From<Deferred> for Node {
    fn from(value: Deferred) -> Self {
        Self::Deferred(value)
    }
}

impl From<RouteError> for Node {
    fn from(value: RouteError) -> Self {
        Self::Error(value)
    }
}
