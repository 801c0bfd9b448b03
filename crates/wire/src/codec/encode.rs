use arbor_core::RouteError;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, FuturesUnordered, StreamExt};
use serde_json::{Map, Value, json};

use super::{
    CLIENT_REF_KEY, DEFERRED_PREFIX, ELEMENT_TAG, ERROR_KEY, EncodeOptions, FRAGMENT_TAG,
    OUTLET_TAG, RedactErrors, SERVER_REF_KEY, escape,
};
use crate::error::{CodecError, CodecResult};
use crate::node::{Element, ElementKind, Node};
use crate::reference::{ClientReference, ServerReference};

type PendingRow = BoxFuture<'static, (u64, Result<Node, RouteError>)>;

struct Encoder {
    next_id: u64,
    pending: FuturesUnordered<PendingRow>,
    redact: RedactErrors,
}

impl Encoder {
    fn new(options: EncodeOptions) -> Self {
        Self {
            next_id: 1,
            pending: FuturesUnordered::new(),
            redact: options.redact_errors,
        }
    }

    fn row(&mut self, id: u64, outcome: &Result<Node, RouteError>) -> CodecResult<Bytes> {
        let (marker, value) = match outcome {
            Ok(node) => ("", self.value(node)),
            Err(error) => ("E", self.error(error)),
        };
        let text = serde_json::to_string(&value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(format!("{id:x}:{marker}{text}\n")))
    }

    fn value(&mut self, node: &Node) -> Value {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(escape(s)),
            Node::Array(items) => Value::Array(items.iter().map(|item| self.value(item)).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (escape(key), self.value(value)))
                    .collect(),
            ),
            Node::Element(element) => self.element(element),
            Node::ClientRef(reference) => client_reference(reference),
            Node::ServerRef(reference) => server_reference(reference),
            Node::Deferred(deferred) => {
                let id = self.next_id;
                self.next_id = self.next_id.saturating_add(1);
                let deferred = deferred.clone();
                self.pending
                    .push(async move { (id, deferred.resolve().await) }.boxed());
                Value::String(format!("{DEFERRED_PREFIX}{id:x}"))
            }
            Node::Error(error) => {
                let mut object = Map::new();
                object.insert(ERROR_KEY.to_string(), self.error(error));
                Value::Object(object)
            }
        }
    }

    fn element(&mut self, element: &Element) -> Value {
        let kind = match &element.kind {
            ElementKind::Intrinsic(tag) => Value::String(escape(tag)),
            ElementKind::Component(reference) => client_reference(reference),
            ElementKind::Fragment => Value::String(FRAGMENT_TAG.to_string()),
            ElementKind::Outlet => Value::String(OUTLET_TAG.to_string()),
        };
        let key = element.key.clone().map_or(Value::Null, Value::String);
        let props: Map<String, Value> = element
            .props
            .iter()
            .map(|(name, value)| (escape(name), self.value(value)))
            .collect();
        let children: Vec<Value> = element.children.iter().map(|c| self.value(c)).collect();

        json!([ELEMENT_TAG, kind, key, props, children])
    }

    fn error(&self, error: &RouteError) -> Value {
        let error = self.redact.apply(error);
        serde_json::to_value(&error).unwrap_or_else(|_| json!({ "status": error.status }))
    }
}

fn client_reference(reference: &ClientReference) -> Value {
    json!({ CLIENT_REF_KEY: {
        "id": reference.id,
        "name": reference.name,
        "chunks": reference.chunks,
    }})
}

fn server_reference(reference: &ServerReference) -> Value {
    json!({ SERVER_REF_KEY: { "id": reference.id } })
}

/// Encode a node graph as a stream of rows.
///
/// The root row is produced immediately; each deferred value found anywhere
/// in the graph gets its own row, emitted in resolution order.
pub fn encode(root: Node, options: EncodeOptions) -> BoxStream<'static, CodecResult<Bytes>> {
    let mut encoder = Encoder::new(options);
    let head = encoder.row(0, &Ok(root));

    let tail = stream::unfold(encoder, |mut encoder| async move {
        let (id, outcome) = encoder.pending.next().await?;
        let row = encoder.row(id, &outcome);
        Some((row, encoder))
    });

    stream::once(async move { head }).chain(tail).boxed()
}

/// Encode a graph and collect every row, waiting for all deferred values.
///
/// # Errors
///
/// Returns the first encoding error.
pub async fn encode_to_string(root: Node, options: EncodeOptions) -> CodecResult<String> {
    let mut stream = encode(root, options);
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    String::from_utf8(out).map_err(|e| CodecError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;
    use crate::Deferred;

    #[tokio::test]
    async fn test_plain_root_is_single_row() {
        let text = encode_to_string(Node::object([("a", Node::from(1_i64))]), EncodeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "0:{\"a\":1}\n");
    }

    #[tokio::test]
    async fn test_dollar_strings_are_escaped() {
        let text = encode_to_string(Node::from("$money"), EncodeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "0:\"$$money\"\n");
    }

    #[tokio::test]
    async fn test_deferred_gets_its_own_row() {
        let root = Node::object([("later", Node::from(Deferred::resolved(Node::from("x"))))]);
        let text = encode_to_string(root, EncodeOptions::default()).await.unwrap();
        assert_eq!(text, "0:{\"later\":\"$@1\"}\n1:\"x\"\n");
    }

    #[tokio::test]
    async fn test_rejected_deferred_is_error_row() {
        let root = Node::from(Deferred::rejected(RouteError::new("secret").with_stack("trace")));
        let text = encode_to_string(root, EncodeOptions::redacted(RedactErrors::On))
            .await
            .unwrap();
        let error_row = text.lines().nth(1).unwrap();
        assert!(error_row.starts_with("1:E{"));
        assert!(!error_row.contains("secret"));
        assert!(!error_row.contains("trace"));
    }

    #[tokio::test]
    async fn test_element_encoding() {
        let element = Element::new("h1").key("title").prop("id", "main").child("Hi");
        let text = encode_to_string(element.into(), EncodeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "0:[\"$E\",\"h1\",\"title\",{\"id\":\"main\"},[\"Hi\"]]\n");
    }
}
