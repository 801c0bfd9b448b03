use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use arbor_core::RouteError;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{
    CLIENT_REF_KEY, DEFERRED_PREFIX, ELEMENT_TAG, ERROR_KEY, FRAGMENT_TAG, OUTLET_TAG,
    SERVER_REF_KEY,
};
use crate::deferred::Deferred;
use crate::error::{CodecError, CodecResult};
use crate::node::{Element, ElementKind, Node};
use crate::reference::{ClientReference, ServerReference};

type Slot = oneshot::Sender<Result<Node, RouteError>>;

/// One `<id>:<payload>` line.
struct Row {
    id: u64,
    is_error: bool,
    body: Value,
}

/// Splits a byte stream into rows. Chunk boundaries may fall anywhere.
struct RowReader<S> {
    stream: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S, E> RowReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    const fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            done: false,
        }
    }

    async fn next_row(&mut self) -> CodecResult<Option<Row>> {
        loop {
            if let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=end).collect();
                let line = line.strip_suffix(b"\n").unwrap_or(&line);
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return parse_row(line).map(Some);
            }

            if self.done {
                if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                return parse_row(&line).map(Some);
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(CodecError::Stream(e.to_string())),
                None => self.done = true,
            }
        }
    }
}

fn parse_row(line: &[u8]) -> CodecResult<Row> {
    let text = std::str::from_utf8(line)
        .map_err(|e| CodecError::malformed_row(format!("row is not utf-8: {e}")))?;
    let (id, rest) = text
        .split_once(':')
        .ok_or_else(|| CodecError::malformed_row(format!("missing row id in {text:?}")))?;
    let id = u64::from_str_radix(id.trim(), 16)
        .map_err(|_| CodecError::malformed_row(format!("invalid row id {id:?}")))?;
    let (is_error, json) = rest.strip_prefix('E').map_or((false, rest), |json| (true, json));
    let body = serde_json::from_str(json)
        .map_err(|e| CodecError::malformed_row(format!("row {id:x}: {e}")))?;

    Ok(Row { id, is_error, body })
}

/// Converts row JSON into nodes, opening a slot for every deferred marker.
#[derive(Default)]
struct Resolver {
    slots: HashMap<u64, Slot>,
}

impl Resolver {
    fn node(&mut self, value: Value) -> CodecResult<Node> {
        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => self.string(s)?,
            Value::Array(items) => self.array(items)?,
            Value::Object(map) => self.object(map)?,
        })
    }

    fn string(&mut self, s: String) -> CodecResult<Node> {
        if !s.starts_with('$') {
            return Ok(Node::String(s));
        }
        if let Some(escaped) = s.strip_prefix("$$") {
            return Ok(Node::String(format!("${escaped}")));
        }
        if let Some(hex) = s.strip_prefix(DEFERRED_PREFIX) {
            let id = u64::from_str_radix(hex, 16)
                .map_err(|_| CodecError::InvalidReference(s.clone()))?;
            if id == 0 || self.slots.contains_key(&id) {
                return Err(CodecError::InvalidReference(s));
            }
            let (tx, rx) = oneshot::channel();
            self.slots.insert(id, tx);
            return Ok(Deferred::from_receiver(id, rx).into());
        }
        Err(CodecError::InvalidReference(s))
    }

    fn array(&mut self, items: Vec<Value>) -> CodecResult<Node> {
        if items.first().and_then(Value::as_str) == Some(ELEMENT_TAG) {
            return self.element(items).map(Node::from);
        }
        items
            .into_iter()
            .map(|item| self.node(item))
            .collect::<CodecResult<Vec<_>>>()
            .map(Node::Array)
    }

    fn element(&mut self, items: Vec<Value>) -> CodecResult<Element> {
        let [_, kind, key, props, children]: [Value; 5] = items
            .try_into()
            .map_err(|_| CodecError::malformed_row("element must have five entries"))?;

        let kind = match kind {
            Value::String(tag) if tag == FRAGMENT_TAG => ElementKind::Fragment,
            Value::String(tag) if tag == OUTLET_TAG => ElementKind::Outlet,
            Value::String(tag) => match self.string(tag)? {
                Node::String(tag) => ElementKind::Intrinsic(tag),
                _ => return Err(CodecError::malformed_row("element tag must be a string")),
            },
            Value::Object(mut map) => match map.remove(CLIENT_REF_KEY) {
                Some(reference) if map.is_empty() => ElementKind::Component(client_reference(reference)?),
                _ => return Err(CodecError::malformed_row("element kind object must be a client reference")),
            },
            other => {
                return Err(CodecError::malformed_row(format!("invalid element kind {other}")));
            }
        };

        let key = match key {
            Value::Null => None,
            Value::String(key) => Some(key),
            other => return Err(CodecError::malformed_row(format!("invalid element key {other}"))),
        };

        let Value::Object(props) = props else {
            return Err(CodecError::malformed_row("element props must be an object"));
        };
        let props = self.entries(props)?;

        let Value::Array(children) = children else {
            return Err(CodecError::malformed_row("element children must be an array"));
        };
        let children = children
            .into_iter()
            .map(|child| self.node(child))
            .collect::<CodecResult<Vec<_>>>()?;

        Ok(Element {
            kind,
            key,
            props,
            children,
        })
    }

    fn object(&mut self, mut map: Map<String, Value>) -> CodecResult<Node> {
        if map.len() == 1 {
            if let Some(reference) = map.remove(CLIENT_REF_KEY) {
                return client_reference(reference).map(Node::ClientRef);
            }
            if let Some(reference) = map.remove(SERVER_REF_KEY) {
                return serde_json::from_value::<ServerReference>(reference)
                    .map(Node::ServerRef)
                    .map_err(|e| CodecError::InvalidReference(format!("server reference: {e}")));
            }
            if let Some(error) = map.remove(ERROR_KEY) {
                return route_error(error).map(Node::Error);
            }
        }
        self.entries(map).map(Node::Object)
    }

    fn entries(&mut self, map: Map<String, Value>) -> CodecResult<BTreeMap<String, Node>> {
        map.into_iter()
            .map(|(key, value)| {
                let key = match key.strip_prefix('$') {
                    Some(rest) if rest.starts_with('$') => rest.to_string(),
                    Some(_) => return Err(CodecError::InvalidReference(key)),
                    None => key,
                };
                Ok((key, self.node(value)?))
            })
            .collect()
    }
}

fn client_reference(value: Value) -> CodecResult<ClientReference> {
    serde_json::from_value(value)
        .map_err(|e| CodecError::InvalidReference(format!("client reference: {e}")))
}

fn route_error(value: Value) -> CodecResult<RouteError> {
    serde_json::from_value(value).map_err(|e| CodecError::malformed_row(format!("error row: {e}")))
}

/// Fill slots as their rows arrive. Slots never reached reject when dropped.
async fn pump<S, E>(mut reader: RowReader<S>, mut resolver: Resolver)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    while !resolver.slots.is_empty() {
        let row = match reader.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, pending = resolver.slots.len(), "payload stream failed");
                break;
            }
        };

        let Some(slot) = resolver.slots.remove(&row.id) else {
            warn!(row = row.id, "ignoring row with no pending reference");
            continue;
        };

        let outcome = if row.is_error {
            match route_error(row.body) {
                Ok(error) => Err(error),
                Err(e) => Err(RouteError::new(e.to_string())),
            }
        } else {
            resolver
                .node(row.body)
                .map_err(|e| RouteError::new(e.to_string()))
        };

        // The receiver may be gone if every clone of the deferred was dropped.
        let _ = slot.send(outcome);
    }

    if !resolver.slots.is_empty() {
        debug!(pending = resolver.slots.len(), "payload stream ended with unresolved rows");
    }
}

/// Decode a row stream into a node graph.
///
/// Returns once the root row is read. Deferred values in the graph resolve
/// as the remaining rows arrive, which happens on a spawned task.
///
/// # Errors
///
/// Fails if the first row is missing or is not row 0, if a row is malformed,
/// or if the root row is an error row.
pub async fn decode<S, E>(stream: S) -> CodecResult<Node>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut reader = RowReader::new(stream.boxed());
    let row = reader.next_row().await?.ok_or(CodecError::MissingRoot)?;
    if row.id != 0 {
        return Err(CodecError::UnexpectedRow {
            expected: 0,
            found: row.id,
        });
    }
    if row.is_error {
        return Err(CodecError::RootError(route_error(row.body)?));
    }

    let mut resolver = Resolver::default();
    let root = resolver.node(row.body)?;

    if !resolver.slots.is_empty() {
        tokio::spawn(pump(reader, resolver));
    }
    Ok(root)
}

/// Decode a fully buffered payload.
///
/// # Errors
///
/// See [`decode`].
pub async fn decode_str(text: &str) -> CodecResult<Node> {
    let bytes = Bytes::copy_from_slice(text.as_bytes());
    decode(stream::iter([Ok::<_, std::convert::Infallible>(bytes)])).await
}
