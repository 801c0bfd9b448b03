//! Arbor wire codec.
//!
//! A streaming value codec shared by the server and the client. Values form a
//! graph ([`Node`]) that can carry UI elements, client references (code the
//! client loads lazily), server references (functions the client can call
//! back), route errors and deferred values that resolve after the first row.
//!
//! # Protocol
//!
//! The stream is a sequence of newline-terminated rows:
//!
//! ```text
//! <hex id>:<json>\n      resolved value
//! <hex id>:E<json>\n     rejected value (a route error)
//! ```
//!
//! Row `0` is the root and always comes first. A deferred value is written as
//! the string `"$@<hex id>"` and its row follows whenever the value resolves,
//! so slow leaves never hold back fast ones. Strings and object keys that
//! begin with `$` are escaped by doubling the `$`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod codec;
mod deferred;
mod error;
mod node;
pub mod payload;
mod reference;

pub use codec::{EncodeOptions, RedactErrors, decode, decode_str, encode, encode_to_string};
pub use deferred::Deferred;
pub use error::{CodecError, CodecResult};
pub use node::{Element, ElementKind, Node};
pub use payload::{
    ActionPayload, AssetsManifest, CONTENT_TYPE, EntryAssets, FetcherPayload, ManifestRoute,
    RedirectPayload, RenderPayload, RenderedRoute, RenderedTreeNode, RouteElement, RouteMeta,
    ServerPayload,
};
pub use reference::{ClientReference, ServerReference};
