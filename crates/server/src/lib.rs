//! Arbor server.
//!
//! Matches a request against the route tree, runs the matched routes' data
//! functions, renders each route's element and streams the result to the
//! client as an encoded [`ServerPayload`](arbor_wire::ServerPayload).
//!
//! ```text
//! request ─▶ PayloadRequest ─▶ match ─▶ resolve modules ─▶ query ─▶ render ─▶ encode
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app;
pub mod config;
pub mod document;
pub mod error;
pub mod module;
pub mod query;
pub mod registry;
pub mod render;
pub mod request;
pub mod server_functions;

pub use app::{App, AppBuilder};
pub use config::ServerConfig;
pub use document::DocumentShell;
pub use error::{Result, ServerError};
pub use module::{ComponentProps, DataArgs, ErrorProps, MatchData, RouteModule, Thrown, ThrownResponse};
pub use query::{QueryContext, QueryOutcome, ResolvedMatch, query};
pub use registry::{ModuleRegistry, RegistryBuilder};
pub use render::{build_manifest, compose_route_element, render_routes};
pub use request::{ACTION_HEADER, DATA_SUFFIX, PayloadRequest, ROUTE_PARAM, ResponseKind};
pub use server_functions::{ServerFn, ServerFunctions, call_arguments};
