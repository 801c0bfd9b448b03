//! Core types shared by the arbor server and client.
//!
//! Route descriptors and their capability flags, the path matcher, and the
//! route-level error type that crosses the wire. Everything here is plain data
//! with no async or transport concerns.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod matcher;
pub mod result;
pub mod route;

pub use error::{Error, RouteError};
pub use matcher::{Matched, RouteMatch, match_or_root, match_routes, strip_basename};
pub use result::{OptionExt, Result, ResultExt};
pub use route::{
    Capabilities, Params, RouteDescriptor, RouteId, find_route, insert_route, validate_route_ids,
};
