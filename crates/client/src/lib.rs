//! Arbor client router.
//!
//! Keeps the last known output of every route, decides per navigation which
//! routes must go back to the server, and grows its route tree lazily as the
//! user visits new paths.
//!
//! ```text
//! navigate ─▶ patch tree ─▶ match ─▶ plan per route ─▶ one shared call ─▶ commit
//!                                     (cache | client hook | server)
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod location;
pub mod patcher;
pub mod server_call;
pub mod session;
pub mod strategy;
pub mod transport;
pub mod view;

pub use cache::{CacheEntry, CacheKey, CacheLookup, CachedRoute, RouteCache, RouteHooks};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use hooks::{
    ClientActionArgs, ClientActionFn, ClientLoaderArgs, ClientLoaderFn, ClientModules, ServerValue,
    ShouldRevalidateArgs, ShouldRevalidateFn, Submission,
};
pub use location::{Location, data_url};
pub use patcher::{PatchedPaths, RoutePatcher, RouteTree};
pub use server_call::{EventId, InFlight, InFlightGuard, ServerCall};
pub use session::{ClientSession, RouterState, SessionBuilder};
pub use strategy::{DataStrategy, FetchOutcome, MutateOutcome, ReadOptions, ReadOutcome};
pub use transport::{HttpTransport, TowerTransport, Transport, TransportRequest, TransportResponse};
pub use view::compose_route_view;
