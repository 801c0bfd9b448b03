//! # Arbor
//!
//! Server-computed route trees streamed to a caching, self-patching client
//! router.
//!
//! This crate re-exports the workspace crates and carries the pieces the
//! `arbor` binary needs: command-line parsing, config loading and the demo
//! application.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub use arbor_client;
pub use arbor_core;
pub use arbor_server;
pub use arbor_wire;

pub mod cli;
pub mod config;
pub mod demo;
