//! Functions the client may call remotely through a server reference.

use std::future::Future;
use std::sync::Arc;

use arbor_core::RouteError;
use arbor_wire::{Deferred, Node, ServerReference};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::error::{Result, ServerError};

pub type ServerFn = Arc<dyn Fn(Vec<Node>) -> BoxFuture<'static, std::result::Result<Node, RouteError>> + Send + Sync>;

/// Registry of callable server functions, keyed by reference id.
#[derive(Clone, Default)]
pub struct ServerFunctions {
    functions: Arc<DashMap<String, ServerFn>>,
}

impl ServerFunctions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `id` and return the reference to embed in payloads.
    pub fn register<F, Fut>(&self, id: impl Into<String>, f: F) -> ServerReference
    where
        F: Fn(Vec<Node>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Node, RouteError>> + Send + 'static,
    {
        let id = id.into();
        let function: ServerFn = Arc::new(move |args| f(args).boxed());
        self.functions.insert(id.clone(), function);
        ServerReference::new(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.functions.contains_key(id)
    }

    /// Start the call. The returned value settles with the function's result.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownServerFunction`] if nothing is registered under `id`.
    pub fn invoke(&self, id: &str, args: Vec<Node>) -> Result<Deferred> {
        let function = self
            .functions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServerError::UnknownServerFunction(id.to_string()))?;

        debug!(function = id, args = args.len(), "invoking server function");
        Ok(Deferred::new(function(args)))
    }
}

/// The argument list of a call body: an array root, or a single value.
#[must_use]
pub fn call_arguments(root: Node) -> Vec<Node> {
    match root {
        Node::Array(args) => args,
        Node::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let functions = ServerFunctions::new();
        let reference = functions.register("math#add", |args: Vec<Node>| async move {
            let sum: i64 = args.iter().filter_map(Node::as_i64).sum();
            Ok(Node::from(sum))
        });
        assert_eq!(reference.id, "math#add");
        assert!(functions.contains("math#add"));

        let result = functions
            .invoke("math#add", vec![Node::from(2_i64), Node::from(3_i64)])
            .unwrap();
        assert_eq!(result.resolve().await.unwrap(), Node::from(5_i64));
    }

    #[test]
    fn test_unknown_function() {
        let error = ServerFunctions::new().invoke("nope", Vec::new()).unwrap_err();
        assert!(matches!(error, ServerError::UnknownServerFunction(id) if id == "nope"));
    }

    #[test]
    fn test_call_arguments() {
        assert_eq!(call_arguments(Node::Null), Vec::<Node>::new());
        assert_eq!(call_arguments(Node::from("x")), vec![Node::from("x")]);
        assert_eq!(
            call_arguments(Node::Array(vec![Node::from(1_i64)])),
            vec![Node::from(1_i64)]
        );
    }
}
