//! Values that settle after the payload's first row.
//!
//! The encoder gives each pending [`Deferred`] its own row id and writes the
//! row once the value resolves; the decoder hands out a `Deferred` that
//! completes when that row arrives.

use std::fmt;
use std::future::Future;

use arbor_core::RouteError;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::node::Node;

type SharedValue = Shared<BoxFuture<'static, Result<Node, RouteError>>>;

/// A value that resolves after the initial payload row.
///
/// Cloning is cheap and every clone observes the same outcome. Awaiting one
/// deferred never blocks on another.
#[derive(Clone)]
pub struct Deferred {
    inner: SharedValue,
}

impl Deferred {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Node, RouteError>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    pub fn resolved(node: Node) -> Self {
        Self::new(futures::future::ready(Ok(node)))
    }

    pub fn rejected(error: RouteError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// Decoder side: completes when the row for this value arrives.
    pub(crate) fn from_receiver(id: u64, receiver: oneshot::Receiver<Result<Node, RouteError>>) -> Self {
        Self::new(async move {
            receiver.await.unwrap_or_else(|_| {
                Err(RouteError::new(format!(
                    "payload stream closed before row {id:x} resolved"
                )))
            })
        })
    }

    /// Wait for the value.
    ///
    /// # Errors
    ///
    /// Returns the route error the value was rejected with.
    pub async fn resolve(&self) -> Result<Node, RouteError> {
        self.inner.clone().await
    }

    /// The outcome, if it is already available.
    #[must_use]
    pub fn peek(&self) -> Option<Result<Node, RouteError>> {
        self.inner.peek().cloned()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

/// Two deferred values are equal if they are the same value or have settled
/// to equal outcomes. Pending values only equal themselves.
impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || matches!((self.peek(), other.peek()), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(Ok(node)) => f.debug_tuple("Deferred").field(&node).finish(),
            Some(Err(error)) => f.debug_tuple("Deferred").field(&error).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}
