//! One server round trip shared by every route of a navigation event.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arbor_wire::ServerPayload;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, trace};

use crate::error::Result;
use crate::transport::{Transport, TransportRequest};

/// Identity of one navigation, submission or fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A lazily started, shared request.
///
/// Nothing is sent until the first clone is awaited; every clone then
/// observes the same outcome.
#[derive(Clone)]
pub struct ServerCall {
    event: EventId,
    url: Arc<str>,
    started: Arc<AtomicBool>,
    outcome: Shared<BoxFuture<'static, Result<Arc<ServerPayload>>>>,
}

impl fmt::Debug for ServerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCall")
            .field("event", &self.event)
            .field("url", &self.url)
            .field("started", &self.started())
            .finish_non_exhaustive()
    }
}

impl ServerCall {
    pub fn new(event: EventId, transport: Arc<dyn Transport>, request: TransportRequest) -> Self {
        let started = Arc::new(AtomicBool::new(false));
        let url: Arc<str> = request.url.as_str().into();
        let outcome = {
            let started = Arc::clone(&started);
            let url = Arc::clone(&url);
            async move {
                started.store(true, Ordering::SeqCst);
                debug!(%event, method = %request.method, url = %url, "calling server");
                let payload = transport.send(request).await?.payload().await?;
                trace!(%event, kind = payload.kind(), "server call settled");
                Ok(Arc::new(payload))
            }
            .boxed()
            .shared()
        };
        Self {
            event,
            url,
            started,
            outcome,
        }
    }

    /// A call whose payload is already known, such as one fetched while
    /// patching the route tree.
    #[must_use]
    pub fn settled(event: EventId, url: &str, payload: Arc<ServerPayload>) -> Self {
        Self {
            event,
            url: url.into(),
            started: Arc::new(AtomicBool::new(true)),
            outcome: futures::future::ready(Ok(payload)).boxed().shared(),
        }
    }

    #[must_use]
    pub const fn event(&self) -> EventId {
        self.event
    }

    /// Whether anything awaited the call, i.e. the request was sent.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Await the shared outcome, sending the request if nobody has yet.
    ///
    /// # Errors
    ///
    /// The transport or decode failure, identical for every caller.
    pub async fn payload(&self) -> Result<Arc<ServerPayload>> {
        self.outcome.clone().await
    }

    /// The outcome, if the call has settled.
    #[must_use]
    pub fn peek(&self) -> Option<Result<Arc<ServerPayload>>> {
        self.outcome.peek().cloned()
    }
}

/// Server calls in flight, keyed by event.
///
/// A call lives in the map from its creation until the [`InFlightGuard`] of
/// its event is dropped, which happens when the event completes or its future
/// is aborted.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    calls: Arc<DashMap<EventId, ServerCall>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `event`.
    #[must_use]
    pub fn track(&self, event: EventId) -> InFlightGuard {
        InFlightGuard {
            calls: Arc::clone(&self.calls),
            event,
        }
    }

    /// The call for `event`, created by `make` at most once.
    pub fn call(&self, event: EventId, make: impl FnOnce() -> ServerCall) -> ServerCall {
        self.calls.entry(event).or_insert_with(make).value().clone()
    }

    #[must_use]
    pub fn get(&self, event: EventId) -> Option<ServerCall> {
        self.calls.get(&event).map(|call| call.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Removes its event's call from the [`InFlight`] map when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    calls: Arc<DashMap<EventId, ServerCall>>,
    event: EventId,
}

impl InFlightGuard {
    #[must_use]
    pub const fn event(&self) -> EventId {
        self.event
    }

    /// Whether this event's call has been sent.
    #[must_use]
    pub fn reached_server(&self) -> bool {
        self.calls.get(&self.event).is_some_and(|call| call.started())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.calls.remove(&self.event).is_some() {
            trace!(event = %self.event, "released server call");
        }
    }
}
