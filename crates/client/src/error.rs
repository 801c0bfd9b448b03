//! Client errors.
//!
//! These abort a navigation or fetch. Errors raised by route data (a failed
//! loader, a client hook returning an error) are not here: they are attached
//! to the route's error boundary and the navigation still completes.

use arbor_core::RouteId;
use arbor_wire::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors are `Clone` so one shared server call can hand the same failure to
/// every route waiting on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("transport failed: {reason}")]
    Transport { reason: String },

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("expected a {expected} payload, got {found}")]
    UnexpectedPayload {
        expected: &'static str,
        found: &'static str,
    },

    #[error("no route matches '{0}'")]
    NoMatch(String),

    #[error("route '{route_id}' is not matched by '{url}'")]
    UnknownRoute { route_id: RouteId, url: String },

    #[error("route '{route_id}' has no client action to handle a {method} fetch")]
    FetcherUnsupported { route_id: RouteId, method: String },

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("navigation {0} was aborted")]
    Aborted(u64),

    #[error("navigation {event} was superseded by navigation {latest}")]
    Superseded { event: u64, latest: u64 },

    #[error("route tree error: {0}")]
    Route(#[from] arbor_core::Error),
}

impl ClientError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub const fn unexpected_payload(expected: &'static str, found: &'static str) -> Self {
        Self::UnexpectedPayload { expected, found }
    }

    /// The navigation did not fail, it was replaced or cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Aborted(_) | Self::Superseded { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::transport(error.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(error: url::ParseError) -> Self {
        Self::invalid_url("", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_failure() {
        assert!(ClientError::Aborted(3).is_cancelled());
        assert!(ClientError::Superseded { event: 1, latest: 2 }.is_cancelled());
        assert!(!ClientError::transport("reset").is_cancelled());
    }

    #[test]
    fn test_display() {
        let error = ClientError::unexpected_payload("render", "fetcher");
        assert_eq!(error.to_string(), "expected a render payload, got fetcher");
    }
}
