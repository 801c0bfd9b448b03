//! Server errors.
//!
//! Route-data errors never appear here: they are captured per route and
//! rendered by an error boundary. Everything below aborts the request.

use arbor_core::{RouteError, RouteId};
use arbor_wire::CodecError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A data function threw a redirect without a valid status or `Location`.
    #[error("invalid redirect response (status {status}, location {location:?})")]
    InvalidRedirect {
        status: u16,
        location: Option<String>,
    },

    #[error("unhandled error in route '{route_id}' with no error boundary above it: {error}")]
    UnhandledRouteError { route_id: RouteId, error: RouteError },

    #[error("failed to resolve module for route '{route_id}': {reason}")]
    Module { route_id: RouteId, reason: String },

    #[error("route '{0}' has no module")]
    MissingModule(RouteId),

    #[error("application has no routes")]
    NoRoutes,

    #[error("fetcher targets route '{0}' which is not matched by this URL")]
    UnknownFetcherRoute(RouteId),

    #[error("unknown server function '{0}'")]
    UnknownServerFunction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("route tree error: {0}")]
    Route(#[from] arbor_core::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl ServerError {
    pub const fn invalid_redirect(status: u16, location: Option<String>) -> Self {
        Self::InvalidRedirect { status, location }
    }

    pub fn module(route_id: RouteId, reason: impl Into<String>) -> Self {
        Self::Module {
            route_id,
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownFetcherRoute(_) | Self::UnknownServerFunction(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::Codec(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRedirect { .. }
            | Self::UnhandledRouteError { .. }
            | Self::Module { .. }
            | Self::MissingModule(_)
            | Self::NoRoutes
            | Self::Route(_)
            | Self::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
