//! Core error types.
//!
//! [`Error`] covers route-tree construction problems. [`RouteError`] is the
//! data error a loader or action raises; it is contained per route and rendered
//! by the nearest error boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::route::RouteId;

/// Route-tree errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(RouteId),

    #[error("route '{route}' names unknown parent '{parent}'")]
    UnknownParent { parent: RouteId, route: RouteId },

    #[error("unknown route '{0}'")]
    UnknownRoute(RouteId),
}

impl Error {
    /// Create an unknown-parent error.
    pub const fn unknown_parent(parent: RouteId, route: RouteId) -> Self {
        Self::UnknownParent { parent, route }
    }
}

/// Error raised by a route's data function.
///
/// `is_response` distinguishes an explicitly thrown response (a 404 for a
/// missing record, say) from an unexpected failure, which always maps to 500.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{status}: {message}")]
pub struct RouteError {
    pub status: u16,
    pub message: String,
    #[serde(default)]
    pub is_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl RouteError {
    /// An unexpected failure (status 500).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
            is_response: false,
            data: None,
            stack: None,
            digest: None,
        }
    }

    /// An explicit error response with its own status.
    pub fn response(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            is_response: true,
            ..Self::new(message)
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::response(404, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::response(405, message)
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_error_display_messages() {
        assert_eq!(
            Error::DuplicateRouteId(RouteId::from("root")).to_string(),
            "duplicate route id 'root'"
        );
        assert_eq!(
            Error::unknown_parent(RouteId::from("p"), RouteId::from("c")).to_string(),
            "route 'c' names unknown parent 'p'"
        );
    }

    #[test]
    fn test_route_error_constructors() {
        let failure = RouteError::new("boom");
        assert_eq!(failure.status, 500);
        assert!(!failure.is_response);

        let missing = RouteError::not_found("no such product");
        assert_eq!(missing.status, 404);
        assert!(missing.is_response);
        assert_eq!(missing.to_string(), "404: no such product");
    }

    #[test]
    fn test_route_error_serde_skips_empty_fields() {
        let json = serde_json::to_value(RouteError::new("boom")).unwrap();
        assert!(json.get("stack").is_none());
        assert!(json.get("digest").is_none());
        assert_eq!(json["isResponse"], false);

        let back: RouteError = serde_json::from_value(json).unwrap();
        assert_eq!(back, RouteError::new("boom"));
    }
}
