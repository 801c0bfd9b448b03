//! Codec errors.
//!
//! Every variant is a protocol error: fatal to the request or navigation that
//! produced it, never silently recovered.

use arbor_core::RouteError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("payload stream ended before the root row")]
    MissingRoot,

    #[error("expected row {expected:x}, found row {found:x}")]
    UnexpectedRow { expected: u64, found: u64 },

    #[error("malformed row: {reason}")]
    MalformedRow { reason: String },

    #[error("invalid reference '{0}'")]
    InvalidReference(String),

    #[error("payload stream failed: {0}")]
    Stream(String),

    #[error("root row carried an error: {0}")]
    RootError(RouteError),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("payload schema mismatch: {0}")]
    Schema(String),

    #[error("value is not plain data: {0}")]
    NotData(String),
}

impl CodecError {
    pub fn malformed_row(reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            reason: reason.into(),
        }
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema(reason.into())
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
