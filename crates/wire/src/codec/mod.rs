//! Streaming encode/decode of [`Node`](crate::Node) graphs.

mod decode;
mod encode;

use arbor_core::RouteError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use decode::{decode, decode_str};
pub use encode::{encode, encode_to_string};

const ELEMENT_TAG: &str = "$E";
const FRAGMENT_TAG: &str = "$F";
const OUTLET_TAG: &str = "$O";
const CLIENT_REF_KEY: &str = "$C";
const SERVER_REF_KEY: &str = "$S";
const ERROR_KEY: &str = "$X";
const DEFERRED_PREFIX: &str = "$@";

/// Message used for redacted errors when no custom message is configured.
pub const REDACTED_MESSAGE: &str =
    "An error occurred while rendering on the server. Details are omitted in this mode.";

/// Whether error details may cross the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RedactSetting", into = "RedactSetting")]
pub enum RedactErrors {
    #[default]
    Off,
    On,
    /// Redact, replacing messages with this text.
    Message(String),
}

/// Config-file shape: `redact_errors = true` or `redact_errors = "text"`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RedactSetting {
    Flag(bool),
    Message(String),
}

impl From<RedactSetting> for RedactErrors {
    fn from(value: RedactSetting) -> Self {
        match value {
            RedactSetting::Flag(false) => Self::Off,
            RedactSetting::Flag(true) => Self::On,
            RedactSetting::Message(message) => Self::Message(message),
        }
    }
}

impl From<RedactErrors> for RedactSetting {
    fn from(value: RedactErrors) -> Self {
        match value {
            RedactErrors::Off => Self::Flag(false),
            RedactErrors::On => Self::Flag(true),
            RedactErrors::Message(message) => Self::Message(message),
        }
    }
}

impl RedactErrors {
    /// Apply the redaction policy to an error about to be serialized.
    ///
    /// Explicit error responses keep their message and data since the route
    /// chose to expose them; stacks never survive redaction.
    #[must_use]
    pub fn apply(&self, error: &RouteError) -> RouteError {
        let message = match self {
            Self::Off => return error.clone(),
            Self::On => REDACTED_MESSAGE,
            Self::Message(message) => message.as_str(),
        };

        if error.is_response {
            return RouteError {
                stack: None,
                ..error.clone()
            };
        }

        RouteError {
            status: error.status,
            message: message.to_string(),
            is_response: false,
            data: None,
            stack: None,
            digest: Some(error.digest.clone().unwrap_or_else(|| digest(&error.message))),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Stable short digest so redacted errors can be matched to server logs.
fn digest(message: &str) -> String {
    Sha256::digest(message.as_bytes())
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Options for [`encode`].
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub redact_errors: RedactErrors,
}

impl EncodeOptions {
    #[must_use]
    pub const fn redacted(redact_errors: RedactErrors) -> Self {
        Self { redact_errors }
    }
}

fn escape(s: &str) -> String {
    if s.starts_with('$') {
        format!("${s}")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_redaction_off_keeps_everything() {
        let error = RouteError::new("db down").with_stack("at loader");
        assert_eq!(RedactErrors::Off.apply(&error), error);
    }

    #[test]
    fn test_redaction_drops_message_and_stack() {
        let error = RouteError::new("db down").with_stack("at loader");
        let redacted = RedactErrors::On.apply(&error);

        assert_eq!(redacted.message, REDACTED_MESSAGE);
        assert_eq!(redacted.stack, None);
        assert_eq!(redacted.status, 500);
        assert_eq!(redacted.digest.as_deref().map(str::len), Some(16));
        // Same message, same digest.
        assert_eq!(RedactErrors::On.apply(&error).digest, redacted.digest);
    }

    #[test]
    fn test_redaction_with_custom_message() {
        let redacted = RedactErrors::Message("nope".into()).apply(&RouteError::new("secret"));
        assert_eq!(redacted.message, "nope");
    }

    #[test]
    fn test_redaction_keeps_error_responses() {
        let error = RouteError::not_found("no product 7").with_stack("trace");
        let redacted = RedactErrors::On.apply(&error);
        assert_eq!(redacted.message, "no product 7");
        assert_eq!(redacted.stack, None);
    }

    #[test]
    fn test_redact_setting_deserializes_flag_or_message() {
        #[derive(Deserialize)]
        struct Config {
            redact_errors: RedactErrors,
        }

        let on: Config = serde_json::from_str(r#"{"redact_errors": true}"#).unwrap();
        assert_eq!(on.redact_errors, RedactErrors::On);

        let custom: Config = serde_json::from_str(r#"{"redact_errors": "hidden"}"#).unwrap();
        assert_eq!(custom.redact_errors, RedactErrors::Message("hidden".into()));
    }
}
