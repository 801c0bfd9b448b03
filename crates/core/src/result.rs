//! Result alias and Railway-style extension traits.
//!
//! Provides logged fallbacks and tap combinators so call sites can stay free of
//! unwrap/expect while still recording what went wrong.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for arbor-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logged combinators for any `Result`.
pub trait ResultExt<T, E> {
    /// Convert to an Option, logging the error at warn level if present.
    fn into_option_logged(self, context: &str) -> Option<T>;

    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, default: T, context: &str) -> T;

    /// Perform a side effect on the Err value without consuming the Result.
    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self;

    /// Perform a side effect on the Ok value without consuming the Result.
    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self;
}

impl<T, E: Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{context}: {e}");
                None
            }
        }
    }

    fn or_default_logged(self, default: T, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("{context}, using default: {e}");
                default
            }
        }
    }

    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }

    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self {
        if let Ok(ref v) = self {
            f(v);
        }
        self
    }
}

/// Extension trait for Option types.
pub trait OptionExt<T> {
    /// Tap into None without consuming the Option.
    fn tap_none<F: FnOnce()>(self, f: F) -> Self;
}

impl<T> OptionExt<T> for Option<T> {
    fn tap_none<F: FnOnce()>(self, f: F) -> Self {
        if self.is_none() {
            f();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_option_logged() {
        let ok: std::result::Result<i32, String> = Ok(42);
        assert_eq!(ok.into_option_logged("reading"), Some(42));

        let err: std::result::Result<i32, String> = Err("nope".into());
        assert_eq!(err.into_option_logged("reading"), None);
    }

    #[test]
    fn test_or_default_logged() {
        let err: std::result::Result<i32, String> = Err("nope".into());
        assert_eq!(err.or_default_logged(99, "reading"), 99);
    }

    #[test]
    fn test_tap_err_and_tap_ok() {
        let mut observed = String::new();
        let err: std::result::Result<i32, &str> = Err("failed");
        let _ = err.tap_err(|e| observed = (*e).to_string());
        assert_eq!(observed, "failed");

        let mut seen = 0;
        let ok: std::result::Result<i32, &str> = Ok(7);
        let _ = ok.tap_ok(|v| seen = *v);
        assert_eq!(seen, 7);
    }

    #[test]
    fn test_tap_none() {
        let mut called = false;
        let opt: Option<i32> = None;
        let _ = opt.tap_none(|| called = true);
        assert!(called);
    }
}
