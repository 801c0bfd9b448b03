//! Loading the server configuration from TOML with command-line overrides.

use std::path::{Path, PathBuf};

use arbor_server::ServerConfig;
use arbor_wire::RedactErrors;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Read `path`, or return the defaults when no file is given.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or is not a valid
/// server config.
pub fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let Some(path) = path else {
        debug!("no config file given, using defaults");
        return Ok(ServerConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Settings given on the command line. They win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub basename: Option<String>,
    pub redact_errors: Option<RedactErrors>,
}

impl Overrides {
    #[must_use]
    pub fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(bind_address) = self.bind_address {
            config.bind_address = bind_address;
        }
        if let Some(basename) = self.basename {
            config.basename = Some(basename);
        }
        if let Some(redact_errors) = self.redact_errors {
            config.redact_errors = redact_errors;
        }
        config
    }
}

/// `off`, `on`, or any other text to use as the replacement message.
///
/// # Errors
///
/// Rejects an empty value.
pub fn parse_redact_errors(value: &str) -> Result<RedactErrors, String> {
    match value.trim() {
        "" => Err("expected off, on, or a replacement message".to_string()),
        "off" | "false" => Ok(RedactErrors::Off),
        "on" | "true" => Ok(RedactErrors::On),
        message => Ok(RedactErrors::Message(message.to_string())),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_file_with_partial_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind_address = \"0.0.0.0:8080\"\nredact_errors = \"Something went wrong\"\nassets = [\"entry.js\"]"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.redact_errors, RedactErrors::Message("Something went wrong".into()));
        assert_eq!(config.entry_module(), "entry.js");
        assert_eq!(config.basename, None);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let missing = load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_address = [").unwrap();
        assert!(matches!(load(Some(file.path())), Err(ConfigError::Parse { .. })));

        assert_eq!(load(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_overrides_win() {
        let config = Overrides {
            bind_address: Some("127.0.0.1:9999".into()),
            basename: None,
            redact_errors: Some(RedactErrors::On),
        }
        .apply(ServerConfig {
            basename: Some("/shop".into()),
            ..ServerConfig::default()
        });
        assert_eq!(config.bind_address, "127.0.0.1:9999");
        assert_eq!(config.basename.as_deref(), Some("/shop"));
        assert_eq!(config.redact_errors, RedactErrors::On);
    }

    #[test]
    fn test_parse_redact_errors() {
        assert_eq!(parse_redact_errors("off"), Ok(RedactErrors::Off));
        assert_eq!(parse_redact_errors("on"), Ok(RedactErrors::On));
        assert_eq!(
            parse_redact_errors("Oops"),
            Ok(RedactErrors::Message("Oops".into()))
        );
        assert!(parse_redact_errors("  ").is_err());
    }
}
