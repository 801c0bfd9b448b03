//! CLI command definitions using clap.

use std::path::PathBuf;

use arbor_wire::RedactErrors;
use clap::{Parser, Subcommand};

use crate::config::{Overrides, parse_redact_errors};

/// Arbor - streamed route payloads for a caching client router
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version)]
#[command(about = "Serve the demo application or drive a client session against a running server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the demo application over HTTP
    Serve {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind to, overriding the config file
        #[arg(short, long)]
        bind: Option<String>,

        /// URL prefix the application is mounted under
        #[arg(long)]
        basename: Option<String>,

        /// Error redaction: off, on, or a replacement message
        #[arg(long, value_parser = parse_redact_errors)]
        redact_errors: Option<RedactErrors>,
    },

    /// Load a page from a running server, then navigate through more paths
    Visit {
        /// Server origin
        #[arg(short, long, default_value = "http://127.0.0.1:3000")]
        server: String,

        /// Paths to visit in order; the first one is loaded
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

impl Commands {
    /// Command-line settings that override the config file.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        match self {
            Self::Serve {
                bind,
                basename,
                redact_errors,
                ..
            } => Overrides {
                bind_address: bind.clone(),
                basename: basename.clone(),
                redact_errors: redact_errors.clone(),
            },
            Self::Visit { .. } => Overrides::default(),
        }
    }
}
