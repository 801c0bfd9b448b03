//! Server configuration.

use arbor_wire::{AssetsManifest, EntryAssets, RedactErrors};
use serde::{Deserialize, Serialize};

/// Server configuration.
///
/// Every field has a default, so a config file only names what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// URL prefix the application is mounted under.
    pub basename: Option<String>,
    /// Whether error details may be sent to clients.
    pub redact_errors: RedactErrors,
    /// Client bundle files. The first one is the entry module.
    pub assets: Vec<String>,
    /// Build version reported in the assets manifest.
    pub version: String,
    /// Maximum number of resolved route modules kept in memory.
    pub module_cache_capacity: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            basename: None,
            redact_errors: RedactErrors::Off,
            assets: Vec::new(),
            version: String::new(),
            module_cache_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// The manifest skeleton shared by every payload; routes are filled per request.
    #[must_use]
    pub fn manifest(&self) -> AssetsManifest {
        AssetsManifest {
            entry: EntryAssets {
                module: self.entry_module(),
                imports: self.assets.clone(),
            },
            routes: std::collections::BTreeMap::new(),
            url: String::new(),
            version: self.version.clone(),
        }
    }

    #[must_use]
    pub fn entry_module(&self) -> String {
        self.assets.first().cloned().unwrap_or_default()
    }
}
