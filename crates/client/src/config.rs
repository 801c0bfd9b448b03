//! Client configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL prefix the application is mounted under.
    pub basename: Option<String>,
    /// Redirects followed by one navigation before giving up.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            basename: None,
            max_redirects: 8,
        }
    }
}
