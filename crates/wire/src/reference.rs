//! References to code on the other side of the wire: client modules the
//! router loads on demand, and server functions the client may call.

use serde::{Deserialize, Serialize};

/// Points at client code the receiver loads lazily.
///
/// `chunks` lists bundles worth preloading before the export is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientReference {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<String>,
}

impl ClientReference {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chunks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// `id#name`, the key client registries resolve by.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}#{}", self.id, self.name)
    }
}

/// Identity of a server function the client may invoke remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerReference {
    pub id: String,
}

impl ServerReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
