//! In-memory map from stream name to the recording it was packaged from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

/// Registered streams. Reads vastly outnumber writes, so a read-optimized
/// lock guards the map; it is never held across I/O.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: RwLock<BTreeMap<String, PathBuf>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`, returning the path it replaced.
    pub fn register(&self, name: impl Into<String>, source: impl AsRef<Path>) -> Option<PathBuf> {
        let name = name.into();
        let source = source.as_ref().to_path_buf();
        tracing::info!(stream = %name, source = %source.display(), "stream registered");
        self.streams.write().insert(name, source)
    }

    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.streams.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.read().contains_key(name)
    }

    /// Sorted snapshot of the registered names.
    pub fn names(&self) -> Vec<String> {
        self.streams.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }
}
