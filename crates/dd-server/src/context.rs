//! Shared state handed to every request handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::StreamRegistry;

/// Cheap to clone; all fields are reference counted.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub registry: Arc<StreamRegistry>,
    output_dir: Arc<PathBuf>,
}

impl AppContext {
    pub fn new(registry: Arc<StreamRegistry>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_dir: Arc::new(output_dir.into()),
        }
    }

    /// Root holding one directory per packaged stream.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
