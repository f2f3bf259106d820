//! Locating GPAC's `MP4Box`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dd_core::config::ToolsConfig;
use dd_core::{Error, Result};
use serde::Serialize;

pub const MP4BOX: &str = "MP4Box";

/// A resolved executable and how long one run of it may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub path: PathBuf,
    pub timeout: Duration,
}

/// Row of `dvrdash check-tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// The external programs dvrdash can use. Only MP4Box today.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    mp4box: Option<Tool>,
}

impl ToolRegistry {
    /// Honour `tools.mp4box_path` when it exists, else search `PATH`.
    pub fn discover(config: &ToolsConfig) -> Self {
        let path = match config.mp4box_path.as_deref() {
            Some(p) if p.is_file() => Some(p.to_path_buf()),
            Some(p) => {
                tracing::warn!(path = %p.display(), "configured MP4Box not found; falling back to PATH");
                which::which(MP4BOX).ok()
            }
            None => which::which(MP4BOX).ok(),
        };

        match &path {
            Some(p) => tracing::debug!(path = %p.display(), "using MP4Box"),
            None => tracing::debug!("MP4Box not found"),
        }

        Self {
            mp4box: path.map(|path| Tool {
                name: MP4BOX,
                path,
                timeout: Duration::from_secs(config.timeout_secs),
            }),
        }
    }

    /// Skip discovery and use `path`.
    pub fn with_mp4box(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            mp4box: Some(Tool {
                name: MP4BOX,
                path: path.into(),
                timeout,
            }),
        }
    }

    pub fn mp4box(&self) -> Result<&Tool> {
        self.mp4box
            .as_ref()
            .ok_or_else(|| Error::tool(MP4BOX, "not installed or not in PATH (it ships with GPAC)"))
    }

    pub fn status(&self) -> Vec<ToolStatus> {
        let row = match &self.mp4box {
            Some(tool) => ToolStatus {
                name: MP4BOX,
                available: true,
                version: gpac_version(&tool.path),
                path: Some(tool.path.clone()),
            },
            None => ToolStatus {
                name: MP4BOX,
                available: false,
                version: None,
                path: None,
            },
        };
        vec![row]
    }
}

/// `MP4Box -version` prints a banner such as
/// `MP4Box - GPAC version 2.2.1-revrelease` on stderr.
fn gpac_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-version").output().ok()?;
    let text = [output.stderr, output.stdout].concat();
    parse_gpac_banner(&String::from_utf8_lossy(&text))
}

fn parse_gpac_banner(banner: &str) -> Option<String> {
    let line = banner.lines().map(str::trim).find(|l| !l.is_empty())?;
    match line.split_once("GPAC version ") {
        Some((_, version)) => version.split_whitespace().next().map(str::to_string),
        None => Some(line.to_string()),
    }
}
