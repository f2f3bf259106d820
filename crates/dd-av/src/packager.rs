//! DASH packaging through GPAC's MP4Box.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dd_core::{Error, Result};

use crate::command::Invocation;
use crate::tools::{Tool, ToolRegistry, MP4BOX};

/// Manifest file name written into every stream directory.
pub const MANIFEST_NAME: &str = "manifest.mpd";

/// Prefix for the media segments MP4Box emits next to the manifest.
pub const SEGMENT_PREFIX: &str = "segment_";

/// Where a packaged stream landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedStream {
    /// `<output_root>/<stream_name>`
    pub dir: PathBuf,
    pub manifest: PathBuf,
}

/// Reject stream names that are empty or would leave the output root.
pub fn validate_stream_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(Error::Configuration(format!("invalid stream name '{name}'")));
    }
    Ok(())
}

/// Converts a finished MP4 into a DASH manifest plus segments.
#[async_trait]
pub trait DashPackager: Send + Sync {
    /// Package `source` into `<output_root>/<stream_name>/`.
    ///
    /// The stream directory is created first. All output files are closed
    /// when this returns `Ok`.
    async fn package(
        &self,
        source: &Path,
        output_root: &Path,
        stream_name: &str,
        segment_duration_secs: f64,
    ) -> Result<PackagedStream>;
}

/// [`DashPackager`] that shells out to `MP4Box -dash`.
#[derive(Debug, Clone)]
pub struct Mp4BoxPackager {
    tool: Tool,
}

impl Mp4BoxPackager {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: Tool {
                name: MP4BOX,
                path: path.into(),
                timeout,
            },
        }
    }

    /// Use the MP4Box found during discovery.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self {
            tool: tools.mp4box()?.clone(),
        })
    }

    pub fn tool_path(&self) -> &Path {
        &self.tool.path
    }

    /// `MP4Box -dash <ms> -frag <ms> -rap -segment-name segment_ -out <manifest> <source>`,
    /// run inside the stream directory.
    fn invocation(&self, source: &Path, manifest: &Path, segment_ms: u64) -> Invocation {
        let ms = segment_ms.to_string();
        let mut run = Invocation::new(&self.tool.path)
            .timeout(self.tool.timeout)
            .args(["-dash", ms.as_str(), "-frag", ms.as_str(), "-rap"])
            .args(["-segment-name", SEGMENT_PREFIX])
            .arg("-out")
            .path_arg(manifest)
            .path_arg(source);
        if let Some(dir) = manifest.parent() {
            run = run.current_dir(dir);
        }
        run
    }
}

#[async_trait]
impl DashPackager for Mp4BoxPackager {
    async fn package(
        &self,
        source: &Path,
        output_root: &Path,
        stream_name: &str,
        segment_duration_secs: f64,
    ) -> Result<PackagedStream> {
        validate_stream_name(stream_name)?;
        if !(segment_duration_secs.is_finite() && segment_duration_secs > 0.0) {
            return Err(Error::Configuration(format!(
                "segment duration must be positive, got {segment_duration_secs}"
            )));
        }
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(Error::not_found("file", source.display()));
        }
        // MP4Box runs inside the stream directory, so hand it absolute paths.
        let source = std::path::absolute(source).map_err(|e| Error::path(source, e))?;
        let output_root = std::path::absolute(output_root).map_err(|e| Error::path(output_root, e))?;

        let dir = output_root.join(stream_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::path(&dir, e))?;
        let manifest = dir.join(MANIFEST_NAME);

        let segment_ms = (segment_duration_secs * 1000.0).round() as u64;
        tracing::info!(
            source = %source.display(),
            dir = %dir.display(),
            segment_ms,
            "packaging DASH stream"
        );

        let output = self.invocation(&source, &manifest, segment_ms).run().await?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!(stream = stream_name, stderr = %output.stderr.trim(), "MP4Box output");
        }

        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            return Err(Error::tool(
                MP4BOX,
                format!("finished without writing {}", manifest.display()),
            ));
        }

        Ok(PackagedStream { dir, manifest })
    }
}
