//! TOML configuration.
//!
//! Sections: `[server]`, `[recording]`, `[dash]` and `[tools]`. Each one is
//! `#[serde(default)]`, so an empty file yields [`Config::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub recording: RecordingConfig,
    pub dash: DashConfig,
    pub tools: ToolsConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(format!("config parse error: {e}")))
    }

    /// Read and parse `path`. A missing file is an error here; fallbacks are
    /// the caller's decision.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::path(path, e))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Settings that work but are probably mistakes.
    pub fn validate(&self) -> Vec<String> {
        let server = &self.server;
        let secs = self.dash.segment_duration_secs;

        let checks = [
            (server.port == 0, "server.port is 0; a random port will be assigned".to_string()),
            (
                server.max_connections == 0,
                "server.max_connections is 0; no request will ever be served".to_string(),
            ),
            (
                secs <= 0.0,
                format!("dash.segment_duration_secs is {secs}; MP4Box needs a positive duration"),
            ),
            (
                secs > 0.0 && secs < 1.0,
                format!("dash.segment_duration_secs is {secs}; sub-second segments inflate request counts"),
            ),
            (
                self.tools.mp4box_path.as_deref().is_some_and(|p| !p.exists()),
                "tools.mp4box_path does not exist; PATH will be searched instead".to_string(),
            ),
            (
                self.recording.relock_policy == RelockPolicy::AllowRelock,
                "recording.relock_policy is allow-relock; fragmented output still rejects a codec change"
                    .to_string(),
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(hit, warning)| hit.then_some(warning))
            .collect()
    }
}

/// Origin HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root directory holding `<stream>/manifest.mpd` and segments.
    pub output_dir: PathBuf,
    /// Upper bound on concurrently served connections.
    pub max_connections: usize,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace_secs: u64,
    /// How long a client may take to send its request headers.
    pub header_read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            output_dir: PathBuf::from("./dash"),
            max_connections: 256,
            shutdown_grace_secs: 5,
            header_read_timeout_secs: 10,
        }
    }
}

/// Codec selection passed to the recorder at init time.
///
/// Detection from the bitstream always overrides an explicit hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecHint {
    #[default]
    Auto,
    H264,
    H265,
}

impl std::str::FromStr for CodecHint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "-1" => Ok(CodecHint::Auto),
            "h264" | "avc" | "0" => Ok(CodecHint::H264),
            "h265" | "hevc" | "1" => Ok(CodecHint::H265),
            other => Err(Error::Configuration(format!("unknown codec hint '{other}'"))),
        }
    }
}

/// Whether parameter sets may be re-detected after the first lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelockPolicy {
    /// Parameter sets are handed to the muxer once per session.
    #[default]
    LockOnce,
    /// A later, different parameter-set bundle re-configures the muxer.
    AllowRelock,
}

/// Recording session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub codec: CodecHint,
    pub relock_policy: RelockPolicy,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./recordings"),
            codec: CodecHint::Auto,
            relock_policy: RelockPolicy::LockOnce,
        }
    }
}

/// DASH packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub segment_duration_secs: f64,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 4.0,
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mp4box_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mp4box_path: None,
            timeout_secs: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.output_dir, PathBuf::from("./dash"));
        assert_eq!(cfg.dash.segment_duration_secs, 4.0);
        assert_eq!(cfg.recording.codec, CodecHint::Auto);
        assert_eq!(cfg.recording.relock_policy, RelockPolicy::LockOnce);
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_toml_config() {
        let toml = r#"
            [server]
            port = 9090

            [recording]
            codec = "h265"
            relock_policy = "allow-relock"

            [dash]
            segment_duration_secs = 2.0
        "#;
        let cfg = Config::from_toml(toml).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.recording.codec, CodecHint::H265);
        assert_eq!(cfg.recording.relock_policy, RelockPolicy::AllowRelock);
        assert_eq!(cfg.dash.segment_duration_secs, 2.0);
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.tools.timeout_secs, 600);
    }

    #[test]
    fn parse_invalid_toml_is_configuration_error() {
        let err = Config::from_toml("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn non_positive_segment_duration_warns() {
        let mut cfg = Config::default();
        cfg.dash.segment_duration_secs = 0.0;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("segment_duration_secs")));
    }

    #[test]
    fn missing_mp4box_path_warns() {
        let mut cfg = Config::default();
        cfg.tools.mp4box_path = Some(PathBuf::from("/nonexistent/MP4Box"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("mp4box_path")));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dvrdash.toml");
        std::fs::write(&path, "[server]\nport = 7070\n").unwrap();
        let cfg = Config::from_path(&path).unwrap();
        assert_eq!(cfg.server.port, 7070);
        assert_eq!(cfg.recording.output_dir, PathBuf::from("./recordings"));
    }

    #[test]
    fn from_path_missing_file_names_it() {
        let err = Config::from_path(Path::new("/nonexistent/dvrdash.toml")).unwrap_err();
        assert!(matches!(err, Error::Path { .. }));
        assert!(err.to_string().contains("/nonexistent/dvrdash.toml"));
    }

    #[test]
    fn short_segments_warn() {
        let mut cfg = Config::default();
        cfg.dash.segment_duration_secs = 0.5;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("sub-second"));
    }

    #[test]
    fn codec_hint_from_str() {
        assert_eq!("auto".parse::<CodecHint>().unwrap(), CodecHint::Auto);
        assert_eq!("-1".parse::<CodecHint>().unwrap(), CodecHint::Auto);
        assert_eq!("H264".parse::<CodecHint>().unwrap(), CodecHint::H264);
        assert_eq!("hevc".parse::<CodecHint>().unwrap(), CodecHint::H265);
        assert!("vp9".parse::<CodecHint>().is_err());
    }
}
