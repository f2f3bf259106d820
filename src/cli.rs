use clap::{Parser, Subcommand};
use dd_core::config::CodecHint;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dvrdash")]
#[command(author, version, about = "DVR stream recorder, DASH packager and origin server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a DHAV capture into an MP4 file
    Record {
        /// DHAV (.dav) input file
        #[arg(required = true)]
        input: PathBuf,

        /// Directory for the recording (defaults to recording.output_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Picture width, when the stream does not announce it
        #[arg(long)]
        width: Option<u32>,

        /// Picture height, when the stream does not announce it
        #[arg(long)]
        height: Option<u32>,

        /// Frame rate, when the stream does not announce it
        #[arg(long)]
        fps: Option<f64>,

        /// Codec hint: auto, h264 or h265
        #[arg(long)]
        codec: Option<CodecHint>,

        /// Write fragmented MP4, one fragment per GOP
        #[arg(long)]
        fragmented: bool,

        /// Package the recording as a DASH stream with this name
        #[arg(long, value_name = "NAME")]
        dash: Option<String>,

        /// DASH segment length in seconds
        #[arg(long, value_name = "SECS")]
        segment_duration: Option<f64>,
    },

    /// Serve packaged DASH streams over HTTP
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Root directory holding one directory per stream
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Package FILE with MP4Box and serve it as NAME
        #[arg(long, value_name = "NAME=FILE", value_parser = parse_stream_arg)]
        publish: Vec<(String, PathBuf)>,

        /// Serve an already packaged stream as NAME
        #[arg(long, value_name = "NAME=FILE", value_parser = parse_stream_arg)]
        register: Vec<(String, PathBuf)>,
    },

    /// Walk a DHAV capture and summarise its frames
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

/// Parse `NAME=FILE`.
pub fn parse_stream_arg(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, file)) if !name.is_empty() && !file.is_empty() => {
            Ok((name.to_string(), PathBuf::from(file)))
        }
        _ => Err(format!("expected NAME=FILE, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn stream_arg_parsing() {
        assert_eq!(
            parse_stream_arg("cam1=/rec/a.mp4").unwrap(),
            ("cam1".to_string(), PathBuf::from("/rec/a.mp4"))
        );
        assert!(parse_stream_arg("cam1").is_err());
        assert!(parse_stream_arg("=a.mp4").is_err());
        assert!(parse_stream_arg("cam1=").is_err());
    }

    #[test]
    fn record_flags() {
        let cli = Cli::try_parse_from([
            "dvrdash", "record", "in.dav", "--codec", "hevc", "--fragmented", "--dash", "cam1",
        ])
        .unwrap();
        match cli.command {
            Commands::Record {
                codec,
                fragmented,
                dash,
                ..
            } => {
                assert_eq!(codec, Some(CodecHint::H265));
                assert!(fragmented);
                assert_eq!(dash.as_deref(), Some("cam1"));
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn serve_collects_streams() {
        let cli = Cli::try_parse_from([
            "dvrdash", "serve", "--port", "9000", "--register", "a=/x/a.mp4", "--register", "b=/x/b.mp4",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { port, register, .. } => {
                assert_eq!(port, Some(9000));
                assert_eq!(register.len(), 2);
            }
            _ => panic!("expected serve"),
        }
    }
}
