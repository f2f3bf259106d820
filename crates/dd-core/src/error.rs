//! The one error type shared by every dvrdash crate.
//!
//! The origin server turns it into a response status with
//! [`Error::http_status`].

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad parameters or an unusable configuration file.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("IO error at {}: {source}", path.display())]
    Path { path: PathBuf, source: std::io::Error },

    /// The listener could not be bound.
    #[error("Cannot listen on {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },

    /// Malformed Annex-B or DHAV data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// `operation` is not allowed in the recorder's current `state`.
    #[error("Invalid state: cannot {operation} while {state}")]
    State {
        operation: &'static str,
        state: String,
    },

    #[error("Mux error: {0}")]
    Mux(String),

    /// An explicit decode time earlier than the last sample's.
    #[error("Timestamp {dts} is earlier than the previous sample at {last}")]
    NonMonotonicTimestamp { dts: u64, last: u64 },

    /// MP4Box could not start, exited non-zero or ran past its deadline.
    #[error("Tool error [{tool}]: {message}")]
    Tool { tool: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Configuration(_) => 400,
            Error::State { .. } => 409,
            Error::Parse(_) | Error::NonMonotonicTimestamp { .. } => 422,
            Error::Tool { .. } => 502,
            Error::Io { .. }
            | Error::Path { .. }
            | Error::Bind { .. }
            | Error::Mux(_)
            | Error::Internal(_) => 500,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn state(operation: &'static str, state: impl fmt::Display) -> Self {
        Error::State {
            operation,
            state: state.to_string(),
        }
    }

    /// I/O failure tied to the file or directory it happened on.
    pub fn path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Path {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by malformed input rather than the system.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::NonMonotonicTimestamp { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn statuses() {
        let cases = [
            (Error::not_found("stream", "camera-1"), 404),
            (Error::Configuration("width must be positive".into()), 400),
            (Error::state("end_fragment", "stopped"), 409),
            (Error::Parse("no start code".into()), 422),
            (Error::NonMonotonicTimestamp { dts: 1, last: 2 }, 422),
            (Error::tool("MP4Box", "exit status: 1"), 502),
            (Error::Mux("boom".into()), 500),
            (Error::from(io::Error::other("disk")), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.http_status(), status, "{err}");
        }
    }

    #[test]
    fn messages() {
        assert_eq!(
            Error::not_found("stream", "camera-1").to_string(),
            "stream not found: camera-1"
        );
        assert_eq!(
            Error::state("end_fragment", "recording without an open fragment").to_string(),
            "Invalid state: cannot end_fragment while recording without an open fragment"
        );
        assert_eq!(
            Error::tool("MP4Box", "exit status: 1").to_string(),
            "Tool error [MP4Box]: exit status: 1"
        );
        assert_eq!(
            Error::NonMonotonicTimestamp { dts: 100, last: 3000 }.to_string(),
            "Timestamp 100 is earlier than the previous sample at 3000"
        );
    }

    #[test]
    fn path_and_bind_name_the_target() {
        let err = Error::path("/var/dash/out", io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        let msg = err.to_string();
        assert!(msg.contains("/var/dash/out") && msg.contains("denied"), "{msg}");

        let err = Error::Bind {
            addr: "0.0.0.0:80".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Cannot listen on 0.0.0.0:80: in use");
    }

    #[test]
    fn bad_input_classification() {
        assert!(Error::Parse("x".into()).is_bad_input());
        assert!(Error::NonMonotonicTimestamp { dts: 0, last: 1 }.is_bad_input());
        assert!(!Error::Mux("x".into()).is_bad_input());
        assert!(!Error::from(io::Error::other("x")).is_bad_input());
    }
}
