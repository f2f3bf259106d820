use std::io;

/// Errors raised by the MP4 writers.
#[derive(Debug, thiserror::Error)]
pub enum Mp4Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid decoder configuration: {0}")]
    InvalidConfig(String),

    #[error("decoder configuration cannot change after the init segment is written")]
    InitSegmentWritten,

    #[error("no decoder configuration has been set")]
    NotConfigured,

    #[error("sample at dts {dts} precedes the previous sample at {last}")]
    NonMonotonicDts { dts: u64, last: u64 },

    #[error("no fragment is open")]
    NoOpenFragment,

    #[error("sample of {0} bytes exceeds the 32-bit size field")]
    SampleTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Mp4Error>;
