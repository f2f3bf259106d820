//! ISO BMFF (MP4) muxing for a single video track.
//!
//! This crate knows nothing about Annex-B scanning or recording sessions. It
//! takes a decoder configuration record plus length-prefixed samples and
//! produces either:
//! - a continuous MP4 (`ftyp` + `mdat`, `moov` written on finish), or
//! - a fragmented MP4 (`ftyp` + `moov`/`mvex`, then `moof` + `mdat` pairs).

mod boxes;
mod config_record;
mod error;
mod fragmented;
mod writer;

pub use config_record::{AvcConfig, DecoderConfig, HevcConfig};
pub use error::{Mp4Error, Result};
pub use fragmented::FragmentedMp4Writer;
pub use writer::Mp4Writer;

use bytes::Bytes;

/// Static description of the single video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackConfig {
    /// Track ID (1-based).
    pub track_id: u32,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Duration used for a trailing sample with no successor.
    pub default_sample_duration: u32,
}

/// One encoded access unit, already in length-prefixed form.
#[derive(Debug, Clone)]
pub struct Sample {
    pub data: Bytes,
    /// Decode timestamp in track timescale units.
    pub dts: u64,
    pub duration: u32,
    pub is_sync: bool,
}
