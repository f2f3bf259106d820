//! Container muxer seam.
//!
//! The recorder talks to whatever produces the container bytes only through
//! [`Muxer`]; [`MuxerFactory`] opens one per session. [`mp4`] is the default
//! ISO BMFF backend.

pub mod mp4;

use std::path::{Path, PathBuf};

use dd_core::config::CodecHint;
use dd_core::Result;

use crate::codec::ParameterSets;
use crate::sample::Sample;

pub use mp4::Mp4MuxerFactory;

/// Output layout requested when a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxMode {
    /// One progressive file, sample table written on finalize.
    Continuous,
    /// Init segment followed by `moof`/`mdat` fragments.
    Fragmented,
}

/// Track parameters fixed at session open.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub timescale: u32,
    pub frame_duration: u32,
    pub codec_hint: CodecHint,
}

pub trait Muxer: Send {
    /// Hand over the locked parameter sets.
    fn configure(&mut self, parameter_sets: &ParameterSets) -> Result<()>;

    fn write_sample(&mut self, sample: &Sample) -> Result<()>;

    fn begin_fragment(&mut self, sequence: u32, reference_time: u64) -> Result<()>;

    fn end_fragment(&mut self) -> Result<()>;

    /// Flush and close the output, returning its path.
    fn finalize(self: Box<Self>) -> Result<PathBuf>;
}

pub trait MuxerFactory: Send + Sync {
    fn open(&self, path: &Path, mode: MuxMode, params: &TrackParams) -> Result<Box<dyn Muxer>>;
}
