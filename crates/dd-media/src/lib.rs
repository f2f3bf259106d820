//! dd-media: elementary-stream ingestion.
//!
//! Raw Annex-B access units flow through the [`nal`] scanner, the
//! [`codec`] parameter-set gate and the [`sample`] assembler into a
//! [`recorder::Recorder`], which drives a [`mux::Muxer`] backend.
//! [`dhav`] reads the DVR container the bitstream usually arrives in.

pub mod codec;
pub mod dhav;
pub mod mux;
pub mod nal;
pub mod recorder;
pub mod sample;

pub use codec::{Codec, NaluKind, ParameterSets};
pub use dhav::{DhavFrame, DhavReader, FrameKind};
pub use nal::{scan_annex_b, AnnexBIter, Nalu};
pub use recorder::{FrameDisposition, Recorder, RecorderState};
pub use sample::{Sample, TIMESCALE};
