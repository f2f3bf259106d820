//! ISO BMFF backend built on `dd-mp4`.

use std::path::{Path, PathBuf};

use dd_core::{Error, Result};
use dd_mp4::{
    AvcConfig, DecoderConfig, FragmentedMp4Writer, HevcConfig, Mp4Error, Mp4Writer, TrackConfig,
};

use super::{MuxMode, Muxer, MuxerFactory, TrackParams};
use crate::codec::{Profile, ParameterSets};
use crate::sample::Sample;

const TRACK_ID: u32 = 1;

fn mux_err(err: Mp4Error) -> Error {
    match err {
        Mp4Error::Io(source) => Error::Io { source },
        other => Error::Mux(other.to_string()),
    }
}

/// Build the `avcC` / `hvcC` fields from a locked bundle.
pub fn decoder_config(ps: &ParameterSets) -> Result<DecoderConfig> {
    match ps.profile {
        Profile::Avc {
            profile_idc,
            compatibility,
            level_idc,
        } => Ok(DecoderConfig::Avc(AvcConfig {
            profile_idc,
            profile_compatibility: compatibility,
            level_idc,
            sps: vec![ps.sps.to_vec()],
            pps: vec![ps.pps.to_vec()],
        })),
        Profile::Hevc(ptl) => {
            let vps = ps
                .vps
                .as_ref()
                .ok_or_else(|| Error::Mux("H.265 parameter sets without a VPS".into()))?;
            Ok(DecoderConfig::Hevc(HevcConfig {
                general_profile_space: ptl.profile_space,
                general_tier_flag: ptl.tier_flag,
                general_profile_idc: ptl.profile_idc,
                general_profile_compatibility_flags: ptl.compatibility_flags,
                general_constraint_indicator_flags: ptl.constraint_flags,
                general_level_idc: ptl.level_idc,
                vps: vec![vps.to_vec()],
                sps: vec![ps.sps.to_vec()],
                pps: vec![ps.pps.to_vec()],
            }))
        }
    }
}

fn to_mp4_sample(sample: &Sample) -> dd_mp4::Sample {
    dd_mp4::Sample {
        data: sample.payload.clone(),
        dts: sample.dts,
        duration: sample.duration,
        is_sync: sample.is_sync,
    }
}

/// Opens [`Mp4Writer`] or [`FragmentedMp4Writer`] depending on the mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mp4MuxerFactory;

impl MuxerFactory for Mp4MuxerFactory {
    fn open(&self, path: &Path, mode: MuxMode, params: &TrackParams) -> Result<Box<dyn Muxer>> {
        let track = TrackConfig {
            track_id: TRACK_ID,
            timescale: params.timescale,
            width: params.width,
            height: params.height,
            default_sample_duration: params.frame_duration,
        };
        let muxer: Box<dyn Muxer> = match mode {
            MuxMode::Continuous => Box::new(ContinuousMuxer {
                writer: Mp4Writer::create(path, track).map_err(|e| open_err(path, e))?,
            }),
            MuxMode::Fragmented => Box::new(FragmentedMuxer {
                writer: FragmentedMp4Writer::create(path, track).map_err(|e| open_err(path, e))?,
            }),
        };
        Ok(muxer)
    }
}

fn open_err(path: &Path, err: Mp4Error) -> Error {
    match err {
        Mp4Error::Io(source) => Error::path(path, source),
        other => mux_err(other),
    }
}

struct ContinuousMuxer {
    writer: Mp4Writer,
}

impl Muxer for ContinuousMuxer {
    fn configure(&mut self, parameter_sets: &ParameterSets) -> Result<()> {
        self.writer
            .set_decoder_config(decoder_config(parameter_sets)?)
            .map_err(mux_err)
    }

    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        self.writer.write_sample(&to_mp4_sample(sample)).map_err(mux_err)
    }

    fn begin_fragment(&mut self, _sequence: u32, _reference_time: u64) -> Result<()> {
        Err(Error::Mux("continuous output has no fragments".into()))
    }

    fn end_fragment(&mut self) -> Result<()> {
        Err(Error::Mux("continuous output has no fragments".into()))
    }

    fn finalize(self: Box<Self>) -> Result<PathBuf> {
        self.writer.finish().map_err(mux_err)
    }
}

struct FragmentedMuxer {
    writer: FragmentedMp4Writer,
}

impl Muxer for FragmentedMuxer {
    fn configure(&mut self, parameter_sets: &ParameterSets) -> Result<()> {
        self.writer
            .set_decoder_config(decoder_config(parameter_sets)?)
            .map_err(mux_err)
    }

    fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        self.writer.write_sample(&to_mp4_sample(sample)).map_err(mux_err)
    }

    fn begin_fragment(&mut self, sequence: u32, reference_time: u64) -> Result<()> {
        self.writer
            .begin_fragment(sequence, reference_time)
            .map_err(mux_err)
    }

    fn end_fragment(&mut self) -> Result<()> {
        let written = self.writer.end_fragment().map_err(mux_err)?;
        if !written {
            tracing::debug!("fragment closed without samples; nothing written");
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<PathBuf> {
        self.writer.finish().map_err(mux_err)
    }
}
