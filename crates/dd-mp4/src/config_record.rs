//! Decoder configuration records (`avcC`, `hvcC`).

use crate::error::{Mp4Error, Result};

/// Fields needed to build an `AVCDecoderConfigurationRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

/// Fields needed to build an `HEVCDecoderConfigurationRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcConfig {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: [u8; 6],
    pub general_level_idc: u8,
    pub vps: Vec<Vec<u8>>,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

/// Codec-specific decoder configuration for the video sample entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderConfig {
    Avc(AvcConfig),
    Hevc(HevcConfig),
}

impl DecoderConfig {
    /// Sample entry fourcc (`avc1` / `hvc1`).
    pub fn sample_entry_type(&self) -> &'static [u8; 4] {
        match self {
            DecoderConfig::Avc(_) => b"avc1",
            DecoderConfig::Hevc(_) => b"hvc1",
        }
    }

    /// Configuration box fourcc (`avcC` / `hvcC`).
    pub fn config_box_type(&self) -> &'static [u8; 4] {
        match self {
            DecoderConfig::Avc(_) => b"avcC",
            DecoderConfig::Hevc(_) => b"hvcC",
        }
    }

    /// Serialize the configuration record (box payload, without header).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            DecoderConfig::Avc(c) => c.to_bytes(),
            DecoderConfig::Hevc(c) => c.to_bytes(),
        }
    }
}

fn push_nalu(out: &mut Vec<u8>, nalu: &[u8]) -> Result<()> {
    let len = u16::try_from(nalu.len()).map_err(|_| {
        Mp4Error::InvalidConfig(format!("parameter set of {} bytes is too long", nalu.len()))
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(nalu);
    Ok(())
}

impl AvcConfig {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.sps.is_empty() || self.pps.is_empty() {
            return Err(Mp4Error::InvalidConfig("avcC needs at least one SPS and one PPS".into()));
        }
        if self.sps.len() > 31 {
            return Err(Mp4Error::InvalidConfig(format!("{} SPS units exceed 31", self.sps.len())));
        }

        let mut out = Vec::with_capacity(16);
        out.push(1);
        out.push(self.profile_idc);
        out.push(self.profile_compatibility);
        out.push(self.level_idc);
        // lengthSizeMinusOne = 3
        out.push(0xFF);
        out.push(0xE0 | self.sps.len() as u8);
        for sps in &self.sps {
            push_nalu(&mut out, sps)?;
        }
        let pps_count = u8::try_from(self.pps.len())
            .map_err(|_| Mp4Error::InvalidConfig(format!("{} PPS units exceed 255", self.pps.len())))?;
        out.push(pps_count);
        for pps in &self.pps {
            push_nalu(&mut out, pps)?;
        }

        // High profiles carry chroma and bit-depth fields: 4:2:0, 8-bit.
        if matches!(self.profile_idc, 100 | 110 | 122 | 144) {
            out.push(0xFC | 1);
            out.push(0xF8);
            out.push(0xF8);
            out.push(0);
        }
        Ok(out)
    }
}

const HEVC_VPS: u8 = 32;
const HEVC_SPS: u8 = 33;
const HEVC_PPS: u8 = 34;

impl HevcConfig {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.vps.is_empty() || self.sps.is_empty() || self.pps.is_empty() {
            return Err(Mp4Error::InvalidConfig(
                "hvcC needs at least one VPS, SPS and PPS".into(),
            ));
        }

        let mut out = Vec::with_capacity(64);
        out.push(1);
        out.push(
            (self.general_profile_space & 0x03) << 6
                | (self.general_tier_flag as u8) << 5
                | (self.general_profile_idc & 0x1F),
        );
        out.extend_from_slice(&self.general_profile_compatibility_flags.to_be_bytes());
        out.extend_from_slice(&self.general_constraint_indicator_flags);
        out.push(self.general_level_idc);
        // min_spatial_segmentation_idc = 0
        out.extend_from_slice(&0xF000u16.to_be_bytes());
        // parallelismType = 0
        out.push(0xFC);
        // chroma_format_idc = 1 (4:2:0)
        out.push(0xFC | 1);
        // bit depths luma/chroma minus 8
        out.push(0xF8);
        out.push(0xF8);
        // avgFrameRate
        out.extend_from_slice(&0u16.to_be_bytes());
        // constantFrameRate 0, numTemporalLayers 1, temporalIdNested 1, lengthSizeMinusOne 3
        out.push((1 << 3) | (1 << 2) | 3);

        let arrays = [(HEVC_VPS, &self.vps), (HEVC_SPS, &self.sps), (HEVC_PPS, &self.pps)];
        out.push(arrays.len() as u8);
        for (nal_type, units) in arrays {
            // array_completeness = 1
            out.push(0x80 | nal_type);
            let count = u16::try_from(units.len())
                .map_err(|_| Mp4Error::InvalidConfig("too many parameter sets".into()))?;
            out.extend_from_slice(&count.to_be_bytes());
            for unit in units {
                push_nalu(&mut out, unit)?;
            }
        }
        Ok(out)
    }
}
