//! Codec detection and parameter-set extraction.
//!
//! All codec-specific numbering lives on [`Codec`]; callers above this module
//! only deal with [`NaluKind`].

use bytes::Bytes;
use dd_core::config::CodecHint;
use std::fmt;

use crate::nal::Nalu;

/// Video codec carried by an Annex-B stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
}

/// Role of a NAL unit as far as sample assembly is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluKind {
    Vps,
    Sps,
    Pps,
    /// Anything else, with its codec-specific type number.
    Other(u8),
}

const H264_SPS: u8 = 7;
const H264_PPS: u8 = 8;
const H265_VPS: u8 = 32;
const H265_SPS: u8 = 33;
const H265_PPS: u8 = 34;

impl Codec {
    /// NAL unit type number from the first header byte.
    pub fn nal_type(self, header: u8) -> u8 {
        match self {
            Codec::H264 => header & 0x1F,
            Codec::H265 => (header & 0x7E) >> 1,
        }
    }

    pub fn classify(self, header: u8) -> NaluKind {
        match (self, self.nal_type(header)) {
            (Codec::H264, H264_SPS) | (Codec::H265, H265_SPS) => NaluKind::Sps,
            (Codec::H264, H264_PPS) | (Codec::H265, H265_PPS) => NaluKind::Pps,
            (Codec::H265, H265_VPS) => NaluKind::Vps,
            (_, other) => NaluKind::Other(other),
        }
    }

    /// The parameter-set kinds a complete bundle must contain.
    pub fn parameter_set_kinds(self) -> &'static [NaluKind] {
        match self {
            Codec::H264 => &[NaluKind::Sps, NaluKind::Pps],
            Codec::H265 => &[NaluKind::Vps, NaluKind::Sps, NaluKind::Pps],
        }
    }

    pub fn is_parameter_set(self, header: u8) -> bool {
        !matches!(self.classify(header), NaluKind::Other(_))
    }

    /// The codec an explicit hint asks for, if any.
    pub fn from_hint(hint: CodecHint) -> Option<Codec> {
        match hint {
            CodecHint::Auto => None,
            CodecHint::H264 => Some(Codec::H264),
            CodecHint::H265 => Some(Codec::H265),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::H264 => "H.264",
            Codec::H265 => "H.265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Infer the codec from a frame's NAL units.
///
/// Any unit whose H.265 type is 32 (VPS) marks the stream as H.265;
/// otherwise it is H.264. The result always wins over an explicit hint.
pub fn detect(nalus: &[Nalu<'_>]) -> Codec {
    if nalus
        .iter()
        .any(|n| Codec::H265.nal_type(n.header()) == H265_VPS)
    {
        Codec::H265
    } else {
        Codec::H264
    }
}

/// Profile fields recorded alongside the parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Avc {
        profile_idc: u8,
        compatibility: u8,
        level_idc: u8,
    },
    Hevc(HevcProfileTierLevel),
}

/// The `general_*` profile-tier-level block of an H.265 SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcProfileTierLevel {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub compatibility_flags: u32,
    pub constraint_flags: [u8; 6],
    pub level_idc: u8,
}

impl HevcProfileTierLevel {
    /// Main profile, level 5.1, progressive source.
    pub const FALLBACK: HevcProfileTierLevel = HevcProfileTierLevel {
        profile_space: 0,
        tier_flag: false,
        profile_idc: 1,
        compatibility_flags: 0x6000_0000,
        constraint_flags: [0x80, 0, 0, 0, 0, 0],
        level_idc: 153,
    };

    /// Read the block from an SPS NAL unit (2-byte header included).
    pub fn parse(sps: &[u8]) -> Option<Self> {
        let rbsp = strip_emulation_prevention(sps.get(2..)?);
        // vps id / max sub layers / nesting, then 12 bytes of general PTL
        if rbsp.len() < 13 {
            return None;
        }
        let mut constraint_flags = [0u8; 6];
        constraint_flags.copy_from_slice(&rbsp[6..12]);
        Some(Self {
            profile_space: rbsp[1] >> 6,
            tier_flag: rbsp[1] & 0x20 != 0,
            profile_idc: rbsp[1] & 0x1F,
            compatibility_flags: u32::from_be_bytes([rbsp[2], rbsp[3], rbsp[4], rbsp[5]]),
            constraint_flags,
            level_idc: rbsp[12],
        })
    }
}

/// Remove `emulation_prevention_three_byte`s (`00 00 03` -> `00 00`).
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// A complete, immutable set of decoder parameter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub codec: Codec,
    /// Present only for H.265.
    pub vps: Option<Bytes>,
    pub sps: Bytes,
    pub pps: Bytes,
    pub profile: Profile,
}

impl ParameterSets {
    /// Pull a complete bundle for `codec` out of one frame's NAL units.
    ///
    /// Later units of the same kind replace earlier ones. Returns `None`
    /// while any required kind is missing.
    pub fn extract(codec: Codec, nalus: &[Nalu<'_>]) -> Option<Self> {
        let mut vps = None;
        let mut sps = None;
        let mut pps = None;
        for nalu in nalus {
            match codec.classify(nalu.header()) {
                NaluKind::Vps => vps = Some(nalu.data()),
                NaluKind::Sps => sps = Some(nalu.data()),
                NaluKind::Pps => pps = Some(nalu.data()),
                NaluKind::Other(_) => {}
            }
        }

        let sps = sps?;
        let pps = pps?;
        let (vps, profile) = match codec {
            Codec::H264 => {
                // profile_idc, constraint flags, level_idc follow the header
                if sps.len() < 4 {
                    return None;
                }
                let profile = Profile::Avc {
                    profile_idc: sps[1],
                    compatibility: sps[2],
                    level_idc: sps[3],
                };
                (None, profile)
            }
            Codec::H265 => {
                let vps = vps?;
                let ptl = HevcProfileTierLevel::parse(sps).unwrap_or_else(|| {
                    tracing::warn!(
                        sps_len = sps.len(),
                        "H.265 SPS too short for profile-tier-level, assuming Main@L5.1"
                    );
                    HevcProfileTierLevel::FALLBACK
                });
                (Some(Bytes::copy_from_slice(vps)), Profile::Hevc(ptl))
            }
        };

        Some(Self {
            codec,
            vps,
            sps: Bytes::copy_from_slice(sps),
            pps: Bytes::copy_from_slice(pps),
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::scan_annex_b;

    const H264_FRAME: &[u8] = &[
        0, 0, 0, 1, 0x67, 0x64, 0x00, 0x1F, 0xAC, //
        0, 0, 0, 1, 0x68, 0xEE, 0x3C, 0x80, //
        0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21,
    ];

    fn h265_frame() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 1, 0x40, 0x01, 0x0C, 0x01];
        // SPS: header, vps id byte, general PTL (Main, level 4.1)
        data.extend_from_slice(&[0, 0, 0, 1, 0x42, 0x01, 0x01, 0x01, 0x60, 0, 0, 0]);
        data.extend_from_slice(&[0x90, 0, 0, 0, 0, 0, 123, 0xA0]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x44, 0x01, 0xC1, 0x72]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x26, 0x01, 0xAF, 0x09]);
        data
    }

    #[test]
    fn nal_type_extraction() {
        assert_eq!(Codec::H264.nal_type(0x67), 7);
        assert_eq!(Codec::H264.nal_type(0x65), 5);
        assert_eq!(Codec::H265.nal_type(0x40), 32);
        assert_eq!(Codec::H265.nal_type(0x42), 33);
        assert_eq!(Codec::H265.nal_type(0x26), 19);
    }

    #[test]
    fn classify_parameter_sets() {
        assert_eq!(Codec::H264.classify(0x67), NaluKind::Sps);
        assert_eq!(Codec::H264.classify(0x68), NaluKind::Pps);
        assert_eq!(Codec::H264.classify(0x65), NaluKind::Other(5));
        assert_eq!(Codec::H265.classify(0x40), NaluKind::Vps);
        assert_eq!(Codec::H265.classify(0x44), NaluKind::Pps);
        assert!(!Codec::H265.is_parameter_set(0x26));
    }

    #[test]
    fn detects_h264_without_vps() {
        assert_eq!(detect(&scan_annex_b(H264_FRAME)), Codec::H264);
    }

    #[test]
    fn vps_forces_h265() {
        let data = h265_frame();
        assert_eq!(detect(&scan_annex_b(&data)), Codec::H265);
    }

    #[test]
    fn extracts_h264_bundle() {
        let nalus = scan_annex_b(H264_FRAME);
        let ps = ParameterSets::extract(Codec::H264, &nalus).unwrap();
        assert_eq!(ps.vps, None);
        assert_eq!(&ps.sps[..], &[0x67, 0x64, 0x00, 0x1F, 0xAC]);
        assert_eq!(&ps.pps[..], &[0x68, 0xEE, 0x3C, 0x80]);
        assert_eq!(
            ps.profile,
            Profile::Avc { profile_idc: 0x64, compatibility: 0, level_idc: 0x1F }
        );
    }

    #[test]
    fn incomplete_bundle_is_none() {
        let data = [0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, 0, 0, 0, 1, 0x65, 0x88];
        assert!(ParameterSets::extract(Codec::H264, &scan_annex_b(&data)).is_none());

        // H.265 without VPS
        let data = h265_frame();
        let nalus: Vec<_> = scan_annex_b(&data).into_iter().skip(1).collect();
        assert!(ParameterSets::extract(Codec::H265, &nalus).is_none());
    }

    #[test]
    fn last_parameter_set_wins() {
        let data = [
            0, 0, 1, 0x67, 0x42, 0x00, 0x1E, //
            0, 0, 1, 0x68, 0x01, //
            0, 0, 1, 0x68, 0x02,
        ];
        let ps = ParameterSets::extract(Codec::H264, &scan_annex_b(&data)).unwrap();
        assert_eq!(&ps.pps[..], &[0x68, 0x02]);
    }

    #[test]
    fn extracts_h265_profile_tier_level() {
        let data = h265_frame();
        let ps = ParameterSets::extract(Codec::H265, &scan_annex_b(&data)).unwrap();
        assert!(ps.vps.is_some());
        let Profile::Hevc(ptl) = ps.profile else {
            panic!("expected HEVC profile");
        };
        assert_eq!(ptl.profile_idc, 1);
        assert_eq!(ptl.compatibility_flags, 0x6000_0000);
        assert_eq!(ptl.constraint_flags[0], 0x90);
        assert_eq!(ptl.level_idc, 123);
    }

    #[test]
    fn short_h265_sps_falls_back() {
        let data = [
            0, 0, 1, 0x40, 0x01, 0x0C, //
            0, 0, 1, 0x42, 0x01, 0x01, //
            0, 0, 1, 0x44, 0x01, 0xC1,
        ];
        let ps = ParameterSets::extract(Codec::H265, &scan_annex_b(&data)).unwrap();
        assert_eq!(ps.profile, Profile::Hevc(HevcProfileTierLevel::FALLBACK));
    }

    #[test]
    fn emulation_prevention_removed() {
        assert_eq!(
            strip_emulation_prevention(&[0x01, 0, 0, 3, 0x01, 0, 0, 3, 0, 0x02]),
            vec![0x01, 0, 0, 0x01, 0, 0, 0, 0x02]
        );
    }
}
