//! Summaries of DHAV captures for `dvrdash probe`.

use chrono::NaiveDateTime;
use dd_core::config::CodecHint;
use dd_media::codec::{self, ParameterSets};
use dd_media::dhav::{DhavReader, FrameKind};
use dd_media::scan_annex_b;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DhavProbe {
    pub file_size: usize,
    /// Bytes covered by well-formed frames.
    pub bytes_parsed: usize,
    pub frames: usize,
    pub video_frames: usize,
    pub key_frames: usize,
    pub audio_frames: usize,
    pub other_frames: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u8>,
    pub gop_interval: Option<u8>,
    /// Codec announced by the container's playback extension.
    pub container_codec: Option<CodecHint>,
    /// Codec found in the first complete parameter-set bundle.
    pub detected_codec: Option<String>,
    pub first_frame_index: Option<u32>,
    pub last_frame_index: Option<u32>,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    /// Error that stopped the walk, if any.
    pub error: Option<String>,
}

pub fn probe_dhav(data: &[u8]) -> DhavProbe {
    let mut probe = DhavProbe {
        file_size: data.len(),
        ..Default::default()
    };

    let mut reader = DhavReader::new(data);
    for frame in reader.by_ref() {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                probe.error = Some(e.to_string());
                break;
            }
        };

        probe.frames += 1;
        probe.first_frame_index.get_or_insert(frame.frame_index);
        probe.last_frame_index = Some(frame.frame_index);
        if let Some(ts) = frame.timestamp {
            probe.first_timestamp.get_or_insert(ts);
            probe.last_timestamp = Some(ts);
        }

        match frame.kind {
            FrameKind::Audio => probe.audio_frames += 1,
            kind if kind.is_video() => {
                probe.video_frames += 1;
                if kind.is_key() {
                    probe.key_frames += 1;
                }
            }
            _ => probe.other_frames += 1,
        }

        if let Some(size) = frame.extensions.image_size {
            probe.width.get_or_insert(size.width);
            probe.height.get_or_insert(size.height);
        }
        if let Some(playback) = frame.extensions.playback {
            probe.fps.get_or_insert(playback.fps);
            probe.gop_interval.get_or_insert(playback.gop_interval);
            probe.container_codec.get_or_insert(playback.codec_hint());
        }

        if probe.detected_codec.is_none() && frame.kind.is_video() {
            let nalus = scan_annex_b(frame.payload);
            let codec = codec::detect(&nalus);
            if ParameterSets::extract(codec, &nalus).is_some() {
                probe.detected_codec = Some(codec.name().to_string());
            }
        }
    }
    probe.bytes_parsed = reader.position();

    probe
}
