//! Reader for the Dahua "DHAV" DVR container.
//!
//! Every frame is laid out as:
//!
//! ```text
//! +-----------------+-------------------+---------+-----------------+
//! | header (24 B)   | extensions (ext)  | payload | tail (8 B)      |
//! +-----------------+-------------------+---------+-----------------+
//! ```
//!
//! All header integers are little-endian. `frame_len` covers the whole frame
//! including header and tail. Byte 23 is the 8-bit wrapping sum of bytes
//! 0..23.

use chrono::{NaiveDate, NaiveDateTime};
use dd_core::config::CodecHint;
use dd_core::{Error, Result};
use serde::Serialize;

pub const MAGIC: &[u8; 4] = b"DHAV";
pub const HEADER_LEN: usize = 24;
pub const TAIL_LEN: usize = 8;

const CHECKSUM_INDEX: usize = 23;

/// Frame type byte at offset 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    I,
    P,
    B,
    Jpeg,
    Audio,
    Assistant,
    Unknown(u8),
}

impl FrameKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0xFD => FrameKind::I,
            0xFC => FrameKind::P,
            0xFE => FrameKind::B,
            0xFB => FrameKind::Jpeg,
            0xF0 => FrameKind::Audio,
            0xF1 => FrameKind::Assistant,
            other => FrameKind::Unknown(other),
        }
    }

    /// I, P and B frames carry the video elementary stream.
    pub fn is_video(self) -> bool {
        matches!(self, FrameKind::I | FrameKind::P | FrameKind::B)
    }

    pub fn is_key(self) -> bool {
        self == FrameKind::I
    }
}

/// Extension `0x80`: coded picture size in units of 8 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub encode: u8,
    pub width: u32,
    pub height: u32,
}

/// Extension `0x81`: playback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Playback {
    /// Frames between I-frames; 0 in legacy streams.
    pub gop_interval: u8,
    pub protocol: u8,
    pub fps: u8,
}

impl Playback {
    /// 2 is H.264, 12 is H.265. Anything else leaves detection to the
    /// bitstream.
    pub fn codec_hint(&self) -> CodecHint {
        match self.protocol {
            2 | 4 => CodecHint::H264,
            12 => CodecHint::H265,
            _ => CodecHint::Auto,
        }
    }
}

/// Decoded extension fields. Only the ones the ingest path uses are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback: Option<Playback>,
    /// Tag that stopped extension parsing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_tag: Option<u8>,
}

/// Fixed length of an extension field including its tag byte.
fn extension_len(tag: u8) -> Option<usize> {
    match tag {
        0x80 | 0x81 | 0x83 | 0x85 | 0x89 | 0x8B | 0x94 | 0x96 | 0x98 => Some(4),
        0x82 | 0x84 | 0x88 | 0x8A | 0x90..=0x93 | 0x95 | 0x9A | 0x9B => Some(8),
        _ => None,
    }
}

fn parse_extensions(mut ext: &[u8]) -> Extensions {
    let mut out = Extensions::default();
    while let Some(&tag) = ext.first() {
        let Some(len) = extension_len(tag) else {
            out.unknown_tag = Some(tag);
            break;
        };
        let Some((field, rest)) = ext.split_at_checked(len) else {
            break;
        };
        match tag {
            0x80 => {
                out.image_size = Some(ImageSize {
                    encode: field[1],
                    width: u32::from(field[2]) * 8,
                    height: u32::from(field[3]) * 8,
                })
            }
            0x81 => {
                out.playback = Some(Playback {
                    gop_interval: field[1],
                    protocol: field[2],
                    fps: field[3],
                })
            }
            _ => {}
        }
        ext = rest;
    }
    out
}

/// Packed wall-clock time, least significant field first:
/// second:6 minute:6 hour:5 day:5 month:4 year:6 (offset from 2000).
pub fn decode_datetime(packed: u32) -> Option<NaiveDateTime> {
    let second = packed & 0x3F;
    let minute = (packed >> 6) & 0x3F;
    let hour = (packed >> 12) & 0x1F;
    let day = (packed >> 17) & 0x1F;
    let month = (packed >> 22) & 0x0F;
    let year = 2000 + ((packed >> 26) & 0x3F) as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Byte sum of everything before the checksum field.
pub fn checksum(header: &[u8; HEADER_LEN]) -> u8 {
    header[..CHECKSUM_INDEX]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// One container frame borrowing the reader's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhavFrame<'a> {
    pub kind: FrameKind,
    pub sub_type: u8,
    pub channel: u8,
    pub sub_frame_index: u8,
    pub frame_index: u32,
    /// Byte offset of the header within the buffer.
    pub offset: usize,
    pub frame_len: u32,
    /// `None` when the packed date is not a valid calendar date.
    pub timestamp: Option<NaiveDateTime>,
    pub time_ms: u16,
    pub extensions: Extensions,
    pub payload: &'a [u8],
}

fn parse_err(offset: usize, msg: impl std::fmt::Display) -> Error {
    Error::Parse(format!("DHAV frame at offset {offset}: {msg}"))
}

impl<'a> DhavFrame<'a> {
    /// Parse the frame at the start of `buf`. `offset` is only used for
    /// positions in errors and in the returned frame.
    pub fn parse(buf: &'a [u8], offset: usize) -> Result<Self> {
        let Some(header) = buf.first_chunk::<HEADER_LEN>() else {
            return Err(parse_err(
                offset,
                format!("truncated header ({} bytes left)", buf.len()),
            ));
        };
        if &header[..4] != MAGIC {
            return Err(parse_err(offset, "bad magic"));
        }
        let expected = checksum(header);
        if header[CHECKSUM_INDEX] != expected {
            return Err(parse_err(
                offset,
                format!(
                    "checksum mismatch (stored {:#04x}, computed {expected:#04x})",
                    header[CHECKSUM_INDEX]
                ),
            ));
        }

        let le32 = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
        let frame_index = le32(8);
        let frame_len = le32(12);
        let packed_time = le32(16);
        let time_ms = u16::from_le_bytes([header[20], header[21]]);
        let ext_len = header[22] as usize;

        let frame_len_usize = frame_len as usize;
        if frame_len_usize > buf.len() {
            return Err(parse_err(
                offset,
                format!("declared length {frame_len} exceeds the {} remaining bytes", buf.len()),
            ));
        }
        let overhead = HEADER_LEN + ext_len + TAIL_LEN;
        if frame_len_usize < overhead {
            return Err(parse_err(
                offset,
                format!("declared length {frame_len} is shorter than header, extensions and tail ({overhead})"),
            ));
        }

        let extensions = parse_extensions(&buf[HEADER_LEN..HEADER_LEN + ext_len]);
        let payload = &buf[HEADER_LEN + ext_len..frame_len_usize - TAIL_LEN];

        Ok(Self {
            kind: FrameKind::from_byte(header[4]),
            sub_type: header[5],
            channel: header[6],
            sub_frame_index: header[7],
            frame_index,
            offset,
            frame_len,
            timestamp: decode_datetime(packed_time),
            time_ms,
            extensions,
            payload,
        })
    }
}

/// Iterator over the frames of a DHAV buffer.
///
/// Yields one `Err` for the first malformed frame and then stops; there is
/// no resynchronisation.
pub struct DhavReader<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> DhavReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            done: false,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for DhavReader<'a> {
    type Item = Result<DhavFrame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.buf.len() {
            return None;
        }
        match DhavFrame::parse(&self.buf[self.pos..], self.pos) {
            Ok(frame) => {
                self.pos += frame.frame_len as usize;
                Some(Ok(frame))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
