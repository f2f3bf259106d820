//! Sample assembly and decode-time stamping.

use bytes::{BufMut, Bytes, BytesMut};
use dd_core::{Error, Result};

use crate::codec::Codec;
use crate::nal::Nalu;

/// Track timescale in ticks per second.
pub const TIMESCALE: u32 = 90_000;

/// One encoded access unit ready for the muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Length-prefixed (AVCC) NAL units.
    pub payload: Bytes,
    /// Decode timestamp in [`TIMESCALE`] units.
    pub dts: u64,
    pub duration: u32,
    /// Sync / random-access point.
    pub is_sync: bool,
}

/// Per-frame duration in [`TIMESCALE`] units, rounded to the nearest tick.
pub fn frame_duration(frame_rate: f64) -> u32 {
    (TIMESCALE as f64 / frame_rate).round() as u32
}

/// Concatenate every non-parameter-set unit with a 4-byte big-endian length
/// prefix. `None` when nothing but parameter sets remain.
pub fn assemble(codec: Codec, nalus: &[Nalu<'_>]) -> Option<Bytes> {
    let total: usize = nalus
        .iter()
        .filter(|n| !codec.is_parameter_set(n.header()))
        .map(|n| 4 + n.len())
        .sum();
    if total == 0 {
        return None;
    }

    let mut payload = BytesMut::with_capacity(total);
    for nalu in nalus.iter().filter(|n| !codec.is_parameter_set(n.header())) {
        payload.put_u32(nalu.len() as u32);
        payload.put_slice(nalu.data());
    }
    Some(payload.freeze())
}

/// Split a length-prefixed payload back into its NAL units.
pub fn split_length_prefixed(payload: &[u8]) -> Result<Vec<&[u8]>> {
    let mut units = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let Some((prefix, tail)) = rest.split_first_chunk::<4>() else {
            return Err(Error::Parse(format!(
                "truncated length prefix: {} trailing bytes",
                rest.len()
            )));
        };
        let len = u32::from_be_bytes(*prefix) as usize;
        if len > tail.len() {
            return Err(Error::Parse(format!(
                "NAL length {len} exceeds remaining {} bytes",
                tail.len()
            )));
        }
        let (unit, next) = tail.split_at(len);
        units.push(unit);
        rest = next;
    }
    Ok(units)
}

/// Hands out decode timestamps for a session.
///
/// Explicit timestamps are taken verbatim but may not go backwards; without
/// one, the next timestamp is the previous one plus the frame duration.
#[derive(Debug, Clone)]
pub struct SampleClock {
    duration: u32,
    next_dts: u64,
    last_dts: Option<u64>,
}

impl SampleClock {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            next_dts: 0,
            last_dts: None,
        }
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Timestamp the next automatic sample would receive.
    pub fn next_dts(&self) -> u64 {
        self.next_dts
    }

    /// Resolve the timestamp for a sample without committing it.
    ///
    /// The sample must also end within the `u64` range.
    pub fn stamp(&self, explicit: Option<u64>) -> Result<u64> {
        let dts = explicit.unwrap_or(self.next_dts);
        if let Some(last) = self.last_dts {
            if dts < last {
                return Err(Error::NonMonotonicTimestamp { dts, last });
            }
        }
        if dts.checked_add(u64::from(self.duration)).is_none() {
            return Err(Error::Parse(format!(
                "timestamp {dts} leaves no room for a {}-tick sample",
                self.duration
            )));
        }
        Ok(dts)
    }

    /// Record that a sample at `dts` was accepted by the muxer.
    pub fn commit(&mut self, dts: u64) {
        self.last_dts = Some(dts);
        self.next_dts = dts.saturating_add(u64::from(self.duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nal::scan_annex_b;

    #[test]
    fn duration_rounds_to_nearest_tick() {
        assert_eq!(frame_duration(25.0), 3600);
        assert_eq!(frame_duration(30.0), 3000);
        assert_eq!(frame_duration(29.97), 3003);
        assert_eq!(frame_duration(7.0), 12857);
    }

    #[test]
    fn assemble_strips_parameter_sets_and_round_trips() {
        let data = [
            0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, //
            0, 0, 0, 1, 0x68, 0xCE, 0x38, //
            0, 0, 1, 0x06, 0x05, 0x11, //
            0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, 0x43,
        ];
        let nalus = scan_annex_b(&data);
        let payload = assemble(Codec::H264, &nalus).unwrap();
        assert_eq!(&payload[..4], &[0, 0, 0, 3]);
        assert_eq!(payload.len(), 4 + 3 + 4 + 5);

        let units = split_length_prefixed(&payload).unwrap();
        let expected: Vec<&[u8]> = nalus
            .iter()
            .filter(|n| !Codec::H264.is_parameter_set(n.header()))
            .map(|n| n.data())
            .collect();
        assert_eq!(units, expected);
    }

    #[test]
    fn parameter_sets_only_is_none() {
        let data = [0, 0, 1, 0x40, 0x01, 0, 0, 1, 0x42, 0x01, 0, 0, 1, 0x44, 0x01];
        assert!(assemble(Codec::H265, &scan_annex_b(&data)).is_none());
    }

    #[test]
    fn split_rejects_truncation() {
        assert!(split_length_prefixed(&[0, 0, 0, 9, 1, 2]).is_err());
        assert!(split_length_prefixed(&[0, 0, 1]).is_err());
        assert!(split_length_prefixed(&[]).unwrap().is_empty());
    }

    #[test]
    fn clock_auto_increments() {
        let mut clock = SampleClock::new(frame_duration(25.0));
        for i in 0..5u64 {
            let dts = clock.stamp(None).unwrap();
            assert_eq!(dts, i * 3600);
            clock.commit(dts);
        }
    }

    #[test]
    fn clock_continues_from_explicit_timestamp() {
        let mut clock = SampleClock::new(3000);
        let dts = clock.stamp(Some(90_000)).unwrap();
        clock.commit(dts);
        assert_eq!(clock.stamp(None).unwrap(), 93_000);
    }

    #[test]
    fn clock_rejects_backwards_timestamp() {
        let mut clock = SampleClock::new(3000);
        clock.commit(9000);
        let err = clock.stamp(Some(100)).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicTimestamp { dts: 100, last: 9000 }));
        // uncommitted stamps leave the clock untouched
        assert_eq!(clock.next_dts(), 12_000);
    }

    #[test]
    fn clock_rejects_timestamp_past_u64_range() {
        let clock = SampleClock::new(3600);
        assert!(matches!(clock.stamp(Some(u64::MAX - 10)), Err(Error::Parse(_))));
        assert_eq!(clock.stamp(Some(u64::MAX - 3600)).unwrap(), u64::MAX - 3600);
        assert_eq!(clock.next_dts(), 0);
    }
}
