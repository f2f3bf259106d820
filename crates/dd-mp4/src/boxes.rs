//! ISO BMFF box writers for a single video track.
//!
//! Every box is built in a [`BytesMut`]: a size placeholder, the fourcc, the
//! body, then the size is patched once the body length is known.

use bytes::{BufMut, BytesMut};

fn bmff_box(fourcc: &[u8; 4], body: impl FnOnce(&mut BytesMut)) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u32(0);
    buf.put_slice(fourcc);
    body(&mut buf);
    let size = buf.len() as u32;
    buf[..4].copy_from_slice(&size.to_be_bytes());
    buf.to_vec()
}

fn full_box(fourcc: &[u8; 4], version: u8, flags: u32, body: impl FnOnce(&mut BytesMut)) -> Vec<u8> {
    bmff_box(fourcc, |buf| {
        buf.put_u8(version);
        buf.put_uint(u64::from(flags & 0x00FF_FFFF), 3);
        body(buf);
    })
}

pub(crate) fn write_container_box(fourcc: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    bmff_box(fourcc, |buf| children.iter().for_each(|child| buf.put_slice(child)))
}

pub(crate) const PROGRESSIVE_BRANDS: &[&[u8; 4]] = &[b"isom", b"iso2", b"mp41"];

/// Brands DASH packagers and MSE expect on a fragmented file.
pub(crate) const FRAGMENTED_BRANDS: &[&[u8; 4]] = &[b"iso6", b"isom", b"dash", b"mp41"];

pub(crate) fn write_ftyp(major: &[u8; 4], compatible: &[&[u8; 4]]) -> Vec<u8> {
    bmff_box(b"ftyp", |buf| {
        buf.put_slice(major);
        buf.put_u32(0x200);
        for brand in compatible {
            buf.put_slice(*brand);
        }
    })
}

/// Unity matrix in 16.16 / 2.30 fixed point.
fn put_unity_matrix(buf: &mut BytesMut) {
    for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        buf.put_u32(v);
    }
}

/// Version 1 creation and modification times, both zero.
fn put_zero_times(buf: &mut BytesMut) {
    buf.put_u64(0);
    buf.put_u64(0);
}

pub(crate) fn write_mvhd(timescale: u32, duration: u64, next_track_id: u32) -> Vec<u8> {
    full_box(b"mvhd", 1, 0, |buf| {
        put_zero_times(buf);
        buf.put_u32(timescale);
        buf.put_u64(duration);
        buf.put_u32(0x0001_0000); // rate
        buf.put_u16(0x0100); // volume
        buf.put_bytes(0, 10);
        put_unity_matrix(buf);
        buf.put_bytes(0, 24);
        buf.put_u32(next_track_id);
    })
}

fn write_tkhd(track_id: u32, duration: u64, width: u32, height: u32) -> Vec<u8> {
    // enabled | in_movie | in_preview
    full_box(b"tkhd", 1, 0x7, |buf| {
        put_zero_times(buf);
        buf.put_u32(track_id);
        buf.put_u32(0);
        buf.put_u64(duration);
        // reserved, layer, alternate group, volume, reserved
        buf.put_bytes(0, 16);
        put_unity_matrix(buf);
        buf.put_u32(width << 16);
        buf.put_u32(height << 16);
    })
}

fn write_mdhd(timescale: u32, duration: u64) -> Vec<u8> {
    full_box(b"mdhd", 1, 0, |buf| {
        put_zero_times(buf);
        buf.put_u32(timescale);
        buf.put_u64(duration);
        buf.put_u16(0x55C4); // "und"
        buf.put_u16(0);
    })
}

fn write_hdlr(handler: &[u8; 4], name: &str) -> Vec<u8> {
    full_box(b"hdlr", 0, 0, |buf| {
        buf.put_u32(0);
        buf.put_slice(handler);
        buf.put_bytes(0, 12);
        buf.put_slice(name.as_bytes());
        buf.put_u8(0);
    })
}

/// `dinf` with one self-contained `url ` entry.
fn write_dinf() -> Vec<u8> {
    let url = full_box(b"url ", 0, 1, |_| {});
    let dref = full_box(b"dref", 0, 0, |buf| {
        buf.put_u32(1);
        buf.put_slice(&url);
    });
    write_container_box(b"dinf", &[&dref])
}

fn write_vmhd() -> Vec<u8> {
    full_box(b"vmhd", 0, 1, |buf| buf.put_bytes(0, 8))
}

/// Sample entry fourcc (`avc1`/`hvc1`) with its configuration box.
pub(crate) struct SampleEntry<'a> {
    pub entry_type: &'a [u8; 4],
    pub config_type: &'a [u8; 4],
    pub config: &'a [u8],
}

fn write_visual_sample_entry(entry: &SampleEntry<'_>, width: u32, height: u32) -> Vec<u8> {
    bmff_box(entry.entry_type, |buf| {
        buf.put_bytes(0, 6);
        buf.put_u16(1); // data_reference_index
        buf.put_bytes(0, 16);
        buf.put_u16(width as u16);
        buf.put_u16(height as u16);
        buf.put_u32(0x0048_0000); // 72 dpi
        buf.put_u32(0x0048_0000);
        buf.put_u32(0);
        buf.put_u16(1); // frame_count
        buf.put_bytes(0, 32); // compressorname
        buf.put_u16(0x0018); // depth
        buf.put_i16(-1);
        if !entry.config.is_empty() {
            buf.put_slice(&bmff_box(entry.config_type, |cfg| cfg.put_slice(entry.config)));
        }
    })
}

fn write_stsd(entry: &SampleEntry<'_>, width: u32, height: u32) -> Vec<u8> {
    let visual = write_visual_sample_entry(entry, width, height);
    full_box(b"stsd", 0, 0, |buf| {
        buf.put_u32(1);
        buf.put_slice(&visual);
    })
}

/// Sample tables of a continuous file.
#[derive(Debug, Default)]
pub(crate) struct SampleTables {
    /// Run-length `(sample_count, sample_delta)`.
    pub time_to_sample: Vec<(u32, u32)>,
    /// 1-based; `None` when every sample is a sync sample.
    pub sync_samples: Option<Vec<u32>>,
    pub sizes: Vec<u32>,
    /// One chunk per sample.
    pub chunk_offsets: Vec<u64>,
}

fn write_u32_table(fourcc: &[u8; 4], values: &[u32]) -> Vec<u8> {
    full_box(fourcc, 0, 0, |buf| {
        buf.put_u32(values.len() as u32);
        values.iter().for_each(|&v| buf.put_u32(v));
    })
}

fn write_stts(runs: &[(u32, u32)]) -> Vec<u8> {
    full_box(b"stts", 0, 0, |buf| {
        buf.put_u32(runs.len() as u32);
        for &(count, delta) in runs {
            buf.put_u32(count);
            buf.put_u32(delta);
        }
    })
}

fn write_stsz(sizes: &[u32]) -> Vec<u8> {
    full_box(b"stsz", 0, 0, |buf| {
        buf.put_u32(0);
        buf.put_u32(sizes.len() as u32);
        sizes.iter().for_each(|&s| buf.put_u32(s));
    })
}

/// Every chunk holds one sample of description 1.
fn write_stsc(has_samples: bool) -> Vec<u8> {
    full_box(b"stsc", 0, 0, |buf| {
        if has_samples {
            buf.put_u32(1);
            buf.put_u32(1);
            buf.put_u32(1);
            buf.put_u32(1);
        } else {
            buf.put_u32(0);
        }
    })
}

/// `co64` once any offset passes 4 GiB, `stco` otherwise.
fn write_chunk_offsets(offsets: &[u64]) -> Vec<u8> {
    let Ok(narrow) = offsets.iter().map(|&o| u32::try_from(o)).collect::<Result<Vec<_>, _>>() else {
        return full_box(b"co64", 0, 0, |buf| {
            buf.put_u32(offsets.len() as u32);
            offsets.iter().for_each(|&o| buf.put_u64(o));
        });
    };
    write_u32_table(b"stco", &narrow)
}

pub(crate) fn write_stbl(entry: &SampleEntry<'_>, width: u32, height: u32, tables: &SampleTables) -> Vec<u8> {
    let mut children = vec![write_stsd(entry, width, height), write_stts(&tables.time_to_sample)];
    if let Some(sync) = &tables.sync_samples {
        children.push(write_u32_table(b"stss", sync));
    }
    children.push(write_stsc(!tables.sizes.is_empty()));
    children.push(write_stsz(&tables.sizes));
    children.push(write_chunk_offsets(&tables.chunk_offsets));

    let refs: Vec<&[u8]> = children.iter().map(Vec::as_slice).collect();
    write_container_box(b"stbl", &refs)
}

pub(crate) fn write_video_trak(
    track_id: u32,
    timescale: u32,
    duration: u64,
    width: u32,
    height: u32,
    stbl: &[u8],
) -> Vec<u8> {
    let minf = write_container_box(b"minf", &[&write_vmhd(), &write_dinf(), stbl]);
    let mdia = write_container_box(
        b"mdia",
        &[&write_mdhd(timescale, duration), &write_hdlr(b"vide", "VideoHandler"), &minf],
    );
    write_container_box(b"trak", &[&write_tkhd(track_id, duration, width, height), &mdia])
}

pub(crate) fn write_trex(track_id: u32, default_sample_duration: u32) -> Vec<u8> {
    full_box(b"trex", 0, 0, |buf| {
        buf.put_u32(track_id);
        buf.put_u32(1);
        buf.put_u32(default_sample_duration);
        buf.put_u32(0);
        buf.put_u32(0);
    })
}

pub(crate) fn write_moov(mvhd: &[u8], trak: &[u8], mvex: Option<&[u8]>) -> Vec<u8> {
    match mvex {
        Some(mvex) => write_container_box(b"moov", &[mvhd, trak, mvex]),
        None => write_container_box(b"moov", &[mvhd, trak]),
    }
}

pub(crate) fn write_mfhd(sequence_number: u32) -> Vec<u8> {
    full_box(b"mfhd", 0, 0, |buf| buf.put_u32(sequence_number))
}

const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

pub(crate) fn write_tfhd(track_id: u32) -> Vec<u8> {
    full_box(b"tfhd", 0, TFHD_DEFAULT_BASE_IS_MOOF, |buf| buf.put_u32(track_id))
}

pub(crate) fn write_tfdt(base_media_decode_time: u64) -> Vec<u8> {
    full_box(b"tfdt", 1, 0, |buf| buf.put_u64(base_media_decode_time))
}

pub(crate) struct TrunSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
}

const TRUN_DATA_OFFSET: u32 = 0x00_0001;
const TRUN_DURATION: u32 = 0x00_0100;
const TRUN_SIZE: u32 = 0x00_0200;
const TRUN_FLAGS: u32 = 0x00_0400;

/// Length of the `trun` that [`write_trun`] produces for `sample_count`
/// samples.
pub(crate) fn trun_size(sample_count: usize) -> usize {
    20 + sample_count * 12
}

/// `data_offset` counts from the first byte of the enclosing `moof`.
pub(crate) fn write_trun(samples: &[TrunSample], data_offset: i32) -> Vec<u8> {
    let flags = TRUN_DATA_OFFSET | TRUN_DURATION | TRUN_SIZE | TRUN_FLAGS;
    full_box(b"trun", 0, flags, |buf| {
        buf.put_u32(samples.len() as u32);
        buf.put_i32(data_offset);
        for s in samples {
            buf.put_u32(s.duration);
            buf.put_u32(s.size);
            buf.put_u32(s.flags);
        }
    })
}

/// Header for `payload_len` bytes of media data, switching to the 64-bit
/// form when the box would not fit a 32-bit size.
pub(crate) fn write_mdat_header(payload_len: u64) -> Vec<u8> {
    let mut hdr = BytesMut::with_capacity(16);
    match u32::try_from(payload_len + 8) {
        Ok(size) => {
            hdr.put_u32(size);
            hdr.put_slice(b"mdat");
        }
        Err(_) => {
            hdr.put_u32(1);
            hdr.put_slice(b"mdat");
            hdr.put_u64(payload_len + 16);
        }
    }
    hdr.to_vec()
}

/// Sync samples depend on nothing; others depend on an earlier sample and
/// are flagged non-sync.
pub(crate) fn sample_flags(is_sync: bool) -> u32 {
    if is_sync {
        0x0200_0000
    } else {
        0x0101_0000
    }
}

#[cfg(test)]
pub(crate) fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
}
