//! Continuous (progressive) MP4 writer.
//!
//! Sample bytes stream straight into a 64-bit `mdat` while recording; the
//! `moov` with the full sample table is appended by [`Mp4Writer::finish`],
//! which also patches the `mdat` size in place.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::boxes::{self, SampleEntry, SampleTables};
use crate::config_record::DecoderConfig;
use crate::error::{Mp4Error, Result};
use crate::{Sample, TrackConfig};

struct SampleRecord {
    dts: u64,
    duration: u32,
    size: u32,
    offset: u64,
    is_sync: bool,
}

pub struct Mp4Writer {
    path: PathBuf,
    out: BufWriter<File>,
    track: TrackConfig,
    config: Option<(DecoderConfig, Vec<u8>)>,
    samples: Vec<SampleRecord>,
    mdat_start: u64,
    position: u64,
}

impl Mp4Writer {
    /// Create the file and write `ftyp` plus an open `mdat` header.
    pub fn create(path: impl AsRef<Path>, track: TrackConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BufWriter::new(File::create(&path)?);

        let ftyp = boxes::write_ftyp(b"isom", boxes::PROGRESSIVE_BRANDS);
        out.write_all(&ftyp)?;

        // 64-bit mdat: size field of 1, largesize patched on finish.
        let mdat_start = ftyp.len() as u64;
        out.write_all(&1u32.to_be_bytes())?;
        out.write_all(b"mdat")?;
        out.write_all(&0u64.to_be_bytes())?;

        Ok(Self {
            path,
            out,
            track,
            config: None,
            samples: Vec::new(),
            mdat_start,
            position: mdat_start + 16,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Set the decoder configuration written into `stsd`.
    ///
    /// The table is only serialized on finish, so a later call replaces an
    /// earlier one.
    pub fn set_decoder_config(&mut self, config: DecoderConfig) -> Result<()> {
        let bytes = config.to_bytes()?;
        self.config = Some((config, bytes));
        Ok(())
    }

    pub fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        if self.config.is_none() {
            return Err(Mp4Error::NotConfigured);
        }
        if let Some(last) = self.samples.last() {
            if sample.dts < last.dts {
                return Err(Mp4Error::NonMonotonicDts {
                    dts: sample.dts,
                    last: last.dts,
                });
            }
        }
        let size =
            u32::try_from(sample.data.len()).map_err(|_| Mp4Error::SampleTooLarge(sample.data.len()))?;

        self.out.write_all(&sample.data)?;
        self.samples.push(SampleRecord {
            dts: sample.dts,
            duration: sample.duration,
            size,
            offset: self.position,
            is_sync: sample.is_sync,
        });
        self.position += size as u64;
        Ok(())
    }

    /// Patch the `mdat` size, append `moov` and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        let mdat_size = self.position - self.mdat_start;
        self.out.seek(SeekFrom::Start(self.mdat_start + 8))?;
        self.out.write_all(&mdat_size.to_be_bytes())?;
        self.out.seek(SeekFrom::Start(self.position))?;

        let moov = self.build_moov();
        self.out.write_all(&moov)?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.path)
    }

    fn build_moov(&self) -> Vec<u8> {
        let tables = self.sample_tables();
        let duration: u64 = tables
            .time_to_sample
            .iter()
            .map(|&(count, delta)| count as u64 * delta as u64)
            .sum();

        let (entry_type, config_type, config_bytes) = match &self.config {
            Some((cfg, bytes)) => (cfg.sample_entry_type(), cfg.config_box_type(), bytes.as_slice()),
            None => (b"avc1", b"avcC", &[][..]),
        };
        let entry = SampleEntry {
            entry_type,
            config_type,
            config: config_bytes,
        };

        let t = &self.track;
        let stbl = boxes::write_stbl(&entry, t.width, t.height, &tables);
        let trak = boxes::write_video_trak(t.track_id, t.timescale, duration, t.width, t.height, &stbl);
        let mvhd = boxes::write_mvhd(t.timescale, duration, t.track_id + 1);
        boxes::write_moov(&mvhd, &trak, None)
    }

    fn sample_tables(&self) -> SampleTables {
        let mut tables = SampleTables::default();

        for (i, s) in self.samples.iter().enumerate() {
            let delta = match self.samples.get(i + 1) {
                Some(next) => u32::try_from(next.dts - s.dts).unwrap_or(u32::MAX),
                None => s.duration,
            };
            match tables.time_to_sample.last_mut() {
                Some((count, d)) if *d == delta => *count += 1,
                _ => tables.time_to_sample.push((1, delta)),
            }
            tables.sizes.push(s.size);
            tables.chunk_offsets.push(s.offset);
        }

        if self.samples.iter().any(|s| !s.is_sync) {
            tables.sync_samples = Some(
                self.samples
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.is_sync)
                    .map(|(i, _)| i as u32 + 1)
                    .collect(),
            );
        }
        tables
    }
}
