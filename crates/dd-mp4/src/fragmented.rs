//! Fragmented MP4 writer.
//!
//! The init segment (`ftyp` + `moov` with `mvex`) is written as soon as the
//! decoder configuration is known. Each closed fragment becomes one
//! `moof` + `mdat` pair appended to the same file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::boxes::{self, SampleEntry, SampleTables, TrunSample};
use crate::config_record::DecoderConfig;
use crate::error::{Mp4Error, Result};
use crate::{Sample, TrackConfig};

struct OpenFragment {
    sequence: u32,
    base_decode_time: u64,
    samples: Vec<Sample>,
}

pub struct FragmentedMp4Writer {
    path: PathBuf,
    out: BufWriter<File>,
    track: TrackConfig,
    config: Option<DecoderConfig>,
    fragment: Option<OpenFragment>,
    last_dts: Option<u64>,
    fragments_written: u32,
}

impl FragmentedMp4Writer {
    pub fn create(path: impl AsRef<Path>, track: TrackConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            out,
            track,
            config: None,
            fragment: None,
            last_dts: None,
            fragments_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fragments_written(&self) -> u32 {
        self.fragments_written
    }

    pub fn has_open_fragment(&self) -> bool {
        self.fragment.is_some()
    }

    /// Set the decoder configuration and write the init segment.
    ///
    /// Setting an identical configuration again is a no-op; a different one
    /// fails because the init segment is already on disk.
    pub fn set_decoder_config(&mut self, config: DecoderConfig) -> Result<()> {
        if let Some(existing) = &self.config {
            if *existing == config {
                return Ok(());
            }
            return Err(Mp4Error::InitSegmentWritten);
        }

        let record = config.to_bytes()?;
        let entry = SampleEntry {
            entry_type: config.sample_entry_type(),
            config_type: config.config_box_type(),
            config: &record,
        };
        let t = &self.track;
        let stbl = boxes::write_stbl(&entry, t.width, t.height, &SampleTables::default());
        let trak = boxes::write_video_trak(t.track_id, t.timescale, 0, t.width, t.height, &stbl);
        let trex = boxes::write_trex(t.track_id, t.default_sample_duration);
        let mvex = boxes::write_container_box(b"mvex", &[&trex]);
        let mvhd = boxes::write_mvhd(t.timescale, 0, t.track_id + 1);
        let moov = boxes::write_moov(&mvhd, &trak, Some(&mvex));

        self.out.write_all(&boxes::write_ftyp(b"iso6", boxes::FRAGMENTED_BRANDS))?;
        self.out.write_all(&moov)?;
        self.out.flush()?;
        self.config = Some(config);
        Ok(())
    }

    /// Open a fragment. An already open fragment is flushed first.
    pub fn begin_fragment(&mut self, sequence: u32, base_decode_time: u64) -> Result<()> {
        if self.fragment.is_some() {
            self.end_fragment()?;
        }
        self.fragment = Some(OpenFragment {
            sequence,
            base_decode_time,
            samples: Vec::new(),
        });
        Ok(())
    }

    pub fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        if self.config.is_none() {
            return Err(Mp4Error::NotConfigured);
        }
        if let Some(last) = self.last_dts {
            if sample.dts < last {
                return Err(Mp4Error::NonMonotonicDts { dts: sample.dts, last });
            }
        }
        if sample.data.len() > u32::MAX as usize {
            return Err(Mp4Error::SampleTooLarge(sample.data.len()));
        }
        let fragment = self.fragment.as_mut().ok_or(Mp4Error::NoOpenFragment)?;
        fragment.samples.push(sample.clone());
        self.last_dts = Some(sample.dts);
        Ok(())
    }

    /// Close the open fragment, writing `moof` + `mdat` if it holds samples.
    ///
    /// Returns whether anything was written.
    pub fn end_fragment(&mut self) -> Result<bool> {
        let fragment = self.fragment.take().ok_or(Mp4Error::NoOpenFragment)?;
        if fragment.samples.is_empty() {
            return Ok(false);
        }
        let segment = self.build_media_segment(&fragment);
        self.out.write_all(&segment)?;
        self.out.flush()?;
        self.fragments_written += 1;
        Ok(true)
    }

    /// Flush any open fragment and close the file.
    pub fn finish(mut self) -> Result<PathBuf> {
        if self.fragment.is_some() {
            self.end_fragment()?;
        }
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.path)
    }

    fn build_media_segment(&self, fragment: &OpenFragment) -> Vec<u8> {
        let samples = &fragment.samples;
        let track_id = self.track.track_id;

        // tfdt carries the first sample's decode time.
        let base = samples
            .first()
            .map_or(fragment.base_decode_time, |s| s.dts);

        let trun_samples: Vec<TrunSample> = samples
            .iter()
            .enumerate()
            .map(|(i, s)| TrunSample {
                duration: match samples.get(i + 1) {
                    Some(next) => u32::try_from(next.dts - s.dts).unwrap_or(u32::MAX),
                    None => s.duration,
                },
                size: s.data.len() as u32,
                flags: boxes::sample_flags(s.is_sync),
            })
            .collect();

        let mfhd = boxes::write_mfhd(fragment.sequence);
        let tfhd = boxes::write_tfhd(track_id);
        let tfdt = boxes::write_tfdt(base);

        let traf_size = 8 + tfhd.len() + tfdt.len() + boxes::trun_size(trun_samples.len());
        let moof_size = 8 + mfhd.len() + traf_size;
        let total_data_size: u64 = samples.iter().map(|s| s.data.len() as u64).sum();
        let mdat_hdr = boxes::write_mdat_header(total_data_size);
        let data_offset = (moof_size + mdat_hdr.len()) as i32;

        let trun = boxes::write_trun(&trun_samples, data_offset);
        let traf = boxes::write_container_box(b"traf", &[&tfhd, &tfdt, &trun]);
        let moof = boxes::write_container_box(b"moof", &[&mfhd, &traf]);

        let mut result = Vec::with_capacity(moof.len() + mdat_hdr.len() + total_data_size as usize);
        result.extend_from_slice(&moof);
        result.extend_from_slice(&mdat_hdr);
        for sample in samples {
            result.extend_from_slice(&sample.data);
        }
        result
    }
}
