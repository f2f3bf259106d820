//! Feed a DHAV capture through a [`Recorder`].

use std::path::{Path, PathBuf};

use dd_core::config::CodecHint;
use dd_core::{Error, Result};
use dd_media::dhav::{DhavFrame, DhavReader, Extensions};
use dd_media::{FrameDisposition, Recorder};

/// Frame rate assumed when neither the caller nor the stream provides one.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

/// Caller overrides. `None` fields are taken from the stream's extensions.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub codec: CodecHint,
    /// Write fragmented MP4, one fragment per GOP.
    pub fragmented: bool,
}

/// Resolved session parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub codec: CodecHint,
    /// GOP length in milliseconds, when the stream announces one.
    pub gop_ms: Option<u32>,
}

/// Counters for one ingest run.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub frames_read: usize,
    pub video_frames: usize,
    pub samples_written: usize,
    /// Video frames that produced no sample (waiting for or holding only
    /// parameter sets).
    pub frames_skipped: usize,
    /// Video frames the recorder rejected as malformed.
    pub frames_rejected: usize,
    /// Container error that ended the run early.
    pub container_error: Option<String>,
    pub output: Option<PathBuf>,
}

/// Combine caller overrides with what the first video frame announces.
pub fn resolve_params(opts: &IngestOptions, ext: Option<&Extensions>) -> Result<StreamParams> {
    let image = ext.and_then(|e| e.image_size);
    let playback = ext.and_then(|e| e.playback);

    let (Some(width), Some(height)) = (
        opts.width.or(image.map(|i| i.width)),
        opts.height.or(image.map(|i| i.height)),
    ) else {
        return Err(Error::Configuration(
            "stream does not announce its picture size; pass --width and --height".into(),
        ));
    };

    let stream_fps = playback.map(|p| p.fps).filter(|&fps| fps > 0).map(f64::from);
    let frame_rate = match opts.frame_rate.or(stream_fps) {
        Some(fps) => fps,
        None => {
            tracing::warn!("stream does not announce a frame rate; assuming {DEFAULT_FRAME_RATE}");
            DEFAULT_FRAME_RATE
        }
    };

    let codec = match opts.codec {
        CodecHint::Auto => playback.map(|p| p.codec_hint()).unwrap_or(CodecHint::Auto),
        explicit => explicit,
    };

    let gop_ms = playback
        .filter(|p| p.gop_interval > 0)
        .map(|p| ((f64::from(p.gop_interval) * 1000.0) / frame_rate).round() as u32);

    Ok(StreamParams {
        width,
        height,
        frame_rate,
        codec,
        gop_ms,
    })
}

/// Record every video frame of `data` into a new session under `out_dir`.
///
/// The session is left open so the caller can either stop it or hand it to
/// [`Recorder::generate_mpd`]. A malformed container frame ends the run
/// early and is reported in [`IngestSummary::container_error`].
pub fn ingest_dhav(
    data: &[u8],
    recorder: &mut Recorder,
    out_dir: &Path,
    opts: &IngestOptions,
) -> Result<IngestSummary> {
    let first_video = DhavReader::new(data)
        .map_while(|r| r.ok())
        .find(|f| f.kind.is_video());
    let Some(first_video) = first_video else {
        return Err(Error::Parse("no video frames in input".into()));
    };

    let params = resolve_params(opts, Some(&first_video.extensions))?;
    tracing::info!(
        width = params.width,
        height = params.height,
        frame_rate = params.frame_rate,
        codec = ?params.codec,
        fragmented = opts.fragmented,
        "ingesting DHAV stream"
    );

    let output = if opts.fragmented {
        recorder.init_fragmented(params.width, params.height, params.frame_rate, params.codec, out_dir)?
    } else {
        recorder.init(params.width, params.height, params.frame_rate, params.codec)?;
        recorder.start_recording(out_dir)?
    };

    let mut summary = IngestSummary {
        output: Some(output),
        ..Default::default()
    };

    for frame in DhavReader::new(data) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("stopping at malformed container frame: {e}");
                summary.container_error = Some(e.to_string());
                break;
            }
        };
        summary.frames_read += 1;
        if !frame.kind.is_video() {
            continue;
        }
        summary.video_frames += 1;
        write_video_frame(recorder, &frame, opts.fragmented, params.gop_ms, &mut summary)?;
    }

    tracing::info!(
        frames = summary.frames_read,
        samples = summary.samples_written,
        skipped = summary.frames_skipped,
        rejected = summary.frames_rejected,
        "ingest finished"
    );
    Ok(summary)
}

fn write_video_frame(
    recorder: &mut Recorder,
    frame: &DhavFrame<'_>,
    fragmented: bool,
    gop_ms: Option<u32>,
    summary: &mut IngestSummary,
) -> Result<()> {
    let key = frame.kind.is_key();

    // Each GOP after the first starts a fragment; the first one opens
    // implicitly with the first sample.
    if fragmented && key && recorder.current_fragment().is_some() {
        recorder.start_fragment(gop_ms.unwrap_or(0))?;
    }

    match recorder.write_frame(frame.payload, key, None) {
        Ok(FrameDisposition::Written { .. }) => summary.samples_written += 1,
        Ok(disposition) => {
            tracing::debug!(frame_index = frame.frame_index, ?disposition, "frame not recorded");
            summary.frames_skipped += 1;
        }
        Err(e) if e.is_bad_input() => {
            tracing::warn!(frame_index = frame.frame_index, "frame rejected: {e}");
            summary.frames_rejected += 1;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
