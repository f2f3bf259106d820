//! Recording session state machine.
//!
//! A [`Recorder`] owns one muxing session at a time:
//!
//! ```text
//! Uninitialized -> Initialized -> Recording ----------------> Stopped
//!                              \-> FragmentedRecording ------/
//!                                   (NoFragment <-> FragmentOpen)
//! ```
//!
//! Frames are gated on parameter sets: nothing reaches the muxer until one
//! frame carries a complete SPS/PPS (or VPS/SPS/PPS) bundle. All mutating
//! operations take `&mut self`; the recorder is not meant to be shared.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use dd_av::{validate_stream_name, DashPackager};
use dd_core::config::{CodecHint, RelockPolicy};
use dd_core::{Error, Result};

use crate::codec::{self, Codec, ParameterSets};
use crate::mux::{Mp4MuxerFactory, MuxMode, Muxer, MuxerFactory, TrackParams};
use crate::nal::{scan_annex_b, Nalu};
use crate::sample::{self, Sample, SampleClock, TIMESCALE};

/// Where the recorder is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Uninitialized,
    Initialized,
    Recording,
    FragmentedRecording { fragment_open: bool },
    Stopped,
}

impl RecorderState {
    pub fn is_recording(self) -> bool {
        matches!(
            self,
            RecorderState::Recording | RecorderState::FragmentedRecording { .. }
        )
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderState::Uninitialized => f.write_str("uninitialized"),
            RecorderState::Initialized => f.write_str("initialized"),
            RecorderState::Recording => f.write_str("recording"),
            RecorderState::FragmentedRecording { fragment_open: true } => {
                f.write_str("fragmented recording with an open fragment")
            }
            RecorderState::FragmentedRecording { fragment_open: false } => {
                f.write_str("fragmented recording without an open fragment")
            }
            RecorderState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Outcome of a successful [`Recorder::write_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// A sample reached the muxer at this decode time.
    Written { dts: u64 },
    /// Parameter sets are still incomplete; the frame was not recorded.
    AwaitingParameterSets,
    /// The frame held nothing but parameter sets.
    ParameterSetsOnly,
    /// The frame had no start code while parameter sets were still pending.
    Dropped,
}

/// A bounded run of samples inside a fragmented session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Starts at 1 and increases by one per fragment.
    pub sequence: u32,
    /// Decode time the fragment starts at.
    pub reference_time: u64,
    /// Requested length in milliseconds; 0 for implicitly opened fragments.
    pub target_duration_ms: u32,
}

#[derive(Debug, Clone)]
struct SessionParams {
    width: u32,
    height: u32,
    frame_rate: f64,
    codec_hint: CodecHint,
    frame_duration: u32,
}

/// Drives one recording session at a time.
pub struct Recorder {
    factory: Arc<dyn MuxerFactory>,
    relock_policy: RelockPolicy,
    state: RecorderState,
    params: Option<SessionParams>,
    muxer: Option<Box<dyn Muxer>>,
    parameter_sets: Option<ParameterSets>,
    clock: SampleClock,
    current_file: Option<PathBuf>,
    dash_root: Option<PathBuf>,
    fragment: Option<Fragment>,
    next_sequence: u32,
    fragments_written: u32,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    /// Recorder backed by the built-in MP4 muxer.
    pub fn new() -> Self {
        Self::with_muxer_factory(Arc::new(Mp4MuxerFactory))
    }

    pub fn with_muxer_factory(factory: Arc<dyn MuxerFactory>) -> Self {
        Self {
            factory,
            relock_policy: RelockPolicy::default(),
            state: RecorderState::Uninitialized,
            params: None,
            muxer: None,
            parameter_sets: None,
            clock: SampleClock::new(0),
            current_file: None,
            dash_root: None,
            fragment: None,
            next_sequence: 1,
            fragments_written: 0,
        }
    }

    pub fn with_relock_policy(mut self, policy: RelockPolicy) -> Self {
        self.relock_policy = policy;
        self
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Codec locked for the current session, once parameter sets arrived.
    pub fn codec(&self) -> Option<Codec> {
        self.parameter_sets.as_ref().map(|ps| ps.codec)
    }

    pub fn parameter_sets(&self) -> Option<&ParameterSets> {
        self.parameter_sets.as_ref()
    }

    /// File of the current (or most recently stopped) session.
    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    pub fn current_fragment(&self) -> Option<&Fragment> {
        self.fragment.as_ref()
    }

    /// Number of fragments closed in this session.
    pub fn fragments_written(&self) -> u32 {
        self.fragments_written
    }

    pub fn frame_duration(&self) -> Option<u32> {
        self.params.as_ref().map(|p| p.frame_duration)
    }

    /// Decode time the next automatically stamped sample will receive.
    pub fn next_dts(&self) -> u64 {
        self.clock.next_dts()
    }

    // ---------------------------------------------------------------------
    // Session lifecycle
    // ---------------------------------------------------------------------

    /// Validate and store the stream parameters for a new session.
    pub fn init(&mut self, width: u32, height: u32, frame_rate: f64, codec_hint: CodecHint) -> Result<()> {
        if self.state.is_recording() {
            return Err(Error::state("init", self.state));
        }
        if width == 0 || height == 0 {
            return Err(Error::Configuration(format!(
                "width and height must be positive, got {width}x{height}"
            )));
        }
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(Error::Configuration(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }

        let frame_duration = sample::frame_duration(frame_rate);
        if frame_duration == 0 {
            return Err(Error::Configuration(format!(
                "frame rate {frame_rate} exceeds the {TIMESCALE} Hz timescale"
            )));
        }

        self.params = Some(SessionParams {
            width,
            height,
            frame_rate,
            codec_hint,
            frame_duration,
        });
        self.parameter_sets = None;
        self.clock = SampleClock::new(frame_duration);
        self.current_file = None;
        self.dash_root = None;
        self.fragment = None;
        self.next_sequence = 1;
        self.fragments_written = 0;
        self.state = RecorderState::Initialized;

        tracing::info!(
            width,
            height,
            frame_rate,
            frame_duration,
            codec_hint = ?codec_hint,
            "recorder initialized"
        );
        Ok(())
    }

    /// Open a continuous MP4 at `<dir>/<YYYYmmdd_HHMMSS>.mp4`.
    pub fn start_recording(&mut self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        self.open_session("start_recording", dir.as_ref(), MuxMode::Continuous)?;
        self.state = RecorderState::Recording;
        self.current_path()
    }

    /// [`init`](Self::init) followed by opening a fragmented MP4 in `dir`.
    ///
    /// `dir` also becomes the root that [`generate_mpd`](Self::generate_mpd)
    /// writes stream directories into.
    pub fn init_fragmented(
        &mut self,
        width: u32,
        height: u32,
        frame_rate: f64,
        codec_hint: CodecHint,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        self.init(width, height, frame_rate, codec_hint)?;
        self.open_session("init_fragmented", dir.as_ref(), MuxMode::Fragmented)?;
        self.state = RecorderState::FragmentedRecording {
            fragment_open: false,
        };
        self.current_path()
    }

    fn current_path(&self) -> Result<PathBuf> {
        self.current_file
            .clone()
            .ok_or_else(|| Error::Internal("session opened without a file".into()))
    }

    fn open_session(&mut self, operation: &'static str, dir: &Path, mode: MuxMode) -> Result<()> {
        if self.state != RecorderState::Initialized {
            return Err(Error::state(operation, self.state));
        }
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::state(operation, self.state))?;

        std::fs::create_dir_all(dir).map_err(|e| Error::path(dir, e))?;
        let path = dir.join(Local::now().format("%Y%m%d_%H%M%S.mp4").to_string());

        let track = TrackParams {
            width: params.width,
            height: params.height,
            frame_rate: params.frame_rate,
            timescale: TIMESCALE,
            frame_duration: params.frame_duration,
            codec_hint: params.codec_hint,
        };
        let muxer = self.factory.open(&path, mode, &track)?;

        tracing::info!(path = %path.display(), mode = ?mode, "recording started");
        self.muxer = Some(muxer);
        self.current_file = Some(path);
        self.dash_root = Some(dir.to_path_buf());
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Frames
    // ---------------------------------------------------------------------

    /// Feed one Annex-B access unit.
    ///
    /// `timestamp` overrides the automatic decode time; it may not be earlier
    /// than the previous sample's.
    pub fn write_frame(
        &mut self,
        data: &[u8],
        is_key_frame: bool,
        timestamp: Option<u64>,
    ) -> Result<FrameDisposition> {
        if !self.state.is_recording() {
            return Err(Error::state("write_frame", self.state));
        }
        if data.is_empty() {
            return Err(Error::Parse("empty frame".into()));
        }

        let nalus = scan_annex_b(data);
        if nalus.is_empty() {
            if self.parameter_sets.is_none() {
                tracing::warn!(len = data.len(), "frame without start code dropped");
                return Ok(FrameDisposition::Dropped);
            }
            return Err(Error::Parse(format!(
                "no Annex-B start code in {}-byte frame",
                data.len()
            )));
        }

        // A rejected timestamp must not relock parameter sets.
        let dts = self.clock.stamp(timestamp)?;

        let codec = match self.lock_parameter_sets(&nalus)? {
            Some(codec) => codec,
            None => return Ok(FrameDisposition::AwaitingParameterSets),
        };

        let Some(payload) = sample::assemble(codec, &nalus) else {
            return Ok(FrameDisposition::ParameterSetsOnly);
        };

        let implicit_fragment = self.state
            == (RecorderState::FragmentedRecording {
                fragment_open: false,
            });
        if implicit_fragment {
            self.open_fragment(0)?;
        }

        let sample = Sample {
            payload,
            dts,
            duration: self.clock.duration(),
            is_sync: is_key_frame,
        };
        let written = self
            .muxer_mut("write_frame")
            .and_then(|muxer| muxer.write_sample(&sample));
        if let Err(e) = written {
            if implicit_fragment {
                self.discard_fragment();
            }
            return Err(e);
        }
        self.clock.commit(dts);

        tracing::trace!(dts, size = sample.payload.len(), key = is_key_frame, "sample written");
        Ok(FrameDisposition::Written { dts })
    }

    /// Detect and lock parameter sets, returning the active codec once locked.
    fn lock_parameter_sets(&mut self, nalus: &[Nalu<'_>]) -> Result<Option<Codec>> {
        if let Some(locked) = &self.parameter_sets {
            if self.relock_policy == RelockPolicy::LockOnce {
                return Ok(Some(locked.codec));
            }
            let codec = codec::detect(nalus);
            return match ParameterSets::extract(codec, nalus) {
                Some(ps) if ps != *locked => {
                    self.muxer_mut("write_frame")?.configure(&ps)?;
                    tracing::info!(codec = %codec, "parameter sets changed; muxer reconfigured");
                    self.parameter_sets = Some(ps);
                    Ok(Some(codec))
                }
                _ => Ok(Some(locked.codec)),
            };
        }

        let codec = codec::detect(nalus);
        let Some(ps) = ParameterSets::extract(codec, nalus) else {
            tracing::debug!(codec = %codec, "waiting for complete parameter sets");
            return Ok(None);
        };

        if let Some(hinted) = self.params.as_ref().and_then(|p| Codec::from_hint(p.codec_hint)) {
            if hinted != codec {
                tracing::warn!(hint = %hinted, detected = %codec, "codec hint overridden by bitstream");
            }
        }

        self.muxer_mut("write_frame")?.configure(&ps)?;
        tracing::info!(codec = %codec, profile = ?ps.profile, "parameter sets locked");
        self.parameter_sets = Some(ps);
        Ok(Some(codec))
    }

    fn muxer_mut(&mut self, operation: &'static str) -> Result<&mut Box<dyn Muxer>> {
        let state = self.state;
        self.muxer
            .as_mut()
            .ok_or_else(|| Error::state(operation, state))
    }

    // ---------------------------------------------------------------------
    // Fragments
    // ---------------------------------------------------------------------

    /// Open a new fragment, closing an open one first. Returns its sequence
    /// number.
    pub fn start_fragment(&mut self, duration_ms: u32) -> Result<u32> {
        match self.state {
            RecorderState::FragmentedRecording { fragment_open } => {
                if fragment_open {
                    self.end_fragment()?;
                }
                self.open_fragment(duration_ms)
            }
            state => Err(Error::state("start_fragment", state)),
        }
    }

    fn open_fragment(&mut self, duration_ms: u32) -> Result<u32> {
        let fragment = Fragment {
            sequence: self.next_sequence,
            reference_time: self.clock.next_dts(),
            target_duration_ms: duration_ms,
        };
        self.muxer_mut("start_fragment")?
            .begin_fragment(fragment.sequence, fragment.reference_time)?;

        tracing::debug!(
            sequence = fragment.sequence,
            reference_time = fragment.reference_time,
            duration_ms,
            "fragment opened"
        );
        self.next_sequence += 1;
        self.fragment = Some(fragment);
        self.state = RecorderState::FragmentedRecording {
            fragment_open: true,
        };
        Ok(fragment.sequence)
    }

    /// Forget an implicitly opened fragment whose first sample failed.
    ///
    /// The muxer still holds it empty; the next `begin_fragment` replaces it
    /// without writing anything.
    fn discard_fragment(&mut self) {
        if let Some(fragment) = self.fragment.take() {
            tracing::debug!(sequence = fragment.sequence, "empty fragment discarded");
            self.next_sequence = fragment.sequence;
        }
        self.state = RecorderState::FragmentedRecording {
            fragment_open: false,
        };
    }

    /// Close the open fragment.
    pub fn end_fragment(&mut self) -> Result<()> {
        if self.state
            != (RecorderState::FragmentedRecording {
                fragment_open: true,
            })
        {
            return Err(Error::state("end_fragment", self.state));
        }
        self.muxer_mut("end_fragment")?.end_fragment()?;

        if let Some(fragment) = self.fragment.take() {
            tracing::debug!(sequence = fragment.sequence, "fragment closed");
        }
        self.fragments_written += 1;
        self.state = RecorderState::FragmentedRecording {
            fragment_open: false,
        };
        Ok(())
    }

    /// Flush any open fragment, finalize the file and return its path.
    ///
    /// If finalizing fails the session is still over: the recorder moves to
    /// `Stopped` and the error is returned.
    pub fn stop_recording(&mut self) -> Result<PathBuf> {
        match self.state {
            RecorderState::FragmentedRecording { fragment_open: true } => self.end_fragment()?,
            RecorderState::FragmentedRecording { fragment_open: false } | RecorderState::Recording => {}
            state => return Err(Error::state("stop_recording", state)),
        }

        let muxer = self
            .muxer
            .take()
            .ok_or_else(|| Error::state("stop_recording", self.state))?;
        self.state = RecorderState::Stopped;
        if self.parameter_sets.is_none() {
            tracing::warn!("recording stopped before any parameter sets arrived; file holds no samples");
        }

        let path = muxer.finalize()?;
        tracing::info!(
            path = %path.display(),
            fragments = self.fragments_written,
            "recording stopped"
        );
        Ok(path)
    }

    /// Package the session's file as DASH under `<dir>/<stream_name>/`.
    ///
    /// Stops the session first if it is still recording. Returns the stream
    /// directory.
    pub async fn generate_mpd(
        &mut self,
        packager: &dyn DashPackager,
        stream_name: &str,
        segment_duration_secs: f64,
    ) -> Result<PathBuf> {
        validate_stream_name(stream_name)?;
        if self.state.is_recording() {
            self.stop_recording()?;
        }
        let (Some(source), Some(root)) = (self.current_file.clone(), self.dash_root.clone()) else {
            return Err(Error::state("generate_mpd", self.state));
        };

        let packaged = packager
            .package(&source, &root, stream_name, segment_duration_secs)
            .await?;
        tracing::info!(stream = stream_name, dir = %packaged.dir.display(), "DASH manifest generated");
        Ok(packaged.dir)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(muxer) = self.muxer.take() {
            if let Some(fragment) = self.fragment.take() {
                tracing::debug!(sequence = fragment.sequence, "flushing open fragment on drop");
            }
            match muxer.finalize() {
                Ok(path) => tracing::info!(path = %path.display(), "recording finalized on drop"),
                Err(e) => tracing::warn!("failed to finalize recording on drop: {e}"),
            }
        }
    }
}
