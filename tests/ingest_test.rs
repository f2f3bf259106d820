//! DHAV captures through the recorder into real MP4 files.

mod common;

use assert_matches::assert_matches;
use common::*;
use dd_core::config::CodecHint;
use dd_core::Error;
use dd_media::{Codec, Recorder, RecorderState};
use dvrdash::ingest::{ingest_dhav, IngestOptions};
use dvrdash::probe::probe_dhav;

#[test]
fn continuous_recording_from_capture() {
    let dir = tempfile::tempdir().unwrap();
    let data = dhav_capture(3);

    let mut recorder = Recorder::new();
    let summary = ingest_dhav(&data, &mut recorder, dir.path(), &IngestOptions::default()).unwrap();

    assert_eq!(summary.frames_read, 18);
    assert_eq!(summary.video_frames, 15);
    assert_eq!(summary.samples_written, 15);
    assert_eq!(summary.frames_skipped, 0);
    assert_eq!(summary.frames_rejected, 0);
    assert!(summary.container_error.is_none());
    assert_eq!(recorder.codec(), Some(Codec::H264));
    // 25 fps from the playback extension.
    assert_eq!(recorder.frame_duration(), Some(3600));
    assert_eq!(recorder.next_dts(), 15 * 3600);

    let path = recorder.stop_recording().unwrap();
    assert_eq!(Some(path.clone()), summary.output);
    assert!(path.starts_with(dir.path()));

    let bytes = std::fs::read(&path).unwrap();
    let kinds: Vec<String> = top_level_boxes(&bytes).into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, ["ftyp", "mdat", "moov"]);
    assert!(bytes.windows(4).any(|w| w == b"avcC"));
}

#[test]
fn fragmented_recording_has_one_fragment_per_gop() {
    let dir = tempfile::tempdir().unwrap();
    let data = dhav_capture(3);
    let opts = IngestOptions {
        fragmented: true,
        ..Default::default()
    };

    let mut recorder = Recorder::new();
    let summary = ingest_dhav(&data, &mut recorder, dir.path(), &opts).unwrap();
    assert_eq!(summary.samples_written, 15);
    assert_matches!(recorder.state(), RecorderState::FragmentedRecording { fragment_open: true });
    assert_eq!(recorder.current_fragment().map(|f| f.sequence), Some(3));

    let path = recorder.stop_recording().unwrap();
    assert_eq!(recorder.fragments_written(), 3);

    let bytes = std::fs::read(path).unwrap();
    let kinds: Vec<String> = top_level_boxes(&bytes).into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        kinds,
        ["ftyp", "moov", "moof", "mdat", "moof", "mdat", "moof", "mdat"]
    );
}

#[test]
fn truncated_capture_keeps_frames_before_the_damage() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = dhav_capture(2);
    let whole = data.len();
    data.truncate(whole - 5);

    let mut recorder = Recorder::new();
    let summary = ingest_dhav(&data, &mut recorder, dir.path(), &IngestOptions::default()).unwrap();

    assert_eq!(summary.samples_written, 9);
    assert_matches!(summary.container_error, Some(_));
    recorder.stop_recording().unwrap();
}

#[test]
fn overrides_replace_stream_values() {
    let dir = tempfile::tempdir().unwrap();
    let data = dhav_capture(1);
    let opts = IngestOptions {
        frame_rate: Some(30.0),
        ..Default::default()
    };

    let mut recorder = Recorder::new();
    ingest_dhav(&data, &mut recorder, dir.path(), &opts).unwrap();
    assert_eq!(recorder.frame_duration(), Some(3000));
    recorder.stop_recording().unwrap();
}

#[test]
fn capture_without_video_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = dhav_frame(DHAV_AUDIO, 0, &[], &[0u8; 32]);

    let mut recorder = Recorder::new();
    let err = ingest_dhav(&data, &mut recorder, dir.path(), &IngestOptions::default()).unwrap_err();
    assert_matches!(err, Error::Parse(_));
    assert_eq!(recorder.state(), RecorderState::Uninitialized);
}

#[test]
fn missing_picture_size_needs_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let data = dhav_frame(DHAV_I, 0, &[], &h264_key_frame());

    let mut recorder = Recorder::new();
    let err = ingest_dhav(&data, &mut recorder, dir.path(), &IngestOptions::default()).unwrap_err();
    assert_matches!(err, Error::Configuration(_));

    let opts = IngestOptions {
        width: Some(352),
        height: Some(288),
        codec: CodecHint::H264,
        ..Default::default()
    };
    let summary = ingest_dhav(&data, &mut recorder, dir.path(), &opts).unwrap();
    assert_eq!(summary.samples_written, 1);
    recorder.stop_recording().unwrap();
}

#[test]
fn probe_summarises_capture() {
    let data = dhav_capture(2);
    let info = probe_dhav(&data);

    assert_eq!(info.frames, 12);
    assert_eq!(info.video_frames, 10);
    assert_eq!(info.key_frames, 2);
    assert_eq!(info.audio_frames, 2);
    assert_eq!(info.other_frames, 0);
    assert_eq!((info.width, info.height), (Some(640), Some(480)));
    assert_eq!(info.fps, Some(25));
    assert_eq!(info.gop_interval, Some(5));
    assert_eq!(info.container_codec, Some(CodecHint::H264));
    assert_eq!(info.detected_codec.as_deref(), Some("H.264"));
    assert_eq!(info.first_frame_index, Some(0));
    assert_eq!(info.last_frame_index, Some(11));
    assert_eq!(info.bytes_parsed, data.len());
    assert!(info.error.is_none());
    assert_eq!(
        info.first_timestamp.map(|t| t.to_string()),
        Some("2024-06-01 12:00:00".to_string())
    );
}

#[test]
fn probe_reports_damage() {
    let mut data = dhav_capture(1);
    let second = dhav_frame(DHAV_I, 0, &EXT_640X480_H264, &h264_key_frame()).len();
    data[second] = b'X';
    let info = probe_dhav(&data);
    assert_eq!(info.frames, 1);
    assert!(info.error.is_some());
}
