//! Shared helpers for integration tests.
//!
//! [`TestServer`] starts a [`OriginServer`] on a random port backed by a
//! temporary output directory. The `dhav_*` builders produce well-formed DHAV
//! captures around synthetic H.264 access units.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dd_core::config::ServerConfig;
use dd_server::OriginServer;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// An origin server running on `127.0.0.1` with a random port.
pub struct TestServer {
    pub server: Arc<OriginServer>,
    pub addr: SocketAddr,
    pub dir: TempDir,
    handle: JoinHandle<dd_core::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            output_dir: dir.path().to_path_buf(),
            max_connections: 8,
            shutdown_grace_secs: 1,
            header_read_timeout_secs: 2,
        };
        let server = Arc::new(OriginServer::new(config));
        let listener = server.bind().await.expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move { running.run(listener).await });

        Self {
            server,
            addr,
            dir,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Write `<output_dir>/<stream>/<file>`.
    pub fn write_file(&self, stream: &str, file: &str, contents: &[u8]) {
        let path = self.dir.path().join(stream).join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Cancel the server and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

pub const DHAV_I: u8 = 0xFD;
pub const DHAV_P: u8 = 0xFC;
pub const DHAV_AUDIO: u8 = 0xF0;

/// Image size 640x480, playback H.264 at 25 fps with a GOP of 5.
pub const EXT_640X480_H264: [u8; 8] = [0x80, 0x00, 80, 60, 0x81, 5, 2, 25];

/// SPS + PPS + IDR slice.
pub fn h264_key_frame() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1E, 0xDA, 0x02, 0x80, //
        0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80, //
        0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, 0xA0, 0x5F,
    ]
}

pub fn h264_p_frame(n: u8) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x41, 0x9A, n, 0x11, 0x22]
}

/// One well-formed DHAV frame.
pub fn dhav_frame(kind: u8, index: u32, ext: &[u8], payload: &[u8]) -> Vec<u8> {
    let frame_len = (24 + ext.len() + payload.len() + 8) as u32;
    let mut out = Vec::with_capacity(frame_len as usize);
    out.extend_from_slice(b"DHAV");
    out.extend_from_slice(&[kind, 0, 0, 0]);
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&frame_len.to_le_bytes());
    // 2024-06-01 12:00:00
    let packed: u32 = (12 << 12) | (1 << 17) | (6 << 22) | (24 << 26);
    out.extend_from_slice(&packed.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.push(ext.len() as u8);
    let sum = out.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    out.push(sum);
    out.extend_from_slice(ext);
    out.extend_from_slice(payload);
    out.extend_from_slice(b"DHAV");
    out.extend_from_slice(&frame_len.to_le_bytes());
    out
}

/// `gops` GOPs of one I-frame and four P-frames, with an audio frame after
/// every I-frame.
pub fn dhav_capture(gops: usize) -> Vec<u8> {
    let mut data = Vec::new();
    let mut index = 0u32;
    for _ in 0..gops {
        data.extend(dhav_frame(DHAV_I, index, &EXT_640X480_H264, &h264_key_frame()));
        index += 1;
        data.extend(dhav_frame(DHAV_AUDIO, index, &[], &[0u8; 16]));
        index += 1;
        for n in 0..4 {
            data.extend(dhav_frame(DHAV_P, index, &[], &h264_p_frame(n)));
            index += 1;
        }
    }
    data
}

/// Walk top-level ISO BMFF boxes, returning `(type, size)` pairs.
pub fn top_level_boxes(data: &[u8]) -> Vec<(String, u64)> {
    let mut boxes = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let size32 = u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap()) as u64;
        let kind = String::from_utf8_lossy(&data[pos + 4..pos + 8]).into_owned();
        let size = if size32 == 1 {
            u64::from_be_bytes(data[pos + 8..pos + 16].try_into().unwrap())
        } else {
            size32
        };
        assert!(size >= 8, "box {kind} at {pos} has size {size}");
        boxes.push((kind, size));
        pos += size as usize;
    }
    assert_eq!(pos, data.len(), "boxes do not span the file exactly");
    boxes
}
