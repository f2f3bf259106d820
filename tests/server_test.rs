//! Origin server tests over real TCP connections.

mod common;

use common::TestServer;
use reqwest::StatusCode;

#[tokio::test]
async fn manifest_is_served_with_dash_content_type() {
    let srv = TestServer::start().await;
    srv.server.register("cam1", "/rec/cam1.mp4").unwrap();
    srv.write_file("cam1", "manifest.mpd", b"<MPD/>");

    let resp = reqwest::get(srv.url("/cam1/manifest.mpd")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/dash+xml");
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.text().await.unwrap(), "<MPD/>");

    srv.stop().await;
}

#[tokio::test]
async fn segments_are_served_as_mp4() {
    let srv = TestServer::start().await;
    srv.server.register("cam1", "/rec/cam1.mp4").unwrap();
    srv.write_file("cam1", "init.mp4", &[0, 0, 0, 8, b'f', b't', b'y', b'p']);
    srv.write_file("cam1", "seg_1.m4s", &[1, 2, 3, 4, 5]);

    let resp = reqwest::get(srv.url("/cam1/seg_1.m4s")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "video/mp4");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &[1, 2, 3, 4, 5]);

    let resp = reqwest::get(srv.url("/cam1/init.mp4")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().len(), 8);

    srv.stop().await;
}

#[tokio::test]
async fn unregistered_stream_is_not_found() {
    let srv = TestServer::start().await;
    // Files on disk are not enough; the stream must be registered.
    srv.write_file("ghost", "manifest.mpd", b"<MPD/>");

    let resp = reqwest::get(srv.url("/ghost/manifest.mpd")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("Stream not found"));

    srv.stop().await;
}

#[tokio::test]
async fn missing_files_are_not_found() {
    let srv = TestServer::start().await;
    srv.server.register("cam1", "/rec/cam1.mp4").unwrap();

    let resp = reqwest::get(srv.url("/cam1/manifest.mpd")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("MPD file not found"));

    let resp = reqwest::get(srv.url("/cam1/seg_9.m4s")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("Segment file not found"));

    srv.stop().await;
}

#[tokio::test]
async fn non_get_requests_are_not_found() {
    let srv = TestServer::start().await;
    srv.server.register("cam1", "/rec/cam1.mp4").unwrap();
    srv.write_file("cam1", "manifest.mpd", b"<MPD/>");

    let resp = reqwest::Client::new()
        .post(srv.url("/cam1/manifest.mpd"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    srv.stop().await;
}

#[tokio::test]
async fn index_lists_registered_streams() {
    let srv = TestServer::start().await;
    srv.server.register("yard", "/rec/yard.mp4").unwrap();
    srv.server.register("gate", "/rec/gate.mp4").unwrap();

    let resp = reqwest::get(srv.url("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    let gate = body.find("/gate/manifest.mpd").expect("gate link missing");
    let yard = body.find("/yard/manifest.mpd").expect("yard link missing");
    assert!(gate < yard);

    srv.stop().await;
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let srv = TestServer::start().await;
    srv.server.register("cam1", "/rec/cam1.mp4").unwrap();

    for path in ["/cam1/notes.txt", "/favicon.ico", "/cam1/.hidden.mp4"] {
        let resp = reqwest::get(srv.url(path)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
    }

    srv.stop().await;
}

#[tokio::test]
async fn registration_while_running_is_visible() {
    let srv = TestServer::start().await;
    srv.write_file("late", "manifest.mpd", b"<MPD/>");

    let resp = reqwest::get(srv.url("/late/manifest.mpd")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    srv.server.register("late", "/rec/late.mp4").unwrap();
    let resp = reqwest::get(srv.url("/late/manifest.mpd")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    srv.stop().await;
}
