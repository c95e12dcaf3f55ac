//! URL decoding tests against a local in-memory HTTP fixture server.

use std::io::Write;
use std::time::Duration;

use jopus::{decode_url, Error, HttpSettings};
use jopus_tests::{setup_tracing, OpusFixture, SimpleOpusServer};

#[tokio::test]
async fn decodes_stream_over_http() {
    setup_tracing();
    let data = OpusFixture::sine_stream(2, 1.0);
    let size = data.len() as u64;
    let addr = SimpleOpusServer::new(data).spawn().await;

    let url = format!("http://{addr}/audio.opus");
    let settings = HttpSettings::new().with_timeout(Duration::from_secs(10));
    let audio = decode_url(&url, &settings).await.unwrap();

    assert_eq!(audio.frames(), 48_000);
    assert_eq!(audio.channel_count, 2);
    assert_eq!(audio.size_in_bytes, size);
    assert!(OpusFixture::verify_samples_not_silence(&audio.samples));
}

#[tokio::test]
async fn missing_resource_is_open_error() {
    setup_tracing();
    let addr = SimpleOpusServer::new(OpusFixture::sine_stream(1, 0.1))
        .spawn()
        .await;

    let url = format!("http://{addr}/missing.opus");
    let err = decode_url(&url, &HttpSettings::default()).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 404, .. }));
    assert!(err.to_string().starts_with("Could not open http://"));
}

#[tokio::test]
async fn non_opus_body_is_not_format() {
    setup_tracing();
    let addr = SimpleOpusServer::new(b"<html>not audio</html>".to_vec())
        .spawn()
        .await;

    let url = format!("http://{addr}/audio.opus");
    let err = decode_url(&url, &HttpSettings::default()).await.unwrap_err();
    assert!(matches!(
        err.opus_error(),
        Some(jopus::OpusError::NotFormat)
    ));
    assert!(err.to_string().contains(&url));
}

#[tokio::test]
async fn requests_go_through_configured_proxy() {
    setup_tracing();
    // The fixture server answers absolute-form proxy requests by path, so a
    // host that does not resolve still succeeds when routed through it.
    let addr = SimpleOpusServer::new(OpusFixture::sine_stream(1, 0.2))
        .spawn()
        .await;

    let settings = HttpSettings::new()
        .with_proxy(addr.ip().to_string(), addr.port())
        .with_timeout(Duration::from_secs(10));
    let audio = decode_url("http://opus.invalid/audio.opus", &settings)
        .await
        .unwrap();
    assert_eq!(audio.frames(), 9_600);
}

#[tokio::test]
async fn connection_failure_is_fetch_error() {
    setup_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{addr}/audio.opus");
    let err = decode_url(&url, &HttpSettings::default()).await.unwrap_err();
    assert!(matches!(err, Error::Fetch { .. }));
}

#[tokio::test]
async fn file_url_decodes_local_path() {
    setup_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&OpusFixture::sine_stream(1, 0.3)).unwrap();
    file.flush().unwrap();

    let url = format!("file://{}", file.path().display());
    let audio = decode_url(&url, &HttpSettings::default()).await.unwrap();
    assert_eq!(audio.frames(), 14_400);
}
