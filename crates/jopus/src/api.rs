//! Entry points: decode a whole Ogg Opus stream from a path, a buffer or a URL.
//!
//! Failures while opening (unreadable input, missing or malformed headers,
//! HTTP errors) are reported as open errors; failures after the headers were
//! accepted are decode errors. Both carry the name of the input.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use bytes::Bytes;
use url::Url;

use crate::audio::{decode_stream, OpusAudio};
use crate::error::{Error, OpusError, Result};
use crate::file::OpusFile;
use crate::http;
use crate::settings::{DecodeSettings, HttpSettings};

/// Decodes a local Ogg Opus file with default settings.
pub fn decode_file(path: impl AsRef<Path>) -> Result<OpusAudio> {
    decode_file_with(path, &DecodeSettings::default())
}

pub fn decode_file_with(path: impl AsRef<Path>, settings: &DecodeSettings) -> Result<OpusAudio> {
    let path = path.as_ref();
    let target = path.display().to_string();
    let file = File::open(path).map_err(|e| Error::open(&target, OpusError::Read(e)))?;
    decode_reader(BufReader::new(file), &target, settings)
}

/// Decodes an in-memory Ogg Opus stream. `target` names it in errors.
pub fn decode_bytes(
    bytes: impl Into<Bytes>,
    target: &str,
    settings: &DecodeSettings,
) -> Result<OpusAudio> {
    decode_reader(Cursor::new(bytes.into()), target, settings)
}

/// Decodes any seekable reader.
pub fn decode_reader<R: Read + Seek>(
    reader: R,
    target: &str,
    settings: &DecodeSettings,
) -> Result<OpusAudio> {
    let mut file = OpusFile::open_seekable_with(reader, settings.clone())
        .map_err(|e| Error::open(target, e))?;
    decode_stream(&mut file).map_err(|e| Error::decode(target, e))
}

/// Fetches and decodes a stream by URL.
///
/// `http` and `https` URLs are downloaded with the proxy/TLS options from
/// `settings`; `file` URLs are read from disk. Decoding runs on a blocking task.
pub async fn decode_url(url: &str, settings: &HttpSettings) -> Result<OpusAudio> {
    let parsed = Url::parse(url)?;
    let decode = settings.decode.clone();

    match parsed.scheme() {
        "http" | "https" => {}
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| Error::UnsupportedScheme(url.to_string()))?;
            return tokio::task::spawn_blocking(move || decode_file_with(path, &decode)).await?;
        }
        other => return Err(Error::UnsupportedScheme(other.to_string())),
    }

    let client = http::build_client(&parsed, settings)?;
    let body = http::fetch(&client, &parsed).await?;

    let target = url.to_string();
    tokio::task::spawn_blocking(move || decode_bytes(body, &target, &decode)).await?
}
