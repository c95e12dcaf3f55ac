//! HTTP fetching for streams opened by URL.
//!
//! The whole body is downloaded into memory before decoding, which makes the
//! stream seekable so totals are available.

use bytes::{Bytes, BytesMut};
use reqwest::{Client, Proxy};
use url::Url;

use crate::error::{Error, OpusError, Result};
use crate::settings::HttpSettings;

/// Largest body preallocation taken from a `Content-Length` header.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Initial body capacity for an announced length; the header is not trusted
/// beyond [`MAX_PREALLOC`].
fn capacity_hint(content_length: Option<u64>) -> usize {
    content_length.map_or(0, |len| len.min(MAX_PREALLOC) as usize)
}

/// Builds a client honoring the proxy, TLS and timeout settings.
pub fn build_client(url: &Url, settings: &HttpSettings) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(settings.user_agent.clone())
        .danger_accept_invalid_certs(settings.skip_certificate_check);

    if let Some(host) = settings.proxy() {
        if settings.proxy_port == 0 {
            return Err(Error::open(url.as_str(), OpusError::Inval));
        }
        let proxy_url = format!("http://{host}:{}", settings.proxy_port);
        let mut proxy = Proxy::all(proxy_url.as_str()).map_err(|source| Error::Fetch {
            url: url.to_string(),
            source,
        })?;
        if let (Some(user), Some(pass)) = (&settings.proxy_user, &settings.proxy_pass) {
            proxy = proxy.basic_auth(user, pass);
        }
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    if let Some(timeout) = settings.timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })
}

/// Downloads the resource body.
pub async fn fetch(client: &Client, url: &Url) -> Result<Bytes> {
    let fetch_err = |source| Error::Fetch {
        url: url.to_string(),
        source,
    };

    let mut resp = client.get(url.clone()).send().await.map_err(fetch_err)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut body = BytesMut::with_capacity(capacity_hint(resp.content_length()));
    while let Some(chunk) = resp.chunk().await.map_err(fetch_err)? {
        body.extend_from_slice(&chunk);
    }

    tracing::info!(url = %url, bytes = body.len(), "fetched stream");
    Ok(body.freeze())
}
