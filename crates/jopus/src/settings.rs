//! Settings for `jopus`.
//!
//! `DecodeSettings` controls how PCM is produced from a stream; `HttpSettings`
//! controls how a stream is fetched when opened by URL (and embeds the decode
//! settings used afterwards).

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::decoder::MAX_FRAMES_PER_PACKET;

/// Settings for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    /// Apply the ID header's output gain to decoded samples.
    /// Default: true.
    pub apply_output_gain: bool,

    /// Frames requested per `read_float` call when decoding a whole stream.
    /// Default: 5760 (120 ms @ 48 kHz).
    pub read_chunk_frames: NonZeroUsize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            apply_output_gain: true,
            read_chunk_frames: NonZeroUsize::new(MAX_FRAMES_PER_PACKET).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl DecodeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_gain(mut self, apply: bool) -> Self {
        self.apply_output_gain = apply;
        self
    }

    pub fn with_read_chunk_frames(mut self, frames: NonZeroUsize) -> Self {
        self.read_chunk_frames = frames;
        self
    }
}

/// Settings for opening a stream by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    // ----------------------------
    // Proxy
    // ----------------------------
    /// HTTP proxy host. `None` (or an empty string) disables the proxy.
    pub proxy_host: Option<String>,

    /// HTTP proxy port. Default: 8080.
    pub proxy_port: u16,

    /// Proxy basic-auth credentials; both must be set to take effect.
    pub proxy_user: Option<String>,
    pub proxy_pass: Option<String>,

    // ----------------------------
    // TLS / request
    // ----------------------------
    /// Accept invalid TLS certificates. Default: false.
    pub skip_certificate_check: bool,

    /// Whole-request timeout. Default: none.
    pub timeout: Option<Duration>,

    pub user_agent: String,

    /// Decoding applied once the body has been fetched.
    pub decode: DecodeSettings,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            proxy_host: None,
            proxy_port: 8080,
            proxy_user: None,
            proxy_pass: None,
            skip_certificate_check: false,
            timeout: None,
            user_agent: concat!("jopus/", env!("CARGO_PKG_VERSION")).to_string(),
            decode: DecodeSettings::default(),
        }
    }
}

impl HttpSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests through `host:port`. An empty host disables the proxy.
    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        self.proxy_host = (!host.is_empty()).then_some(host);
        self.proxy_port = port;
        self
    }

    pub fn with_proxy_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.proxy_user = Some(user.into());
        self.proxy_pass = Some(pass.into());
        self
    }

    pub fn with_skip_certificate_check(mut self, skip: bool) -> Self {
        self.skip_certificate_check = skip;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_decode_settings(mut self, decode: DecodeSettings) -> Self {
        self.decode = decode;
        self
    }

    /// Proxy host, treating an empty string as unset.
    pub(crate) fn proxy(&self) -> Option<&str> {
        self.proxy_host.as_deref().filter(|h| !h.is_empty())
    }
}
