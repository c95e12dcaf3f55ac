//! Crate-level error types.
//!
//! Two layers:
//! - [`OpusError`] is the low-level failure kind returned by the demuxer, header
//!   parsers, decoder and [`crate::OpusFile`]. Every variant maps to the numeric
//!   code libopusfile uses for the same condition, so callers that used to
//!   branch on `OP_*` values can keep doing so via [`OpusError::code`].
//! - [`Error`] is what the public entry points (`decode_file`, `decode_url`, ...)
//!   return. It records *what* was being opened or decoded alongside the cause.

use std::io;

/// Result type used by the public entry points.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds of Ogg Opus stream handling.
#[derive(Debug, thiserror::Error)]
pub enum OpusError {
    #[error("A request did not succeed.")]
    False,

    #[error("There was a hole in the page sequence numbers (e.g., a page was corrupt or missing).")]
    Hole,

    #[error("An underlying read, seek, or tell operation failed when it should have succeeded.")]
    Read(#[source] io::Error),

    #[error("Failed to allocate memory, or an internal library error was encountered.")]
    Fault,

    #[error("The stream used a feature that is not implemented, such as an unsupported channel family.")]
    Impl,

    #[error("One or more parameters to a function were invalid.")]
    Inval,

    #[error(
        "A purported Ogg Opus stream did not begin with an Ogg page, a purported header packet \
         did not start with one of the required strings, 'OpusHead' or 'OpusTags', or a link in \
         a chained file was encountered that did not contain any logical Opus streams."
    )]
    NotFormat,

    #[error("A required header packet was not properly formatted, contained illegal values, or was missing altogether.")]
    BadHeader,

    #[error("The ID header contained an unrecognized version number.")]
    Version,

    #[error(
        "An audio packet failed to decode properly. This is usually caused by a multistream Ogg \
         packet where the durations of the individual Opus packets contained in it are not all \
         the same."
    )]
    BadPacket,

    #[error(
        "We failed to find data we had seen before, or the bitstream structure was sufficiently \
         malformed that seeking to the target destination was impossible"
    )]
    BadLink,

    #[error("An operation that requires seeking was requested on an unseekable stream.")]
    NoSeek,

    #[error("The first or last granule position of a link failed basic validity checks.")]
    BadTimestamp,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl OpusError {
    /// The libopusfile error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            OpusError::False => -1,
            OpusError::Hole => -3,
            OpusError::Read(_) => -128,
            OpusError::Fault => -129,
            OpusError::Impl => -130,
            OpusError::Inval => -131,
            OpusError::NotFormat => -132,
            OpusError::BadHeader => -133,
            OpusError::Version => -134,
            OpusError::BadPacket => -136,
            OpusError::BadLink => -137,
            OpusError::NoSeek => -138,
            OpusError::BadTimestamp => -139,
            OpusError::Unknown(code) => *code,
        }
    }

    /// Maps a libopusfile error code back to an error.
    ///
    /// `OP_EREAD` has no I/O cause attached, so it gets a generic one.
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => OpusError::False,
            -3 => OpusError::Hole,
            -128 => OpusError::Read(io::Error::other("read failed")),
            -129 => OpusError::Fault,
            -130 => OpusError::Impl,
            -131 => OpusError::Inval,
            -132 => OpusError::NotFormat,
            -133 => OpusError::BadHeader,
            -134 => OpusError::Version,
            -136 => OpusError::BadPacket,
            -137 => OpusError::BadLink,
            -138 => OpusError::NoSeek,
            -139 => OpusError::BadTimestamp,
            other => OpusError::Unknown(other),
        }
    }
}

impl From<io::Error> for OpusError {
    fn from(e: io::Error) -> Self {
        OpusError::Read(e)
    }
}

/// Error returned by the public decoding entry points.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stream could not be opened (headers missing or malformed, file not readable).
    #[error("Could not open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: OpusError,
    },

    /// The stream opened but decoding failed part-way.
    #[error("Got error during decoding of {target}: {source}")]
    Decode {
        target: String,
        #[source]
        source: OpusError,
    },

    /// The HTTP request could not be performed.
    #[error("Could not open {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("Could not open {url}: HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The blocking decode task panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn open(target: impl Into<String>, source: OpusError) -> Self {
        Error::Open {
            target: target.into(),
            source,
        }
    }

    pub(crate) fn decode(target: impl Into<String>, source: OpusError) -> Self {
        Error::Decode {
            target: target.into(),
            source,
        }
    }

    /// The underlying stream error, when there is one.
    pub fn opus_error(&self) -> Option<&OpusError> {
        match self {
            Error::Open { source, .. } | Error::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}
