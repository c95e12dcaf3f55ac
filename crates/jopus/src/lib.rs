//! Ogg Opus decoding in the manner of libopusfile.
//!
//! Open an Ogg Opus stream from a path, a buffer or a URL and decode it to
//! 48 kHz interleaved f32 PCM together with its header metadata. Page and
//! packet demuxing is done by the `ogg` crate, packet decoding by libopus;
//! Opus header handling, link tracking and sample accounting live here.
//!
//! Layers, bottom-up:
//! - `demux`: packet events from the `ogg` crate's reader,
//! - [`header`]: `OpusHead`/`OpusTags`,
//! - [`decoder`]: libopus packet decoder,
//! - [`OpusFile`]: link-aware decoding reader (`read_float`, totals),
//! - [`decode_file`], [`decode_bytes`], [`decode_url`]: whole-stream decoding.

mod api;
mod audio;
mod demux;
mod error;
mod file;
mod http;
mod settings;

pub mod decoder;
pub mod header;

pub use crate::api::{decode_bytes, decode_file, decode_file_with, decode_reader, decode_url};
pub use crate::audio::{decode_stream, OpusAudio};
pub use crate::error::{Error, OpusError, Result};
pub use crate::file::{LinkInfo, OpusFile};
pub use crate::header::{OpusHead, OpusTags, OPUS_SAMPLE_RATE};
pub use crate::settings::{DecodeSettings, HttpSettings};
