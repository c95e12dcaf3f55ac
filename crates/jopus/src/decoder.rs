//! libopus-backed packet decoder.
//!
//! Decoding goes through the `opus` crate's single-stream decoder, so a link is
//! decodable when its ID header describes exactly one mono or stereo Opus
//! stream with the identity channel mapping. Surround layouts (several
//! streams) are reported as [`OpusError::Impl`].

use opus::{Channels, Decoder};

use crate::error::OpusError;
use crate::header::{OpusHead, OPUS_SAMPLE_RATE};

/// Longest Opus packet: 120 ms at 48 kHz.
pub const MAX_FRAMES_PER_PACKET: usize = 5760;

/// Duration of a packet in 48 kHz frames, read from its TOC without decoding.
///
/// An empty packet lasts zero frames.
pub fn packet_frames(packet: &[u8]) -> Result<usize, OpusError> {
    if packet.is_empty() {
        return Ok(0);
    }
    opus::packet::get_nb_samples(packet, OPUS_SAMPLE_RATE).map_err(|e| {
        tracing::debug!("opus packet duration unreadable: {}", e);
        OpusError::BadPacket
    })
}

pub struct PacketDecoder {
    inner: Decoder,
    channels: usize,
    gain: f32,
}

impl std::fmt::Debug for PacketDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketDecoder")
            .field("channels", &self.channels)
            .field("gain", &self.gain)
            .finish()
    }
}

impl PacketDecoder {
    /// Creates a decoder for a link. `apply_gain` selects whether the header's
    /// output gain is applied to decoded samples.
    pub fn new(head: &OpusHead, apply_gain: bool) -> Result<Self, OpusError> {
        let channels = match (head.stream_count, head.coupled_count, head.channel_count) {
            (1, 0, 1) => Channels::Mono,
            (1, 1, 2) => Channels::Stereo,
            _ => return Err(OpusError::Impl),
        };
        let identity = head
            .mapping
            .iter()
            .enumerate()
            .all(|(i, &m)| m as usize == i);
        if !identity {
            return Err(OpusError::Impl);
        }

        let inner = Decoder::new(OPUS_SAMPLE_RATE, channels).map_err(|e| {
            tracing::error!("opus decoder creation failed: {}", e);
            OpusError::Fault
        })?;

        let gain = if apply_gain { head.gain_factor() } else { 1.0 };

        Ok(Self {
            inner,
            channels: head.channel_count as usize,
            gain,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decodes one packet into `out` (interleaved) and returns sample frames written.
    ///
    /// `out` must hold [`MAX_FRAMES_PER_PACKET`] frames.
    pub fn decode(&mut self, packet: &[u8], out: &mut [f32]) -> Result<usize, OpusError> {
        if out.len() < MAX_FRAMES_PER_PACKET * self.channels {
            return Err(OpusError::Inval);
        }
        let frames = self.inner.decode_float(packet, out, false).map_err(|e| {
            tracing::debug!("opus packet decode failed: {}", e);
            OpusError::BadPacket
        })?;

        if self.gain != 1.0 {
            for s in &mut out[..frames * self.channels] {
                *s *= self.gain;
            }
        }
        Ok(frames)
    }

    /// Clears decoder history, e.g. after a hole.
    pub fn reset(&mut self) -> Result<(), OpusError> {
        self.inner.reset_state().map_err(|_| OpusError::Fault)
    }
}
