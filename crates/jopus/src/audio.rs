//! Whole-stream decoding into an [`OpusAudio`].

use std::io::{Read, Seek};

use crate::error::OpusError;
use crate::file::OpusFile;
use crate::header::OPUS_SAMPLE_RATE;

/// A fully decoded stream plus the metadata of its first link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpusAudio {
    /// Interleaved f32 PCM at 48 kHz, `channel_count` channels.
    pub samples: Vec<f32>,
    /// Compressed size of the stream in bytes.
    pub size_in_bytes: u64,
    /// Playable duration in seconds.
    pub duration: f32,

    pub input_sample_rate: u32,
    pub pre_skip: u16,
    pub stream_count: u8,
    pub channel_count: u8,
    /// Q7.8 dB.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub vendor: String,
    pub comments: Vec<String>,
}

impl OpusAudio {
    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        match self.channel_count {
            0 => 0,
            c => self.samples.len() / c as usize,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        OPUS_SAMPLE_RATE
    }
}

/// Decodes every link of a seekable stream.
///
/// Holes are logged and skipped; any other read error aborts. All links must
/// share the first link's channel count, which is checked before decoding.
pub fn decode_stream<R: Read + Seek>(file: &mut OpusFile<R>) -> Result<OpusAudio, OpusError> {
    let pcm_total = file.pcm_total(None)?;

    let mut audio = OpusAudio {
        duration: pcm_total as f32 / OPUS_SAMPLE_RATE as f32,
        size_in_bytes: file.raw_total(None)?,
        ..OpusAudio::default()
    };
    if let Some(head) = file.head(Some(0)) {
        audio.input_sample_rate = head.input_sample_rate;
        audio.pre_skip = head.pre_skip;
        audio.channel_count = head.channel_count;
        audio.stream_count = head.stream_count;
        audio.output_gain = head.output_gain;
        audio.mapping_family = head.mapping_family;
    }
    if let Some(tags) = file.tags(Some(0)) {
        audio.vendor = tags.vendor.clone();
        audio.comments = tags.comments.clone();
    }

    let channels = audio.channel_count as usize;
    if let Some(link) = (1..file.link_count())
        .find(|&i| file.head(Some(i)).map(|h| h.channel_count as usize) != Some(channels))
    {
        tracing::debug!(link, expected = channels, "chained link changes channel count");
        return Err(OpusError::Impl);
    }

    let chunk_frames = file.settings().read_chunk_frames.get();
    let mut buf = vec![0.0f32; chunk_frames * channels.max(2)];
    loop {
        let frames = match file.read_float(&mut buf) {
            Ok(0) => break,
            Ok(frames) => frames,
            Err(OpusError::Hole) => {
                tracing::warn!("hole detected, corrupt file segment?");
                continue;
            }
            Err(e) => return Err(e),
        };
        if file.channels() != channels {
            tracing::debug!(
                link = file.current_link(),
                channels = file.channels(),
                expected = channels,
                "chained link changes channel count"
            );
            return Err(OpusError::Impl);
        }
        audio.samples.extend_from_slice(&buf[..frames * channels]);
    }

    tracing::debug!(
        frames = audio.frames(),
        expected = pcm_total,
        links = file.link_count(),
        "stream decoded"
    );
    Ok(audio)
}
