//! Ogg Opus header packets (RFC 7845 §5): the ID header and the comment header.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::OpusError;

pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const OPUS_TAGS_MAGIC: &[u8; 8] = b"OpusTags";

/// Output sample rate of every Opus decoder in this crate.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Identification header of one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channel_count: u8,
    /// Samples (at 48 kHz) to discard from the decoder output at the start of the link.
    pub pre_skip: u16,
    /// Sample rate of the original input, informational only.
    pub input_sample_rate: u32,
    /// Gain to apply to the decoded output, Q7.8 dB.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: u8,
    pub coupled_count: u8,
    pub mapping: Vec<u8>,
}

impl OpusHead {
    /// Parses an ID header packet.
    pub fn parse(packet: &[u8]) -> Result<Self, OpusError> {
        if packet.len() < 8 || &packet[..8] != OPUS_HEAD_MAGIC {
            return Err(OpusError::NotFormat);
        }
        if packet.len() < 19 {
            return Err(OpusError::BadHeader);
        }

        let mut buf = &packet[8..];
        let version = buf.get_u8();
        // Only the major version (upper nibble) breaks compatibility.
        if version >> 4 != 0 {
            return Err(OpusError::Version);
        }
        let channel_count = buf.get_u8();
        if channel_count == 0 {
            return Err(OpusError::BadHeader);
        }
        let pre_skip = buf.get_u16_le();
        let input_sample_rate = buf.get_u32_le();
        let output_gain = buf.get_i16_le();
        let mapping_family = buf.get_u8();

        let (stream_count, coupled_count, mapping) = match mapping_family {
            0 => {
                if channel_count > 2 {
                    return Err(OpusError::BadHeader);
                }
                (1, channel_count - 1, (0..channel_count).collect())
            }
            1 | 255 => {
                if mapping_family == 1 && channel_count > 8 {
                    return Err(OpusError::BadHeader);
                }
                if buf.remaining() < 2 + channel_count as usize {
                    return Err(OpusError::BadHeader);
                }
                let stream_count = buf.get_u8();
                let coupled_count = buf.get_u8();
                if stream_count == 0
                    || coupled_count > stream_count
                    || stream_count as u16 + coupled_count as u16 > 255
                {
                    return Err(OpusError::BadHeader);
                }
                let mapping = buf[..channel_count as usize].to_vec();
                let decoded_channels = stream_count + coupled_count;
                if mapping.iter().any(|&m| m != 255 && m >= decoded_channels) {
                    return Err(OpusError::BadHeader);
                }
                (stream_count, coupled_count, mapping)
            }
            _ => return Err(OpusError::Impl),
        };

        Ok(Self {
            version,
            channel_count,
            pre_skip,
            input_sample_rate,
            output_gain,
            mapping_family,
            stream_count,
            coupled_count,
            mapping,
        })
    }

    /// Linear multiplier for [`Self::output_gain`].
    pub fn gain_factor(&self) -> f32 {
        q78_to_linear(self.output_gain as i32)
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(21 + self.mapping.len());
        out.put_slice(OPUS_HEAD_MAGIC);
        out.put_u8(self.version);
        out.put_u8(self.channel_count);
        out.put_u16_le(self.pre_skip);
        out.put_u32_le(self.input_sample_rate);
        out.put_i16_le(self.output_gain);
        out.put_u8(self.mapping_family);
        if self.mapping_family != 0 {
            out.put_u8(self.stream_count);
            out.put_u8(self.coupled_count);
            out.put_slice(&self.mapping);
        }
        out.freeze()
    }
}

/// Converts a Q7.8 dB value to a linear amplitude factor.
pub fn q78_to_linear(gain: i32) -> f32 {
    10f32.powf(gain as f32 / (20.0 * 256.0))
}

/// Comment header of one link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpusTags {
    pub vendor: String,
    /// `TAG=value` user comments in stream order.
    pub comments: Vec<String>,
}

impl OpusTags {
    /// Parses a comment header packet.
    pub fn parse(packet: &[u8]) -> Result<Self, OpusError> {
        if packet.len() < 8 || &packet[..8] != OPUS_TAGS_MAGIC {
            return Err(OpusError::NotFormat);
        }
        let mut buf = &packet[8..];
        let vendor = read_string(&mut buf)?;

        if buf.remaining() < 4 {
            return Err(OpusError::BadHeader);
        }
        let count = buf.get_u32_le() as usize;
        // Each comment needs at least its 4-byte length.
        if count > buf.remaining() / 4 {
            return Err(OpusError::BadHeader);
        }
        let mut comments = Vec::with_capacity(count);
        for _ in 0..count {
            comments.push(read_string(&mut buf)?);
        }
        // Anything after the comments is binary padding/extension data and ignored.

        Ok(Self { vendor, comments })
    }

    /// The `index`-th value of `tag`, compared case-insensitively.
    pub fn query(&self, tag: &str, index: usize) -> Option<&str> {
        self.values(tag).nth(index)
    }

    /// Number of comments carrying `tag`.
    pub fn query_count(&self, tag: &str) -> usize {
        self.values(tag).count()
    }

    fn values<'a, 'b>(
        &'a self,
        tag: &'b str,
    ) -> impl Iterator<Item = &'a str> + Captures<'a> + Captures<'b> {
        self.comments.iter().filter_map(move |c| {
            let (name, value) = c.split_once('=')?;
            name.eq_ignore_ascii_case(tag).then_some(value)
        })
    }

    /// `R128_TRACK_GAIN`, Q7.8 dB.
    pub fn track_gain(&self) -> Option<i32> {
        self.gain_tag("R128_TRACK_GAIN")
    }

    /// `R128_ALBUM_GAIN`, Q7.8 dB.
    pub fn album_gain(&self) -> Option<i32> {
        self.gain_tag("R128_ALBUM_GAIN")
    }

    fn gain_tag(&self, tag: &str) -> Option<i32> {
        let value = self.query(tag, 0)?.trim();
        let gain = value.parse::<i32>().ok()?;
        (i16::MIN as i32..=i16::MAX as i32)
            .contains(&gain)
            .then_some(gain)
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::new();
        out.put_slice(OPUS_TAGS_MAGIC);
        out.put_u32_le(self.vendor.len() as u32);
        out.put_slice(self.vendor.as_bytes());
        out.put_u32_le(self.comments.len() as u32);
        for c in &self.comments {
            out.put_u32_le(c.len() as u32);
            out.put_slice(c.as_bytes());
        }
        out.freeze()
    }
}

fn read_string(buf: &mut &[u8]) -> Result<String, OpusError> {
    if buf.remaining() < 4 {
        return Err(OpusError::BadHeader);
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(OpusError::BadHeader);
    }
    let s = String::from_utf8_lossy(&buf[..len]).into_owned();
    buf.advance(len);
    Ok(s)
}


/// Lets an `impl Trait` return type capture a lifetime without bounding by it.
trait Captures<'a> {}
impl<'a, T: ?Sized> Captures<'a> for T {}
