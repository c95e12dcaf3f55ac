//! Packet demuxing on top of the `ogg` crate.
//!
//! `ogg::PacketReader` does the page work: capture-pattern sync, CRC checks
//! and packet reassembly across pages for every logical stream. This module
//! turns its output into the events [`crate::OpusFile`] consumes. Pages the
//! reader rejects as corrupt are reported as [`Demuxed::Hole`].

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ogg::reading::OggReadError;

use crate::error::OpusError;

/// A packet of one logical stream.
#[derive(Debug, Clone)]
pub(crate) struct Packet {
    pub data: Vec<u8>,
    pub serial: u32,
    /// Granule position of the page the packet ends on; `None` for `-1`.
    pub granule_position: Option<i64>,
    pub bos: bool,
    pub eos: bool,
    /// Last packet completed on its page.
    pub last_in_page: bool,
    /// Input position at which reading of the packet's page started.
    pub offset: u64,
}

#[derive(Debug)]
pub(crate) enum Demuxed {
    Packet(Packet),
    /// A page was dropped as corrupt; data is missing before the next packet.
    Hole,
}

/// Keeps the byte position of the wrapped reader in sync with its reads and seeks.
struct Tracked<R> {
    inner: R,
    pos: Arc<AtomicU64>,
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl<R: Seek> Seek for Tracked<R> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let pos = self.inner.seek(from)?;
        self.pos.store(pos, Ordering::Relaxed);
        Ok(pos)
    }
}

pub(crate) struct PacketReader<R: Read + Seek> {
    inner: ogg::reading::PacketReader<Tracked<R>>,
    pos: Arc<AtomicU64>,
    holes: u64,
}

impl<R: Read + Seek> PacketReader<R> {
    /// Reads packets from `reader`, whose current position is `start`.
    pub fn new(reader: R, start: u64) -> Self {
        let pos = Arc::new(AtomicU64::new(start));
        let tracked = Tracked {
            inner: reader,
            pos: Arc::clone(&pos),
        };
        Self {
            inner: ogg::reading::PacketReader::new(tracked),
            pos,
            holes: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos.load(Ordering::Relaxed)
    }

    /// Corrupt pages dropped so far.
    pub fn holes(&self) -> u64 {
        self.holes
    }

    /// Next packet or hole; `Ok(None)` at end of input.
    ///
    /// Input with no Ogg page at all is `NotFormat`.
    pub fn next(&mut self) -> Result<Option<Demuxed>, OpusError> {
        let offset = self.position();
        match self.inner.read_packet() {
            Ok(Some(p)) => Ok(Some(Demuxed::Packet(Packet {
                serial: p.stream_serial(),
                granule_position: granule(p.absgp_page()),
                bos: p.first_in_stream(),
                eos: p.last_in_stream(),
                last_in_page: p.last_in_page(),
                offset,
                data: p.data,
            }))),
            Ok(None) => Ok(None),
            Err(OggReadError::NoCapturePatternFound) => Err(OpusError::NotFormat),
            Err(OggReadError::ReadError(e)) => Err(OpusError::Read(e)),
            Err(e) => {
                self.holes += 1;
                tracing::debug!(offset, error = %e, "dropping corrupt page");
                Ok(Some(Demuxed::Hole))
            }
        }
    }
}

/// Raw page granule as a signed position; all ones means "no packet ends here".
fn granule(raw: u64) -> Option<i64> {
    match raw {
        u64::MAX => None,
        g => Some(g as i64),
    }
}
