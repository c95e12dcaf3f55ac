//! `OpusFile`: a decoding reader over an Ogg Opus stream.
//!
//! ## Links
//! An Ogg Opus stream may be *chained*: several complete logical Opus streams
//! (links) back to back, each with its own ID and comment headers. Links are
//! decoded in order; the decoder is recreated at each link boundary.
//! Non-Opus logical streams multiplexed alongside are skipped.
//!
//! ## Scanned vs. streaming open
//! - `open` reads front to back without a scan. Totals are unknown, so
//!   `pcm_total`/`raw_total` fail with `OpusError::Inval`.
//! - `open_seekable` scans the whole input once (demux only, no decoding) to
//!   learn every link's headers and granule range, then rewinds.
//!
//! Both need `Seek` because the Ogg reader steps back over partial capture
//! patterns while syncing.
//!
//! ## Sample accounting
//! Positions are in 48 kHz sample frames. A link need not start at granule
//! zero: its start is the first audio page's granule position minus the
//! frames completed on that page. Decoded samples are released a page at a
//! time. Each link starts by discarding `pre_skip` frames, and on the link's
//! last page the granule position caps the output, trimming encoder padding
//! across every packet of that page.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use crate::decoder::{packet_frames, PacketDecoder, MAX_FRAMES_PER_PACKET};
use crate::demux::{Demuxed, Packet, PacketReader};
use crate::error::OpusError;
use crate::header::{OpusHead, OpusTags, OPUS_HEAD_MAGIC};
use crate::settings::DecodeSettings;

/// Headers and position of one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub serial: u32,
    pub head: OpusHead,
    pub tags: OpusTags,
    /// Offset of the link's first page.
    pub offset: u64,
    /// Granule position of the link's first sample, known after a scan.
    pub start_granule: Option<i64>,
    /// Granule position of the link's last audio page, known after a scan.
    pub last_granule: Option<i64>,
}

impl LinkInfo {
    /// Playable frames of the link, when its granule range is known.
    pub fn pcm_total(&self) -> Option<i64> {
        let span = self.last_granule?.checked_sub(self.start_granule?)?;
        Some((span - self.head.pre_skip as i64).max(0))
    }
}

/// Granule position of a page-ending packet. Negative positions other than
/// the "unset" marker are invalid.
fn page_granule(packet: &Packet) -> Result<Option<i64>, OpusError> {
    match packet.granule_position {
        Some(gp) if gp < 0 => Err(OpusError::BadTimestamp),
        gp => Ok(gp),
    }
}

/// Start granule of a link from its first audio page.
///
/// A negative start is only accepted when the link ends on that same page,
/// in which case the link starts at zero and the page is end-trimmed.
fn start_granule(page_granule: i64, page_frames: i64, eos: bool) -> Result<i64, OpusError> {
    match page_granule.checked_sub(page_frames) {
        Some(start) if start >= 0 => Ok(start),
        Some(_) if eos => Ok(0),
        _ => Err(OpusError::BadTimestamp),
    }
}

/// Link-boundary state machine shared by the scan and the decode paths.
#[derive(Debug)]
enum Phase {
    /// Waiting for an `OpusHead` BOS packet.
    SeekingHead,
    AwaitTags {
        serial: u32,
        head: OpusHead,
        offset: u64,
    },
    Audio {
        serial: u32,
    },
}

#[derive(Debug)]
enum Step {
    Ignore,
    LinkStarted(LinkInfo),
    Audio(Packet),
    Hole,
}

#[derive(Debug)]
struct LinkTracker {
    phase: Phase,
    links_started: usize,
}

impl LinkTracker {
    fn new() -> Self {
        Self {
            phase: Phase::SeekingHead,
            links_started: 0,
        }
    }

    fn step(&mut self, item: Demuxed) -> Result<Step, OpusError> {
        let p = match item {
            Demuxed::Hole => {
                return match self.phase {
                    Phase::Audio { .. } => Ok(Step::Hole),
                    Phase::AwaitTags { .. } => Err(OpusError::BadHeader),
                    Phase::SeekingHead => Ok(Step::Ignore),
                };
            }
            Demuxed::Packet(p) => p,
        };

        if p.bos && p.data.starts_with(OPUS_HEAD_MAGIC) {
            if matches!(self.phase, Phase::AwaitTags { .. }) {
                // A second Opus stream in the same BOS group; the first one wins.
                tracing::debug!(serial = p.serial, "ignoring additional opus stream");
                return Ok(Step::Ignore);
            }
            let head = OpusHead::parse(&p.data)?;
            tracing::debug!(
                serial = p.serial,
                channels = head.channel_count,
                pre_skip = head.pre_skip,
                "opus link header"
            );
            self.phase = Phase::AwaitTags {
                serial: p.serial,
                head,
                offset: p.offset,
            };
            return Ok(Step::Ignore);
        }

        let ours = match self.phase {
            Phase::AwaitTags { serial, .. } | Phase::Audio { serial } => serial == p.serial,
            Phase::SeekingHead => false,
        };
        match self.phase {
            Phase::SeekingHead => {
                if p.bos || self.links_started > 0 {
                    Ok(Step::Ignore)
                } else {
                    // The initial BOS group ended without an Opus stream.
                    Err(OpusError::NotFormat)
                }
            }
            _ if !ours => Ok(Step::Ignore),
            Phase::AwaitTags { .. } => {
                let tags = OpusTags::parse(&p.data).map_err(|e| match e {
                    OpusError::NotFormat => OpusError::BadHeader,
                    other => other,
                })?;
                let next = if p.eos {
                    Phase::SeekingHead
                } else {
                    Phase::Audio { serial: p.serial }
                };
                let Phase::AwaitTags {
                    serial,
                    head,
                    offset,
                } = std::mem::replace(&mut self.phase, next)
                else {
                    return Err(OpusError::Fault);
                };
                self.links_started += 1;
                Ok(Step::LinkStarted(LinkInfo {
                    serial,
                    head,
                    tags,
                    offset,
                    start_granule: None,
                    last_granule: None,
                }))
            }
            Phase::Audio { .. } => {
                if p.eos {
                    self.phase = Phase::SeekingHead;
                }
                Ok(Step::Audio(p))
            }
        }
    }

    /// Checks the state at end of input.
    fn finish(&self) -> Result<(), OpusError> {
        match self.phase {
            Phase::AwaitTags { .. } => Err(OpusError::BadHeader),
            _ if self.links_started == 0 => Err(OpusError::NotFormat),
            _ => Ok(()),
        }
    }
}

/// Result of scanning a seekable stream.
#[derive(Debug, Clone)]
struct StreamScan {
    links: Vec<LinkInfo>,
    start: u64,
    end: u64,
}

fn scan_stream<R: Read + Seek>(reader: R, start: u64) -> Result<Vec<LinkInfo>, OpusError> {
    let mut packets = PacketReader::new(reader, start);
    let mut tracker = LinkTracker::new();
    let mut links: Vec<LinkInfo> = Vec::new();
    // Frames completed on the current link's first audio page so far.
    let mut first_page_frames = 0i64;

    while let Some(item) = packets.next()? {
        let p = match tracker.step(item)? {
            Step::LinkStarted(info) => {
                links.push(info);
                first_page_frames = 0;
                continue;
            }
            Step::Audio(p) => p,
            Step::Hole | Step::Ignore => continue,
        };
        let Some(link) = links.last_mut() else {
            continue;
        };
        if link.start_granule.is_none() {
            first_page_frames += packet_frames(&p.data)? as i64;
        }
        if !p.last_in_page {
            continue;
        }
        let Some(gp) = page_granule(&p)? else {
            continue;
        };
        if link.start_granule.is_none() {
            link.start_granule = Some(start_granule(gp, first_page_frames, p.eos)?);
        }
        link.last_granule = Some(gp);
    }
    tracker.finish()?;

    for link in &links {
        let (Some(first), Some(last)) = (link.start_granule, link.last_granule) else {
            continue;
        };
        if last < first || last - first < link.head.pre_skip as i64 {
            tracing::debug!(serial = link.serial, first, last, "link ends before its pre-skip");
            return Err(OpusError::BadTimestamp);
        }
    }
    tracing::debug!(
        links = links.len(),
        holes = packets.holes(),
        "stream scan complete"
    );
    Ok(links)
}

/// Decoding reader over an Ogg Opus stream.
pub struct OpusFile<R: Read + Seek> {
    packets: PacketReader<R>,
    tracker: LinkTracker,
    settings: DecodeSettings,
    links: Vec<LinkInfo>,
    scan: Option<StreamScan>,
    current: usize,
    decoder: PacketDecoder,
    /// Pre-skip of the current link.
    pre_skip: i64,
    /// Frames still to drop for pre-skip.
    skip_remaining: usize,
    /// Frames of the current link up to the end of the last released page,
    /// pre-skip included.
    link_frames: i64,
    /// Start granule of the current link, set by its first audio page.
    granule_base: Option<i64>,
    /// After a hole, re-anchor on the next page granule without a gap check.
    resync: bool,
    scratch: Vec<f32>,
    /// Decoded samples of the page being assembled, then of the released page.
    page_pcm: Vec<f32>,
    page_frames: i64,
    pending: Range<usize>,
    pending_channels: usize,
    ended: bool,
}

impl<R: Read + Seek> std::fmt::Debug for OpusFile<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusFile")
            .field("links", &self.links.len())
            .field("current", &self.current)
            .field("seekable", &self.scan.is_some())
            .field("ended", &self.ended)
            .finish()
    }
}

impl<R: Read + Seek> OpusFile<R> {
    /// Opens a stream for front-to-back reading, without a scan.
    pub fn open(reader: R) -> Result<Self, OpusError> {
        Self::open_with(reader, DecodeSettings::default())
    }

    pub fn open_with(mut reader: R, settings: DecodeSettings) -> Result<Self, OpusError> {
        let start = reader.stream_position()?;
        Self::from_packets(PacketReader::new(reader, start), settings, None)
    }

    /// Opens a stream after scanning it for link totals.
    pub fn open_seekable(reader: R) -> Result<Self, OpusError> {
        Self::open_seekable_with(reader, DecodeSettings::default())
    }

    pub fn open_seekable_with(mut reader: R, settings: DecodeSettings) -> Result<Self, OpusError> {
        let start = reader.stream_position()?;
        let links = scan_stream(&mut reader, start)?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(start))?;

        let scan = StreamScan { links, start, end };
        Self::from_packets(PacketReader::new(reader, start), settings, Some(scan))
    }

    fn from_packets(
        mut packets: PacketReader<R>,
        settings: DecodeSettings,
        scan: Option<StreamScan>,
    ) -> Result<Self, OpusError> {
        let mut tracker = LinkTracker::new();
        let first = loop {
            let Some(item) = packets.next()? else {
                tracker.finish()?;
                return Err(OpusError::NotFormat);
            };
            if let Step::LinkStarted(info) = tracker.step(item)? {
                break info;
            }
        };

        let decoder = PacketDecoder::new(&first.head, settings.apply_output_gain)?;
        let skip_remaining = first.head.pre_skip as usize;
        let links = match &scan {
            Some(scan) => scan.links.clone(),
            None => vec![first],
        };

        Ok(Self {
            packets,
            tracker,
            settings,
            links,
            scan,
            current: 0,
            decoder,
            pre_skip: skip_remaining as i64,
            skip_remaining,
            link_frames: 0,
            granule_base: None,
            resync: false,
            scratch: vec![0.0; MAX_FRAMES_PER_PACKET * 2],
            page_pcm: Vec::new(),
            page_frames: 0,
            pending: 0..0,
            pending_channels: 0,
            ended: false,
        })
    }

    /// Whether the stream was scanned and totals are available.
    pub fn seekable(&self) -> bool {
        self.scan.is_some()
    }

    /// Links known so far: all of them for scanned streams.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn current_link(&self) -> usize {
        self.current
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    /// ID header of `link`, or of the current link for `None`.
    pub fn head(&self, link: Option<usize>) -> Option<&OpusHead> {
        self.link(link).map(|l| &l.head)
    }

    /// Comment header of `link`, or of the current link for `None`.
    pub fn tags(&self, link: Option<usize>) -> Option<&OpusTags> {
        self.link(link).map(|l| &l.tags)
    }

    pub fn link(&self, link: Option<usize>) -> Option<&LinkInfo> {
        self.links.get(link.unwrap_or(self.current))
    }

    /// Channels of the samples `read_float` returns next.
    pub fn channels(&self) -> usize {
        if self.pending.is_empty() {
            self.decoder.channels()
        } else {
            self.pending_channels
        }
    }

    /// Playable 48 kHz frames of `link`, or of the whole stream for `None`.
    pub fn pcm_total(&self, link: Option<usize>) -> Result<i64, OpusError> {
        if self.scan.is_none() {
            return Err(OpusError::Inval);
        }
        match link {
            Some(i) => self
                .links
                .get(i)
                .map(|l| l.pcm_total().unwrap_or(0))
                .ok_or(OpusError::Inval),
            None => self
                .links
                .iter()
                .try_fold(0i64, |acc, l| acc.checked_add(l.pcm_total().unwrap_or(0)))
                .ok_or(OpusError::BadTimestamp),
        }
    }

    /// Compressed size in bytes of `link`, or of the whole stream for `None`.
    pub fn raw_total(&self, link: Option<usize>) -> Result<u64, OpusError> {
        let Some(scan) = &self.scan else {
            return Err(OpusError::Inval);
        };
        match link {
            None => Ok(scan.end - scan.start),
            Some(i) => {
                let this = self.links.get(i).ok_or(OpusError::Inval)?;
                let next = self.links.get(i + 1).map_or(scan.end, |l| l.offset);
                let start = if i == 0 { scan.start } else { this.offset };
                Ok(next.saturating_sub(start))
            }
        }
    }

    /// Reads decoded PCM into `buf`, interleaved, and returns frames per channel.
    ///
    /// Returns `Ok(0)` at end of stream and `Err(OpusError::Hole)` once per
    /// detected gap; reading may continue after a hole. A single call never
    /// crosses a link boundary, so every call's samples share one channel count
    /// (see [`Self::channels`]).
    pub fn read_float(&mut self, buf: &mut [f32]) -> Result<usize, OpusError> {
        loop {
            if !self.pending.is_empty() {
                let channels = self.pending_channels;
                let frames = (buf.len() / channels).min(self.pending.len() / channels);
                if frames == 0 {
                    return Err(OpusError::Inval);
                }
                let n = frames * channels;
                let start = self.pending.start;
                buf[..n].copy_from_slice(&self.page_pcm[start..start + n]);
                self.pending.start += n;
                return Ok(frames);
            }
            if self.ended {
                return Ok(0);
            }

            let Some(item) = self.packets.next()? else {
                self.ended = true;
                if self.page_frames > 0 {
                    // Truncated input: release the unfinished page untrimmed.
                    self.release_page(None, false)?;
                }
                self.tracker.finish()?;
                continue;
            };
            match self.tracker.step(item)? {
                Step::Ignore => {}
                Step::Hole => {
                    self.decoder.reset()?;
                    self.resync = true;
                    self.page_frames = 0;
                    return Err(OpusError::Hole);
                }
                Step::LinkStarted(info) => self.start_link(info)?,
                Step::Audio(packet) => {
                    if self.decode_packet(&packet)? {
                        return Err(OpusError::Hole);
                    }
                }
            }
        }
    }

    fn start_link(&mut self, info: LinkInfo) -> Result<(), OpusError> {
        if self.page_frames > 0 {
            tracing::debug!(frames = self.page_frames, "dropping unfinished page of previous link");
        }
        self.decoder = PacketDecoder::new(&info.head, self.settings.apply_output_gain)?;
        self.pre_skip = info.head.pre_skip as i64;
        self.skip_remaining = info.head.pre_skip as usize;
        self.link_frames = 0;
        self.granule_base = None;
        self.resync = false;
        self.page_frames = 0;
        self.current += 1;
        if self.scan.is_none() {
            self.links.push(info);
        }
        tracing::debug!(link = self.current, "chained link started");
        Ok(())
    }

    /// Decodes one packet into the page buffer; releases the page when the
    /// packet ends it. Returns whether the page's granule revealed a gap.
    fn decode_packet(&mut self, packet: &Packet) -> Result<bool, OpusError> {
        if self.page_frames == 0 {
            self.page_pcm.clear();
        }
        if packet.data.is_empty() {
            tracing::debug!(offset = packet.offset, "skipping empty packet");
        } else {
            let frames = self.decoder.decode(&packet.data, &mut self.scratch)?;
            let n = frames * self.decoder.channels();
            self.page_pcm.extend_from_slice(&self.scratch[..n]);
            self.page_frames += frames as i64;
        }

        if packet.last_in_page || packet.eos {
            return self.release_page(page_granule(packet)?, packet.eos);
        }
        Ok(false)
    }

    /// Applies granule accounting to the buffered page and queues its samples.
    fn release_page(&mut self, granule: Option<i64>, eos: bool) -> Result<bool, OpusError> {
        let frames = std::mem::take(&mut self.page_frames);
        let page_start = self.link_frames;
        let mut page_end = page_start
            .checked_add(frames)
            .ok_or(OpusError::BadTimestamp)?;
        let mut keep = frames;
        let mut hole = false;

        if let Some(gp) = granule {
            let base = match self.granule_base {
                Some(base) => base,
                None => {
                    let base = start_granule(gp, page_end, eos)?;
                    self.granule_base = Some(base);
                    base
                }
            };
            let end = gp
                .checked_sub(base)
                .filter(|end| *end >= 0)
                .ok_or(OpusError::BadTimestamp)?;
            if eos {
                if end < self.pre_skip {
                    tracing::debug!(
                        granule = end,
                        pre_skip = self.pre_skip,
                        "link ends before its pre-skip"
                    );
                    return Err(OpusError::BadTimestamp);
                }
                keep = end.saturating_sub(page_start).clamp(0, frames);
            } else if end != page_end {
                if end > page_end && !self.resync {
                    tracing::debug!(expected = page_end, granule = end, "granule gap");
                    hole = true;
                } else {
                    tracing::debug!(expected = page_end, granule = end, "re-anchoring on granule");
                }
                page_end = end;
            }
            self.resync = false;
        }
        self.link_frames = page_end;

        let skip = (self.skip_remaining as i64).min(keep);
        self.skip_remaining -= skip as usize;

        let channels = self.decoder.channels();
        self.pending = (skip as usize * channels)..(keep as usize * channels);
        self.pending_channels = channels;
        Ok(hole)
    }
}
