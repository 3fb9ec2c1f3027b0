//! Per-stream packet navigation.
//!
//! A `StreamReader` walks one stream's packets forward or backward using the
//! best structure the file offers: the stream's OpenDML index, then the
//! shared `idx1`, then a plain walk over the `movi` chunks.

use serde::Serialize;

use super::chunk::{ids, padded, read_chunk_header, FourCc, PacketKind};
use super::idx1::{self, Idx1Hit};
use super::indx::HierIndex;
use super::parser::{Container, StreamFormat, StreamInfo};
use crate::error::{AviError, Result};
use crate::source::{self, ByteSource};

/// Where a packet lives and where it sits in its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub tag: FourCc,
    /// Zero-based packet number within the stream.
    pub stream_packet_index: u64,
    /// Position in whatever produced the packet: `idx1` entry, standard
    /// index entry, or data chunk count in `movi`.
    pub structure_index: u64,
    /// Absolute offset of the payload.
    pub offset: u64,
    pub len: u32,
    /// Stream bytes before this packet.
    pub stream_byte_offset: u64,
    pub keyframe: bool,
}

impl Packet {
    pub fn kind(&self) -> Option<PacketKind> {
        self.tag.packet_kind()
    }

    /// True when `byte_offset` of the stream falls inside this packet.
    pub fn contains_byte(&self, byte_offset: u64) -> bool {
        self.stream_byte_offset <= byte_offset && byte_offset < self.stream_byte_offset + self.len as u64
    }
}

/// Receives packets on dispatch. The reader hands over the payload location
/// only; implementations seek and read themselves if they need the bytes.
///
/// A sink must not call back into the reader that is dispatching to it.
pub trait PacketSink {
    fn on_video_compressed(&mut self, _offset: u64, _len: u32) {}
    fn on_video(&mut self, _offset: u64, _len: u32) {}
    fn on_palette_change(&mut self, _offset: u64, _len: u32) {}
    fn on_audio(&mut self, _offset: u64, _len: u32) {}
}

/// Route a packet to the sink method matching its tag suffix.
pub fn dispatch_packet(packet: &Packet, sink: &mut dyn PacketSink) -> Result<()> {
    match packet.kind() {
        Some(PacketKind::VideoUncompressed) => sink.on_video(packet.offset, packet.len),
        Some(PacketKind::VideoCompressed) => sink.on_video_compressed(packet.offset, packet.len),
        Some(PacketKind::PaletteChange) => sink.on_palette_change(packet.offset, packet.len),
        Some(PacketKind::Audio) => sink.on_audio(packet.offset, packet.len),
        None => {
            tracing::error!("Unknown stream type: \"{}\"", packet.tag);
            return Err(AviError::UnknownPacketType(packet.tag));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    HierarchicalIndex,
    FlatIndex,
    LinearScan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavState {
    NotStarted,
    Positioned(Packet),
    /// Keeps the last packet reached, if any.
    Exhausted(Option<Packet>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

pub struct StreamReader<'c, S: ByteSource> {
    container: &'c Container,
    stream_id: usize,
    source: S,
    /// Live copy of the stream format; palette changes land here.
    pub(crate) format: StreamFormat,
    state: NavState,
    indx: Option<HierIndex>,
    quiet: bool,
}

impl Container {
    /// Bind a navigator for stream `id` to its own byte source.
    pub fn open_stream<S: ByteSource>(&self, id: usize, source: S) -> Result<StreamReader<'_, S>> {
        let info = self.stream(id).map_err(|e| {
            tracing::error!("Bad stream id `{}` (Max: `{}`)", id, self.stream_count());
            e
        })?;
        if info.indx_offset.is_none() {
            tracing::info!("Stream {} doesn't have a 'indx' chunk", id);
        }
        Ok(StreamReader {
            container: self,
            stream_id: id,
            source,
            format: info.format.clone(),
            state: NavState::NotStarted,
            indx: None,
            quiet: false,
        })
    }

    /// Open the first video and the first audio stream, each on its own source.
    pub fn open_av_pair<S: ByteSource>(
        &self,
        video_source: S,
        audio_source: S,
    ) -> Result<(Option<StreamReader<'_, S>>, Option<StreamReader<'_, S>>)> {
        let video = match self.first_video_stream() {
            Some(id) => Some(self.open_stream(id, video_source)?),
            None => None,
        };
        let audio = match self.first_audio_stream() {
            Some(id) => Some(self.open_stream(id, audio_source)?),
            None => None,
        };
        Ok((video, audio))
    }
}

impl<'c, S: ByteSource> StreamReader<'c, S> {
    pub fn stream_id(&self) -> usize {
        self.stream_id
    }

    pub fn container(&self) -> &'c Container {
        self.container
    }

    pub fn stream_info(&self) -> &'c StreamInfo {
        &self.container.streams()[self.stream_id]
    }

    /// Stream format including any palette changes applied so far.
    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Silence per-packet debug narration for this stream.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn strategy(&self) -> Strategy {
        if self.stream_info().indx_offset.is_some() {
            Strategy::HierarchicalIndex
        } else if self.container.flat_index().is_some() {
            Strategy::FlatIndex
        } else {
            Strategy::LinearScan
        }
    }

    /// Packet the reader is positioned on.
    pub fn current(&self) -> Option<&Packet> {
        match &self.state {
            NavState::Positioned(p) => Some(p),
            _ => None,
        }
    }

    /// Positioned packet, or the last one reached before running out.
    pub fn last_packet(&self) -> Option<&Packet> {
        match &self.state {
            NavState::Positioned(p) | NavState::Exhausted(Some(p)) => Some(p),
            _ => None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state != NavState::NotStarted
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.state, NavState::Exhausted(_))
    }

    /// Go back to before the first packet. Clears the end-of-stream state.
    pub fn reset(&mut self) {
        self.state = NavState::NotStarted;
    }

    /// Move to the next packet. `Ok(None)` means the stream has no more
    /// packets; the reader then stays at end of stream until `reset`.
    pub fn advance(&mut self) -> Result<Option<Packet>> {
        let from = match self.state {
            NavState::NotStarted => None,
            NavState::Positioned(p) => Some(p),
            NavState::Exhausted(_) => return Ok(None),
        };
        let next_index = from.map_or(0, |p| p.stream_packet_index + 1);
        let byte_offset = from.map_or(0, |p| p.stream_byte_offset + p.len as u64);

        let found = match self.strategy() {
            Strategy::HierarchicalIndex => self.resolve_indexed(next_index)?,
            Strategy::FlatIndex => {
                let start = from.map_or(0, |p| p.structure_index + 1);
                self.resolve_flat(Direction::Forward, start, next_index)?
            }
            Strategy::LinearScan => self.scan_linear(from, next_index)?,
        };
        Ok(self.land(found.map(|p| Packet {
            stream_byte_offset: byte_offset,
            ..p
        }), from, next_index))
    }

    /// Move to the previous packet. Retreating from the first packet lands
    /// on it again. Without any index this fails with
    /// `BackwardScanUnsupported` and leaves the position unchanged.
    /// The stream byte offset drops by the size of the packet moved to.
    pub fn retreat(&mut self) -> Result<Option<Packet>> {
        let from = match self.state {
            NavState::NotStarted => None,
            NavState::Positioned(p) => Some(p),
            NavState::Exhausted(_) => return Ok(None),
        };
        let strategy = self.strategy();
        if strategy == Strategy::LinearScan && from.is_some() {
            tracing::warn!("Stream {}: cannot scan backward without an index", self.stream_id);
            return Err(AviError::BackwardScanUnsupported { stream: self.stream_id });
        }

        let cur = match from {
            Some(p) if p.stream_packet_index > 0 => p,
            _ => {
                self.state = NavState::NotStarted;
                return self.advance();
            }
        };
        let prev_index = cur.stream_packet_index - 1;

        let found = match strategy {
            Strategy::HierarchicalIndex => self.resolve_indexed(prev_index)?,
            Strategy::FlatIndex => {
                self.resolve_flat(Direction::Backward, cur.structure_index.saturating_sub(1), prev_index)?
            }
            Strategy::LinearScan => None,
        };
        Ok(self.land(found.map(|p| Packet {
            stream_byte_offset: cur.stream_byte_offset.saturating_sub(p.len as u64),
            ..p
        }), from, prev_index))
    }

    fn land(&mut self, found: Option<Packet>, from: Option<Packet>, wanted: u64) -> Option<Packet> {
        match found {
            Some(packet) => {
                if !self.quiet {
                    tracing::debug!(
                        "Successfully found packet {}({}) of the stream {}: Offset = {:#x}, Length = {:#x}",
                        packet.stream_packet_index,
                        packet.structure_index,
                        self.stream_id,
                        packet.offset,
                        packet.len
                    );
                }
                self.state = NavState::Positioned(packet);
                Some(packet)
            }
            None => {
                if !self.quiet {
                    tracing::debug!("Stream {}: no packet {}", self.stream_id, wanted);
                }
                self.state = NavState::Exhausted(from);
                None
            }
        }
    }

    /// Dispatch the current packet. Returns false when not positioned.
    pub fn dispatch(&self, sink: &mut dyn PacketSink) -> Result<bool> {
        match self.current() {
            Some(packet) => {
                dispatch_packet(packet, sink)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn advance_dispatch(&mut self, sink: &mut dyn PacketSink) -> Result<Option<Packet>> {
        let packet = self.advance()?;
        if let Some(p) = &packet {
            dispatch_packet(p, sink)?;
        }
        Ok(packet)
    }

    pub fn retreat_dispatch(&mut self, sink: &mut dyn PacketSink) -> Result<Option<Packet>> {
        let packet = self.retreat()?;
        if let Some(p) = &packet {
            dispatch_packet(p, sink)?;
        }
        Ok(packet)
    }

    /// Read the current packet's payload.
    pub fn read_packet_data(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(packet) = self.current().copied() else {
            return Ok(None);
        };
        Ok(Some(source::read_at(&mut self.source, packet.offset, packet.len as usize)?))
    }

    // ========================================================================
    // Strategies
    // ========================================================================

    fn resolve_indexed(&mut self, packet_index: u64) -> Result<Option<Packet>> {
        if self.indx.is_none() {
            let Some(offset) = self.stream_info().indx_offset else {
                return Ok(None);
            };
            let capacity = self.container.config().index_cache_capacity;
            self.indx = Some(HierIndex::open(&mut self.source, self.stream_id, offset, capacity)?);
        }
        let Some(indx) = self.indx.as_mut() else {
            return Ok(None);
        };
        let found = indx.resolve(&mut self.source, packet_index)?;
        if found.is_none() {
            tracing::warn!(
                "Could not find packet {} for the stream id {}",
                packet_index,
                self.stream_id
            );
        }
        Ok(found.map(|p| Packet {
            tag: p.chunk_id,
            stream_packet_index: packet_index,
            structure_index: packet_index,
            offset: p.offset,
            len: p.len,
            stream_byte_offset: 0,
            keyframe: p.keyframe,
        }))
    }

    fn resolve_flat(&mut self, direction: Direction, start: u64, packet_index: u64) -> Result<Option<Packet>> {
        let Some(index) = self.container.flat_index().copied() else {
            return Ok(None);
        };
        if packet_index == 0 && !self.quiet {
            tracing::debug!(
                "Seeking packet {} of the stream {} using the indices from the AVI file",
                packet_index,
                self.stream_id
            );
        }
        let hit: Option<Idx1Hit> = match direction {
            Direction::Forward => idx1::scan_forward(&mut self.source, &index, self.stream_id, start)?,
            Direction::Backward => idx1::scan_backward(&mut self.source, &index, self.stream_id, start)?,
        };
        if hit.is_none() {
            tracing::warn!(
                "Could not find packet {} for the stream id {}",
                packet_index,
                self.stream_id
            );
        }
        Ok(hit.map(|h| Packet {
            tag: h.entry.chunk_id,
            stream_packet_index: packet_index,
            structure_index: h.entry_index,
            offset: h.data_offset,
            len: h.entry.size,
            stream_byte_offset: 0,
            keyframe: h.entry.is_keyframe(),
        }))
    }

    /// Walk `movi` chunk by chunk from just past the current packet,
    /// entering `LIST(rec )` groups, until the next chunk of this stream.
    fn scan_linear(&mut self, from: Option<Packet>, packet_index: u64) -> Result<Option<Packet>> {
        let end_of_file = self.container.end_of_file();
        let (mut pos, mut chunk_count) = match from {
            Some(p) => (p.offset + padded(p.len as u64), p.structure_index + 1),
            None => {
                if !self.quiet {
                    tracing::debug!(
                        "Seeking packet {} of the stream {} via file traversal",
                        packet_index,
                        self.stream_id
                    );
                }
                (self.container.movi_data_offset(), 0)
            }
        };

        while pos + 8 <= end_of_file {
            source::seek_to(&mut self.source, pos)?;
            let header = read_chunk_header(&mut self.source)?;

            if header.id == ids::LIST {
                let list_type = source::read_fourcc(&mut self.source)?;
                if list_type == ids::REC {
                    if !self.quiet {
                        tracing::debug!("Seeking into a LIST(rec) chunk");
                    }
                    pos = header.data_start + 4;
                } else {
                    pos = header.padded_end();
                }
                continue;
            }

            match header.id.stream_number() {
                None => tracing::warn!(
                    "Encountering unknown FourCC \"{}\" while seeking for a packet, skipping",
                    header.id
                ),
                Some(n) if n == self.stream_id => {
                    return Ok(Some(Packet {
                        tag: header.id,
                        stream_packet_index: packet_index,
                        structure_index: chunk_count,
                        offset: header.data_start,
                        len: header.size,
                        stream_byte_offset: 0,
                        keyframe: true,
                    }));
                }
                Some(_) => {
                    if header.id.packet_kind().is_some() {
                        chunk_count += 1;
                    }
                }
            }
            pos = header.padded_end();
        }

        tracing::warn!(
            "No packet found for stream id {} after full file traversal",
            self.stream_id
        );
        Ok(None)
    }
}
