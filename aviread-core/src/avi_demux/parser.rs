//! Container parsing: one pass over the RIFF tree that builds the stream
//! table and locates the packet area and the indices.

use serde::Serialize;

use super::chunk::{ids, walk_chunks, ChunkHeader, FourCc, Walk};
use super::pixel::PixelFormat;
use super::structs::{
    BitmapFormat, BitmapInfoHeader, Idx1Entry, MainHeader, MainHeaderFlags, StreamHeader,
    WaveFormat,
};
use crate::config::{DemuxConfig, Idx1Anchor};
use crate::error::{AviError, Result};
use crate::source::{self, ByteSource};

// ============================================================================
// Stream Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Text,
    Midi,
    Unknown,
}

impl StreamKind {
    pub fn from_fourcc(fcc: FourCc) -> Self {
        match fcc {
            ids::VIDS => StreamKind::Video,
            ids::AUDS => StreamKind::Audio,
            ids::TXTS => StreamKind::Text,
            ids::MIDS => StreamKind::Midi,
            _ => StreamKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    Bitmap(BitmapFormat),
    Wave(WaveFormat),
    /// Text and MIDI streams carry no decoded format.
    None,
}

/// Where a chunk payload lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkSpan {
    pub offset: u64,
    pub len: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub header: StreamHeader,
    pub format: StreamFormat,
    /// False when the `strf` chunk was missing or too short; `format` is then zeroed.
    pub format_valid: bool,
    pub name: Option<String>,
    /// `strf` payload, recorded during the walk.
    pub format_chunk: Option<ChunkSpan>,
    /// `strd` payload (codec private data).
    pub extra_data: Option<ChunkSpan>,
    /// Payload offset of this stream's OpenDML `indx` chunk.
    pub indx_offset: Option<u64>,
}

impl StreamInfo {
    fn empty() -> Self {
        Self {
            header: StreamHeader::default(),
            format: StreamFormat::None,
            format_valid: false,
            name: None,
            format_chunk: None,
            extra_data: None,
            indx_offset: None,
        }
    }

    pub fn kind(&self) -> StreamKind {
        StreamKind::from_fourcc(self.header.fcc_type)
    }

    pub fn is_video(&self) -> bool {
        self.kind() == StreamKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind() == StreamKind::Audio
    }

    pub fn is_text(&self) -> bool {
        self.kind() == StreamKind::Text
    }

    pub fn is_midi(&self) -> bool {
        self.kind() == StreamKind::Midi
    }

    pub fn bitmap_format(&self) -> Option<&BitmapFormat> {
        match &self.format {
            StreamFormat::Bitmap(b) if self.format_valid => Some(b),
            _ => None,
        }
    }

    pub fn wave_format(&self) -> Option<&WaveFormat> {
        match &self.format {
            StreamFormat::Wave(w) if self.format_valid => Some(w),
            _ => None,
        }
    }

    /// Frames (or samples) per second, when the header defines a time base.
    pub fn frame_rate(&self) -> Option<f64> {
        if self.header.scale > 0 && self.header.rate > 0 {
            Some(self.header.rate as f64 / self.header.scale as f64)
        } else {
            None
        }
    }
}

// ============================================================================
// Container
// ============================================================================

/// Location of the legacy `idx1` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatIndex {
    /// Payload offset of the `idx1` chunk.
    pub offset: u64,
    pub entries: u64,
    /// Added to an entry's stored offset to reach its chunk header.
    pub anchor: u64,
}

impl FlatIndex {
    pub fn entry_offset(&self, i: u64) -> u64 {
        self.offset + i * Idx1Entry::SIZE as u64
    }
}

/// Everything learned from the header walk. Immutable once built; navigators
/// borrow it read-only.
#[derive(Debug, Clone)]
pub struct Container {
    config: DemuxConfig,
    main_header: MainHeader,
    streams: Vec<StreamInfo>,
    movi_data_offset: u64,
    rec_lists: bool,
    flat_index: Option<FlatIndex>,
    end_of_file: u64,
}

impl Container {
    /// Parse with default limits. The source must be positioned on the `RIFF` tag.
    pub fn parse<S: ByteSource + ?Sized>(src: &mut S) -> Result<Self> {
        Self::parse_with_config(src, DemuxConfig::default())
    }

    pub fn parse_with_config<S: ByteSource + ?Sized>(src: &mut S, config: DemuxConfig) -> Result<Self> {
        config.validate()?;
        let result = parse_riff(src, config);
        if result.is_err() {
            tracing::error!("Reading AVI file failed");
        }
        result
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn main_header(&self) -> &MainHeader {
        &self.main_header
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, id: usize) -> Result<&StreamInfo> {
        self.streams.get(id).ok_or(AviError::InvalidStream {
            id,
            count: self.streams.len(),
        })
    }

    /// First byte after the `movi` list type.
    pub fn movi_data_offset(&self) -> u64 {
        self.movi_data_offset
    }

    /// Position of the `movi` FourCC itself.
    pub fn movi_fourcc_offset(&self) -> u64 {
        self.movi_data_offset - 4
    }

    /// True when packets are grouped in `LIST(rec )` chunks.
    pub fn uses_rec_lists(&self) -> bool {
        self.rec_lists
    }

    pub fn flat_index(&self) -> Option<&FlatIndex> {
        self.flat_index.as_ref()
    }

    /// Logical end of the file according to the outer RIFF size.
    pub fn end_of_file(&self) -> u64 {
        self.end_of_file
    }

    pub fn first_video_stream(&self) -> Option<usize> {
        self.streams.iter().position(StreamInfo::is_video)
    }

    pub fn first_audio_stream(&self) -> Option<usize> {
        self.streams.iter().position(StreamInfo::is_audio)
    }

    /// Fetch a stream's `strd` payload.
    pub fn read_extra_data<S: ByteSource + ?Sized>(&self, src: &mut S, id: usize) -> Result<Option<Vec<u8>>> {
        match self.stream(id)?.extra_data {
            Some(span) => Ok(Some(source::read_at(src, span.offset, span.len as usize)?)),
            None => Ok(None),
        }
    }

    pub fn summary(&self) -> ContainerSummary {
        let header = &self.main_header;
        let streams = self
            .streams
            .iter()
            .enumerate()
            .map(|(id, s)| StreamSummary {
                id,
                kind: s.kind(),
                handler: s.header.fcc_handler,
                name: s.name.clone(),
                frame_rate: s.frame_rate(),
                length: s.header.length,
                has_indx: s.indx_offset.is_some(),
                video: s.bitmap_format().map(|b| b.header.clone()),
                audio: s.wave_format().cloned(),
                pixel_format: s.pixel_format(),
            })
            .collect();

        ContainerSummary {
            width: header.width,
            height: header.height,
            fps: if header.micro_sec_per_frame > 0 {
                1_000_000.0 / header.micro_sec_per_frame as f64
            } else {
                0.0
            },
            duration_us: header.total_frames as u64 * header.micro_sec_per_frame as u64,
            total_frames: header.total_frames,
            flags: header.header_flags(),
            flat_index_entries: self.flat_index.map(|i| i.entries),
            rec_lists: self.rec_lists,
            streams,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_us: u64,
    pub total_frames: u32,
    pub flags: MainHeaderFlags,
    pub flat_index_entries: Option<u64>,
    pub rec_lists: bool,
    pub streams: Vec<StreamSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub id: usize,
    pub kind: StreamKind,
    pub handler: FourCc,
    pub name: Option<String>,
    pub frame_rate: Option<f64>,
    pub length: u32,
    pub has_indx: bool,
    pub video: Option<BitmapInfoHeader>,
    pub audio: Option<WaveFormat>,
    pub pixel_format: Option<PixelFormat>,
}

// ============================================================================
// RIFF Walk
// ============================================================================

struct ParseState {
    config: DemuxConfig,
    main_header: Option<MainHeader>,
    streams: Vec<StreamInfo>,
    movi_data_offset: Option<u64>,
    rec_lists: bool,
    idx1: Option<(u64, u64)>,
}

impl ParseState {
    fn got_all_we_need(&self) -> bool {
        let has_index = self.main_header.as_ref().is_some_and(MainHeader::has_index);
        !self.streams.is_empty()
            && self.movi_data_offset.is_some()
            && (!has_index || self.idx1.is_some())
    }

    fn parse_hdrl<S: ByteSource + ?Sized>(&mut self, src: &mut S, list: &ChunkHeader) -> Result<()> {
        tracing::info!("Reading toplevel LIST chunk \"hdrl\"");
        let streams_before = self.streams.len();
        let mut avih_read = false;

        walk_chunks(src, list.end(), |src, chunk| {
            match chunk.id {
                ids::AVIH => {
                    if avih_read || self.main_header.is_some() {
                        tracing::error!("AVI file format corrupted: duplicated main AVI header \"avih\"");
                        return Err(AviError::DuplicateMainHeader);
                    }
                    tracing::info!("Reading the main AVI header \"avih\"");
                    let header = MainHeader::from_bytes(&read_record(
                        src,
                        chunk,
                        MainHeader::MIN_SIZE,
                        MainHeader::SIZE,
                    )?);
                    if header.streams as usize > self.config.max_streams {
                        tracing::error!(
                            "The AVI file contains too many streams ({}) exceeded the limit {}",
                            header.streams,
                            self.config.max_streams
                        );
                        return Err(AviError::TooManyStreams {
                            limit: self.config.max_streams,
                        });
                    }
                    self.main_header = Some(header);
                    avih_read = true;
                }
                ids::LIST => {
                    let list_type = source::read_fourcc(src)?;
                    if list_type == ids::STRL {
                        self.parse_strl(src, chunk)?;
                    } else {
                        tracing::info!("Skipping chunk \"{}\"", list_type);
                    }
                }
                other => tracing::info!("Skipping chunk \"{}\"", other),
            }
            Ok(Walk::Continue)
        })?;

        if !avih_read {
            tracing::error!("Missing main AVI header \"avih\"");
            return Err(AviError::MissingMainHeader);
        }
        if self.streams.len() == streams_before {
            tracing::error!("No stream found in the AVI file");
            return Err(AviError::NoStreams);
        }
        Ok(())
    }

    fn parse_strl<S: ByteSource + ?Sized>(&mut self, src: &mut S, list: &ChunkHeader) -> Result<()> {
        let stream_id = self.streams.len();
        if stream_id >= self.config.max_streams {
            tracing::error!(
                "Too many streams in the AVI file, max supported streams is {}",
                self.config.max_streams
            );
            return Err(AviError::TooManyStreams {
                limit: self.config.max_streams,
            });
        }
        tracing::info!("Reading the stream list");

        let max_name = self.config.max_stream_name - 1;
        let mut info = StreamInfo::empty();
        let mut strh_read = false;

        walk_chunks(src, list.end(), |src, chunk| {
            match chunk.id {
                ids::STRH => {
                    tracing::info!("Reading the stream header for stream id {}", stream_id);
                    info.header = StreamHeader::from_bytes(&read_record(src, chunk, 0, StreamHeader::SIZE)?);
                    strh_read = true;
                }
                ids::STRF => {
                    tracing::info!("Reading the stream format for stream id {}", stream_id);
                    info.format_chunk = Some(ChunkSpan {
                        offset: chunk.data_start,
                        len: chunk.size,
                    });
                }
                ids::STRD => {
                    tracing::info!(
                        "Reading the stream additional header data for stream id {}",
                        stream_id
                    );
                    info.extra_data = Some(ChunkSpan {
                        offset: chunk.data_start,
                        len: chunk.size,
                    });
                }
                ids::STRN => {
                    tracing::info!("Reading the stream name for stream id {}", stream_id);
                    let mut raw = vec![0u8; (chunk.size as usize).min(max_name)];
                    source::read_exact(src, &mut raw)?;
                    if let Some(nul) = raw.iter().position(|&b| b == 0) {
                        raw.truncate(nul);
                    }
                    info.name = Some(String::from_utf8_lossy(&raw).into_owned());
                }
                ids::INDX => {
                    tracing::info!("Reading the index chunk \"indx\"");
                    info.indx_offset = Some(chunk.data_start);
                }
                other => tracing::info!("Skipping chunk \"{}\"", other),
            }
            Ok(Walk::Continue)
        })?;

        if !strh_read {
            tracing::error!("Stream {} has no stream header \"strh\"", stream_id);
            return Err(AviError::MissingChunk("strh"));
        }

        read_stream_format(src, stream_id, &mut info)?;

        match &info.name {
            Some(name) => tracing::info!(
                "Stream {}: Type: \"{}\", Handler: \"{}\", Name: {}",
                stream_id,
                info.header.fcc_type,
                info.header.fcc_handler,
                name
            ),
            None => tracing::info!(
                "Stream {}: Type: \"{}\", Handler: \"{}\"",
                stream_id,
                info.header.fcc_type,
                info.header.fcc_handler
            ),
        }

        self.streams.push(info);
        Ok(())
    }

    fn parse_movi<S: ByteSource + ?Sized>(&mut self, src: &mut S, list: &ChunkHeader) -> Result<()> {
        tracing::info!("Reading toplevel LIST chunk \"movi\"");
        let data_offset = source::tell(src)?;
        self.movi_data_offset = Some(data_offset);

        // A nested LIST as first child means packets are grouped in LIST(rec ).
        if data_offset + 12 <= list.end() {
            let first = source::read_fourcc(src)?;
            if first == ids::LIST {
                source::read_u32_le(src)?;
                let list_type = source::read_fourcc(src)?;
                if list_type != ids::REC {
                    tracing::error!(
                        "Inside LIST(movi): expected LIST(rec ), got LIST({})",
                        list_type
                    );
                    return Err(AviError::UnexpectedMoviList(list_type));
                }
                tracing::info!("This AVI file uses `LIST(rec )` structure to store packets");
                self.rec_lists = true;
            }
        }
        Ok(())
    }
}

fn parse_riff<S: ByteSource + ?Sized>(src: &mut S, config: DemuxConfig) -> Result<Container> {
    source::expect_fourcc(src, ids::RIFF)?;
    let riff_len = source::read_u32_le(src)?;
    let avi_start = source::tell(src)?;
    source::expect_fourcc(src, ids::AVI)?;
    let end_of_file = avi_start + riff_len as u64;

    let mut state = ParseState {
        config,
        main_header: None,
        streams: Vec::new(),
        movi_data_offset: None,
        rec_lists: false,
        idx1: None,
    };

    // https://learn.microsoft.com/en-us/windows/win32/directshow/avi-riff-file-reference
    walk_chunks(src, end_of_file, |src, chunk| {
        match chunk.id {
            ids::LIST => {
                let list_type = source::read_fourcc(src)?;
                match list_type {
                    ids::HDRL => state.parse_hdrl(src, chunk)?,
                    ids::MOVI => state.parse_movi(src, chunk)?,
                    other => tracing::info!("Skipping LIST chunk \"{}\"", other),
                }
            }
            ids::IDX1 => {
                tracing::info!("Reading toplevel chunk \"idx1\"");
                state.idx1 = Some((chunk.data_start, chunk.size as u64 / Idx1Entry::SIZE as u64));
            }
            other => tracing::info!("Skipping chunk \"{}\"", other),
        }
        Ok(if state.got_all_we_need() {
            Walk::Stop
        } else {
            Walk::Continue
        })
    })?;

    let main_header = state.main_header.take().ok_or_else(|| {
        tracing::error!("Missing main AVI header \"avih\"");
        AviError::MissingMainHeader
    })?;
    if state.streams.is_empty() {
        tracing::error!("No stream found in the AVI file");
        return Err(AviError::NoStreams);
    }
    let movi_data_offset = state.movi_data_offset.ok_or_else(|| {
        tracing::error!("Missing toplevel LIST chunk \"movi\"");
        AviError::MissingChunk("movi")
    })?;

    let flat_index = match state.idx1 {
        Some((offset, entries)) if entries > 0 => {
            let mut index = FlatIndex {
                offset,
                entries,
                anchor: movi_data_offset - 4,
            };
            index.anchor = resolve_idx1_anchor(src, &index, end_of_file, state.config.idx1_anchor)?;
            Some(index)
        }
        _ => None,
    };

    if flat_index.is_none() && state.streams.iter().all(|s| s.indx_offset.is_none()) {
        tracing::warn!("No AVI index: per-stream seeking requires per-packet file traversal");
    }

    Ok(Container {
        config: state.config,
        main_header,
        streams: state.streams,
        movi_data_offset,
        rec_lists: state.rec_lists,
        flat_index,
        end_of_file,
    })
}

/// Read a fixed-layout record, zero-extending a short chunk up to `size`.
fn read_record<S: ByteSource + ?Sized>(src: &mut S, chunk: &ChunkHeader, min: usize, size: usize) -> Result<Vec<u8>> {
    if (chunk.size as usize) < min {
        tracing::error!("Chunk \"{}\" too small: {} bytes", chunk.id, chunk.size);
        return Err(AviError::ChunkTooSmall {
            id: chunk.id,
            size: chunk.size as u64,
            min: min as u64,
        });
    }
    let mut buf = vec![0u8; size];
    let len = (chunk.size as usize).min(size);
    source::read_exact(src, &mut buf[..len])?;
    Ok(buf)
}

fn read_stream_format<S: ByteSource + ?Sized>(src: &mut S, stream_id: usize, info: &mut StreamInfo) -> Result<()> {
    let span = info.format_chunk;
    let len = span.map(|s| s.len as usize).unwrap_or(0);

    match info.kind() {
        StreamKind::Video => {
            info.format = StreamFormat::Bitmap(BitmapFormat::default());
            if let (Some(span), true) = (span, len >= BitmapInfoHeader::SIZE) {
                let raw = source::read_at(src, span.offset, len.min(BitmapFormat::MAX_SIZE))?;
                info.format = StreamFormat::Bitmap(BitmapFormat::from_bytes(&raw));
                info.format_valid = true;
            } else {
                tracing::warn!("Stream {}: video format chunk missing or too short", stream_id);
            }
        }
        StreamKind::Audio => {
            info.format = StreamFormat::Wave(WaveFormat::default());
            if let (Some(span), true) = (span, len >= WaveFormat::MIN_SIZE) {
                let mut raw = source::read_at(src, span.offset, len.min(WaveFormat::SIZE))?;
                raw.resize(WaveFormat::SIZE, 0);
                info.format = StreamFormat::Wave(WaveFormat::from_bytes(&raw));
                info.format_valid = true;
            } else {
                tracing::warn!("Stream {}: audio format chunk missing or too short", stream_id);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Decide which anchor `idx1` offsets use, probing the first stream-data
/// entry in `Auto` mode.
fn resolve_idx1_anchor<S: ByteSource + ?Sized>(
    src: &mut S,
    index: &FlatIndex,
    end_of_file: u64,
    mode: Idx1Anchor,
) -> Result<u64> {
    let movi_relative = index.anchor;
    match mode {
        Idx1Anchor::MoviRelative => return Ok(movi_relative),
        Idx1Anchor::Absolute => return Ok(0),
        Idx1Anchor::Auto => {}
    }

    const PROBE_ENTRIES: u64 = 16;
    for i in 0..index.entries.min(PROBE_ENTRIES) {
        let raw = source::read_at(src, index.entry_offset(i), Idx1Entry::SIZE)?;
        let entry = Idx1Entry::from_bytes(&raw);
        if !entry.chunk_id.is_stream_data() {
            continue;
        }
        for anchor in [movi_relative, 0] {
            let at = anchor + entry.offset as u64;
            if at + 8 > end_of_file {
                continue;
            }
            let tag = source::seek_to(src, at).and_then(|_| source::read_fourcc(src));
            if matches!(tag, Ok(tag) if tag == entry.chunk_id) {
                if anchor == 0 {
                    tracing::info!("idx1 offsets are absolute file positions");
                }
                return Ok(anchor);
            }
        }
        tracing::warn!(
            "idx1 entry \"{}\" does not point at a matching chunk, assuming movi-relative offsets",
            entry.chunk_id
        );
        return Ok(movi_relative);
    }
    Ok(movi_relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi_demux::fixture::{AviBuilder, IndexMode, JunkAt, StreamSpec};
    use std::io::Cursor;

    fn parse(bytes: Vec<u8>) -> Result<Container> {
        Container::parse(&mut Cursor::new(bytes))
    }

    #[test]
    fn parses_video_and_audio_streams() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(30, 1).named("Main video"))
            .stream(StreamSpec::audio(44_100, 4))
            .packets(0, &[100, 101, 102])
            .packets(1, &[400, 400])
            .build();
        let container = parse(file.bytes).expect("parse");

        assert_eq!(container.stream_count(), 2);
        let video = container.stream(0).expect("video");
        assert!(video.is_video());
        assert!(video.format_valid);
        assert_eq!(video.name.as_deref(), Some("Main video"));
        assert_eq!(video.header.rate, 30);

        let audio = container.stream(1).expect("audio");
        assert!(audio.is_audio());
        assert_eq!(audio.wave_format().expect("wave").avg_bytes_per_sec, 44_100 * 4);

        assert_eq!(container.first_video_stream(), Some(0));
        assert_eq!(container.first_audio_stream(), Some(1));
        assert_eq!(container.movi_data_offset(), file.movi_data_offset);
        assert!(container.flat_index().is_some());
        assert!(!container.uses_rec_lists());
    }

    #[test]
    fn rejects_bad_signature() {
        let mut file = AviBuilder::new().stream(StreamSpec::video(25, 1)).build();
        file.bytes[8..12].copy_from_slice(b"WAVE");
        assert!(matches!(parse(file.bytes), Err(AviError::FourCcMismatch { .. })));
    }

    #[test]
    fn rejects_duplicate_main_header() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .duplicate_avih()
            .build();
        assert!(matches!(parse(file.bytes), Err(AviError::DuplicateMainHeader)));
    }

    #[test]
    fn rejects_too_many_streams() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .stream(StreamSpec::audio(8_000, 1))
            .stream(StreamSpec::audio(8_000, 1))
            .build();
        let config = DemuxConfig {
            max_streams: 2,
            ..DemuxConfig::default()
        };
        let err = Container::parse_with_config(&mut Cursor::new(file.bytes), config).unwrap_err();
        assert!(matches!(err, AviError::TooManyStreams { limit: 2 }));
    }

    #[test]
    fn rejects_file_without_streams() {
        let file = AviBuilder::new().build();
        assert!(matches!(parse(file.bytes), Err(AviError::NoStreams)));
    }

    #[test]
    fn truncates_long_stream_names() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1).named("abcdefghijklmnop"))
            .build();
        let config = DemuxConfig {
            max_stream_name: 8,
            ..DemuxConfig::default()
        };
        let container = Container::parse_with_config(&mut Cursor::new(file.bytes), config).expect("parse");
        assert_eq!(container.stream(0).expect("stream").name.as_deref(), Some("abcdefg"));
    }

    #[test]
    fn short_format_chunk_marks_format_invalid() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1).format_len(20))
            .stream(StreamSpec::audio(8_000, 1).format_len(10))
            .build();
        let container = parse(file.bytes).expect("parse");
        assert!(!container.stream(0).expect("video").format_valid);
        assert!(container.stream(0).expect("video").bitmap_format().is_none());
        assert!(!container.stream(1).expect("audio").format_valid);
    }

    #[test]
    fn records_extra_data_and_indx() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1).extra_data(b"codec-private"))
            .packets(0, &[10, 20])
            .index(IndexMode::Super { per_segment: 1 })
            .build();
        let mut src = Cursor::new(file.bytes);
        let container = Container::parse(&mut src).expect("parse");
        let stream = container.stream(0).expect("stream");
        assert!(stream.indx_offset.is_some());
        let extra = container.read_extra_data(&mut src, 0).expect("strd");
        assert_eq!(extra.as_deref(), Some(&b"codec-private"[..]));
    }

    #[test]
    fn detects_rec_lists() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11])
            .rec_lists(true)
            .index(IndexMode::None)
            .build();
        let container = parse(file.bytes).expect("parse");
        assert!(container.uses_rec_lists());
        assert!(container.flat_index().is_none());
    }

    #[test]
    fn detects_absolute_idx1_offsets() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11])
            .absolute_idx1(true)
            .build();
        let container = parse(file.bytes).expect("parse");
        assert_eq!(container.flat_index().expect("idx1").anchor, 0);
    }

    #[test]
    fn detects_movi_relative_idx1_offsets() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11])
            .build();
        let container = parse(file.bytes).expect("parse");
        assert_eq!(
            container.flat_index().expect("idx1").anchor,
            container.movi_fourcc_offset()
        );
    }

    fn with_anchor(bytes: Vec<u8>, idx1_anchor: Idx1Anchor) -> Container {
        let config = DemuxConfig {
            idx1_anchor,
            ..DemuxConfig::default()
        };
        Container::parse_with_config(&mut Cursor::new(bytes), config).expect("parse")
    }

    #[test]
    fn unmatched_idx1_offsets_fall_back_to_movi_relative() {
        let mut file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11, 12])
            .absolute_idx1(true)
            .build();
        // Point every entry past the end of the file.
        let idx1 = file.idx1_offset.expect("idx1") as usize;
        for entry in 0..3 {
            let at = idx1 + entry * Idx1Entry::SIZE + 8;
            file.bytes[at..at + 4].copy_from_slice(&0x00ff_fff0u32.to_le_bytes());
        }
        let container = with_anchor(file.bytes, Idx1Anchor::Auto);
        assert_eq!(
            container.flat_index().expect("idx1").anchor,
            container.movi_fourcc_offset()
        );
    }

    #[test]
    fn forced_idx1_anchor_skips_detection() {
        let relative = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11])
            .build();
        let container = with_anchor(relative.bytes, Idx1Anchor::Absolute);
        assert_eq!(container.flat_index().expect("idx1").anchor, 0);

        let absolute = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10, 11])
            .absolute_idx1(true)
            .build();
        let container = with_anchor(absolute.bytes, Idx1Anchor::MoviRelative);
        assert_eq!(
            container.flat_index().expect("idx1").anchor,
            container.movi_fourcc_offset()
        );
    }

    #[test]
    fn rejects_missing_main_header() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1))
            .packets(0, &[10])
            .omit_avih()
            .build();
        let err = parse(file.bytes).unwrap_err();
        assert!(matches!(err, AviError::MissingMainHeader));
        assert!(err.is_fatal());
    }

    #[test]
    fn skips_junk_and_unknown_chunks() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(25, 1).named("cam"))
            .stream(StreamSpec::audio(8_000, 1))
            .packets(0, &[10, 11])
            .packets(1, &[20])
            .junk(JunkAt::TopLevel)
            .junk(JunkAt::Header)
            .junk(JunkAt::Movi)
            .build();
        let container = parse(file.bytes).expect("parse");
        assert_eq!(container.stream_count(), 2);
        assert_eq!(container.stream(0).expect("video").name.as_deref(), Some("cam"));
        assert_eq!(container.main_header().width, 320);
        assert_eq!(container.movi_data_offset(), file.movi_data_offset);
        assert!(!container.uses_rec_lists());
        assert_eq!(container.flat_index().expect("idx1").anchor, container.movi_fourcc_offset());
    }

    #[test]
    fn summary_serializes_to_json() {
        let file = AviBuilder::new()
            .stream(StreamSpec::video(30, 1))
            .stream(StreamSpec::audio(22_050, 2))
            .packets(0, &[10])
            .build();
        let container = parse(file.bytes).expect("parse");
        let json = serde_json::to_value(container.summary()).expect("json");
        assert_eq!(json["streams"][0]["kind"], "video");
        assert_eq!(json["streams"][0]["handler"], "DIB ");
        assert_eq!(json["streams"][1]["audio"]["samples_per_sec"], 22_050);
    }
}
