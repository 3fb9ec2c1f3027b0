//! RIFF chunk walking and the FourCC / packet-tag model.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::source::{self, ByteSource};

/// Four-character code identifying a chunk or a stream packet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Stream number encoded in the two leading decimal digits ("01wb" -> 1).
    pub fn stream_number(&self) -> Option<usize> {
        let [a, b, _, _] = self.0;
        if a.is_ascii_digit() && b.is_ascii_digit() {
            Some(((a - b'0') as usize) * 10 + (b - b'0') as usize)
        } else {
            None
        }
    }

    /// Packet kind encoded in the two trailing characters.
    pub fn packet_kind(&self) -> Option<PacketKind> {
        match &self.0[2..4] {
            b"db" | b"DB" => Some(PacketKind::VideoUncompressed),
            b"dc" | b"DC" => Some(PacketKind::VideoCompressed),
            b"pc" | b"PC" => Some(PacketKind::PaletteChange),
            b"wb" | b"WB" => Some(PacketKind::Audio),
            _ => None,
        }
    }

    /// True for `##db`, `##dc`, `##pc` and `##wb` tags.
    pub fn is_stream_data(&self) -> bool {
        self.stream_number().is_some() && self.packet_kind().is_some()
    }

    /// Packet tag for a stream, e.g. `FourCc::for_stream(1, *b"wb")` is "01wb".
    pub fn for_stream(stream: usize, suffix: [u8; 2]) -> Self {
        let stream = stream % 100;
        FourCc([
            b'0' + (stream / 10) as u8,
            b'0' + (stream % 10) as u8,
            suffix[0],
            suffix[1],
        ])
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{self}\")")
    }
}

impl From<[u8; 4]> for FourCc {
    fn from(bytes: [u8; 4]) -> Self {
        FourCc(bytes)
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Chunk and list identifiers used by the parser.
pub mod ids {
    use super::FourCc;

    pub const RIFF: FourCc = FourCc(*b"RIFF");
    pub const AVI: FourCc = FourCc(*b"AVI ");
    pub const LIST: FourCc = FourCc(*b"LIST");
    pub const JUNK: FourCc = FourCc(*b"JUNK");
    pub const HDRL: FourCc = FourCc(*b"hdrl");
    pub const AVIH: FourCc = FourCc(*b"avih");
    pub const STRL: FourCc = FourCc(*b"strl");
    pub const STRH: FourCc = FourCc(*b"strh");
    pub const STRF: FourCc = FourCc(*b"strf");
    pub const STRD: FourCc = FourCc(*b"strd");
    pub const STRN: FourCc = FourCc(*b"strn");
    pub const INDX: FourCc = FourCc(*b"indx");
    pub const MOVI: FourCc = FourCc(*b"movi");
    pub const REC: FourCc = FourCc(*b"rec ");
    pub const IDX1: FourCc = FourCc(*b"idx1");

    pub const VIDS: FourCc = FourCc(*b"vids");
    pub const AUDS: FourCc = FourCc(*b"auds");
    pub const TXTS: FourCc = FourCc(*b"txts");
    pub const MIDS: FourCc = FourCc(*b"mids");
}

/// What a stream packet carries, decided by the low two characters of its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PacketKind {
    /// `##db`
    VideoUncompressed,
    /// `##dc`
    VideoCompressed,
    /// `##pc`
    PaletteChange,
    /// `##wb`
    Audio,
}

/// Round a chunk size up to the even length RIFF stores on disk.
pub(crate) fn padded(size: u64) -> u64 {
    size + (size & 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub id: FourCc,
    pub size: u32,
    /// Absolute offset of the first payload byte.
    pub data_start: u64,
}

impl ChunkHeader {
    pub fn end(&self) -> u64 {
        self.data_start + self.size as u64
    }

    pub fn padded_end(&self) -> u64 {
        self.data_start + padded(self.size as u64)
    }
}

pub(crate) fn read_chunk_header<S: ByteSource + ?Sized>(src: &mut S) -> Result<ChunkHeader> {
    let id = source::read_fourcc(src)?;
    let size = source::read_u32_le(src)?;
    let data_start = source::tell(src)?;
    Ok(ChunkHeader { id, size, data_start })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Walk {
    Continue,
    Stop,
}

/// Visit consecutive chunks until `parent_end`.
///
/// The source must sit on a chunk header (or at `parent_end`). After each
/// handler call the source is moved to the even-padded end of the chunk,
/// whatever the handler read.
pub(crate) fn walk_chunks<S, F>(src: &mut S, parent_end: u64, mut handler: F) -> Result<()>
where
    S: ByteSource + ?Sized,
    F: FnMut(&mut S, &ChunkHeader) -> Result<Walk>,
{
    let mut pos = source::tell(src)?;
    while pos + 8 <= parent_end {
        let header = read_chunk_header(src)?;
        let flow = handler(src, &header)?;
        pos = header.padded_end();
        source::seek_to(src, pos)?;
        if flow == Walk::Stop {
            break;
        }
    }
    Ok(())
}
