// AVI DEMUXER - RIFF/AVI container reader
//
// Locates streams, formats and packets in an AVI file and hands packet byte
// ranges to the caller. Nothing is decoded here.
//
// RIFF 'AVI '
// ├── LIST 'hdrl'
// │   ├── avih (main header)
// │   └── LIST 'strl' (per stream: strh, strf, strd, strn, indx)
// ├── LIST 'movi'
// │   ├── ##dc / ##db / ##pc / ##wb packets, or LIST 'rec ' groups of them
// │   └── ix## (OpenDML standard index chunks)
// └── idx1 (legacy index)

mod chunk;
mod idx1;
mod indx;
mod navigator;
mod parser;
mod pixel;
mod structs;
mod timing;

#[cfg(test)]
pub(crate) mod fixture;

pub use chunk::{ids, FourCc, PacketKind};
pub use navigator::{dispatch_packet, Packet, PacketSink, Strategy, StreamReader};
pub use parser::{
    ChunkSpan, Container, ContainerSummary, FlatIndex, StreamFormat, StreamInfo, StreamKind, StreamSummary,
};
pub use pixel::{apply_palette_change, classify, PixelFormat};
pub use structs::{
    BitmapFormat, BitmapInfoHeader, Idx1Entry, MainHeader, MainHeaderFlags, MetaIndex, PaletteChange,
    PaletteEntry, Rect, StdIndexEntry, StreamHeader, SuperIndexEntry, WaveFormat, AVIF_COPYRIGHTED,
    AVIF_HASINDEX, AVIF_ISINTERLEAVED, AVIF_MUSTUSEINDEX, AVIF_TRUSTCKTYPE, AVIF_WASCAPTUREFILE, AVIIF_KEYFRAME,
    AVIIF_LIST, BI_BITFIELDS, BI_JPEG, BI_PNG, BI_RGB, BI_RLE4, BI_RLE8, MAX_PALETTE_ENTRIES,
};
pub use timing::{byte_offset_from_time, frame_number_from_time};

use crate::config::DemuxConfig;
use crate::error::Result;

/// Parse a file on disk and return its summary as JSON.
pub fn avi_probe(path: &std::path::Path, config: DemuxConfig) -> Result<serde_json::Value> {
    let mut file = std::fs::File::open(path)?;
    let container = Container::parse_with_config(&mut file, config)?;
    Ok(serde_json::to_value(container.summary())?)
}
