// ON-DISK RECORDS - AVI / RIFF / BMP / WAVE layouts
//
// All records are little-endian and tightly packed. Each `from_bytes` takes a
// buffer of at least `SIZE` bytes; short chunks are zero-extended by the
// caller first, which is how a missing tail field reads as 0.

use bytes::Buf;
use serde::Serialize;

use super::chunk::FourCc;

// ============================================================================
// Main Header (avih)
// ============================================================================

pub const AVIF_HASINDEX: u32 = 0x0000_0010;
pub const AVIF_MUSTUSEINDEX: u32 = 0x0000_0020;
pub const AVIF_ISINTERLEAVED: u32 = 0x0000_0100;
pub const AVIF_TRUSTCKTYPE: u32 = 0x0000_0800;
pub const AVIF_WASCAPTUREFILE: u32 = 0x0001_0000;
pub const AVIF_COPYRIGHTED: u32 = 0x0002_0000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MainHeader {
    pub micro_sec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: u32,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl MainHeader {
    /// Full record including the four reserved words.
    pub const SIZE: usize = 56;
    /// Everything up to and including `height`.
    pub const MIN_SIZE: usize = 40;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        Self {
            micro_sec_per_frame: buf.get_u32_le(),
            max_bytes_per_sec: buf.get_u32_le(),
            padding_granularity: buf.get_u32_le(),
            flags: buf.get_u32_le(),
            total_frames: buf.get_u32_le(),
            initial_frames: buf.get_u32_le(),
            streams: buf.get_u32_le(),
            suggested_buffer_size: buf.get_u32_le(),
            width: buf.get_u32_le(),
            height: buf.get_u32_le(),
        }
    }

    pub fn has_index(&self) -> bool {
        self.flags & AVIF_HASINDEX != 0
    }

    pub fn header_flags(&self) -> MainHeaderFlags {
        MainHeaderFlags::from_u32(self.flags)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MainHeaderFlags {
    pub has_index: bool,
    pub must_use_index: bool,
    pub is_interleaved: bool,
    pub trust_chunk_type: bool,
    pub was_capture_file: bool,
    pub copyrighted: bool,
}

impl MainHeaderFlags {
    pub fn from_u32(value: u32) -> Self {
        Self {
            has_index: value & AVIF_HASINDEX != 0,
            must_use_index: value & AVIF_MUSTUSEINDEX != 0,
            is_interleaved: value & AVIF_ISINTERLEAVED != 0,
            trust_chunk_type: value & AVIF_TRUSTCKTYPE != 0,
            was_capture_file: value & AVIF_WASCAPTUREFILE != 0,
            copyrighted: value & AVIF_COPYRIGHTED != 0,
        }
    }
}

// ============================================================================
// Stream Header (strh)
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamHeader {
    /// `vids`, `auds`, `txts` or `mids`
    pub fcc_type: FourCc,
    /// Codec FourCC
    pub fcc_handler: FourCc,
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: u32,
    pub sample_size: u32,
    pub frame: Rect,
}

impl StreamHeader {
    pub const SIZE: usize = 56;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        let mut fcc_type = [0u8; 4];
        buf.copy_to_slice(&mut fcc_type);
        let mut fcc_handler = [0u8; 4];
        buf.copy_to_slice(&mut fcc_handler);
        Self {
            fcc_type: FourCc::new(fcc_type),
            fcc_handler: FourCc::new(fcc_handler),
            flags: buf.get_u32_le(),
            priority: buf.get_u16_le(),
            language: buf.get_u16_le(),
            initial_frames: buf.get_u32_le(),
            scale: buf.get_u32_le(),
            rate: buf.get_u32_le(),
            start: buf.get_u32_le(),
            length: buf.get_u32_le(),
            suggested_buffer_size: buf.get_u32_le(),
            quality: buf.get_u32_le(),
            sample_size: buf.get_u32_le(),
            frame: Rect {
                left: buf.get_i16_le(),
                top: buf.get_i16_le(),
                right: buf.get_i16_le(),
                bottom: buf.get_i16_le(),
            },
        }
    }
}

// ============================================================================
// Video Format (BITMAPINFOHEADER + masks / palette)
// ============================================================================

pub const BI_RGB: u32 = 0;
pub const BI_RLE8: u32 = 1;
pub const BI_RLE4: u32 = 2;
pub const BI_BITFIELDS: u32 = 3;
pub const BI_JPEG: u32 = 4;
pub const BI_PNG: u32 = 5;

pub const MAX_PALETTE_ENTRIES: usize = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaletteEntry {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub flags: u8,
}

impl PaletteEntry {
    pub const SIZE: usize = 4;

    /// BMP palettes are stored as RGBQUAD: blue, green, red, reserved.
    pub(crate) fn from_rgbquad(buf: &[u8]) -> Self {
        Self {
            blue: buf[0],
            green: buf[1],
            red: buf[2],
            flags: buf[3],
        }
    }

    /// Palette-change packets carry PALETTEENTRY: red, green, blue, flags.
    pub(crate) fn from_palette_entry(buf: &[u8]) -> Self {
        Self {
            red: buf[0],
            green: buf[1],
            blue: buf[2],
            flags: buf[3],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BitmapInfoHeader {
    pub size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl BitmapInfoHeader {
    pub const SIZE: usize = 40;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        Self {
            size: buf.get_u32_le(),
            width: buf.get_i32_le(),
            height: buf.get_i32_le(),
            planes: buf.get_u16_le(),
            bit_count: buf.get_u16_le(),
            compression: buf.get_u32_le(),
            size_image: buf.get_u32_le(),
            x_pels_per_meter: buf.get_i32_le(),
            y_pels_per_meter: buf.get_i32_le(),
            clr_used: buf.get_u32_le(),
            clr_important: buf.get_u32_le(),
        }
    }
}

/// Video stream format: the info header followed by either RGB bit-field
/// masks or a colour table. Both views are kept since the compression code
/// decides which one is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitmapFormat {
    pub header: BitmapInfoHeader,
    pub bitfields: [u32; 4],
    #[serde(skip)]
    pub palette: Vec<PaletteEntry>,
}

impl Default for BitmapFormat {
    fn default() -> Self {
        Self {
            header: BitmapInfoHeader::default(),
            bitfields: [0; 4],
            palette: vec![PaletteEntry::default(); MAX_PALETTE_ENTRIES],
        }
    }
}

impl BitmapFormat {
    /// Header plus the larger of the mask block and a full colour table.
    pub const MAX_SIZE: usize = BitmapInfoHeader::SIZE + MAX_PALETTE_ENTRIES * PaletteEntry::SIZE;

    /// Decode a `strf` payload of at least `BitmapInfoHeader::SIZE` bytes.
    pub(crate) fn from_bytes(buf: &[u8]) -> Self {
        let header = BitmapInfoHeader::from_bytes(buf);
        let mut format = Self {
            header,
            ..Self::default()
        };

        let mut masks = &buf[BitmapInfoHeader::SIZE.min(buf.len())..];
        for mask in format.bitfields.iter_mut() {
            if masks.remaining() < 4 {
                break;
            }
            *mask = masks.get_u32_le();
        }

        // The colour table follows the header as sized by biSize.
        let table_start = (format.header.size as usize).max(BitmapInfoHeader::SIZE);
        if table_start < buf.len() {
            for (slot, quad) in format
                .palette
                .iter_mut()
                .zip(buf[table_start..].chunks_exact(PaletteEntry::SIZE))
            {
                *slot = PaletteEntry::from_rgbquad(quad);
            }
        }
        format
    }
}

// ============================================================================
// Audio Format (WAVEFORMATEX)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Extra format bytes following the record; 0 when the chunk stops short of it.
    pub cb_size: u16,
}

impl WaveFormat {
    pub const SIZE: usize = 18;
    /// WAVEFORMAT without `cbSize`.
    pub const MIN_SIZE: usize = 16;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        Self {
            format_tag: buf.get_u16_le(),
            channels: buf.get_u16_le(),
            samples_per_sec: buf.get_u32_le(),
            avg_bytes_per_sec: buf.get_u32_le(),
            block_align: buf.get_u16_le(),
            bits_per_sample: buf.get_u16_le(),
            cb_size: buf.get_u16_le(),
        }
    }
}

// ============================================================================
// Flat Index (idx1)
// ============================================================================

pub const AVIIF_LIST: u32 = 0x0000_0001;
pub const AVIIF_KEYFRAME: u32 = 0x0000_0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idx1Entry {
    pub chunk_id: FourCc,
    pub flags: u32,
    /// Offset of the chunk header, relative to the anchor the file uses.
    pub offset: u32,
    pub size: u32,
}

impl Idx1Entry {
    pub const SIZE: usize = 16;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        let mut id = [0u8; 4];
        buf.copy_to_slice(&mut id);
        Self {
            chunk_id: FourCc::new(id),
            flags: buf.get_u32_le(),
            offset: buf.get_u32_le(),
            size: buf.get_u32_le(),
        }
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags & AVIIF_KEYFRAME != 0
    }
}

// ============================================================================
// OpenDML Index (indx / ix##)
// ============================================================================

pub const AVI_INDEX_OF_INDEXES: u8 = 0;
pub const AVI_INDEX_OF_CHUNKS: u8 = 1;

/// Header shared by super-index and standard-index chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaIndex {
    pub longs_per_entry: u16,
    pub index_sub_type: u8,
    pub index_type: u8,
    pub entries_in_use: u32,
    pub chunk_id: FourCc,
    /// `qwBaseOffset` for standard indices; reserved (zero) for super indices.
    pub base_offset: u64,
}

impl MetaIndex {
    pub const SIZE: usize = 24;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        let longs_per_entry = buf.get_u16_le();
        let index_sub_type = buf.get_u8();
        let index_type = buf.get_u8();
        let entries_in_use = buf.get_u32_le();
        let mut id = [0u8; 4];
        buf.copy_to_slice(&mut id);
        let base_offset = buf.get_u64_le();
        Self {
            longs_per_entry,
            index_sub_type,
            index_type,
            entries_in_use,
            chunk_id: FourCc::new(id),
            base_offset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperIndexEntry {
    /// Absolute offset of the `ix##` chunk header.
    pub offset: u64,
    pub size: u32,
    pub duration: u32,
}

impl SuperIndexEntry {
    pub const SIZE: usize = 16;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        Self {
            offset: buf.get_u64_le(),
            size: buf.get_u32_le(),
            duration: buf.get_u32_le(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdIndexEntry {
    /// Offset of the packet payload relative to the leaf's base offset.
    pub offset: u32,
    /// Payload size; bit 31 set marks a non-key frame.
    pub size: u32,
}

impl StdIndexEntry {
    pub const SIZE: usize = 8;

    pub(crate) fn from_bytes(mut buf: &[u8]) -> Self {
        Self {
            offset: buf.get_u32_le(),
            size: buf.get_u32_le(),
        }
    }

    pub fn packet_size(&self) -> u32 {
        self.size & 0x7FFF_FFFF
    }

    pub fn is_keyframe(&self) -> bool {
        self.size & 0x8000_0000 == 0
    }
}

// ============================================================================
// Palette Change (##pc payload)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteChange {
    pub first_entry: u8,
    pub flags: u16,
    pub entries: Vec<PaletteEntry>,
}

impl PaletteChange {
    pub const HEADER_SIZE: usize = 4;

    /// Decode an AVIPALCHANGE payload. Returns `None` when the payload is
    /// shorter than its declared entry count.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return None;
        }
        let mut head = &buf[..Self::HEADER_SIZE];
        let first_entry = head.get_u8();
        let count = head.get_u8() as usize;
        let flags = head.get_u16_le();
        let body = &buf[Self::HEADER_SIZE..];
        if body.len() < count * PaletteEntry::SIZE {
            return None;
        }
        let entries = body
            .chunks_exact(PaletteEntry::SIZE)
            .take(count)
            .map(PaletteEntry::from_palette_entry)
            .collect();
        Some(Self {
            first_entry,
            flags,
            entries,
        })
    }
}
