//! Pixel-format classification and palette changes.

use serde::Serialize;

use super::chunk::PacketKind;
use super::navigator::StreamReader;
use super::parser::{StreamFormat, StreamInfo};
use super::structs::{
    BitmapFormat, PaletteChange, BI_BITFIELDS, BI_JPEG, BI_PNG, BI_RGB, BI_RLE4, BI_RLE8, MAX_PALETTE_ENTRIES,
};
use crate::error::{AviError, Result};
use crate::source::ByteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 1 to 8 bits per pixel through the colour table.
    IndexedColor,
    Rgb555,
    Rgb565,
    Rgb888,
    Jpeg,
    Png,
}

const MASKS_555: [u32; 4] = [0x7C00, 0x03E0, 0x001F, 0];
const MASKS_565: [u32; 4] = [0xF800, 0x07E0, 0x001F, 0];
const MASKS_888: [u32; 4] = [0xFF_0000, 0x00_FF00, 0x00_00FF, 0];

/// Classify a decoded bitmap format; `None` when no named layout matches.
pub fn classify(format: &BitmapFormat) -> Option<PixelFormat> {
    let bits = format.header.bit_count;
    match format.header.compression {
        BI_RGB | BI_RLE8 | BI_RLE4 if (1..=8).contains(&bits) => Some(PixelFormat::IndexedColor),
        BI_RGB if bits == 16 => Some(PixelFormat::Rgb555),
        BI_RGB if bits == 24 => Some(PixelFormat::Rgb888),
        BI_BITFIELDS if bits == 16 && format.bitfields == MASKS_555 => Some(PixelFormat::Rgb555),
        BI_BITFIELDS if bits == 16 && format.bitfields == MASKS_565 => Some(PixelFormat::Rgb565),
        BI_BITFIELDS if bits == 24 && format.bitfields == MASKS_888 => Some(PixelFormat::Rgb888),
        BI_JPEG => Some(PixelFormat::Jpeg),
        BI_PNG => Some(PixelFormat::Png),
        _ => None,
    }
}

fn classify_stream_format(format: &StreamFormat, valid: bool) -> Option<PixelFormat> {
    match format {
        StreamFormat::Bitmap(bitmap) if valid => classify(bitmap),
        _ => None,
    }
}

impl StreamInfo {
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        classify_stream_format(&self.format, self.format_valid)
    }
}

/// Copy the changed slots into `format`'s palette and raise the colour
/// counters that are in use but now too small.
pub fn apply_palette_change(format: &mut BitmapFormat, change: &PaletteChange) -> Result<()> {
    let first = change.first_entry as usize;
    let end = first + change.entries.len();
    if end > MAX_PALETTE_ENTRIES {
        return Err(AviError::InvalidPaletteChange(format!(
            "entries {first}..{end} exceed the {MAX_PALETTE_ENTRIES}-entry palette"
        )));
    }
    format.palette[first..end].copy_from_slice(&change.entries);

    let end = end as u32;
    let header = &mut format.header;
    if header.clr_used != 0 && header.clr_used < end {
        header.clr_used = end;
    }
    if header.clr_important != 0 && header.clr_important < end {
        header.clr_important = end;
    }
    Ok(())
}

impl<S: ByteSource> StreamReader<'_, S> {
    /// Pixel format of the live stream format.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        classify_stream_format(&self.format, self.stream_info().format_valid)
    }

    /// Apply a palette change to this reader's copy of the stream format.
    /// Only indexed-colour streams accept one.
    pub fn apply_palette_change(&mut self, change: &PaletteChange) -> Result<()> {
        if self.pixel_format() != Some(PixelFormat::IndexedColor) {
            tracing::warn!("Stream {}: palette change on a non indexed-color stream", self.stream_id());
            return Err(AviError::NotIndexedColor {
                stream: self.stream_id(),
            });
        }
        match &mut self.format {
            StreamFormat::Bitmap(bitmap) => apply_palette_change(bitmap, change),
            _ => Err(AviError::NotIndexedColor {
                stream: self.stream_id(),
            }),
        }
    }

    /// Parse the current packet as a palette change. `None` when the reader
    /// is not on a `##pc` packet.
    pub fn read_palette_change(&mut self) -> Result<Option<PaletteChange>> {
        let is_palette = self
            .current()
            .is_some_and(|p| p.kind() == Some(PacketKind::PaletteChange));
        if !is_palette {
            return Ok(None);
        }
        let Some(data) = self.read_packet_data()? else {
            return Ok(None);
        };
        match PaletteChange::from_bytes(&data) {
            Some(change) => Ok(Some(change)),
            None => Err(AviError::InvalidPaletteChange(format!(
                "{} byte payload is shorter than its entry count",
                data.len()
            ))),
        }
    }

    /// Read the current `##pc` packet and apply it. Returns false when the
    /// reader is not on a palette change.
    pub fn apply_current_palette_change(&mut self) -> Result<bool> {
        match self.read_palette_change()? {
            Some(change) => {
                self.apply_palette_change(&change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
