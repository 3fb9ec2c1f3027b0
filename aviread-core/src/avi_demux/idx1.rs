//! Legacy `idx1` lookups.
//!
//! The index is never loaded: entries are read on demand by position and
//! filtered by the stream number in their tag, since one array interleaves
//! every stream.

use super::parser::FlatIndex;
use super::structs::Idx1Entry;
use crate::error::Result;
use crate::source::{self, ByteSource};

/// An `idx1` entry that belongs to the stream being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Idx1Hit {
    /// Position of the entry in the `idx1` array.
    pub entry_index: u64,
    pub entry: Idx1Entry,
    /// Absolute offset of the packet payload.
    pub data_offset: u64,
}

fn matches_stream(entry: &Idx1Entry, stream_id: usize) -> bool {
    entry.chunk_id.is_stream_data() && entry.chunk_id.stream_number() == Some(stream_id)
}

fn hit(index: &FlatIndex, entry_index: u64, entry: Idx1Entry) -> Idx1Hit {
    Idx1Hit {
        entry_index,
        entry,
        // Stored offsets point at the chunk header.
        data_offset: index.anchor + entry.offset as u64 + 8,
    }
}

pub(crate) fn read_entry<S: ByteSource + ?Sized>(src: &mut S, index: &FlatIndex, i: u64) -> Result<Idx1Entry> {
    let raw = source::read_at(src, index.entry_offset(i), Idx1Entry::SIZE)?;
    Ok(Idx1Entry::from_bytes(&raw))
}

/// First entry for `stream_id` at or after `from`.
pub(crate) fn scan_forward<S: ByteSource + ?Sized>(
    src: &mut S,
    index: &FlatIndex,
    stream_id: usize,
    from: u64,
) -> Result<Option<Idx1Hit>> {
    if from >= index.entries {
        return Ok(None);
    }
    source::seek_to(src, index.entry_offset(from))?;
    let mut raw = [0u8; Idx1Entry::SIZE];
    for i in from..index.entries {
        source::read_exact(src, &mut raw)?;
        let entry = Idx1Entry::from_bytes(&raw);
        if matches_stream(&entry, stream_id) {
            return Ok(Some(hit(index, i, entry)));
        }
    }
    Ok(None)
}

/// Last entry for `stream_id` at or before `from`.
pub(crate) fn scan_backward<S: ByteSource + ?Sized>(
    src: &mut S,
    index: &FlatIndex,
    stream_id: usize,
    from: u64,
) -> Result<Option<Idx1Hit>> {
    if index.entries == 0 {
        return Ok(None);
    }
    let mut i = from.min(index.entries - 1);
    loop {
        let entry = read_entry(src, index, i)?;
        if matches_stream(&entry, stream_id) {
            return Ok(Some(hit(index, i, entry)));
        }
        if i == 0 {
            return Ok(None);
        }
        i -= 1;
    }
}
