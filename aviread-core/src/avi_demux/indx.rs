//! OpenDML `indx` resolution.
//!
//! A super index lists leaf `ix##` chunks without telling where each leaf
//! starts in packet numbers; that has to be summed from every preceding
//! leaf. Resolved segments are kept in a small MRU cache so repeated and
//! nearby lookups do not re-read the whole chain.

use super::chunk::FourCc;
use super::structs::{MetaIndex, StdIndexEntry, SuperIndexEntry, AVI_INDEX_OF_CHUNKS, AVI_INDEX_OF_INDEXES};
use crate::error::{AviError, Result};
use crate::source::{self, ByteSource};

/// Byte range and tag of one packet as recorded by a standard index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexedPacket {
    pub chunk_id: FourCc,
    pub offset: u64,
    pub len: u32,
    pub keyframe: bool,
}

// ============================================================================
// Segment Cache
// ============================================================================

/// One leaf of a super index, resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentInfo {
    /// Position in the super index.
    pub index: u32,
    /// Absolute offset of the leaf's `ix##` chunk header.
    pub chunk_offset: u64,
    pub chunk_size: u32,
    pub duration: u32,
    pub chunk_id: FourCc,
    pub base_offset: u64,
    pub packet_count: u32,
    /// First packet number in this leaf; unknown until every earlier leaf is summed.
    pub start_packet: Option<u64>,
}

impl SegmentInfo {
    fn entries_offset(&self) -> u64 {
        self.chunk_offset + 8 + MetaIndex::SIZE as u64
    }
}

#[derive(Debug, Clone)]
struct Slot {
    segment: Option<SegmentInfo>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed pool of segment slots ordered most-recently-used first.
///
/// The order is a doubly linked list through slot indices, so moving a slot
/// to the front and taking the tail are both O(1). Empty slots always sit
/// behind every filled one.
#[derive(Debug, Clone)]
pub(crate) struct SegmentCache {
    slots: Vec<Slot>,
    head: usize,
    tail: usize,
}

impl SegmentCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|i| Slot {
                segment: None,
                prev: i.checked_sub(1),
                next: (i + 1 < capacity).then_some(i + 1),
            })
            .collect();
        Self {
            slots,
            head: 0,
            tail: capacity - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn move_to_front(&mut self, slot: usize) {
        if slot == self.head {
            return;
        }
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        if let Some(p) = prev {
            self.slots[p].next = next;
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => {
                if let Some(p) = prev {
                    self.tail = p;
                }
            }
        }
        self.slots[self.head].prev = Some(slot);
        self.slots[slot].prev = None;
        self.slots[slot].next = Some(self.head);
        self.head = slot;
    }

    /// Find a cached segment, promoting it to most recently used.
    pub fn lookup(&mut self, index: u32) -> Option<usize> {
        let mut cursor = Some(self.head);
        while let Some(slot) = cursor {
            match &self.slots[slot].segment {
                Some(seg) if seg.index == index => {
                    self.move_to_front(slot);
                    return Some(slot);
                }
                Some(_) => cursor = self.slots[slot].next,
                None => break,
            }
        }
        None
    }

    /// Store a segment in the first empty slot, or over the least recently
    /// used one when the pool is full.
    pub fn insert(&mut self, segment: SegmentInfo) -> usize {
        let mut victim = self.tail;
        let mut cursor = Some(self.head);
        while let Some(slot) = cursor {
            if self.slots[slot].segment.is_none() {
                victim = slot;
                break;
            }
            cursor = self.slots[slot].next;
        }
        self.move_to_front(victim);
        self.slots[victim].segment = Some(segment);
        victim
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut SegmentInfo> {
        self.slots.get_mut(slot).and_then(|s| s.segment.as_mut())
    }

    /// Segment indices from most to least recently used.
    #[cfg(test)]
    pub fn order(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.slots.len());
        let mut cursor = Some(self.head);
        while let Some(slot) = cursor {
            if let Some(seg) = &self.slots[slot].segment {
                out.push(seg.index);
            }
            cursor = self.slots[slot].next;
        }
        out
    }
}

// ============================================================================
// Index Resolution
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) enum HierIndex {
    /// The `indx` chunk is itself a standard index.
    Leaf {
        entries_offset: u64,
        header: MetaIndex,
    },
    Super(SuperIndex),
}

#[derive(Debug, Clone)]
pub(crate) struct SuperIndex {
    stream_id: usize,
    entries_offset: u64,
    entries: u32,
    cache: SegmentCache,
    /// Segment the last lookup ended in; lookups walk from here.
    scan: u32,
}

fn check_header(header: &MetaIndex, stream_id: usize, what: &str) -> Result<()> {
    let expected_longs = match header.index_type {
        AVI_INDEX_OF_INDEXES => 4,
        AVI_INDEX_OF_CHUNKS => 2,
        other => {
            tracing::error!("Stream {}: unknown {} index type {}", stream_id, what, other);
            return Err(AviError::IndexMismatch(format!("unknown index type {other}")));
        }
    };
    if header.longs_per_entry != expected_longs {
        tracing::error!(
            "Stream {}: {} index has {} longs per entry, it should be {}",
            stream_id,
            what,
            header.longs_per_entry,
            expected_longs
        );
        return Err(AviError::IndexMismatch(format!(
            "longs_per_entry {} for index type {}",
            header.longs_per_entry, header.index_type
        )));
    }
    if header.index_sub_type != 0 {
        tracing::error!(
            "Stream {}: {} index sub type is {}, it should be 0",
            stream_id,
            what,
            header.index_sub_type
        );
        return Err(AviError::IndexMismatch(format!(
            "index_sub_type {}",
            header.index_sub_type
        )));
    }
    Ok(())
}

impl HierIndex {
    /// Read the `indx` header at `indx_offset` (its payload start).
    pub fn open<S: ByteSource + ?Sized>(src: &mut S, stream_id: usize, indx_offset: u64, cache_capacity: usize) -> Result<Self> {
        tracing::info!("Reading the 'indx' chunk of stream {}", stream_id);
        let header = MetaIndex::from_bytes(&source::read_at(src, indx_offset, MetaIndex::SIZE)?);
        check_header(&header, stream_id, "'indx'")?;
        let entries_offset = indx_offset + MetaIndex::SIZE as u64;

        if header.index_type == AVI_INDEX_OF_INDEXES {
            let cache = SegmentCache::new(cache_capacity);
            tracing::debug!(
                "Stream {}: super index with {} segments, {} cache slots",
                stream_id,
                header.entries_in_use,
                cache.capacity()
            );
            Ok(HierIndex::Super(SuperIndex {
                stream_id,
                entries_offset,
                entries: header.entries_in_use,
                cache,
                scan: 0,
            }))
        } else {
            Ok(HierIndex::Leaf { entries_offset, header })
        }
    }

    /// Resolve a stream packet number; `None` past the last packet.
    pub fn resolve<S: ByteSource + ?Sized>(&mut self, src: &mut S, packet: u64) -> Result<Option<IndexedPacket>> {
        match self {
            HierIndex::Leaf { entries_offset, header } => {
                if packet >= header.entries_in_use as u64 {
                    return Ok(None);
                }
                let at = *entries_offset + packet * StdIndexEntry::SIZE as u64;
                let entry = StdIndexEntry::from_bytes(&source::read_at(src, at, StdIndexEntry::SIZE)?);
                Ok(Some(IndexedPacket {
                    chunk_id: header.chunk_id,
                    offset: entry.offset as u64 + header.base_offset,
                    len: entry.packet_size(),
                    keyframe: entry.is_keyframe(),
                }))
            }
            HierIndex::Super(index) => index.resolve(src, packet),
        }
    }
}

impl SuperIndex {
    /// Slot holding segment `i`, reading it from the file on a miss.
    fn load<S: ByteSource + ?Sized>(&mut self, src: &mut S, i: u32) -> Result<usize> {
        if let Some(slot) = self.cache.lookup(i) {
            return Ok(slot);
        }
        tracing::info!("Reading super index {} for stream {} into cache", i, self.stream_id);

        let at = self.entries_offset + i as u64 * SuperIndexEntry::SIZE as u64;
        let entry = SuperIndexEntry::from_bytes(&source::read_at(src, at, SuperIndexEntry::SIZE)?);
        let leaf = MetaIndex::from_bytes(&source::read_at(src, entry.offset + 8, MetaIndex::SIZE)?);
        if leaf.index_type != AVI_INDEX_OF_CHUNKS {
            tracing::error!("Standard index chunk expected");
            return Err(AviError::IndexMismatch(format!(
                "segment {i} is index type {}",
                leaf.index_type
            )));
        }
        check_header(&leaf, self.stream_id, "standard")?;

        Ok(self.cache.insert(SegmentInfo {
            index: i,
            chunk_offset: entry.offset,
            chunk_size: entry.size,
            duration: entry.duration,
            chunk_id: leaf.chunk_id,
            base_offset: leaf.base_offset,
            packet_count: leaf.entries_in_use,
            start_packet: (i == 0).then_some(0),
        }))
    }

    fn segment_mut<S: ByteSource + ?Sized>(&mut self, src: &mut S, i: u32) -> Result<&mut SegmentInfo> {
        let slot = self.load(src, i)?;
        self.cache
            .get_mut(slot)
            .ok_or_else(|| AviError::IndexMismatch(format!("segment {i} missing from cache")))
    }

    /// Segment `i` with its start packet filled in, summing from the
    /// nearest earlier segment whose start is already known.
    fn resolved_segment<S: ByteSource + ?Sized>(&mut self, src: &mut S, i: u32) -> Result<(SegmentInfo, u64)> {
        let seg = *self.segment_mut(src, i)?;
        if let Some(start) = seg.start_packet {
            return Ok((seg, start));
        }

        // Segment 0 always knows its start, so this walk terminates.
        let mut known = i;
        let mut start = loop {
            known = known.saturating_sub(1);
            if let Some(start) = self.segment_mut(src, known)?.start_packet {
                break start;
            }
        };

        for k in known..i {
            let seg = self.segment_mut(src, k)?;
            seg.start_packet = Some(start);
            start += seg.packet_count as u64;
        }
        let seg = self.segment_mut(src, i)?;
        seg.start_packet = Some(start);
        Ok((*seg, start))
    }

    fn resolve<S: ByteSource + ?Sized>(&mut self, src: &mut S, packet: u64) -> Result<Option<IndexedPacket>> {
        if self.entries == 0 {
            return Ok(None);
        }
        // The scan position always names a real segment, so a lookup past
        // the end leaves it on the last one.
        self.scan = self.scan.min(self.entries - 1);
        loop {
            let (seg, start) = self.resolved_segment(src, self.scan)?;

            if start > packet {
                match self.scan.checked_sub(1) {
                    Some(prev) => self.scan = prev,
                    None => return Ok(None),
                }
                continue;
            }
            if start + seg.packet_count as u64 <= packet {
                if self.scan + 1 >= self.entries {
                    return Ok(None);
                }
                self.scan += 1;
                continue;
            }

            let at = seg.entries_offset() + (packet - start) * StdIndexEntry::SIZE as u64;
            let entry = StdIndexEntry::from_bytes(&source::read_at(src, at, StdIndexEntry::SIZE)?);
            return Ok(Some(IndexedPacket {
                chunk_id: seg.chunk_id,
                offset: entry.offset as u64 + seg.base_offset,
                len: entry.packet_size(),
                keyframe: entry.is_keyframe(),
            }));
        }
    }

    #[cfg(test)]
    fn cached_start(&mut self, i: u32) -> Option<u64> {
        let slot = self.cache.lookup(i)?;
        self.cache.get_mut(slot).and_then(|s| s.start_packet)
    }
}
