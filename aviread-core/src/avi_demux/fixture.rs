//! In-memory AVI files for tests.

use bytes::BufMut;

use super::structs::{AVIF_HASINDEX, AVIIF_KEYFRAME, AVIIF_LIST, AVI_INDEX_OF_CHUNKS, AVI_INDEX_OF_INDEXES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMode {
    /// No index at all.
    None,
    /// `idx1` only.
    Idx1,
    /// `idx1` plus an `indx` that is itself a standard index.
    Leaf,
    /// `idx1` plus a super index with fixed-size leaves.
    Super { per_segment: usize },
    /// `idx1` plus a super index with the given leaf sizes; leftover packets
    /// form one more leaf.
    SuperSegments(Vec<usize>),
}

/// Where `AviBuilder::junk` puts filler chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunkAt {
    /// Between the `AVI ` form type and `LIST(hdrl)`.
    TopLevel,
    /// Inside `hdrl`, after `avih`.
    Header,
    /// Inside `movi`, between every round of packets.
    Movi,
}

pub struct StreamSpec {
    fcc_type: [u8; 4],
    handler: [u8; 4],
    rate: u32,
    scale: u32,
    format: Vec<u8>,
    name: Option<String>,
    extra: Option<Vec<u8>>,
    suffix: [u8; 2],
}

fn bitmap_header(bit_count: u16, clr_used: u32) -> Vec<u8> {
    let mut f = Vec::with_capacity(40);
    f.put_u32_le(40);
    f.put_i32_le(320);
    f.put_i32_le(240);
    f.put_u16_le(1);
    f.put_u16_le(bit_count);
    f.put_u32_le(0);
    f.put_u32_le(320 * 240 * bit_count as u32 / 8);
    f.put_i32_le(0);
    f.put_i32_le(0);
    f.put_u32_le(clr_used);
    f.put_u32_le(0);
    f
}

impl StreamSpec {
    /// 24-bit uncompressed video, packets tagged `##dc`.
    pub fn video(rate: u32, scale: u32) -> Self {
        Self {
            fcc_type: *b"vids",
            handler: *b"DIB ",
            rate,
            scale,
            format: bitmap_header(24, 0),
            name: None,
            extra: None,
            suffix: *b"dc",
        }
    }

    /// 8-bit palettised video; `palette` holds RGBQUADs.
    pub fn indexed_video(rate: u32, scale: u32, palette: &[[u8; 4]]) -> Self {
        let mut format = bitmap_header(8, palette.len() as u32);
        for quad in palette {
            format.put_slice(quad);
        }
        Self {
            format,
            ..Self::video(rate, scale)
        }
    }

    /// PCM audio with `avg_bytes_per_sec = samples_per_sec * block_align`.
    pub fn audio(samples_per_sec: u32, block_align: u16) -> Self {
        let channels = (block_align / 2).max(1);
        let mut format = Vec::with_capacity(18);
        format.put_u16_le(1);
        format.put_u16_le(channels);
        format.put_u32_le(samples_per_sec);
        format.put_u32_le(samples_per_sec * block_align as u32);
        format.put_u16_le(block_align);
        format.put_u16_le(if block_align >= 2 { 16 } else { 8 });
        format.put_u16_le(0);
        Self {
            fcc_type: *b"auds",
            handler: [0; 4],
            rate: samples_per_sec,
            scale: 1,
            format,
            name: None,
            extra: None,
            suffix: *b"wb",
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn format_len(mut self, len: usize) -> Self {
        self.format.resize(len, 0);
        self
    }

    pub fn extra_data(mut self, data: &[u8]) -> Self {
        self.extra = Some(data.to_vec());
        self
    }

    /// Tag packets `##db` instead of `##dc`.
    pub fn raw(mut self) -> Self {
        self.suffix = *b"db";
        self
    }
}

pub struct AviFile {
    pub bytes: Vec<u8>,
    pub movi_data_offset: u64,
    /// Payload offset of `idx1`, when one was written.
    pub idx1_offset: Option<u64>,
    /// Payload offset and length of every packet, per stream.
    pub packets: Vec<Vec<(u64, u32)>>,
}

struct PendingPacket {
    tag: [u8; 4],
    data: Vec<u8>,
}

struct Idx1Row {
    tag: [u8; 4],
    flags: u32,
    header_pos: usize,
    size: u32,
}

struct Located {
    tag: [u8; 4],
    data_pos: usize,
    len: u32,
    keyframe: bool,
}

pub struct AviBuilder {
    streams: Vec<StreamSpec>,
    packets: Vec<Vec<PendingPacket>>,
    rec_lists: bool,
    index: IndexMode,
    absolute_idx1: bool,
    duplicate_avih: bool,
    omit_avih: bool,
    junk: Vec<JunkAt>,
}

fn begin_chunk(out: &mut Vec<u8>, id: &[u8; 4]) -> usize {
    out.put_slice(id);
    let size_pos = out.len();
    out.put_u32_le(0);
    size_pos
}

fn end_chunk(out: &mut Vec<u8>, size_pos: usize) {
    let size = (out.len() - size_pos - 4) as u32;
    out[size_pos..size_pos + 4].copy_from_slice(&size.to_le_bytes());
    if size & 1 == 1 {
        out.put_u8(0);
    }
}

fn chunk(out: &mut Vec<u8>, id: &[u8; 4], payload: &[u8]) {
    let size_pos = begin_chunk(out, id);
    out.put_slice(payload);
    end_chunk(out, size_pos);
}

/// An odd-sized `JUNK` chunk followed by a chunk nobody knows.
fn filler_chunks(out: &mut Vec<u8>) {
    chunk(out, b"JUNK", &[0; 5]);
    chunk(out, b"vedt", &[1, 2, 3]);
}

fn begin_list(out: &mut Vec<u8>, list_type: &[u8; 4]) -> usize {
    let size_pos = begin_chunk(out, b"LIST");
    out.put_slice(list_type);
    size_pos
}

fn stream_tag(stream: usize, suffix: &[u8]) -> [u8; 4] {
    [
        b'0' + (stream / 10) as u8,
        b'0' + (stream % 10) as u8,
        suffix[0],
        suffix[1],
    ]
}

fn meta_index(out: &mut Vec<u8>, longs: u16, index_type: u8, entries: u32, chunk_id: [u8; 4], base: u64) {
    out.put_u16_le(longs);
    out.put_u8(0);
    out.put_u8(index_type);
    out.put_u32_le(entries);
    out.put_slice(&chunk_id);
    out.put_u64_le(base);
    out.put_u32_le(0);
}

fn std_entries(out: &mut Vec<u8>, packets: &[Located], base: u64) {
    for p in packets {
        out.put_u32_le((p.data_pos as u64 - base) as u32);
        out.put_u32_le(if p.keyframe { p.len } else { p.len | 0x8000_0000 });
    }
}

impl Default for AviBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AviBuilder {
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            packets: Vec::new(),
            rec_lists: false,
            index: IndexMode::Idx1,
            absolute_idx1: false,
            duplicate_avih: false,
            omit_avih: false,
            junk: Vec::new(),
        }
    }

    /// Payload written for packet `index` of `stream`.
    pub fn filler(stream: usize, index: usize, len: usize) -> Vec<u8> {
        (0..len).map(|b| (stream * 31 + index * 7 + b) as u8).collect()
    }

    pub fn stream(mut self, spec: StreamSpec) -> Self {
        self.streams.push(spec);
        self.packets.push(Vec::new());
        self
    }

    pub fn packets(mut self, stream: usize, sizes: &[u32]) -> Self {
        let suffix = self.streams[stream].suffix;
        for &size in sizes {
            let index = self.packets[stream].len();
            self.packets[stream].push(PendingPacket {
                tag: stream_tag(stream, &suffix),
                data: Self::filler(stream, index, size as usize),
            });
        }
        self
    }

    /// Append a `##pc` packet; `entries` are PALETTEENTRY (r, g, b, flags).
    pub fn palette_change(mut self, stream: usize, first: u8, entries: &[[u8; 4]]) -> Self {
        let mut data = vec![first, entries.len() as u8, 0, 0];
        for e in entries {
            data.extend_from_slice(e);
        }
        self.packets[stream].push(PendingPacket {
            tag: stream_tag(stream, b"pc"),
            data,
        });
        self
    }

    pub fn rec_lists(mut self, on: bool) -> Self {
        self.rec_lists = on;
        self
    }

    pub fn index(mut self, mode: IndexMode) -> Self {
        self.index = mode;
        self
    }

    pub fn absolute_idx1(mut self, on: bool) -> Self {
        self.absolute_idx1 = on;
        self
    }

    pub fn duplicate_avih(mut self) -> Self {
        self.duplicate_avih = true;
        self
    }

    pub fn omit_avih(mut self) -> Self {
        self.omit_avih = true;
        self
    }

    pub fn junk(mut self, at: JunkAt) -> Self {
        self.junk.push(at);
        self
    }

    fn segments(&self, count: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut left = count;
        match &self.index {
            IndexMode::Super { per_segment } => {
                let per = (*per_segment).max(1);
                while left > 0 {
                    out.push(per.min(left));
                    left -= per.min(left);
                }
            }
            IndexMode::SuperSegments(sizes) => {
                for &n in sizes {
                    if left == 0 {
                        break;
                    }
                    out.push(n.min(left));
                    left -= n.min(left);
                }
                if left > 0 {
                    out.push(left);
                }
            }
            _ => {}
        }
        out
    }

    fn write_avih(&self, out: &mut Vec<u8>) {
        let mut avih = Vec::with_capacity(56);
        avih.put_u32_le(33_333);
        avih.put_u32_le(0);
        avih.put_u32_le(0);
        avih.put_u32_le(if self.index == IndexMode::None { 0 } else { AVIF_HASINDEX });
        avih.put_u32_le(self.packets.first().map_or(0, |p| p.len() as u32));
        avih.put_u32_le(0);
        avih.put_u32_le(self.streams.len() as u32);
        avih.put_u32_le(0);
        avih.put_u32_le(320);
        avih.put_u32_le(240);
        avih.put_bytes(0, 16);
        chunk(out, b"avih", &avih);
    }

    pub fn build(self) -> AviFile {
        let mut out = Vec::new();
        let riff = begin_chunk(&mut out, b"RIFF");
        out.put_slice(b"AVI ");
        if self.junk.contains(&JunkAt::TopLevel) {
            filler_chunks(&mut out);
        }

        // hdrl, with room reserved for each indx
        let hdrl = begin_list(&mut out, b"hdrl");
        if !self.omit_avih {
            self.write_avih(&mut out);
        }
        if self.duplicate_avih {
            self.write_avih(&mut out);
        }
        if self.junk.contains(&JunkAt::Header) {
            filler_chunks(&mut out);
        }
        let mut indx_slots: Vec<Option<usize>> = Vec::new();
        for (id, spec) in self.streams.iter().enumerate() {
            let strl = begin_list(&mut out, b"strl");

            let mut strh = Vec::with_capacity(56);
            strh.put_slice(&spec.fcc_type);
            strh.put_slice(&spec.handler);
            strh.put_u32_le(0);
            strh.put_u16_le(0);
            strh.put_u16_le(0);
            strh.put_u32_le(0);
            strh.put_u32_le(spec.scale);
            strh.put_u32_le(spec.rate);
            strh.put_u32_le(0);
            strh.put_u32_le(self.packets[id].len() as u32);
            strh.put_u32_le(0);
            strh.put_u32_le(u32::MAX);
            strh.put_u32_le(0);
            strh.put_i16_le(0);
            strh.put_i16_le(0);
            strh.put_i16_le(320);
            strh.put_i16_le(240);
            chunk(&mut out, b"strh", &strh);
            chunk(&mut out, b"strf", &spec.format);
            if let Some(extra) = &spec.extra {
                chunk(&mut out, b"strd", extra);
            }
            if let Some(name) = &spec.name {
                let mut raw = name.as_bytes().to_vec();
                raw.push(0);
                chunk(&mut out, b"strn", &raw);
            }

            let count = self.packets[id].len();
            let indx_len = match &self.index {
                IndexMode::Leaf => Some(24 + 8 * count),
                IndexMode::Super { .. } | IndexMode::SuperSegments(_) => Some(24 + 16 * self.segments(count).len()),
                _ => None,
            };
            indx_slots.push(indx_len.map(|len| {
                let size_pos = begin_chunk(&mut out, b"indx");
                let payload = out.len();
                out.put_bytes(0, len);
                end_chunk(&mut out, size_pos);
                payload
            }));
            end_chunk(&mut out, strl);
        }
        end_chunk(&mut out, hdrl);

        // movi
        let movi = begin_list(&mut out, b"movi");
        let movi_fourcc = movi + 4;
        let movi_data_offset = movi_fourcc + 4;
        let mut rows = Vec::new();
        let mut located: Vec<Vec<Located>> = self.streams.iter().map(|_| Vec::new()).collect();
        let rounds = self.packets.iter().map(Vec::len).max().unwrap_or(0);

        for round in 0..rounds {
            let rec = self.rec_lists.then(|| {
                let size_pos = begin_list(&mut out, b"rec ");
                rows.push(Idx1Row {
                    tag: *b"rec ",
                    flags: AVIIF_LIST,
                    header_pos: size_pos - 4,
                    size: 0,
                });
                (size_pos, rows.len() - 1)
            });
            for (stream, packets) in self.packets.iter().enumerate() {
                let Some(packet) = packets.get(round) else {
                    continue;
                };
                let header_pos = out.len();
                chunk(&mut out, &packet.tag, &packet.data);
                let keyframe = round % 3 == 0;
                rows.push(Idx1Row {
                    tag: packet.tag,
                    flags: if keyframe { AVIIF_KEYFRAME } else { 0 },
                    header_pos,
                    size: packet.data.len() as u32,
                });
                located[stream].push(Located {
                    tag: packet.tag,
                    data_pos: header_pos + 8,
                    len: packet.data.len() as u32,
                    keyframe,
                });
            }
            if let Some((size_pos, row)) = rec {
                end_chunk(&mut out, size_pos);
                rows[row].size = (out.len() - size_pos - 4) as u32;
            }
            if round + 1 < rounds && self.junk.contains(&JunkAt::Movi) {
                filler_chunks(&mut out);
            }
        }

        // Leaf chunks of super indices live inside movi.
        let base = movi_fourcc as u64;
        let mut super_entries: Vec<Vec<(u64, u32, u32)>> = self.streams.iter().map(|_| Vec::new()).collect();
        if matches!(self.index, IndexMode::Super { .. } | IndexMode::SuperSegments(_)) {
            for (stream, packets) in located.iter().enumerate() {
                let mut start = 0;
                for count in self.segments(packets.len()) {
                    let segment = &packets[start..start + count];
                    let chunk_pos = out.len();
                    let size_pos = begin_chunk(&mut out, &stream_tag(stream, b"ix"));
                    let tag = segment.first().map_or([0; 4], |p| p.tag);
                    meta_index(&mut out, 2, AVI_INDEX_OF_CHUNKS, count as u32, tag, base);
                    std_entries(&mut out, segment, base);
                    end_chunk(&mut out, size_pos);
                    super_entries[stream].push((chunk_pos as u64, (out.len() - chunk_pos) as u32, count as u32));
                    start += count;
                }
            }
        }
        end_chunk(&mut out, movi);

        let mut idx1_offset = None;
        if self.index != IndexMode::None {
            idx1_offset = Some(out.len() as u64 + 8);
            let mut idx1 = Vec::with_capacity(rows.len() * 16);
            for row in &rows {
                let anchor = if self.absolute_idx1 { 0 } else { movi_fourcc };
                idx1.put_slice(&row.tag);
                idx1.put_u32_le(row.flags);
                idx1.put_u32_le((row.header_pos - anchor) as u32);
                idx1.put_u32_le(row.size);
            }
            chunk(&mut out, b"idx1", &idx1);
        }

        // Fill the reserved indx payloads now that every offset is known.
        for (stream, slot) in indx_slots.iter().enumerate() {
            let Some(pos) = *slot else {
                continue;
            };
            let packets = &located[stream];
            let tag = packets.first().map_or([0; 4], |p| p.tag);
            let mut indx = Vec::new();
            if self.index == IndexMode::Leaf {
                meta_index(&mut indx, 2, AVI_INDEX_OF_CHUNKS, packets.len() as u32, tag, base);
                std_entries(&mut indx, packets, base);
            } else {
                let entries = &super_entries[stream];
                meta_index(&mut indx, 4, AVI_INDEX_OF_INDEXES, entries.len() as u32, tag, 0);
                for &(offset, size, duration) in entries {
                    indx.put_u64_le(offset);
                    indx.put_u32_le(size);
                    indx.put_u32_le(duration);
                }
            }
            out[pos..pos + indx.len()].copy_from_slice(&indx);
        }

        let riff_size = (out.len() - riff - 4) as u32;
        out[riff..riff + 4].copy_from_slice(&riff_size.to_le_bytes());

        AviFile {
            bytes: out,
            movi_data_offset: movi_data_offset as u64,
            idx1_offset,
            packets: located
                .iter()
                .map(|s| s.iter().map(|p| (p.data_pos as u64, p.len)).collect())
                .collect(),
        }
    }
}
