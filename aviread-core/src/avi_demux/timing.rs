//! Time to packet translation and seek-to-target.

use super::navigator::{dispatch_packet, Packet, PacketSink, Strategy, StreamReader};
use crate::error::Result;
use crate::source::ByteSource;

/// `floor(t_ms * rate / (1000 * scale))`; 0 when the stream has no time base.
pub fn frame_number_from_time(rate: u32, scale: u32, time_ms: u64) -> u64 {
    if scale == 0 {
        return 0;
    }
    let frames = time_ms as u128 * rate as u128 / (1000 * scale as u128);
    frames.min(u64::MAX as u128) as u64
}

/// `floor(t_ms * avg_bytes_per_sec / 1000)`.
pub fn byte_offset_from_time(avg_bytes_per_sec: u32, time_ms: u64) -> u64 {
    (time_ms as u128 * avg_bytes_per_sec as u128 / 1000).min(u64::MAX as u128) as u64
}

impl<S: ByteSource> StreamReader<'_, S> {
    pub fn frame_number_from_time(&self, time_ms: u64) -> u64 {
        let header = &self.stream_info().header;
        frame_number_from_time(header.rate, header.scale, time_ms)
    }

    /// Audio streams only; 0 when the stream has no wave format.
    pub fn byte_offset_from_time(&self, time_ms: u64) -> u64 {
        self.stream_info()
            .wave_format()
            .map_or(0, |w| byte_offset_from_time(w.avg_bytes_per_sec, time_ms))
    }

    /// Reposition for a seek that may go backward. Without an index the only
    /// way back is to start over.
    fn rewind_for(&mut self, behind: bool) {
        if self.is_end_of_stream() || (behind && self.strategy() == Strategy::LinearScan) {
            self.reset();
        }
    }

    /// Step to packet `frame` of the stream, dispatching only the packet
    /// landed on. `Ok(None)` when the stream ends first.
    pub fn seek_to_frame(&mut self, frame: u64, sink: Option<&mut dyn PacketSink>) -> Result<Option<Packet>> {
        let behind = self.last_packet().is_some_and(|p| p.stream_packet_index > frame);
        self.rewind_for(behind);

        let mut informed = false;
        while let Some(cur) = self.current().copied() {
            if cur.stream_packet_index <= frame {
                break;
            }
            if !informed && cur.stream_packet_index - frame > 1 {
                tracing::info!(
                    "Stream {}: skipping backward {} frames",
                    self.stream_id(),
                    cur.stream_packet_index - frame - 1
                );
                informed = true;
            }
            if self.retreat()?.is_none() {
                return Ok(None);
            }
        }

        loop {
            let at = self.current().map(|p| p.stream_packet_index);
            if at.is_some_and(|i| i >= frame) {
                break;
            }
            let remaining = frame - at.map_or(0, |i| i + 1);
            if !informed && remaining > 0 {
                tracing::info!("Stream {}: skipping {} frames", self.stream_id(), remaining);
                informed = true;
            }
            if self.advance()?.is_none() {
                return Ok(None);
            }
        }

        self.finish_seek(sink)
    }

    /// Step to the packet whose byte window `[stream_byte_offset,
    /// stream_byte_offset + len)` holds `byte_offset`.
    pub fn seek_to_byte_offset(&mut self, byte_offset: u64, sink: Option<&mut dyn PacketSink>) -> Result<Option<Packet>> {
        let behind = self
            .last_packet()
            .is_some_and(|p| p.stream_byte_offset > byte_offset);
        self.rewind_for(behind);

        while let Some(cur) = self.current().copied() {
            if cur.stream_byte_offset <= byte_offset {
                break;
            }
            if self.retreat()?.is_none() {
                return Ok(None);
            }
        }

        loop {
            if self.current().is_some_and(|p| p.contains_byte(byte_offset)) {
                break;
            }
            if self.advance()?.is_none() {
                return Ok(None);
            }
        }

        self.finish_seek(sink)
    }

    /// Seek by time: frame number for video and other streams, byte offset
    /// for audio.
    pub fn seek_to_time(&mut self, time_ms: u64, sink: Option<&mut dyn PacketSink>) -> Result<Option<Packet>> {
        if self.stream_info().is_audio() && self.stream_info().wave_format().is_some() {
            let target = self.byte_offset_from_time(time_ms);
            self.seek_to_byte_offset(target, sink)
        } else {
            let target = self.frame_number_from_time(time_ms);
            self.seek_to_frame(target, sink)
        }
    }

    fn finish_seek(&mut self, sink: Option<&mut dyn PacketSink>) -> Result<Option<Packet>> {
        let packet = self.current().copied();
        if let (Some(p), Some(sink)) = (&packet, sink) {
            dispatch_packet(p, sink)?;
        }
        Ok(packet)
    }
}
