//! Byte source contract.
//!
//! The demuxer never opens files. Callers hand it anything that can read,
//! seek to an absolute offset and report its position; every `Read + Seek`
//! type qualifies through the blanket impl.

use std::io::{self, Read, Seek, SeekFrom};

use bytes::Buf;

use crate::avi_demux::FourCc;
use crate::error::{AviError, Result};

pub trait ByteSource {
    /// Read up to `buf.len()` bytes, returning how many were read.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Move to an absolute offset.
    fn seek(&mut self, offset: u64) -> io::Result<u64>;
    /// Current absolute offset.
    fn tell(&mut self) -> io::Result<u64>;
}

impl<T: Read + Seek + ?Sized> ByteSource for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, offset: u64) -> io::Result<u64> {
        Seek::seek(self, SeekFrom::Start(offset))
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

/// Fill `buf` completely or fail; a short read is never silently accepted.
pub(crate) fn read_exact<S: ByteSource + ?Sized>(src: &mut S, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!("Read {} bytes failed: {}", buf.len(), e);
                return Err(e.into());
            }
        }
    }
    if filled != buf.len() {
        tracing::error!("Tried to read {} bytes, got {} bytes", buf.len(), filled);
        return Err(AviError::ShortRead {
            expected: buf.len(),
            got: filled,
        });
    }
    Ok(())
}

pub(crate) fn seek_to<S: ByteSource + ?Sized>(src: &mut S, offset: u64) -> Result<()> {
    src.seek(offset).map_err(|e| {
        tracing::error!("seek({:#x}) failed: {}", offset, e);
        AviError::Io(e)
    })?;
    Ok(())
}

pub(crate) fn tell<S: ByteSource + ?Sized>(src: &mut S) -> Result<u64> {
    src.tell().map_err(|e| {
        tracing::error!("tell() failed: {}", e);
        AviError::Io(e)
    })
}

pub(crate) fn read_u32_le<S: ByteSource + ?Sized>(src: &mut S) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(src, &mut buf)?;
    let mut cursor = &buf[..];
    Ok(cursor.get_u32_le())
}

pub(crate) fn read_fourcc<S: ByteSource + ?Sized>(src: &mut S) -> Result<FourCc> {
    let mut buf = [0u8; 4];
    read_exact(src, &mut buf)?;
    Ok(FourCc::new(buf))
}

/// Read a FourCC and fail unless it equals `expected`.
pub(crate) fn expect_fourcc<S: ByteSource + ?Sized>(src: &mut S, expected: FourCc) -> Result<()> {
    let found = read_fourcc(src)?;
    if found != expected {
        tracing::error!("Matching FourCC failed: {} != {}", found, expected);
        return Err(AviError::FourCcMismatch { expected, found });
    }
    Ok(())
}

/// Read `len` bytes at `offset`, leaving the source positioned after them.
pub(crate) fn read_at<S: ByteSource + ?Sized>(src: &mut S, offset: u64, len: usize) -> Result<Vec<u8>> {
    seek_to(src, offset)?;
    let mut buf = vec![0u8; len];
    read_exact(src, &mut buf)?;
    Ok(buf)
}
